//! HTTP plumbing shared by the async and blocking clients.
//!
//! The session core only produces [`ApiRequest`] descriptors and consumes
//! [`ApiResponse`] values, so anything that can move JSON over HTTP can sit
//! underneath it. `reqwest::Client` and `reqwest::blocking::Client` are wired
//! up out of the box.

use std::collections::HashMap;
use std::future::Future;

use log::debug;
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed body. `Null` for an empty body, a JSON string for a body that isn't JSON.
    pub json: Value,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Best-effort extraction of the server's `error.message`
    pub fn error_message(&self) -> String {
        self.json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.json.to_string())
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Non-blocking transport capability
pub trait Transport: Send + Sync {
    fn request(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send;
}

/// Blocking transport capability
pub trait BlockingTransport: Send + Sync {
    fn request(&self, request: ApiRequest) -> Result<ApiResponse>;
}

impl Transport for reqwest::Client {
    fn request(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send {
        async move {
            debug!("{:?} {}", request.method, request.url);

            let mut builder =
                reqwest::Client::request(self, request.method.into(), request.url.as_str());
            if !request.query.is_empty() {
                builder = builder.query(&request.query);
            }
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;

            debug!("{} -> {}", request.url, status);
            Ok(ApiResponse {
                status,
                json: parse_body(&text),
            })
        }
    }
}

impl BlockingTransport for reqwest::blocking::Client {
    fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        debug!("{:?} {}", request.method, request.url);

        let mut builder =
            reqwest::blocking::Client::request(self, request.method.into(), request.url.as_str());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let text = response.text()?;

        debug!("{} -> {}", request.url, status);
        Ok(ApiResponse {
            status,
            json: parse_body(&text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("Bad Gateway"), json!("Bad Gateway"));
    }

    #[test]
    fn test_error_message_extraction() {
        let response = ApiResponse {
            status: 401,
            json: json!({"error": {"message": "Invalid credentials"}}),
        };
        assert!(!response.is_success());
        assert_eq!(response.error_message(), "Invalid credentials");

        let response = ApiResponse {
            status: 500,
            json: json!("upstream down"),
        };
        assert_eq!(response.error_message(), "\"upstream down\"");
    }
}
