//! Transport-independent half of the Culligan client.
//!
//! [`Session`] owns the credential store and knows how to build every request
//! and interpret every response. The async and blocking clients only move the
//! descriptors it produces over the wire.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::{json, Value};

use crate::command::{command_succeeded, CommandPayload};
use crate::credentials::{AuthState, Credentials, LinkedCredentials, LoginData};
use crate::device::{Device, RegistryData, RegistryEntry};
use crate::error::{AuthFailure, Error, Result};
use crate::transport::{ApiRequest, ApiResponse, HttpMethod};

pub const DEFAULT_BASE_URL: &str = "https://api.cws.culligan.com/v2";

/// Metadata field the server returns as a JSON document encoded in a string
pub const ONBOARDING_SURVEY_KEY: &str = "CWS-onboarding-survey";

pub struct Session {
    email: String,
    password: String,
    app_id: String,
    base_url: String,
    credentials: RwLock<Credentials>,
    tracked_serials: Mutex<Vec<String>>,
}

impl Session {
    pub fn new(email: &str, password: &str, app_id: &str, base_url: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
            app_id: app_id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: RwLock::new(Credentials::default()),
            tracked_serials: Mutex::new(Vec::new()),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn read_credentials(&self) -> std::sync::RwLockReadGuard<'_, Credentials> {
        self.credentials.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_credentials(&self) -> std::sync::RwLockWriteGuard<'_, Credentials> {
        self.credentials
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the credential store
    pub fn credentials(&self) -> Credentials {
        self.read_credentials().clone()
    }

    // ── Sign-in / refresh / sign-out ────────────────────────────────

    pub fn sign_in_request(&self) -> ApiRequest {
        ApiRequest::new(HttpMethod::Post, self.url("/auth/login")).with_body(json!({
            "email": self.email,
            "password": self.password,
            "appId": self.app_id,
        }))
    }

    pub fn refresh_request(&self) -> Result<ApiRequest> {
        let refresh_token = self
            .read_credentials()
            .refresh_token
            .clone()
            .ok_or(Error::NotAuthed)?;

        Ok(
            ApiRequest::new(HttpMethod::Put, self.url("/auth/login")).with_body(json!({
                "refreshToken": refresh_token,
                "appId": self.app_id,
            })),
        )
    }

    /// Update the credential store from a `/auth/login` response.
    ///
    /// The store is replaced in one critical section on success. On failure
    /// the session is marked unauthenticated and the error returned.
    pub fn apply_auth_response(&self, response: ApiResponse) -> Result<()> {
        let parsed =
            parse_login(&response).and_then(|data| Credentials::from_login(data, Utc::now()));
        let mut credentials = self.write_credentials();

        match parsed {
            Ok(fresh) => {
                *credentials = fresh;
                debug!("Authenticated as {}", self.email);
                Ok(())
            }
            Err(err) => {
                credentials.authenticated = false;
                warn!("Authentication failed for {}: {}", self.email, err);
                Err(err)
            }
        }
    }

    pub fn sign_out(&self) {
        self.write_credentials().clear();
        debug!("Signed out {}", self.email);
    }

    // ── Validity ────────────────────────────────────────────────────

    pub fn auth_state(&self) -> AuthState {
        self.read_credentials().state_at(Utc::now())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.auth_state(),
            AuthState::Authenticated | AuthState::ExpiringSoon
        )
    }

    /// When the primary token expires, if signed in
    pub fn auth_expiration(&self) -> Option<DateTime<Utc>> {
        let credentials = self.read_credentials();
        if credentials.authenticated {
            credentials.primary_expiry
        } else {
            None
        }
    }

    pub fn check_auth(&self, require_not_expiring_soon: bool) -> Result<()> {
        self.check_auth_at(Utc::now(), require_not_expiring_soon)
    }

    pub fn check_auth_at(&self, now: DateTime<Utc>, require_not_expiring_soon: bool) -> Result<()> {
        let result = self
            .read_credentials()
            .check_at(now, require_not_expiring_soon);

        if let Err(Error::NotAuthed) = result {
            let mut credentials = self.write_credentials();
            if credentials.authenticated {
                debug!("Session for {} is no longer valid", self.email);
                credentials.authenticated = false;
            }
        }
        result
    }

    /// `Authorization: Bearer <token>` for the current session
    pub fn auth_header(&self) -> Result<HashMap<String, String>> {
        self.check_auth(false)?;
        let bearer = self.read_credentials().bearer().ok_or(Error::NotAuthed)?;
        Ok(HashMap::from([("Authorization".to_string(), bearer)]))
    }

    /// Caller headers overlaid with the auth header
    pub fn headers(&self, extra: HashMap<String, String>) -> Result<HashMap<String, String>> {
        let mut headers = extra;
        headers.extend(self.auth_header()?);
        Ok(headers)
    }

    pub fn no_cache_header() -> HashMap<String, String> {
        HashMap::from([("Cache-Control".to_string(), "no-cache".to_string())])
    }

    pub fn export_linked_credentials(&self) -> Option<LinkedCredentials> {
        self.read_credentials().linked()
    }

    // ── Authenticated requests ──────────────────────────────────────

    pub fn authed_request(
        &self,
        method: HttpMethod,
        path: &str,
        extra_headers: HashMap<String, String>,
    ) -> Result<ApiRequest> {
        Ok(ApiRequest::new(method, self.url(path)).with_headers(self.headers(extra_headers)?))
    }

    pub fn profile_request(&self) -> Result<ApiRequest> {
        self.authed_request(HttpMethod::Get, "/user/profile", HashMap::new())
    }

    pub fn metadata_request(&self) -> Result<ApiRequest> {
        self.authed_request(HttpMethod::Get, "/metadata/user", HashMap::new())
    }

    pub fn registry_request(&self, extra_headers: HashMap<String, String>) -> Result<ApiRequest> {
        self.authed_request(HttpMethod::Get, "/device/registry", extra_headers)
    }

    pub fn device_data_request(&self, serial_number: &str) -> Result<ApiRequest> {
        Ok(self
            .authed_request(HttpMethod::Get, "/device/data", HashMap::new())?
            .with_query("serialNumber", serial_number))
    }

    pub fn command_request(&self, payload: &CommandPayload) -> Result<ApiRequest> {
        Ok(self
            .authed_request(HttpMethod::Post, "/device/command", HashMap::new())?
            .with_body(serde_json::to_value(payload)?))
    }

    // ── Response interpretation ─────────────────────────────────────

    pub fn parse_profile(&self, response: ApiResponse) -> Result<Value> {
        take_data(read_body(response)?)
    }

    pub fn parse_metadata(&self, response: ApiResponse) -> Result<Value> {
        let mut data = take_data(read_body(response)?)?;

        let decoded = match data.get(ONBOARDING_SURVEY_KEY) {
            Some(Value::String(encoded)) => Some(serde_json::from_str::<Value>(encoded)?),
            _ => None,
        };
        if let Some(decoded) = decoded {
            data[ONBOARDING_SURVEY_KEY] = decoded;
        }
        Ok(data)
    }

    /// Parse the registry and remember every serial it names
    pub fn parse_registry(&self, response: ApiResponse) -> Result<Vec<RegistryEntry>> {
        let data = take_data(read_body(response)?)?;
        let registry: RegistryData = serde_json::from_value(data)
            .map_err(|e| Error::MalformedResponse(format!("device registry: {}", e)))?;

        self.track_serials(&registry.devices);
        debug!("Registry lists {} devices", registry.devices.len());
        Ok(registry.devices)
    }

    pub fn parse_device_data(&self, response: ApiResponse) -> Result<Value> {
        read_body(response)
    }

    pub fn apply_device_data(&self, device: &mut Device, response: ApiResponse) -> Result<bool> {
        device.apply_snapshot(&read_body(response)?)
    }

    /// `success` decides the outcome whenever the server sends it, whatever
    /// the status. 401 is still an auth failure.
    pub fn parse_command_response(&self, response: ApiResponse) -> Result<bool> {
        if response.status != 401 && response.json.get("success").is_some() {
            if !response.is_success() {
                warn!("Command answered with status {}", response.status);
            }
            return Ok(command_succeeded(&response.json));
        }
        Ok(command_succeeded(&read_body(response)?))
    }

    // ── Serial tracking ─────────────────────────────────────────────

    fn track_serials(&self, entries: &[RegistryEntry]) {
        let mut tracked = self
            .tracked_serials
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for entry in entries {
            if !tracked.contains(&entry.serial_number) {
                tracked.push(entry.serial_number.clone());
            }
        }
    }

    /// Every serial seen in a registry fetch, in first-seen order
    pub fn tracked_serials(&self) -> Vec<String> {
        self.tracked_serials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Only a 200 signs in. Any other status, 2xx included, is a rejection.
fn parse_login(response: &ApiResponse) -> Result<LoginData> {
    if response.status != 200 {
        let reason = AuthFailure::from_status(response.status);
        let message = response.error_message();
        let message = match reason {
            AuthFailure::NotFound => format!("{} (Confirm login information is correct)", message),
            AuthFailure::Unprocessable => format!(
                "{} (Confirm login information is correct, username should be an email address.)",
                message
            ),
            _ => message,
        };
        return Err(Error::auth(reason, message));
    }

    let data = response.json.get("data").ok_or_else(|| {
        Error::auth(
            AuthFailure::MalformedResponse,
            format!("no 'data' in the response: {}", response.json),
        )
    })?;

    serde_json::from_value(data.clone())
        .map_err(|e| Error::auth(AuthFailure::MalformedResponse, e.to_string()))
}

/// Body of an authenticated read. 401 means the token died mid-session.
fn read_body(response: ApiResponse) -> Result<Value> {
    if response.status == 401 {
        return Err(Error::auth(
            AuthFailure::Unauthorized,
            response.error_message(),
        ));
    }
    if !response.is_success() {
        return Err(Error::Api {
            status: response.status,
            message: response.error_message(),
        });
    }
    Ok(response.json)
}

fn take_data(mut body: Value) -> Result<Value> {
    if let Some(data) = body.get_mut("data") {
        return Ok(data.take());
    }
    Err(Error::MalformedResponse(format!(
        "no 'data' in the response: {}",
        body
    )))
}
