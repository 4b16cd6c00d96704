use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AuthFailure, Error, Result};

/// Tokens that expire within this many seconds count as expiring soon
pub const EXPIRING_SOON_SECS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    Authenticated,
    /// Still valid, but due for a refresh
    ExpiringSoon,
    Expired,
}

/// `data` object of a successful `/auth/login` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    #[serde(default)]
    pub user_id: Option<Value>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub linked_accounts: LinkedAccounts,
}

#[derive(Debug, Deserialize)]
pub struct LinkedAccounts {
    pub ayla: LinkedToken,
}

#[derive(Debug, Deserialize)]
pub struct LinkedToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

/// Ayla credentials handed to a downstream Ayla SDK
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedCredentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub primary_expiry: Option<DateTime<Utc>>,
    pub linked_access_token: Option<String>,
    pub linked_refresh_token: Option<String>,
    pub linked_expiry: Option<DateTime<Utc>>,
    pub linked_expires_in: Option<i64>,
    pub authenticated: bool,
}

impl Credentials {
    /// Build a fully authenticated store from a login payload received at `now`.
    ///
    /// Fails with [`AuthFailure::MalformedResponse`] when a lifetime can't be
    /// represented as a timestamp.
    pub fn from_login(data: LoginData, now: DateTime<Utc>) -> Result<Self> {
        let user_id = data.user_id.map(|id| match id {
            Value::String(s) => s,
            other => other.to_string(),
        });
        let linked = data.linked_accounts.ayla;
        let primary_expiry = expiry_after(now, data.expires_in, "expiresIn")?;
        let linked_expiry = expiry_after(now, linked.expires_in, "ayla expires_in")?;

        Ok(Self {
            user_id,
            access_token: Some(data.access_token),
            refresh_token: Some(data.refresh_token),
            primary_expiry: Some(primary_expiry),
            linked_access_token: Some(linked.access_token),
            linked_refresh_token: Some(linked.refresh_token),
            linked_expiry: Some(linked_expiry),
            linked_expires_in: Some(linked.expires_in),
            authenticated: true,
        })
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> AuthState {
        let expiry = match (self.authenticated, &self.access_token, self.primary_expiry) {
            (true, Some(token), Some(expiry)) if !token.is_empty() => expiry,
            _ => return AuthState::Unauthenticated,
        };

        if now > expiry {
            AuthState::Expired
        } else if now > expiry - Duration::seconds(EXPIRING_SOON_SECS) {
            AuthState::ExpiringSoon
        } else {
            AuthState::Authenticated
        }
    }

    /// Validate the session at `now`.
    ///
    /// Missing, unauthenticated or expired tokens fail with [`Error::NotAuthed`].
    /// With `require_not_expiring_soon`, a token inside the refresh window fails
    /// with [`Error::AuthExpiring`].
    pub fn check_at(&self, now: DateTime<Utc>, require_not_expiring_soon: bool) -> Result<()> {
        match self.state_at(now) {
            AuthState::Unauthenticated | AuthState::Expired => Err(Error::NotAuthed),
            AuthState::ExpiringSoon if require_not_expiring_soon => Err(Error::AuthExpiring),
            AuthState::ExpiringSoon | AuthState::Authenticated => Ok(()),
        }
    }

    pub fn bearer(&self) -> Option<String> {
        self.access_token
            .as_ref()
            .map(|token| format!("Bearer {}", token))
    }

    pub fn linked(&self) -> Option<LinkedCredentials> {
        Some(LinkedCredentials {
            access_token: self.linked_access_token.clone()?,
            refresh_token: self.linked_refresh_token.clone()?,
            expires_in: self.linked_expires_in?,
        })
    }
}

fn expiry_after(now: DateTime<Utc>, seconds: i64, field: &str) -> Result<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            Error::auth(
                AuthFailure::MalformedResponse,
                format!("{} out of range: {}", field, seconds),
            )
        })
}
