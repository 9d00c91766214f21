use std::collections::BTreeMap;

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::AuthError;

pub const EXPIRY_MARGIN_SECS: i64 = 60;

pub const AUTHORIZATION_KEY: &str = "authorization";

#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_url: String,
    pub pkce: crate::PkcePair,
    pub state: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    pub fn expires_at(&self, issued_at: i64) -> i64 {
        issued_at
            .saturating_add(self.expires_in)
            .saturating_sub(EXPIRY_MARGIN_SECS)
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub access_token_expires: i64,
    pub refresh_token: String,
}

impl StoredCredentials {
    // The initial code exchange must carry a refresh token.
    pub fn from_response(response: TokenResponse, issued_at: i64) -> Result<Self, AuthError> {
        let access_token_expires = response.expires_at(issued_at);
        let refresh_token = response.refresh_token.ok_or(AuthError::MissingRefreshToken)?;
        Ok(Self {
            access_token: response.access_token,
            access_token_expires,
            refresh_token,
        })
    }

    pub fn refreshed(&self, response: TokenResponse, issued_at: i64) -> Self {
        let access_token_expires = response.expires_at(issued_at);
        Self {
            access_token: response.access_token,
            access_token_expires,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| self.refresh_token.clone()),
        }
    }

    pub fn is_valid_at(&self, now: i64) -> bool {
        now < self.access_token_expires
    }

    /// True until the server-side expiry, which lies one margin past
    /// `access_token_expires`.
    pub fn is_unexpired_at(&self, now: i64) -> bool {
        now < self.access_token_expires.saturating_add(EXPIRY_MARGIN_SECS)
    }
}

impl std::fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("access_token", &"<redacted>")
            .field("access_token_expires", &self.access_token_expires)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Empty when no credential is available. An `authorization` key is never
/// present with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallMetadata(BTreeMap<String, String>);

impl CallMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_authorization(value: impl Into<String>) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(AUTHORIZATION_KEY.to_string(), value.into());
        Self(entries)
    }

    pub fn bearer(access_token: &str) -> Self {
        Self::with_authorization(format!("Bearer {access_token}"))
    }

    pub fn authorization(&self) -> Option<&str> {
        self.get(AUTHORIZATION_KEY)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn to_header_map(&self) -> Result<HeaderMap, AuthError> {
        let mut headers = HeaderMap::with_capacity(self.0.len());
        for (name, value) in &self.0 {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| AuthError::InvalidHeader {
                    name: name.clone(),
                    value: "<redacted>".to_string(),
                })?;
            let mut header_value =
                HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader {
                    name: name.clone(),
                    value: "<redacted>".to_string(),
                })?;
            header_value.set_sensitive(true);
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }
}
