use std::time::Duration;

use crate::AuthError;

const AUTHORIZE_URL: &str = "https://auth.topos.com/authorize";
const TOKEN_URL: &str = "https://auth.topos.com/oauth/token";

const DEFAULT_CLIENT_ID: &str = "tJbqmqfttOHJ0kGfy8Bvf60v8Z4pW7T4";
const DEFAULT_AUDIENCE: &str = "https://endpoints.topos.com";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8676/callback";
const DEFAULT_SCOPE: &str = "offline_access";

pub const CLIENT_ID_ENV: &str = "TOPOS_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "TOPOS_CLIENT_SECRET";

/// Endpoints and public-client settings for the authorization server.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub authorize_url: String,
    pub token_url: String,
    pub client_id: String,
    pub audience: String,
    pub redirect_uri: String,
    pub scope: String,
    pub timeout: Option<Duration>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: None,
        }
    }
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points both endpoints at another auth host, e.g. `https://auth.example.com`.
    pub fn with_auth_host(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        self.authorize_url = format!("{base}/authorize");
        self.token_url = format!("{base}/oauth/token");
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Machine identity for the client-credentials grant.
#[derive(Clone)]
pub struct MachineConfig {
    pub client_id: String,
    pub client_secret: String,
}

impl MachineConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let config = Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads `TOPOS_CLIENT_ID` and `TOPOS_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client_id = lookup(CLIENT_ID_ENV).ok_or(AuthError::MissingConfig {
            name: CLIENT_ID_ENV,
        })?;
        let client_secret = lookup(CLIENT_SECRET_ENV).ok_or(AuthError::MissingConfig {
            name: CLIENT_SECRET_ENV,
        })?;
        Self::new(client_id, client_secret)
    }

    fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::MissingConfig {
                name: CLIENT_ID_ENV,
            });
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::MissingConfig {
                name: CLIENT_SECRET_ENV,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for MachineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}
