use reqwest::{Client, StatusCode, tls};
use url::Url;

use crate::{AuthConfig, AuthError, TokenResponse};

/// Form payload for one token-endpoint exchange.
#[derive(Clone)]
pub enum TokenGrant {
    AuthorizationCode {
        client_id: String,
        code: String,
        code_verifier: String,
        redirect_uri: String,
    },
    RefreshToken {
        client_id: String,
        refresh_token: String,
    },
    ClientCredentials {
        audience: String,
        client_id: String,
        client_secret: String,
    },
}

impl TokenGrant {
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
            Self::ClientCredentials { .. } => "client_credentials",
        }
    }

    pub fn form_params(&self) -> Vec<(&'static str, &str)> {
        let mut params = vec![("grant_type", self.grant_type())];
        match self {
            Self::AuthorizationCode {
                client_id,
                code,
                code_verifier,
                redirect_uri,
            } => {
                params.push(("client_id", client_id));
                params.push(("code", code));
                params.push(("code_verifier", code_verifier));
                params.push(("redirect_uri", redirect_uri));
            }
            Self::RefreshToken {
                client_id,
                refresh_token,
            } => {
                params.push(("client_id", client_id));
                params.push(("refresh_token", refresh_token));
            }
            Self::ClientCredentials {
                audience,
                client_id,
                client_secret,
            } => {
                params.push(("audience", audience));
                params.push(("client_id", client_id));
                params.push(("client_secret", client_secret));
            }
        }
        params
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

/// Performs token exchanges against the authorization server.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: Client,
    token_url: Url,
}

impl TokenClient {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        let mut builder = Client::builder().min_tls_version(tls::Version::TLS_1_2);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Self::with_http_client(config, http)
    }

    pub fn with_http_client(config: &AuthConfig, http: Client) -> Result<Self, AuthError> {
        Ok(Self {
            http,
            token_url: Url::parse(&config.token_url)?,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Sends one form-encoded POST. Failures are returned as-is; retrying is
    /// up to the caller.
    pub async fn exchange(&self, grant: &TokenGrant) -> Result<TokenResponse, AuthError> {
        tracing::debug!(
            grant_type = grant.grant_type(),
            token_url = %self.token_url,
            "requesting token"
        );

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&grant.form_params())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            tracing::warn!(
                grant_type = grant.grant_type(),
                status = status.as_u16(),
                "token endpoint rejected request"
            );
            return Err(AuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|err| AuthError::InvalidResponse {
            message: err.to_string(),
            body,
        })
    }
}
