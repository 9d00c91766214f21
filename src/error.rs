use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("os rng error: {message}")]
    OsRng { message: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    /// The auth endpoint could not be reached (DNS, TCP, TLS, timeout).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The auth endpoint answered with something other than `200 OK`.
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The token payload could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("invalid redirect uri: {0}")]
    InvalidRedirectUri(String),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("token response did not include a refresh token")]
    MissingRefreshToken,

    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("state mismatch in authorization callback")]
    StateMismatch,

    #[error("no stored credentials at {}", path.display())]
    CredentialsNotFound { path: PathBuf },

    #[error("stored credentials at {} are corrupt: {source}", path.display())]
    CredentialsCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not determine a home directory for the credential store")]
    NoHomeDirectory,

    #[error("missing configuration: {name}")]
    MissingConfig { name: &'static str },

    #[error("failed to bind callback listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("callback listener on {addr} failed: {message}")]
    Listener { addr: SocketAddr, message: String },

    #[error("local server timed out after {timeout:?}")]
    LocalServerTimeout { timeout: std::time::Duration },

    #[error("operation cancelled")]
    Cancelled,
}

impl AuthError {
    /// True when the caller should run the browser login instead of failing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::CredentialsNotFound { .. })
    }
}
