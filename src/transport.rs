use reqwest::{Client, Method, RequestBuilder, tls};

use crate::AuthError;
use crate::credentials::{CallContext, CallCredentials, Credentials};

/// Channel security chosen for a target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSecurity {
    Plaintext,
    /// TLS 1.2 or newer.
    Tls { verify_certificates: bool },
}

impl ChannelSecurity {
    /// Loopback targets go in plaintext. Anything else uses TLS, and
    /// dotless cluster-internal names skip certificate verification.
    pub fn for_address(addr: &str) -> Self {
        if addr.starts_with("localhost:") || addr.starts_with("127.0.0.1:") {
            return Self::Plaintext;
        }
        Self::Tls {
            verify_certificates: addr.contains('.'),
        }
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls { .. })
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Plaintext => "http",
            Self::Tls { .. } => "https",
        }
    }

    pub fn http_client(&self) -> Result<Client, AuthError> {
        let builder = match self {
            Self::Plaintext => Client::builder(),
            Self::Tls {
                verify_certificates,
            } => Client::builder()
                .https_only(true)
                .min_tls_version(tls::Version::TLS_1_2)
                .danger_accept_invalid_certs(!verify_certificates),
        };
        Ok(builder.build()?)
    }
}

/// An authenticated connection to one service address.
#[derive(Debug)]
pub struct Channel {
    addr: String,
    security: ChannelSecurity,
    credentials: Credentials,
    http: Client,
}

impl Channel {
    pub fn connect(addr: impl Into<String>, credentials: Credentials) -> Result<Self, AuthError> {
        let addr = addr.into();
        let security = ChannelSecurity::for_address(&addr);
        if !security.is_tls() && credentials.requires_transport_security() {
            tracing::debug!(%addr, "sending credentials over plaintext loopback channel");
        }
        let http = security.http_client()?;
        tracing::debug!(%addr, ?security, credentials = credentials.kind(), "channel ready");
        Ok(Self {
            addr,
            security,
            credentials,
            http,
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn security(&self) -> ChannelSecurity {
        self.security
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.security.scheme(), self.addr)
    }

    /// Starts a request to `path` carrying this call's credential metadata.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        ctx: &CallContext,
    ) -> Result<RequestBuilder, AuthError> {
        let metadata = self.credentials.metadata(ctx).await?;
        let url = format!("{}/{}", self.base_url(), path.trim_start_matches('/'));
        Ok(self
            .http
            .request(method, url)
            .headers(metadata.to_header_map()?))
    }
}
