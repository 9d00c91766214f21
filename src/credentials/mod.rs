//! Per-call credential capabilities.
//!
//! An RPC layer asks a [`CallCredentials`] for [`CallMetadata`] right before
//! each outbound call. Three sources exist, selected once at construction
//! through [`Credentials`].

mod local;
mod machine;
mod remote;

use std::future::Future;

use async_trait::async_trait;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::{AuthError, CallMetadata};

pub use local::LocalCredentials;
pub use machine::ClientCredentials;
pub use remote::RemoteCredentials;

#[derive(Debug, Clone, Default)]
pub struct CallContext {
    inbound: Option<HeaderMap>,
    cancel: Option<CancellationToken>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inbound(mut self, inbound: HeaderMap) -> Self {
        self.inbound = Some(inbound);
        self
    }

    /// Cancelling the token aborts any token exchange this call triggers.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn inbound(&self) -> Option<&HeaderMap> {
        self.inbound.as_ref()
    }

    pub(crate) async fn run<T, F>(&self, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        match &self.cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => Err(AuthError::Cancelled),
                result = fut => result,
            },
            None => fut.await,
        }
    }
}

#[async_trait]
pub trait CallCredentials: Send + Sync {
    async fn metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError>;

    fn requires_transport_security(&self) -> bool;
}

#[derive(Debug)]
pub enum Credentials {
    Local(LocalCredentials),
    ClientCredential(ClientCredentials),
    Remote(RemoteCredentials),
}

impl Credentials {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::ClientCredential(_) => "client_credentials",
            Self::Remote(_) => "remote",
        }
    }
}

#[async_trait]
impl CallCredentials for Credentials {
    async fn metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        match self {
            Self::Local(credentials) => credentials.metadata(ctx).await,
            Self::ClientCredential(credentials) => credentials.metadata(ctx).await,
            Self::Remote(credentials) => credentials.metadata(ctx).await,
        }
    }

    fn requires_transport_security(&self) -> bool {
        match self {
            Self::Local(credentials) => credentials.requires_transport_security(),
            Self::ClientCredential(credentials) => credentials.requires_transport_security(),
            Self::Remote(credentials) => credentials.requires_transport_security(),
        }
    }
}

impl From<LocalCredentials> for Credentials {
    fn from(credentials: LocalCredentials) -> Self {
        Self::Local(credentials)
    }
}

impl From<ClientCredentials> for Credentials {
    fn from(credentials: ClientCredentials) -> Self {
        Self::ClientCredential(credentials)
    }
}

impl From<RemoteCredentials> for Credentials {
    fn from(credentials: RemoteCredentials) -> Self {
        Self::Remote(credentials)
    }
}
