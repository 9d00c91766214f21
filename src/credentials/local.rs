use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::{
    AuthConfig, AuthError, CallMetadata, CredentialStore, StoredCredentials, TokenClient,
    TokenGrant,
};

use super::{CallContext, CallCredentials};

// The mutex is held across check, refresh and persist so concurrent callers
// share one refresh.
pub struct LocalCredentials {
    client: TokenClient,
    client_id: String,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    cached: Mutex<StoredCredentials>,
}

impl LocalCredentials {
    pub fn new(
        client: TokenClient,
        client_id: impl Into<String>,
        store: CredentialStore,
        credentials: StoredCredentials,
    ) -> Self {
        Self {
            client,
            client_id: client_id.into(),
            store,
            clock: Arc::new(SystemClock),
            cached: Mutex::new(credentials),
        }
    }

    pub async fn load(
        config: &AuthConfig,
        client: TokenClient,
        store: CredentialStore,
    ) -> Result<Self, AuthError> {
        let credentials = store.load().await?;
        Ok(Self::new(client, config.client_id.clone(), store, credentials))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current access token, refreshed first once inside the expiry margin.
    /// A failed refresh still yields the previous token until its real
    /// expiry, one margin later.
    pub async fn access_token(&self, ctx: &CallContext) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        let now = self.clock.now();
        if cached.is_valid_at(now) {
            return Ok(cached.access_token.clone());
        }

        tracing::debug!(
            expired_at = cached.access_token_expires,
            now,
            "access token expired, refreshing"
        );

        let grant = TokenGrant::RefreshToken {
            client_id: self.client_id.clone(),
            refresh_token: cached.refresh_token.clone(),
        };
        let response = match ctx.run(self.client.exchange(&grant)).await {
            Ok(response) => response,
            Err(err) if !matches!(err, AuthError::Cancelled) && cached.is_unexpired_at(now) =>
            {
                tracing::warn!(
                    error = %err,
                    expired_at = cached.access_token_expires,
                    "refresh failed, serving previous access token until it lapses"
                );
                return Ok(cached.access_token.clone());
            }
            Err(err) => return Err(err),
        };
        let refreshed = cached.refreshed(response, now);

        self.store.save(&refreshed).await?;
        *cached = refreshed;

        tracing::info!(
            expires_at = cached.access_token_expires,
            "refreshed access token"
        );
        Ok(cached.access_token.clone())
    }

    pub async fn snapshot(&self) -> StoredCredentials {
        self.cached.lock().await.clone()
    }
}

#[async_trait]
impl CallCredentials for LocalCredentials {
    async fn metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        let access_token = self.access_token(ctx).await?;
        Ok(CallMetadata::bearer(&access_token))
    }

    fn requires_transport_security(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for LocalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCredentials")
            .field("client_id", &self.client_id)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
