use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::{
    AuthConfig, AuthError, CallMetadata, EXPIRY_MARGIN_SECS, MachineConfig, TokenClient, TokenGrant,
};

use super::{CallContext, CallCredentials};

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: i64,
}

pub struct ClientCredentials {
    client: TokenClient,
    audience: String,
    machine: MachineConfig,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl ClientCredentials {
    pub fn new(client: TokenClient, config: &AuthConfig, machine: MachineConfig) -> Self {
        Self {
            client,
            audience: config.audience.clone(),
            machine,
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
        }
    }

    pub fn from_env(client: TokenClient, config: &AuthConfig) -> Result<Self, AuthError> {
        Ok(Self::new(client, config, MachineConfig::from_env()?))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn access_token(&self, ctx: &CallContext) -> Result<String, AuthError> {
        let mut cached = self.cached.lock().await;

        let now = self.clock.now();
        if let Some(token) = cached.as_ref().filter(|token| now < token.expires_at) {
            return Ok(token.access_token.clone());
        }

        let grant = TokenGrant::ClientCredentials {
            audience: self.audience.clone(),
            client_id: self.machine.client_id.clone(),
            client_secret: self.machine.client_secret.clone(),
        };
        let response = match ctx.run(self.client.exchange(&grant)).await {
            Ok(response) => response,
            Err(err) => {
                let previous = cached.as_ref().filter(|token| {
                    !matches!(err, AuthError::Cancelled)
                        && now < token.expires_at.saturating_add(EXPIRY_MARGIN_SECS)
                });
                let Some(previous) = previous else {
                    return Err(err);
                };
                tracing::warn!(
                    error = %err,
                    client_id = %self.machine.client_id,
                    "token request failed, serving previous machine token until it lapses"
                );
                return Ok(previous.access_token.clone());
            }
        };
        let token = CachedToken {
            expires_at: response.expires_at(now),
            access_token: response.access_token,
        };

        tracing::info!(
            client_id = %self.machine.client_id,
            expires_at = token.expires_at,
            "obtained machine access token"
        );

        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}

#[async_trait]
impl CallCredentials for ClientCredentials {
    async fn metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        let access_token = self.access_token(ctx).await?;
        Ok(CallMetadata::bearer(&access_token))
    }

    fn requires_transport_security(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("audience", &self.audience)
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}
