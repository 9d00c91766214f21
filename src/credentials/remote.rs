use async_trait::async_trait;

use crate::types::AUTHORIZATION_KEY;
use crate::{AuthError, CallMetadata};

use super::{CallContext, CallCredentials};

/// Forwards the inbound call's authorization onto outbound calls, verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteCredentials;

#[async_trait]
impl CallCredentials for RemoteCredentials {
    async fn metadata(&self, ctx: &CallContext) -> Result<CallMetadata, AuthError> {
        let Some(value) = ctx
            .inbound()
            .and_then(|headers| headers.get_all(AUTHORIZATION_KEY).iter().next())
        else {
            return Ok(CallMetadata::new());
        };

        // Metadata values are text. A value carrying obs-text bytes is
        // rejected rather than forwarded lossily.
        let value = value.to_str().map_err(|_| AuthError::InvalidHeader {
            name: AUTHORIZATION_KEY.to_string(),
            value: "<non-ascii>".to_string(),
        })?;
        if value.is_empty() {
            return Ok(CallMetadata::new());
        }
        Ok(CallMetadata::with_authorization(value))
    }

    fn requires_transport_security(&self) -> bool {
        true
    }
}
