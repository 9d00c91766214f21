use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::AuthError;

type CallbackResult = Result<String, AuthError>;
type CallbackSender = oneshot::Sender<CallbackResult>;
pub(super) type CallbackReceiver = oneshot::Receiver<CallbackResult>;

// Single-use hand-off to the waiting flow. The first send wins.
#[derive(Clone)]
pub(super) struct CallbackSlot(Arc<Mutex<Option<CallbackSender>>>);

impl CallbackSlot {
    pub(super) fn new() -> (Self, CallbackReceiver) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    pub(super) fn send(&self, result: CallbackResult) -> bool {
        let Ok(mut guard) = self.0.lock() else {
            return false;
        };
        match guard.take() {
            Some(sender) => sender.send(result).is_ok(),
            None => false,
        }
    }
}

#[derive(Clone)]
pub(super) struct LocalServerState {
    pub(super) expected_state: Arc<str>,
    pub(super) success_html: Arc<str>,
    pub(super) error_html: Arc<str>,
    pub(super) slot: CallbackSlot,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

pub(super) async fn callback_handler(
    State(state): State<LocalServerState>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let LocalServerState {
        expected_state,
        success_html,
        error_html,
        slot,
    } = state;
    let error_page = Html(error_html.to_string());

    if params.state.as_deref() != Some(&*expected_state) {
        tracing::warn!(error = %AuthError::StateMismatch, "rejected authorization callback");
        return (StatusCode::UNAUTHORIZED, error_page);
    }

    if let Some(error) = params.error {
        tracing::warn!(%error, "authorization server returned an error");
        slot.send(Err(AuthError::AuthorizationDenied {
            error,
            description: params.error_description,
        }));
        return (StatusCode::BAD_REQUEST, error_page);
    }

    match params.code.filter(|code| !code.is_empty()) {
        Some(code) => {
            if slot.send(Ok(code)) {
                tracing::info!("captured authorization code");
            } else {
                tracing::debug!("ignoring repeated authorization callback");
            }
            (StatusCode::OK, Html(success_html.to_string()))
        }
        None => (StatusCode::BAD_REQUEST, error_page),
    }
}

pub(super) async fn fallback_handler(State(state): State<LocalServerState>) -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Html(state.error_html.to_string()))
}

pub(super) async fn wait_for_response(
    response_rx: CallbackReceiver,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> CallbackResult {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = response_rx => result.map_err(|_| AuthError::InvalidResponse {
            message: "local server response channel closed".to_string(),
            body: String::new(),
        })?,
        _ = cancel.cancelled() => Err(AuthError::Cancelled),
        _ = deadline => Err(AuthError::LocalServerTimeout {
            // Only reachable when a timeout was configured.
            timeout: timeout.unwrap_or_default(),
        }),
    }
}
