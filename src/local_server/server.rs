use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::AuthError;

use super::config::LocalServerConfig;
use super::http::{
    CallbackSlot, LocalServerState, callback_handler, fallback_handler, wait_for_response,
};
use super::target::RedirectTarget;

#[derive(Debug, Clone)]
pub struct LocalServer {
    bind_host: String,
    target: RedirectTarget,
    success_html: String,
    error_html: String,
    timeout: Option<Duration>,
}

impl LocalServer {
    pub fn new(redirect_uri: impl Into<String>) -> Result<Self, AuthError> {
        Self::from_config(LocalServerConfig::new(redirect_uri))
    }

    pub fn from_config(config: LocalServerConfig) -> Result<Self, AuthError> {
        Ok(Self {
            target: RedirectTarget::parse(&config.redirect_uri)?,
            bind_host: config.bind_host,
            success_html: config.success_html,
            error_html: config.error_html,
            timeout: config.timeout,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn bind(&self) -> Result<BoundServer, AuthError> {
        let addr = format!("{}:{}", self.bind_host, self.target.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| AuthError::ListenerBind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AuthError::ListenerBind { addr, source })?;

        tracing::debug!(%local_addr, path = %self.target.path, "callback listener bound");
        Ok(BoundServer {
            server: self.clone(),
            listener,
            local_addr,
        })
    }
}

#[derive(Debug)]
pub struct BoundServer {
    server: LocalServer,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BoundServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn redirect_uri(&self) -> String {
        self.server.target.uri_with_port(self.local_addr.port())
    }

    /// Serves callbacks until one carries `expected_state` and a code. The
    /// listener is fully shut down before this returns.
    pub async fn wait_for_code(
        self,
        expected_state: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let Self {
            server,
            listener,
            local_addr,
        } = self;

        let (slot, response_rx) = CallbackSlot::new();
        let state = LocalServerState {
            expected_state: Arc::from(expected_state),
            success_html: Arc::from(server.success_html.as_str()),
            error_html: Arc::from(server.error_html.as_str()),
            slot: slot.clone(),
        };

        let app = router(&server.target.path, state);

        let shutdown = CancellationToken::new();
        let serve =
            axum::serve(listener, app).with_graceful_shutdown(shutdown.clone().cancelled_owned());

        let server_handle = tokio::spawn(async move {
            let result = serve.await;
            if let Err(err) = &result {
                slot.send(Err(AuthError::Listener {
                    addr: local_addr,
                    message: err.to_string(),
                }));
            }
            result
        });

        let response = wait_for_response(response_rx, server.timeout, cancel).await;

        shutdown.cancel();
        match server_handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                return Err(AuthError::Listener {
                    addr: local_addr,
                    message: err.to_string(),
                });
            }
            Err(err) => {
                return Err(AuthError::Listener {
                    addr: local_addr,
                    message: err.to_string(),
                });
            }
        }
        tracing::debug!(%local_addr, "callback listener stopped");

        response
    }
}

fn router(callback_path: &str, state: LocalServerState) -> Router {
    Router::new()
        .route(callback_path, get(callback_handler))
        .fallback(fallback_handler)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use reqwest::StatusCode;
    use tower::ServiceExt;

    use super::*;

    const REDIRECT: &str = "http://127.0.0.1:0/callback";

    async fn get(url: String) -> Result<StatusCode, reqwest::Error> {
        Ok(reqwest::get(url).await?.status())
    }

    #[tokio::test]
    async fn mismatched_state_is_rejected_then_valid_state_captures() {
        let bound = LocalServer::new(REDIRECT).unwrap().bind().await.unwrap();
        let redirect = bound.redirect_uri();
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move { bound.wait_for_code("expected", &cancel).await });

        let wrong = get(format!("{redirect}?code=evil&state=wrong")).await.unwrap();
        assert_eq!(wrong, StatusCode::UNAUTHORIZED);

        let base = redirect.trim_end_matches("/callback").to_string();
        let missing = get(format!("{base}/elsewhere?code=c&state=expected"))
            .await
            .unwrap();
        assert_eq!(missing, StatusCode::NOT_FOUND);

        let no_code = get(format!("{redirect}?state=expected")).await.unwrap();
        assert_eq!(no_code, StatusCode::BAD_REQUEST);

        let ok = get(format!("{redirect}?code=the-code&state=expected"))
            .await
            .unwrap();
        assert_eq!(ok, StatusCode::OK);

        assert_eq!(waiter.await.unwrap().unwrap(), "the-code");
    }

    async fn call(app: &Router, uri: &str) -> StatusCode {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        app.clone().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn replayed_callback_is_answered_but_not_delivered() {
        let (slot, rx) = CallbackSlot::new();
        let state = LocalServerState {
            expected_state: Arc::from("expected"),
            success_html: Arc::from("ok"),
            error_html: Arc::from("error"),
            slot: slot.clone(),
        };
        let app = router("/callback", state);

        assert_eq!(
            call(&app, "/callback?code=evil&state=wrong").await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            call(&app, "/callback?code=first&state=expected").await,
            StatusCode::OK
        );
        assert_eq!(
            call(&app, "/callback?code=second&state=expected").await,
            StatusCode::OK
        );

        assert_eq!(rx.await.unwrap().unwrap(), "first");
        assert!(!slot.send(Ok("third".to_string())));
    }

    #[tokio::test]
    async fn error_callback_fails_the_wait() {
        let bound = LocalServer::new(REDIRECT).unwrap().bind().await.unwrap();
        let redirect = bound.redirect_uri();
        let cancel = CancellationToken::new();
        let waiter = tokio::spawn(async move { bound.wait_for_code("s", &cancel).await });

        let status = get(format!("{redirect}?error=access_denied&state=s"))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::AuthorizationDenied { ref error, .. } if error == "access_denied"));
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait_and_listener() {
        let bound = LocalServer::new(REDIRECT).unwrap().bind().await.unwrap();
        let addr = bound.local_addr();
        let cancel = CancellationToken::new();
        let waiter = {
            let cancel = cancel.clone();
            tokio::spawn(async move { bound.wait_for_code("s", &cancel).await })
        };

        cancel.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn timeout_bounds_the_wait() {
        let server = LocalServer::new(REDIRECT)
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let bound = server.bind().await.unwrap();

        let err = bound
            .wait_for_code("s", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::LocalServerTimeout { .. }));
    }

    #[tokio::test]
    async fn taken_port_is_a_bind_error() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let server = LocalServer::new(format!("http://localhost:{port}/callback")).unwrap();
        let err = server.bind().await.unwrap_err();
        assert!(matches!(err, AuthError::ListenerBind { .. }));
    }
}
