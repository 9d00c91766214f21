//! Browser-based login with PKCE.
//!
//! The flow binds the loopback listener, opens the authorize URL through a
//! [`BrowserOpener`], waits for the redirect, and exchanges the code. The
//! resulting record is written to the [`CredentialStore`] by [`PkceLoginFlow::login`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::pkce::generate_state;
use crate::{
    AuthConfig, AuthError, AuthorizationRequest, CredentialStore, LocalServer, LocalServerConfig,
    PkcePair, StoredCredentials, TokenClient, TokenGrant, TokenResponse,
};

/// Opens a URL for the user to visit.
pub trait BrowserOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<(), AuthError>;
}

impl<F> BrowserOpener for F
where
    F: Fn(&str) -> Result<(), AuthError> + Send + Sync,
{
    fn open(&self, url: &str) -> Result<(), AuthError> {
        self(url)
    }
}

/// The platform's default browser.
#[cfg(feature = "browser")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

#[cfg(feature = "browser")]
impl BrowserOpener for SystemBrowser {
    fn open(&self, url: &str) -> Result<(), AuthError> {
        webbrowser::open(url)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PkceLoginFlow {
    config: AuthConfig,
    client: TokenClient,
    local_server: LocalServerConfig,
    clock: Arc<dyn Clock>,
}

impl PkceLoginFlow {
    pub fn new(config: AuthConfig, client: TokenClient) -> Self {
        let local_server = LocalServerConfig::new(config.redirect_uri.clone());
        Self {
            config,
            client,
            local_server,
            clock: Arc::new(SystemClock),
        }
    }

    /// Overrides the listener settings. The redirect uri sent to the auth
    /// server follows `local_server.redirect_uri`.
    pub fn with_local_server_config(mut self, local_server: LocalServerConfig) -> Self {
        self.config.redirect_uri = local_server.redirect_uri.clone();
        self.local_server = local_server;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Fresh verifier, state, and authorize URL for one attempt.
    pub fn authorization_request(
        &self,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest, AuthError> {
        let pkce = PkcePair::generate()?;
        let state = generate_state()?;

        let mut url = Url::parse(&self.config.authorize_url)?;
        url.query_pairs_mut()
            .append_pair("audience", &self.config.audience)
            .append_pair("client_id", &self.config.client_id)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("state", &state)
            .append_pair("scope", &self.config.scope);

        Ok(AuthorizationRequest {
            authorization_url: url.to_string(),
            pkce,
            state,
            redirect_uri: redirect_uri.to_string(),
        })
    }

    /// Runs the browser flow and returns the raw token response.
    ///
    /// `cancel` aborts both the wait for the browser and the code exchange.
    pub async fn run(
        &self,
        browser: &dyn BrowserOpener,
        cancel: &CancellationToken,
    ) -> Result<TokenResponse, AuthError> {
        let server = LocalServer::from_config(self.local_server.clone())?;
        let bound = server.bind().await?;
        let auth = self.authorization_request(&bound.redirect_uri())?;

        tracing::info!(redirect_uri = %auth.redirect_uri, "opening browser for login");
        browser.open(&auth.authorization_url)?;

        let code = bound.wait_for_code(&auth.state, cancel).await?;

        let grant = TokenGrant::AuthorizationCode {
            client_id: self.config.client_id.clone(),
            code,
            code_verifier: auth.pkce.code_verifier.clone(),
            redirect_uri: auth.redirect_uri.clone(),
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            result = self.client.exchange(&grant) => result,
        }
    }

    /// Runs the browser flow and replaces the stored record with its result.
    pub async fn login(
        &self,
        store: &CredentialStore,
        browser: &dyn BrowserOpener,
        cancel: &CancellationToken,
    ) -> Result<StoredCredentials, AuthError> {
        let response = self.run(browser, cancel).await?;
        let credentials = StoredCredentials::from_response(response, self.clock.now())?;
        store.save(&credentials).await?;
        tracing::info!(path = %store.path().display(), "login complete");
        Ok(credentials)
    }

    /// Refreshes an existing record, or logs in through the browser when
    /// there is none. A corrupt record is an error, not a reason to log in.
    pub async fn login_or_refresh(
        &self,
        store: &CredentialStore,
        browser: &dyn BrowserOpener,
        cancel: &CancellationToken,
    ) -> Result<StoredCredentials, AuthError> {
        let current = match store.load().await {
            Ok(current) => current,
            Err(err) if err.is_not_found() => {
                tracing::info!("no stored credentials, starting browser login");
                return self.login(store, browser, cancel).await;
            }
            Err(err) => return Err(err),
        };

        let grant = TokenGrant::RefreshToken {
            client_id: self.config.client_id.clone(),
            refresh_token: current.refresh_token.clone(),
        };
        let now = self.clock.now();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AuthError::Cancelled),
            result = self.client.exchange(&grant) => result?,
        };
        let refreshed = current.refreshed(response, now);
        store.save(&refreshed).await?;
        tracing::info!("refreshed stored credentials");
        Ok(refreshed)
    }
}

impl std::fmt::Debug for PkceLoginFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceLoginFlow")
            .field("config", &self.config)
            .field("local_server", &self.local_server)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use tokio::sync::mpsc;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::clock::test_support::ManualClock;

    const REDIRECT: &str = "http://127.0.0.1:0/callback";

    fn flow(server: &MockServer) -> PkceLoginFlow {
        let config = AuthConfig::new()
            .with_auth_host(&server.uri())
            .with_client_id("cid");
        let client = TokenClient::new(&config).unwrap();
        PkceLoginFlow::new(config, client)
            .with_local_server_config(LocalServerConfig::new(REDIRECT))
            .with_clock(Arc::new(ManualClock::at(1000)))
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    fn form(request: &Request) -> HashMap<String, String> {
        url::form_urlencoded::parse(&request.body)
            .into_owned()
            .collect()
    }

    /// Mounts a token endpoint that only accepts a verifier hashing to the
    /// challenge the browser saw.
    async fn mount_code_exchange(server: &MockServer, challenge: Arc<Mutex<Option<String>>>) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(move |request: &Request| {
                let form = form(request);
                let expected = challenge.lock().unwrap().clone();
                match (form.get("code_verifier"), expected) {
                    (Some(verifier), Some(expected)) => {
                        PkcePair::from_verifier(verifier.as_str()).code_challenge == expected
                    }
                    _ => false,
                }
            })
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "abc",
                "expires_in": 3600,
                "refresh_token": "r1"
            })))
            .expect(1)
            .mount(server)
            .await;

        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(serde_json::json!({
                    "error": "invalid_grant"
                })),
            )
            .mount(server)
            .await;
    }

    /// A browser that hits the callback the way a user agent would, wrong
    /// state first.
    fn scripted_browser(
        challenge: Arc<Mutex<Option<String>>>,
        statuses: mpsc::UnboundedSender<u16>,
    ) -> impl BrowserOpener {
        move |authorize_url: &str| -> Result<(), AuthError> {
            let params = query(authorize_url);
            *challenge.lock().unwrap() = params.get("code_challenge").cloned();
            let redirect = params["redirect_uri"].clone();
            let state = params["state"].clone();
            let statuses = statuses.clone();
            tokio::spawn(async move {
                for url in [
                    format!("{redirect}?code=evil&state=wrong"),
                    format!("{redirect}?code=the-code&state={state}"),
                ] {
                    let status = reqwest::get(url).await.unwrap().status().as_u16();
                    let _ = statuses.send(status);
                }
            });
            Ok(())
        }
    }

    #[test]
    fn authorize_url_carries_pkce_and_state() {
        let config = AuthConfig::new();
        let client = TokenClient::new(&config).unwrap();
        let flow = PkceLoginFlow::new(config, client);
        let auth = flow
            .authorization_request("http://localhost:8676/callback")
            .unwrap();

        let url = Url::parse(&auth.authorization_url).unwrap();
        assert_eq!(url.path(), "/authorize");
        let pairs = query(&auth.authorization_url);
        assert_eq!(pairs["audience"], "https://endpoints.topos.com");
        assert_eq!(pairs["client_id"], "tJbqmqfttOHJ0kGfy8Bvf60v8Z4pW7T4");
        assert_eq!(pairs["code_challenge"], auth.pkce.code_challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8676/callback");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["state"], auth.state);
        assert_eq!(pairs["scope"], "offline_access");
        assert_ne!(auth.state, auth.pkce.code_verifier);
    }

    #[tokio::test]
    async fn login_captures_code_and_stores_credentials() {
        let server = MockServer::start().await;
        let challenge = Arc::new(Mutex::new(None));
        mount_code_exchange(&server, challenge.clone()).await;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let browser = scripted_browser(challenge, tx);

        let stored = flow(&server)
            .login(&store, &browser, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            stored,
            StoredCredentials {
                access_token: "abc".to_string(),
                access_token_expires: 4540,
                refresh_token: "r1".to_string(),
            }
        );
        assert_eq!(store.load().await.unwrap(), stored);
        assert_eq!(rx.recv().await, Some(401));
        assert_eq!(rx.recv().await, Some(200));
    }

    #[tokio::test]
    async fn foreign_verifier_is_rejected_by_token_endpoint() {
        let server = MockServer::start().await;
        let challenge = Arc::new(Mutex::new(Some(PkcePair::generate().unwrap().code_challenge)));
        mount_code_exchange(&server, challenge.clone()).await;

        // The browser reports the real challenge to nobody, so the endpoint
        // keeps checking against an unrelated one.
        let (tx, _rx) = mpsc::unbounded_channel();
        let browser = {
            let decoy = Arc::new(Mutex::new(None));
            scripted_browser(decoy, tx)
        };

        let err = flow(&server)
            .run(&browser, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::HttpStatus { status: 400, .. }));

        // Release the expect(1) on the accepting mock.
        server.reset().await;
    }

    #[tokio::test]
    async fn cancel_aborts_pending_browser_wait() {
        let server = MockServer::start().await;
        let cancel = CancellationToken::new();
        let browser = {
            let cancel = cancel.clone();
            move |_: &str| -> Result<(), AuthError> {
                cancel.cancel();
                Ok(())
            }
        };

        let err = flow(&server).run(&browser, &cancel).await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
    }

    #[tokio::test]
    async fn browser_failure_aborts_flow() {
        let server = MockServer::start().await;
        let browser = |_: &str| -> Result<(), AuthError> {
            Err(AuthError::Io(std::io::Error::other("no browser")))
        };

        let err = flow(&server)
            .run(&browser, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Io(_)));
    }

    #[tokio::test]
    async fn existing_record_is_refreshed_instead_of_prompting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("credentials.json"));
        store
            .save(&StoredCredentials {
                access_token: "old".to_string(),
                access_token_expires: 0,
                refresh_token: "r1".to_string(),
            })
            .await
            .unwrap();

        let browser = |_: &str| -> Result<(), AuthError> { panic!("browser must not open") };
        let refreshed = flow(&server)
            .login_or_refresh(&store, &browser, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(refreshed.access_token, "new");
        assert_eq!(refreshed.refresh_token, "r1");
        assert_eq!(refreshed.access_token_expires, 4540);
        assert_eq!(store.load().await.unwrap(), refreshed);
    }

    #[tokio::test]
    async fn corrupt_record_is_not_treated_as_missing() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "garbage").unwrap();

        let browser = |_: &str| -> Result<(), AuthError> { panic!("browser must not open") };
        let err = flow(&server)
            .login_or_refresh(&CredentialStore::new(path), &browser, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialsCorrupt { .. }));
    }
}
