//! Credentials for outbound Topos RPC calls.
//!
//! Three trust models are supported: a human who logged in through the
//! browser (PKCE), a machine identity using the client-credentials grant, and
//! a service forwarding the authorization of the call it is serving. Each is
//! exposed through [`CallCredentials`] and combined with a [`ChannelSecurity`]
//! chosen from the target address.

mod client;
mod clock;
mod config;
mod credentials;
mod error;
#[cfg(feature = "local-server")]
mod local_server;
#[cfg(feature = "local-server")]
mod login;
mod pkce;
mod store;
mod transport;
mod types;

pub use client::{TokenClient, TokenGrant};
pub use clock::{Clock, SystemClock};
pub use config::{AuthConfig, CLIENT_ID_ENV, CLIENT_SECRET_ENV, MachineConfig};
pub use credentials::{
    CallContext, CallCredentials, ClientCredentials, Credentials, LocalCredentials,
    RemoteCredentials,
};
pub use error::AuthError;
#[cfg(feature = "local-server")]
pub use local_server::{BoundServer, LocalServer, LocalServerConfig};
#[cfg(feature = "browser")]
#[cfg(feature = "local-server")]
pub use login::SystemBrowser;
#[cfg(feature = "local-server")]
pub use login::{BrowserOpener, PkceLoginFlow};
pub use pkce::{PkcePair, generate_state};
pub use store::CredentialStore;
pub use transport::{Channel, ChannelSecurity};
pub use types::{
    AUTHORIZATION_KEY, AuthorizationRequest, CallMetadata, EXPIRY_MARGIN_SECS, StoredCredentials,
    TokenResponse,
};
