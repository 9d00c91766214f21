//! Loopback listener that receives the authorization redirect.

mod config;
mod http;
mod server;
mod target;

pub use config::LocalServerConfig;
pub use server::{BoundServer, LocalServer};
