use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use topos_auth::{
    AuthConfig, AuthError, BrowserOpener, CallContext, CallCredentials, ClientCredentials,
    CredentialStore, LocalCredentials, LocalServerConfig, PkceLoginFlow, SystemBrowser,
    TokenClient,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "topos-auth",
    about = "Log in to Topos and print call credentials."
)]
struct Cli {
    /// Auth server base URL.
    #[arg(long, global = true)]
    auth_host: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in through the browser, or refresh stored credentials.
    Login {
        /// Always run the browser flow, replacing stored credentials.
        #[arg(long)]
        force: bool,

        /// Give up waiting for the browser after this many seconds.
        #[arg(long, default_value_t = 300)]
        timeout_secs: u64,
    },
    /// Print the authorization metadata for the logged-in user.
    Token,
    /// Print the authorization metadata for the machine identity in
    /// TOPOS_CLIENT_ID / TOPOS_CLIENT_SECRET.
    MachineToken,
}

#[tokio::main]
async fn main() -> Result<(), AuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AuthConfig::new();
    if let Some(host) = &cli.auth_host {
        config = config.with_auth_host(host);
    }

    match cli.command {
        Command::Login {
            force,
            timeout_secs,
        } => run_login(config, force, Duration::from_secs(timeout_secs)).await,
        Command::Token => run_token(config).await,
        Command::MachineToken => run_machine_token(config).await,
    }
}

async fn run_login(config: AuthConfig, force: bool, timeout: Duration) -> Result<(), AuthError> {
    let client = TokenClient::new(&config)?;
    let local_server = LocalServerConfig::new(config.redirect_uri.clone()).with_timeout(timeout);
    let flow = PkceLoginFlow::new(config, client).with_local_server_config(local_server);
    let store = CredentialStore::default_location()?;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let browser = |url: &str| -> Result<(), AuthError> {
        eprintln!("Authorization URL:\n{url}");
        if let Err(err) = SystemBrowser.open(url) {
            eprintln!("Failed to open browser automatically: {err}");
        }
        Ok(())
    };

    let result = if force {
        flow.login(&store, &browser, &cancel).await
    } else {
        flow.login_or_refresh(&store, &browser, &cancel).await
    };
    ctrl_c.abort();

    let credentials = result?;
    eprintln!(
        "Credentials saved to {} (access token valid until {}).",
        store.path().display(),
        credentials.access_token_expires
    );
    Ok(())
}

async fn run_token(config: AuthConfig) -> Result<(), AuthError> {
    let client = TokenClient::new(&config)?;
    let store = CredentialStore::default_location()?;
    let credentials = match LocalCredentials::load(&config, client, store).await {
        Err(err) if err.is_not_found() => {
            eprintln!("Not logged in. Run `topos-auth login` first.");
            return Err(err);
        }
        other => other?,
    };
    print_metadata(&credentials).await
}

async fn run_machine_token(config: AuthConfig) -> Result<(), AuthError> {
    let client = TokenClient::new(&config)?;
    let credentials = ClientCredentials::from_env(client, &config)?;
    print_metadata(&credentials).await
}

async fn print_metadata(credentials: &dyn CallCredentials) -> Result<(), AuthError> {
    let metadata = credentials.metadata(&CallContext::new()).await?;
    for (key, value) in metadata.iter() {
        println!("{key}: {value}");
    }
    Ok(())
}
