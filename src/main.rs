use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use subgate::config::Config;
use subgate::router::EdgeServer;
use subgate::store::KvStore;
use tokio::sync::watch;
use tracing::{error, info, warn};

const PKG_NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("subgate=debug".parse().expect("valid log directive")),
        )
        .init();

    // Load configuration: TOML file when present, environment otherwise
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = if config_path.exists() {
        let config = Config::load(&config_path).map_err(|e| {
            error!(path = %config_path.display(), error = %e, "Failed to load configuration");
            e
        })?;
        info!(path = %config_path.display(), "Configuration loaded");
        config
    } else {
        info!("No configuration file, using environment variables");
        Config::from_env()
    };
    let config = Arc::new(config);

    print_startup_banner(&config);

    if !config.has_credentials() {
        warn!("No token or secret configured; all gated paths will answer 404");
    }

    // Open the key-value store and run the one-time legacy-key migration
    let store = match config.db_path.as_deref() {
        Some(path) => {
            let store = KvStore::open(path)?;
            store.migrate_legacy(&config.legacy_key, &config.edit_key)?;
            Some(Arc::new(store))
        }
        None => {
            info!("No db_path configured; editor runs without a store");
            None
        }
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let bind_addr: SocketAddr = format!("{}:{}", config.bind, config.port)
        .parse()
        .map_err(|e| {
            error!(bind = %config.bind, port = config.port, error = %e, "Invalid bind address");
            anyhow::anyhow!("Invalid bind address: {}", e)
        })?;

    let server = EdgeServer::new(bind_addr, Arc::clone(&config), store, shutdown_rx);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!(error = %e, "Edge server error");
        }
    });

    // Wait for shutdown signal (Ctrl+C or SIGTERM)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT (Ctrl+C), shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        info!("Received Ctrl+C, shutting down...");
    }

    // Signal shutdown and wait briefly for the server to stop
    let _ = shutdown_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn print_startup_banner(config: &Config) {
    info!(name = PKG_NAME, version = VERSION, "Starting edge service");
    info!(
        bind = %config.bind,
        port = config.port,
        "Server configuration"
    );
    info!(
        static_token = config.token.is_some(),
        rotating_secret = config.secret.is_some(),
        "Credential configuration"
    );
    info!(
        redirect = config.redirect_url.as_deref().unwrap_or("-"),
        proxy = config.proxy_url.as_deref().unwrap_or("-"),
        "Root path behavior"
    );
    info!(
        upstreams = config.api_urls.len(),
        protocol = %config.protocol,
        fake_host = config.fake_host.as_deref().unwrap_or("-"),
        "Subscription settings"
    );
    info!(
        store = config.db_path.as_deref().unwrap_or("-"),
        edit_key = %config.edit_key,
        notifications = config.notifications_enabled(),
        "Store and notification settings"
    );
}
