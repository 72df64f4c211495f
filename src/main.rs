use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use luahttpd::config::Config;
use luahttpd::loader::ScriptLoader;
use luahttpd::registry::EndpointRegistry;
use luahttpd::server::Server;

/// An HTTP server scripted with Lua endpoint definitions.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "luahttpd.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "luahttpd=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let registry = EndpointRegistry::new();

    // The registry must be fully populated before serving begins; it is
    // read without synchronization concerns from then on.
    let loader = ScriptLoader::new(None)?;
    loader.load_directory(&config.scripts.dir);
    let _lua = loader.finish(&registry);

    info!(endpoints = registry.len(), "endpoint registry populated");

    let server = Server::bind(&config.listener.address, config.listener.port, registry)?;
    info!(addr = %server.local_addr()?, "listening for connections");

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    server.serve(stop_rx).await;

    info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
