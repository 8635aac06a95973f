//! Beacon hub binary: parse flags, bind, serve until ctrl-c.

use anyhow::Context;
use beacon_server::config::ServerConfig;
use beacon_server::server::HubServer;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "beacon-server", about = "Real-time presence hub")]
struct Args {
    /// Host to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to bind.
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Allowed Origin header value for upgrades. Repeatable; when given,
    /// replaces the default allow-list.
    #[arg(long = "allow-origin")]
    allow_origins: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ServerConfig {
        host: args.host,
        port: args.port,
        ..ServerConfig::default()
    };
    if !args.allow_origins.is_empty() {
        config.allowed_origins = args.allow_origins;
    }

    let bind_addr = format!("{}:{}", config.host, config.port);
    let server = HubServer::new(config);
    let shutdown = server.shutdown().clone();
    let tasks = server.tasks().clone();
    let router = server.router();

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(addr = %listener.local_addr()?, "beacon hub listening");

    let signal_shutdown = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("ctrl-c received, shutting down");
            signal_shutdown.begin();
        })
        .await
        .context("server error")?;

    // Session loops observe the shutdown token; wait for their cleanup
    // tails before exiting.
    shutdown.drain(&tasks, None).await;
    info!("bye");
    Ok(())
}
