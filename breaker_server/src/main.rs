//! who-broke-build — calls out whoever broke the build.
//!
//! Listens for Jenkins Notification plugin datagrams on UDP. When a build
//! completes with a failure, the build page is fetched to find who started
//! it, and that person is called out in chat through an external CLI.
//! Breakers can optionally be tallied in an external key-value store.

mod config;
mod error;
mod metrics;
mod models;
mod services;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use crate::services::listener::{BuildListener, Forever};
use crate::services::notifier::ChatNotifier;
use crate::services::resolver::JenkinsResolver;
use crate::services::tally::TallyStore;

#[derive(Parser)]
#[command(name = "who-broke-build", about = "Build breaker notifier")]
struct Cli {
    /// UDP port the CI server sends notifications to
    #[arg(short, long, env = "WBB_UDP_PORT", default_value = "22222")]
    port: u16,

    /// Address to serve Prometheus metrics on
    #[arg(long, env = "WBB_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let config = config::BreakerConfig::from_env()?;

    tracing::info!(
        members = config.identities.len(),
        channel = %config.chat.channel,
        tally = config.tally.is_some(),
        timeout_secs = config.downstream_timeout.as_secs(),
        "Starting who-broke-build..."
    );

    metrics::init_metrics(cli.metrics_addr);

    let timeout = config.downstream_timeout;
    let resolver = JenkinsResolver::new(
        config.ci_username.clone(),
        config.ci_password.clone(),
        config.identities.members(),
        config.strip_html,
        timeout,
    )?;
    let tally = config
        .tally
        .as_ref()
        .map(|tally| TallyStore::new(tally, timeout))
        .transpose()?;
    let notifier = ChatNotifier::new(config.chat.clone(), tally, timeout);
    let listener = BuildListener::new(
        Arc::new(resolver),
        Arc::new(notifier),
        config.identities.clone(),
    );

    let mut socket = services::listener::bind(cli.port).await?;
    tracing::info!("Listening for build notifications on {}", socket.local_addr()?);

    tokio::select! {
        result = listener.run(&mut socket, Forever) => result?,
        _ = shutdown_signal() => {}
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
