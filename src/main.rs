mod bot;
mod config;
mod llm;
mod platform;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

/// Used when `RUST_LOG` is unset. `tower_http` carries the per-request traces.
const DEFAULT_LOG_FILTER: &str = "info,relaybot=debug,tower_http=debug";

/// How long in-flight requests get to finish once shutdown starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Environment first, then the local defaults file
    let defaults_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("local.env.toml"));

    info!("Loading configuration (defaults file: {})", defaults_path.display());
    let config = Config::load(&defaults_path).context("Failed to load configuration")?;

    info!("Configuration loaded successfully");
    info!("  Telegram API: {}", redact_token(&config.telegram_api));
    info!("  Completion API: {}", config.openai_api_base);

    let state = AppState::new(&config);
    let app = bot::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Server initialized, listening at port: {}", config.port);

    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        wait_for_interrupt().await;
        info!("Shutting down server...");
        let _ = signal_tx.send(());
    });
    let mut server = tokio::spawn(async move { server.await });

    tokio::select! {
        res = &mut server => {
            // Server stopped on its own, without an interrupt
            res.context("Server task panicked")?.context("Server error")?;
            return Ok(());
        }
        _ = signal_rx => {}
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(res) => {
            res.context("Server task panicked")?
                .context("Server shutdown")?;
            info!("Server exiting");
            Ok(())
        }
        Err(_) => {
            error!(
                "Server shutdown: in-flight requests did not finish within {:?}",
                SHUTDOWN_GRACE
            );
            anyhow::bail!("Server shutdown timed out after {:?}", SHUTDOWN_GRACE)
        }
    }
}

async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        // Without a signal handler the server runs until killed
        std::future::pending::<()>().await;
    }
}

/// Hide the bot token embedded in a Telegram API base URL (`.../bot<token>`).
fn redact_token(url: &str) -> String {
    match url.rfind("/bot") {
        Some(pos) if pos + 4 < url.len() => format!("{}/bot***", &url[..pos]),
        _ => url.to_string(),
    }
}
