//! Poloniex Feed Binary
//!
//! Connects to the push API, subscribes the configured channels and logs
//! every event.
//!
//! # Usage
//!
//! ```bash
//! FEED_CHANNELS=ticker,BTC_ETH RUST_LOG=poloniex_feed=debug cargo run --bin poloniex-feed
//! ```
//!
//! # Environment Variables
//!
//! - `POLONIEX_WS_URL`: Push API endpoint (default: <wss://api2.poloniex.com>)
//! - `POLONIEX_PUBLIC_API_URL`: REST endpoint (default: <https://poloniex.com/public>)
//! - `FEED_CHANNELS`: Comma-separated channel names or ids (default: ticker)
//! - `FEED_HEALTH_PORT`: Health check HTTP port, 0 disables (default: 8083)
//! - `FEED_*`: Connection timeouts, retry and queue sizes (see `FeedConfig`)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use poloniex_feed::infrastructure::health::{HealthServer, HealthServerState};
use poloniex_feed::infrastructure::telemetry;
use poloniex_feed::{
    EventKind, FeedConfig, FeedEvent, MarketFeed, PublicApiClient, Topic, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Poloniex feed");

    let _metrics_handle = init_metrics();

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let feed = Arc::new(MarketFeed::new(&config));

    let rest = PublicApiClient::new(&config.public_api_url, config.rest_timeout)
        .context("failed to build REST client")?;
    match feed.refresh_directory(&rest).await {
        Ok(snapshot) => tracing::info!(markets = snapshot.markets.len(), "Market directory loaded"),
        Err(e) => tracing::warn!(error = %e, "Market directory unavailable, well-known channels only"),
    }

    for kind in EventKind::all() {
        feed.on(Topic::kind(*kind), log_event);
    }

    feed.start().await.context("feed unavailable")?;

    for channel in &config.channels {
        match feed.subscribe(channel).await {
            Ok(outcome) => tracing::debug!(channel = %channel, ?outcome, "Channel requested"),
            Err(e) => tracing::warn!(channel = %channel, error = %e, "Subscribe failed"),
        }
    }

    let health_task = (config.server.health_port != 0).then(|| {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&feed),
        ));
        let server = HealthServer::new(config.server.health_port, state, shutdown_token.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        })
    });

    tracing::info!("Feed ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, feed.close()).await.is_err() {
        tracing::warn!("Feed did not close in time");
    }
    if let Some(task) = health_task {
        let _ = tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await;
    }

    tracing::info!(dropped_events = feed.dropped_events(), "Feed stopped");
    Ok(())
}

fn log_event(event: &FeedEvent) {
    match event {
        FeedEvent::Ticker(t) => tracing::debug!(
            pair = %t.pair,
            last = %t.last,
            bid = %t.bid,
            ask = %t.ask,
            change_pct = %t.percent_change,
            "Ticker"
        ),
        FeedEvent::OrderBook(d) => tracing::debug!(
            pair = %d.pair,
            side = ?d.side,
            rate = %d.rate,
            amount = %d.amount,
            kind = d.kind.as_str(),
            sequence = ?d.sequence,
            "Order book"
        ),
        FeedEvent::Trade(t) => tracing::debug!(
            pair = %t.pair,
            trade_id = t.trade_id,
            side = ?t.side,
            rate = %t.rate,
            amount = %t.amount,
            "Trade"
        ),
        FeedEvent::ResyncNeeded(r) => tracing::warn!(
            pair = %r.pair,
            last = ?r.last_sequence,
            received = ?r.received_sequence,
            "Order book out of sequence"
        ),
        FeedEvent::Chat(c) => tracing::debug!(user = %c.username, message = %c.message, "Chat"),
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &FeedConfig) {
    tracing::info!(
        url = %config.connection.url,
        channels = ?config.channels,
        dial_attempts = config.connection.dial_attempts,
        queue_capacity = config.listeners.queue_capacity,
        health_port = config.server.health_port,
        "Configuration loaded"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
