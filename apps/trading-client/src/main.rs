//! Trading Client Binary
//!
//! Headless runner: opens a session, follows the event stream and logs every
//! state change until interrupted.
//!
//! # Usage
//!
//! ```bash
//! TRADING_API_KEY=... cargo run --bin trading-client
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `TRADING_API_KEY`: API key sent as `x-api-key`
//!
//! ## Optional
//! - `TRADING_API_URL`: REST base URL (default: <http://localhost:8000/api/v1>)
//! - `TRADING_WS_URL`: event channel URL (default: <ws://localhost:8000/api/v1/ws>)
//! - `TRADING_METRICS_PORT`: Prometheus metrics port (default: 0, disabled)
//! - `OTEL_ENABLED`: export spans over OTLP (default: false)
//! - `RUST_LOG`: log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use trading_client::infrastructure::stream::{self, DEFAULT_EVENT_CAPACITY};
use trading_client::infrastructure::telemetry;
use trading_client::{
    ClientConfig, CommandClient, HttpCommandTransport, Selector, StateUpdate, TradingSession,
    init_metrics,
};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting trading client");

    let config = ClientConfig::from_env().context("loading configuration")?;
    log_config(&config);

    if config.metrics_enabled() {
        let addr = init_metrics(config.metrics_port).context("installing metrics exporter")?;
        tracing::info!(%addr, "Metrics exporter listening");
    }

    let transport = HttpCommandTransport::new(&config.http()).context("building HTTP transport")?;
    let commands = CommandClient::new(Arc::new(transport));
    let session = Arc::new(TradingSession::new(commands, config.session()));

    let _handles = [
        Selector::Orders,
        Selector::Trades,
        Selector::Portfolio,
        Selector::Connectivity,
        Selector::Notices,
    ]
    .map(|selector| session.subscribe(selector, log_update));

    let shutdown_token = session.shutdown_token();
    let (connection, events) =
        stream::spawn(config.connection(), shutdown_token.clone(), DEFAULT_EVENT_CAPACITY);

    let session_task = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run(events).await })
    };

    await_shutdown(shutdown_token).await;

    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        match connection.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Connection manager stopped with error"),
            Err(e) => tracing::error!(error = %e, "Connection manager task failed"),
        }
        if let Err(e) = session_task.await {
            tracing::error!(error = %e, "Session task failed");
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(timeout_secs = SHUTDOWN_TIMEOUT.as_secs(), "Shutdown timed out");
    }

    tracing::info!("Trading client stopped");
    Ok(())
}

/// Log one state update.
fn log_update(update: &StateUpdate) {
    match update {
        StateUpdate::Orders(orders) => {
            let provisional = orders.iter().filter(|view| view.provisional).count();
            tracing::info!(count = orders.len(), provisional, "Orders updated");
        }
        StateUpdate::Trades(trades) => {
            if let Some(latest) = trades.last() {
                tracing::info!(
                    count = trades.len(),
                    trade_id = %latest.trade_id,
                    symbol = %latest.symbol,
                    "Trades updated"
                );
            }
        }
        StateUpdate::Portfolio(portfolio) => {
            for holding in &portfolio.holdings {
                tracing::info!(
                    symbol = %holding.symbol,
                    quantity = holding.quantity,
                    avg_price = %holding.avg_price,
                    current_value = %holding.current_value,
                    "Holding"
                );
            }
        }
        StateUpdate::Connectivity(status) => {
            tracing::info!(%status, "Connectivity");
        }
        StateUpdate::Notice(conflict) => {
            tracing::warn!(order_id = %conflict.order_id, "{conflict}");
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ClientConfig) {
    tracing::info!(
        api_url = %config.endpoints.api_url,
        ws_url = %config.endpoints.ws_url,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
    tracing::debug!(
        probe_interval_secs = config.stream.heartbeat.probe_interval.as_secs(),
        grace_secs = config.stream.heartbeat.grace.as_secs(),
        buffer_window_ms = u64::try_from(config.reconciliation.buffer_window.as_millis()).unwrap_or(u64::MAX),
        "Stream settings"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
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
        () = shutdown_token.cancelled() => {}
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
