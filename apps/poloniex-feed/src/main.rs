//! Poloniex Feed Binary
//!
//! Subscribes to the configured currency pairs and logs every decoded record.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin poloniex-feed
//! ```
//!
//! # Environment Variables
//!
//! - `POLONIEX_WS_URL`: Push API endpoint (default: wss://api2.poloniex.com)
//! - `FEED_INSTRUMENTS`: Comma-separated `BASE_QUOTE` symbols
//! - `FEED_CONFIG_PATH`: JSON file `{"poloniex": [...]}`, used when `FEED_INSTRUMENTS` is unset
//! - `FEED_SESSION_DEADLINE_SECS`: Run for this long, 0 = until Ctrl+C (default: 3)
//! - `FEED_PENDING_LIMIT`: Records held per unlearned channel, and per instrument in total (default: 1024)
//! - `FEED_METRICS_PORT`: Prometheus port, 0 = disabled (default: 0)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: info)

use anyhow::Context;
use poloniex_feed::infrastructure::telemetry;
use poloniex_feed::{
    ChannelSink, FeedConfig, FeedEvent, FeedSession, SessionReport, SessionStatus, WsConnector,
    init_metrics,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialise telemetry")?;

    tracing::info!("Starting Poloniex feed");

    let config = FeedConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    init_metrics(config.metrics_port).context("failed to start metrics exporter")?;

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let (sink, rx) = ChannelSink::channel();
    let consumer = tokio::spawn(handle_feed_events(rx));

    let mut session = FeedSession::new(config.session_config(), sink, shutdown_token);
    let status = session.status();
    let result = session
        .run(&WsConnector::new(), config.instruments.as_slice())
        .await;

    // Dropping the session closes the event channel so the consumer can finish.
    drop(session);
    consumer.await.context("event consumer panicked")?;

    let report = result?;
    log_report(&report, &status);

    tracing::info!("Poloniex feed stopped");
    Ok(())
}

/// Log every event the session produces.
async fn handle_feed_events(mut rx: mpsc::UnboundedReceiver<FeedEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            FeedEvent::StateChanged(state) => {
                tracing::debug!(state = %state, "Session state");
            }
            FeedEvent::Subscribed {
                instrument,
                channel,
            } => {
                tracing::info!(instrument = %instrument, channel = %channel, "Subscribed");
            }
            FeedEvent::ChannelLearned {
                channel_id,
                instrument,
            } => {
                tracing::info!(channel_id, instrument = %instrument, "Channel mapped");
            }
            FeedEvent::Record {
                instrument,
                channel_id,
                sequence,
                record,
            } => {
                tracing::info!(
                    instrument = %instrument,
                    channel_id,
                    sequence,
                    kind = record.kind(),
                    record = ?record,
                    "Record"
                );
            }
            FeedEvent::Unmapped {
                channel_id,
                sequence,
                record,
                reason,
            } => {
                tracing::warn!(
                    channel_id,
                    sequence,
                    kind = record.kind(),
                    reason = ?reason,
                    "Unmapped record"
                );
            }
            FeedEvent::Diagnostic(diagnostic) => {
                tracing::warn!(diagnostic = ?diagnostic, "Feed diagnostic");
            }
        }
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
        url = %config.url,
        instruments = ?config.instruments,
        deadline_secs = config.deadline.map(|d| d.as_secs()),
        pending_limit = config.pending_limit,
        metrics_port = config.metrics_port,
        "Configuration loaded"
    );
}

/// Log the end-of-session summary.
fn log_report(report: &SessionReport, status: &SessionStatus) {
    tracing::info!(
        termination = %report.termination,
        frames_read = report.frames_read,
        channels = report.learned_channels.len(),
        subscribe_errors = report.subscribe_errors.len(),
        records_routed = status.get_records_routed(),
        records_unmapped = status.get_records_unmapped(),
        diagnostics = status.get_diagnostics(),
        "Session finished"
    );
    for (channel_id, instrument) in &report.learned_channels {
        tracing::info!(channel_id, instrument = %instrument, "Learned channel");
    }
}

/// Cancel `shutdown_token` on SIGTERM or Ctrl+C.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    }

    shutdown_token.cancel();
}
