use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use voipmon::CaptureListener;
use voipmon_infra_common::config::MonitorConfig;
use voipmon_infra_common::logging::{log_welcome, setup_logging};
use voipmon_infra_common::sink::{LogWriter, MetricsRegistry, QueuedPersistence};
use voipmon_infra_common::time::SystemClock;

#[derive(Parser, Debug)]
#[command(name = "voipmon")]
#[command(version, about = "Passive SIP/RTCP monitor fed by HEP capture agents")]
struct Args {
    /// Configuration file (TOML); VOIPMON__* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Capture listener address, overrides listener.address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error), overrides logging.level
    #[arg(long)]
    log_level: Option<String>,

    /// Seconds between metrics snapshot log lines
    #[arg(long, default_value = "60")]
    metrics_interval: u64,
}

async fn log_metrics(metrics: Arc<MetricsRegistry>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = metrics.snapshot();
                for (key, value) in &snapshot.counters {
                    info!(
                        target: "voipmon::metrics",
                        metric = %key.name,
                        attributes = ?key.attributes,
                        value,
                        "counter"
                    );
                }
                for (key, summary) in &snapshot.summaries {
                    info!(
                        target: "voipmon::metrics",
                        metric = %key.name,
                        attributes = ?key.attributes,
                        count = summary.count,
                        mean = summary.mean(),
                        max = summary.max,
                        "summary"
                    );
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config =
        MonitorConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    setup_logging(&config.logging)?;
    log_welcome(&config.logging.app_name, env!("CARGO_PKG_VERSION"));

    let listen = match args.listen {
        Some(addr) => addr,
        None => config
            .listener
            .address
            .as_deref()
            .context("listener.address is not configured")?
            .parse()
            .context("invalid listener.address")?,
    };

    let metrics = Arc::new(MetricsRegistry::new());
    let (persistence, writer) =
        QueuedPersistence::spawn(Arc::new(LogWriter), config.queue_capacity);
    let pipeline = voipmon::start(
        &config,
        Arc::new(SystemClock),
        Arc::new(persistence),
        metrics.clone(),
    )?;

    let cancel = CancellationToken::new();
    let listener = CaptureListener::bind(listen, pipeline.ingress())
        .await
        .with_context(|| format!("failed to bind capture listener on {}", listen))?;
    let listener_task = tokio::spawn(listener.run(cancel.clone()));
    let metrics_task = tokio::spawn(log_metrics(
        metrics,
        Duration::from_secs(args.metrics_interval.max(1)),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    cancel.cancel();
    listener_task.await?;
    pipeline.shutdown().await;
    metrics_task.await?;
    // Every persistence handle is gone once the pipeline stopped
    writer.await?;

    Ok(())
}
