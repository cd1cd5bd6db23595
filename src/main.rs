// src/main.rs
//! Stock Sentinel: binary entrypoint.
//! Loads config, wires sources/oracle/sinks and runs the polling scheduler
//! until Ctrl-C.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stock_sentinel::{bootstrap, MonitorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Poll until interrupted.
    Monitor,
    /// Run a single cycle and print the events as JSON lines.
    Once,
    /// Interactive assistant (not available in this build).
    Chat,
}

#[derive(Debug, Parser)]
#[command(name = "stock-sentinel", version, about = "Multi-source GPU stock monitor")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Mode::Monitor)]
    mode: Mode,

    /// Config file; falls back to $MONITOR_CONFIG_PATH, then config/monitor.toml.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Compact logs by default, JSON lines when LOG_FORMAT=json.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stock_sentinel=info,alert=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .ok()
        .is_some_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let single_cycle = match cli.mode {
        Mode::Chat => {
            warn!("chat mode is not available in this build; use --mode monitor or --mode once");
            return Ok(());
        }
        Mode::Once => true,
        Mode::Monitor => false,
    };

    let cfg = MonitorConfig::load(cli.config.as_deref()).context("loading monitor config")?;
    if let Some(addr) = &cfg.metrics_addr {
        stock_sentinel::metrics::install_exporter(addr)?;
    }
    let rt = bootstrap::build(&cfg)?;
    let mut scheduler = rt.scheduler;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("ctrl-c received; shutting down");
                    cancel.cancel();
                }
                Err(e) => warn!(error = %e, "ctrl-c handler unavailable"),
            }
        });
    }

    if single_cycle {
        scheduler.startup_health_check().await;
        let report = scheduler.run_cycle(&cancel).await;
        for ev in &report.events {
            println!("{}", serde_json::to_string(ev)?);
        }
        info!(
            probed = report.probed.len(),
            events = report.events.len(),
            "single cycle finished"
        );
        drop(scheduler);
    } else {
        scheduler.run(cancel).await;
    }

    // Dropping the scheduler closes the queue; wait for pending deliveries.
    if let Err(e) = rt.notifier.await {
        warn!(error = %e, "notification task ended abnormally");
    }
    Ok(())
}
