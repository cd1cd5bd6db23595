// src/bin/notify_demo.rs
//! Demo that pushes a few sample events through the configured sinks
//! (log only unless a Discord webhook is configured).

use chrono::Utc;
use stock_sentinel::bootstrap::build_notifier;
use stock_sentinel::model::{ActionDescriptor, Availability, Candidate, Event};
use stock_sentinel::MonitorConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();
    let cfg = MonitorConfig::load(None)?;
    let mux = build_notifier(&cfg);

    let found = Candidate::observed(
        "bestbuy",
        "RTX 5090",
        "NVIDIA GeForce RTX 5090 Founders Edition",
        "https://www.bestbuy.com/site/nvidia-geforce-rtx-5090/6614151.p",
        "SEE_DETAILS",
    )
    .with_price("$1,999.99")
    .resolved("SEE_DETAILS", Availability::Available);

    let seq = [
        Event::stock_found(found, vec![ActionDescriptor::new("click See Details")], Utc::now()),
        Event::cycle_error("newegg", "probe of source `newegg` timed out after 90s", Utc::now()),
        Event::source_degraded("newegg", "3 consecutive failures", Utc::now()),
    ];

    for ev in &seq {
        mux.notify(ev).await;
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    }

    println!("notify-demo done");
    Ok(())
}
