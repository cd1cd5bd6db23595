// src/bootstrap.rs
//! Turns a validated [`MonitorConfig`] into a ready-to-run [`Scheduler`].

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{MonitorConfig, SourceConfig, SourceKind};
use crate::error::{MonitorError, MonitorResult};
use crate::model::Source;
use crate::normalize::NormalizationTable;
use crate::notify::{discord::DiscordSink, Dispatcher, LogSink, NotifierMux};
use crate::oracle::{openai::OpenAiOracle, DisabledOracle, DynOracle};
use crate::scheduler::{Scheduler, SchedulerSettings};
use crate::search::NavigationSearch;
use crate::source::{fixture::FixtureSource, rss_feed::RssFeedSource, DynSource};

pub struct Runtime {
    pub scheduler: Scheduler,
    /// Delivery task; ends after the scheduler (and its dispatcher) is dropped.
    pub notifier: JoinHandle<()>,
    pub oracle: DynOracle,
}

pub fn build_oracle(cfg: &MonitorConfig) -> MonitorResult<DynOracle> {
    if !cfg.oracle.enabled {
        info!("perception oracle disabled; ambiguous pages stay unresolved");
        return Ok(Arc::new(DisabledOracle));
    }
    let oracle = OpenAiOracle::from_config(&cfg.oracle)?;
    // Safe diagnostics: only model + key length
    info!(
        model = cfg.oracle.model.as_deref().unwrap_or("default"),
        key_len = cfg.oracle.api_key.len(),
        "perception oracle configured"
    );
    Ok(Arc::new(oracle))
}

/// `oracle`, when given, screens plain feed mentions.
pub fn build_adapter(sc: &SourceConfig, oracle: Option<&DynOracle>) -> MonitorResult<DynSource> {
    let adapter: DynSource = match sc.kind {
        SourceKind::Fixture => {
            let path = sc.path.clone().ok_or_else(|| {
                MonitorError::config(format!("fixture source `{}` needs a `path`", sc.id))
            })?;
            Arc::new(FixtureSource::from_path(&sc.id, path))
        }
        SourceKind::Rss => {
            let mut feed = RssFeedSource::from_urls(&sc.id, sc.urls.clone())
                .map_err(|e| MonitorError::config(format!("rss source `{}`: {e:#}", sc.id)))?
                .with_max_age_secs(sc.max_age_secs);
            if let Some(k) = &sc.priority_keywords {
                feed = feed.with_priority_keywords(k.clone());
            }
            if let Some(o) = oracle {
                feed = feed.with_oracle(o.clone());
            }
            Arc::new(feed)
        }
    };
    Ok(adapter)
}

pub fn build_notifier(cfg: &MonitorConfig) -> NotifierMux {
    let mut mux = NotifierMux::new();
    if cfg.notify.log {
        mux = mux.with_sink(Arc::new(LogSink));
    }
    if let Some(hook) = cfg.notify.discord_webhook.as_deref().filter(|h| !h.is_empty()) {
        mux = mux.with_sink(Arc::new(DiscordSink::new(hook.to_string())));
    }
    if mux.is_empty() {
        warn!("no notification sinks configured; events are only counted");
    }
    mux
}

/// Build the scheduler, its sources and the notification task. Must run inside
/// a tokio runtime.
pub fn build(cfg: &MonitorConfig) -> MonitorResult<Runtime> {
    let oracle = build_oracle(cfg)?;
    let (dispatcher, notifier) = Dispatcher::spawn(build_notifier(cfg), cfg.notify.queue_capacity);

    let table = NormalizationTable::default_seed().with_rules(&cfg.normalization);
    let mut scheduler = Scheduler::new(
        SchedulerSettings::from_config(cfg),
        cfg.products.clone(),
        dispatcher,
    )
    .with_normalization(table);
    if cfg.oracle.enabled {
        scheduler = scheduler.with_search(NavigationSearch::new(oracle.clone()));
    }

    for sc in &cfg.sources {
        let source = Source::new(&sc.id, sc.role, sc.capabilities);
        let source = if sc.enabled { source } else { source.disabled() };
        let adapter = build_adapter(sc, cfg.oracle.enabled.then_some(&oracle))?;
        info!(source = %sc.id, role = ?sc.role, enabled = sc.enabled, "source registered");
        scheduler = scheduler.with_source(source, adapter);
    }
    if cfg.sources.is_empty() {
        warn!("no sources configured; cycles will be empty");
    }

    Ok(Runtime {
        scheduler,
        notifier,
        oracle,
    })
}
