// src/scheduler/mod.rs
//! # Polling Scheduler
//! Owns every piece of mutable monitoring state: source health, the dedup set,
//! feed timestamps and the jitter RNG. One cycle runs three phases
//! (aggregators, retailers, due feeds); inside a phase every source runs as its
//! own task, and results are folded back in completion order.
//!
//! A source failure (error or timeout) never leaves its task: it comes back as a
//! value, bumps that source's counter and becomes a `CycleError` event.

pub mod cadence;

use chrono::{DateTime, FixedOffset, Utc};
use metrics::{counter, gauge, histogram};
use rand::{rngs::StdRng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::aggregate::{Aggregator, Suppressed};
use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::model::{
    Action, Availability, Candidate, Capabilities, Event, Health, Product, Source, SourceRole,
};
use crate::normalize::NormalizationTable;
use crate::notify::Dispatcher;
use crate::search::{NavigationSearch, DEFAULT_GOAL};
use crate::source::DynSource;
use cadence::{fixed_offset, jittered, CadenceTable};

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub cadence: CadenceTable,
    pub jitter: f64,
    pub feed_interval: Duration,
    pub utc_offset: FixedOffset,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub max_search_depth: usize,
    pub search_goal: String,
    pub dedup_retention: Duration,
    pub aggregator_authoritative: bool,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

impl SchedulerSettings {
    pub fn from_config(cfg: &MonitorConfig) -> Self {
        Self {
            cadence: cfg.cadence.table(),
            jitter: cfg.cadence.jitter,
            feed_interval: Duration::from_secs(cfg.cadence.feed_interval_secs),
            utc_offset: fixed_offset(cfg.cadence.utc_offset_hours),
            probe_timeout: cfg.probe_timeout(),
            failure_threshold: cfg.failure_threshold.max(1),
            max_search_depth: cfg.max_search_depth,
            search_goal: cfg
                .search_goal
                .clone()
                .unwrap_or_else(|| DEFAULT_GOAL.to_string()),
            dedup_retention: cfg.dedup_retention(),
            aggregator_authoritative: cfg.aggregator_authoritative,
        }
    }
}

/// Result of one [`Scheduler::run_cycle`].
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Every event emitted this cycle, in emission order.
    pub events: Vec<Event>,
    /// Ids of the sources attempted this cycle.
    pub probed: Vec<String>,
    /// Retailer phase skipped because the aggregators answered.
    pub short_circuited: bool,
    pub cancelled: bool,
}

impl CycleReport {
    pub fn stock_found(&self) -> impl Iterator<Item = &Candidate> {
        self.events.iter().filter_map(Event::candidate)
    }
}

struct Registered {
    source: Source,
    adapter: DynSource,
    last_checked: Option<Instant>,
}

/// What one source task hands back.
struct SourceRun {
    resolved: Vec<(Candidate, Vec<Action>)>,
    error: Option<MonitorError>,
    elapsed: Duration,
}

/// Everything a source task needs, cloned into the task.
#[derive(Clone)]
struct Worker {
    source_id: String,
    capabilities: Capabilities,
    adapter: DynSource,
    products: Arc<[Product]>,
    table: Arc<NormalizationTable>,
    search: Option<NavigationSearch>,
    goal: Arc<str>,
    max_depth: usize,
    timeout: Duration,
}

pub struct Scheduler {
    settings: SchedulerSettings,
    products: Arc<[Product]>,
    sources: Vec<Registered>,
    aggregator: Aggregator,
    table: Arc<NormalizationTable>,
    search: Option<NavigationSearch>,
    dispatcher: Dispatcher,
    rng: StdRng,
    last_cycle: Option<Instant>,
}

impl Scheduler {
    pub fn new(settings: SchedulerSettings, products: Vec<Product>, dispatcher: Dispatcher) -> Self {
        let aggregator = Aggregator::new(settings.dedup_retention, Vec::<String>::new());
        Self {
            settings,
            products: products.into(),
            sources: Vec::new(),
            aggregator,
            table: Arc::new(NormalizationTable::default_seed()),
            search: None,
            dispatcher,
            rng: StdRng::from_os_rng(),
            last_cycle: None,
        }
    }

    pub fn with_source(mut self, source: Source, adapter: DynSource) -> Self {
        self.aggregator.register_source(source.id.clone());
        self.sources.push(Registered {
            source,
            adapter,
            last_checked: None,
        });
        self
    }

    pub fn with_normalization(mut self, table: NormalizationTable) -> Self {
        self.table = Arc::new(table);
        self
    }

    pub fn with_search(mut self, search: NavigationSearch) -> Self {
        self.search = Some(search);
        self
    }

    /// Deterministic jitter for tests.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter().map(|r| &r.source)
    }

    pub fn source(&self, id: &str) -> Option<&Source> {
        self.sources().find(|s| s.id == id)
    }

    /// Ask every enabled adapter whether it is usable. Failing adapters start
    /// `Degraded`; they are still attempted.
    pub async fn startup_health_check(&mut self) {
        let limit = self.settings.probe_timeout;
        for reg in self.sources.iter_mut().filter(|r| r.source.is_enabled()) {
            let ok = matches!(timeout(limit, reg.adapter.health_check()).await, Ok(true));
            if ok {
                debug!(source = %reg.source.id, "health check ok");
            } else {
                warn!(source = %reg.source.id, "health check failed; starting degraded");
                reg.source.health = Health::Degraded;
            }
        }
    }

    /// Run exactly one cycle. Returns early, with `cancelled` set, when the
    /// token fires; results not yet folded in are discarded.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleReport {
        crate::metrics::ensure_metrics_described();
        let started = Instant::now();
        if let Some(prev) = self.last_cycle {
            debug!(since_last_ms = started.duration_since(prev).as_millis() as u64, "cycle start");
        }
        self.last_cycle = Some(started);

        let now = Utc::now();
        self.aggregator.begin_cycle(now);
        let mut report = CycleReport::default();

        let aggregators = self.eligible(SourceRole::Aggregator, started);
        let all_ok = self.run_phase(&aggregators, cancel, &mut report).await;
        if report.cancelled {
            return report;
        }

        if self.settings.aggregator_authoritative && !aggregators.is_empty() && all_ok {
            info!(aggregators = aggregators.len(), "aggregators answered; retailer phase skipped");
            counter!("monitor_short_circuit_total").increment(1);
            report.short_circuited = true;
        } else {
            let retailers = self.eligible(SourceRole::Retailer, started);
            self.run_phase(&retailers, cancel, &mut report).await;
            if report.cancelled {
                return report;
            }
        }

        let feeds = self.eligible(SourceRole::Feed, started);
        for &i in &feeds {
            self.sources[i].last_checked = Some(started);
        }
        self.run_phase(&feeds, cancel, &mut report).await;
        if report.cancelled {
            return report;
        }

        counter!("monitor_cycles_total").increment(1);
        info!(
            probed = report.probed.len(),
            events = report.events.len(),
            short_circuited = report.short_circuited,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cycle complete"
        );
        report
    }

    /// Delay before the next cycle: hour-bucket base times jitter.
    pub fn next_delay(&mut self, now: DateTime<Utc>) -> Duration {
        let base = self.settings.cadence.base_at(now, self.settings.utc_offset);
        let delay = jittered(base, self.settings.jitter, &mut self.rng);
        gauge!("monitor_next_delay_secs").set(delay.as_secs_f64());
        delay
    }

    /// Cycle until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        self.startup_health_check().await;
        info!(
            sources = self.sources.len(),
            products = self.products.len(),
            "scheduler started"
        );
        loop {
            let report = self.run_cycle(&cancel).await;
            if report.cancelled || cancel.is_cancelled() {
                break;
            }
            let delay = self.next_delay(Utc::now());
            debug!(delay_secs = delay.as_secs(), "sleeping until next cycle");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("scheduler stopped");
    }

    fn eligible(&self, role: SourceRole, now: Instant) -> Vec<usize> {
        self.sources
            .iter()
            .enumerate()
            .filter(|(_, r)| r.source.role == role && r.source.is_enabled())
            .filter(|(_, r)| {
                role != SourceRole::Feed
                    || r.last_checked
                        .is_none_or(|t| now.duration_since(t) >= self.settings.feed_interval)
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn worker(&self, idx: usize) -> Worker {
        let reg = &self.sources[idx];
        Worker {
            source_id: reg.source.id.clone(),
            capabilities: reg.source.capabilities,
            adapter: reg.adapter.clone(),
            products: self.products.clone(),
            table: self.table.clone(),
            search: self.search.clone(),
            goal: Arc::from(self.settings.search_goal.as_str()),
            max_depth: self.settings.max_search_depth,
            timeout: self.settings.probe_timeout,
        }
    }

    /// Returns true when every source in the phase succeeded.
    async fn run_phase(
        &mut self,
        indices: &[usize],
        cancel: &CancellationToken,
        report: &mut CycleReport,
    ) -> bool {
        let mut set: JoinSet<(usize, SourceRun)> = JoinSet::new();
        for &idx in indices {
            let worker = self.worker(idx);
            let source = &self.sources[idx].source;
            if source.health == Health::Degraded {
                info!(
                    source = %source.id,
                    health = ?source.health,
                    failures = source.consecutive_failures,
                    "degraded source attempted"
                );
            } else {
                debug!(source = %source.id, health = ?source.health, "source attempted");
            }
            report.probed.push(worker.source_id.clone());
            set.spawn(async move { (idx, worker.run().await) });
        }

        let mut pending: HashSet<usize> = indices.iter().copied().collect();
        let mut all_ok = true;
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // In-flight probes end on their own timeout.
                    set.detach_all();
                    report.cancelled = true;
                    info!(in_flight = pending.len(), "cycle cancelled");
                    return false;
                }
                joined = set.join_next() => joined,
            };
            match joined {
                None => break,
                Some(Ok((idx, run))) => {
                    pending.remove(&idx);
                    all_ok &= self.fold(idx, run, report);
                }
                Some(Err(e)) => {
                    error!(error = %e, "source task did not complete");
                }
            }
        }

        // Tasks that panicked never reported back.
        for idx in pending {
            all_ok = false;
            let run = SourceRun {
                resolved: Vec::new(),
                error: Some(MonitorError::ProbeFailure {
                    source_id: self.sources[idx].source.id.clone(),
                    message: "source task panicked".into(),
                }),
                elapsed: Duration::ZERO,
            };
            self.fold(idx, run, report);
        }
        all_ok
    }

    /// Apply one source's result to health state and the aggregator.
    fn fold(&mut self, idx: usize, run: SourceRun, report: &mut CycleReport) -> bool {
        let now = Utc::now();
        let threshold = self.settings.failure_threshold;
        histogram!("monitor_probe_ms").record(run.elapsed.as_secs_f64() * 1_000.0);

        for (candidate, path) in run.resolved {
            match self.aggregator.ingest_with_path(candidate, path, now) {
                Ok(ev) => self.publish(ev, report),
                Err(Suppressed::NotAvailable) => {}
                Err(why) => debug!(reason = ?why, "candidate suppressed"),
            }
        }

        let source = &mut self.sources[idx].source;
        let ok = match run.error {
            None => {
                if source.consecutive_failures > 0 || source.health == Health::Degraded {
                    info!(
                        source = %source.id,
                        after_failures = source.consecutive_failures,
                        "source recovered"
                    );
                }
                source.consecutive_failures = 0;
                source.health = Health::Healthy;
                true
            }
            Some(err) => {
                source.consecutive_failures += 1;
                counter!("monitor_probe_failures_total", "kind" => err.kind()).increment(1);
                if source.health == Health::Degraded {
                    warn!(
                        source = %source.id,
                        health = ?source.health,
                        failures = source.consecutive_failures,
                        error = %err,
                        "degraded source failed again"
                    );
                } else {
                    warn!(
                        source = %source.id,
                        health = ?source.health,
                        failures = source.consecutive_failures,
                        error = %err,
                        "source failed this cycle"
                    );
                }
                let id = source.id.clone();
                let failures = source.consecutive_failures;
                let degrade = failures >= threshold && source.health == Health::Healthy;
                if degrade {
                    source.health = Health::Degraded;
                }
                self.publish(Event::cycle_error(&id, err.to_string(), now), report);
                if degrade {
                    warn!(source = %id, failures, "source degraded");
                    self.publish(
                        Event::source_degraded(
                            &id,
                            format!("{failures} consecutive failures"),
                            now,
                        ),
                        report,
                    );
                }
                false
            }
        };
        let source = &self.sources[idx].source;
        gauge!("monitor_source_consecutive_failures", "source" => source.id.clone())
            .set(source.consecutive_failures as f64);
        ok
    }

    fn publish(&self, event: Event, report: &mut CycleReport) {
        self.dispatcher.emit(event.clone());
        report.events.push(event);
    }
}

impl Worker {
    async fn run(self) -> SourceRun {
        let started = Instant::now();
        let mut resolved = Vec::new();
        let mut error = None;
        if timeout(self.timeout, self.adapter.begin_check()).await.is_err() {
            debug!(source = %self.source_id, "begin_check timed out");
        }
        for product in self.products.iter() {
            match self.product(product).await {
                Ok(mut found) => resolved.append(&mut found),
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }
        SourceRun {
            resolved,
            error,
            elapsed: started.elapsed(),
        }
    }

    async fn product(&self, product: &Product) -> MonitorResult<Vec<(Candidate, Vec<Action>)>> {
        let listed = self
            .bounded(self.adapter.list_candidates(product))
            .await?;
        debug!(source = %self.source_id, product = %product.name, listed = listed.len(), "candidates listed");
        let mut out = Vec::with_capacity(listed.len());
        for c in listed {
            out.push(self.resolve(c).await?);
        }
        Ok(out)
    }

    /// Normalize the raw tag; ambiguous candidates go through a direct probe and
    /// then navigation search when the source supports them.
    async fn resolve(&self, c: Candidate) -> MonitorResult<(Candidate, Vec<Action>)> {
        let availability = self.table.normalize(&self.source_id, &c.raw_tag);
        let c = c.resolved(&c.raw_tag, availability);
        if availability != Availability::Ambiguous {
            return Ok((c, Vec::new()));
        }

        let c = if self.capabilities.supports_direct_probe {
            let verdict = self.bounded(self.adapter.probe(&c.reference())).await?;
            let availability = self.table.normalize(&self.source_id, &verdict.raw_tag);
            let probed = c.resolved(&verdict.raw_tag, availability);
            if availability != Availability::Ambiguous {
                return Ok((probed, Vec::new()));
            }
            probed
        } else {
            c
        };

        let (Some(search), Some(navigator)) = (&self.search, self.adapter.navigator()) else {
            return Ok((c, Vec::new()));
        };
        if !self.capabilities.supports_search {
            return Ok((c, Vec::new()));
        }

        let start = self.bounded(navigator.open(&c.url)).await?;
        let walk = search.search(navigator, start, &self.goal, self.max_depth);
        let outcome = timeout(self.timeout, walk)
            .await
            .map_err(|_| self.timed_out())??;
        debug!(source = %self.source_id, url = %c.url, reached = outcome.is_reached(), "navigation search finished");
        if outcome.is_reached() {
            let path = outcome.actions().to_vec();
            Ok((c.resolved(&c.raw_tag, Availability::Available), path))
        } else {
            Ok((c.resolved(&c.raw_tag, Availability::Unavailable), Vec::new()))
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> MonitorResult<T>
    where
        F: std::future::Future<Output = anyhow::Result<T>>,
    {
        match timeout(self.timeout, fut).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(MonitorError::probe_failure(&self.source_id, &e)),
            Err(_) => Err(self.timed_out()),
        }
    }

    fn timed_out(&self) -> MonitorError {
        MonitorError::ProbeTimeout {
            source_id: self.source_id.clone(),
            after: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifierMux;

    #[tokio::test]
    async fn next_delay_uses_bucket_and_jitter() {
        let (d, _h) = Dispatcher::spawn(NotifierMux::new(), 4);
        let mut s = Scheduler::new(SchedulerSettings::default(), vec![], d).with_rng_seed(7);
        // 20:00 UTC = 12:00 at UTC-8 → intensive (60 s), jitter 10%.
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 1, 30, 20, 0, 0).unwrap();
        for _ in 0..100 {
            let delay = s.next_delay(now);
            assert!(delay >= Duration::from_secs(54) && delay <= Duration::from_secs(66), "{delay:?}");
        }
    }

    #[test]
    fn settings_follow_config() {
        let mut cfg = MonitorConfig::default();
        cfg.failure_threshold = 5;
        cfg.search_goal = Some("cart visible".into());
        let s = SchedulerSettings::from_config(&cfg);
        assert_eq!(s.failure_threshold, 5);
        assert_eq!(s.search_goal, "cart visible");
        assert_eq!(s.feed_interval, Duration::from_secs(1800));
    }
}
