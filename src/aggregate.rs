// src/aggregate.rs
//! Deduplication & aggregation of per-source findings into `StockFound` events.
//!
//! The retained set holds `(source, url, availability)` keys with the time they
//! were first reported. It is swept once per cycle, so a listing that disappears
//! and comes back after the retention window is reported again.
//!
//! A candidate is suppressed when its own key is still fresh, or when another
//! source already reported the same `(url, availability)` earlier in the current
//! cycle. The aggregator page and the retailer page often point at the same
//! listing; only the first report of the cycle alerts. The second source's key
//! is still retained. Keys from earlier cycles never suppress another source.
//!
//! No I/O and no suspension points; the scheduler is the only writer.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use metrics::counter;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::model::{Action, Availability, Candidate, Event};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub source_id: String,
    pub url: String,
    pub availability: Availability,
}

impl DedupKey {
    pub fn of(c: &Candidate) -> Self {
        Self {
            source_id: c.source_id.clone(),
            url: normalize_url(&c.url),
            availability: c.availability,
        }
    }
}

/// Why `ingest` returned no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suppressed {
    /// Key already retained within the window.
    Retained,
    /// Another source already reported the same listing this cycle.
    SeenFromOtherSource,
    /// Only `Available` candidates raise alerts.
    NotAvailable,
    /// Candidate from a source the aggregator was not registered with.
    UnknownSource,
}

#[derive(Debug)]
pub struct Aggregator {
    retention: ChronoDuration,
    known_sources: HashSet<String>,
    retained: HashMap<DedupKey, DateTime<Utc>>,
    cycle_started_at: Option<DateTime<Utc>>,
}

impl Aggregator {
    pub fn new<I, S>(retention: std::time::Duration, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            retention: ChronoDuration::from_std(retention)
                .unwrap_or_else(|_| ChronoDuration::days(36_500)),
            known_sources: sources.into_iter().map(Into::into).collect(),
            retained: HashMap::new(),
            cycle_started_at: None,
        }
    }

    /// Expiry sweep, run once per cycle before ingestion. Returns the number of
    /// expired keys.
    pub fn begin_cycle(&mut self, now: DateTime<Utc>) -> usize {
        self.cycle_started_at = Some(now);
        let before = self.retained.len();
        let retention = self.retention;
        self.retained
            .retain(|_, seen_at| now.signed_duration_since(*seen_at) < retention);
        let expired = before - self.retained.len();
        if expired > 0 {
            debug!(target: "aggregate", expired, "dedup keys expired");
        }
        expired
    }

    pub fn ingest(&mut self, candidate: Candidate, now: DateTime<Utc>) -> Option<Event> {
        self.ingest_with_path(candidate, Vec::new(), now).ok()
    }

    /// Like [`Aggregator::ingest`], carrying the navigation path that resolved the
    /// candidate and reporting why nothing was emitted.
    pub fn ingest_with_path(
        &mut self,
        candidate: Candidate,
        path: Vec<Action>,
        now: DateTime<Utc>,
    ) -> Result<Event, Suppressed> {
        if !self.known_sources.contains(&candidate.source_id) {
            warn!(target: "aggregate", source = %candidate.source_id, "candidate from unregistered source dropped");
            return Err(Suppressed::UnknownSource);
        }
        if candidate.availability != Availability::Available {
            return Err(Suppressed::NotAvailable);
        }

        let key = DedupKey::of(&candidate);
        let fresh = |seen_at: &DateTime<Utc>| now.signed_duration_since(*seen_at) < self.retention;
        if self.retained.get(&key).is_some_and(fresh) {
            counter!("monitor_dedup_suppressed_total").increment(1);
            return Err(Suppressed::Retained);
        }
        let this_cycle = |seen_at: &DateTime<Utc>| {
            self.cycle_started_at.is_some_and(|start| *seen_at >= start)
        };
        let elsewhere = self.retained.iter().any(|(k, seen_at)| {
            k.url == key.url
                && k.availability == key.availability
                && k.source_id != key.source_id
                && this_cycle(seen_at)
        });
        self.retained.insert(key, now);

        if elsewhere {
            counter!("monitor_dedup_suppressed_total").increment(1);
            return Err(Suppressed::SeenFromOtherSource);
        }

        counter!("monitor_stock_found_total").increment(1);
        Ok(Event::stock_found(candidate, path, now))
    }

    pub fn register_source(&mut self, source_id: impl Into<String>) {
        self.known_sources.insert(source_id.into());
    }

    /// Stop tracking a source and drop its retained keys.
    pub fn forget_source(&mut self, source_id: &str) {
        self.known_sources.remove(source_id);
        self.retained.retain(|k, _| k.source_id != source_id);
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn retained_sources(&self) -> HashSet<&str> {
        self.retained.keys().map(|k| k.source_id.as_str()).collect()
    }
}

/// Trim, drop the fragment and trailing slash, lowercase scheme and host.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.split('#').next().unwrap_or_default();
    let (scheme, rest) = match url.split_once("://") {
        Some((s, r)) => (Some(s.to_ascii_lowercase()), r),
        None => (None, url),
    };
    let (host, tail) = match rest.find(['/', '?']) {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, ""),
    };
    let tail = tail.trim_end_matches('/');
    match scheme {
        Some(s) => format!("{s}://{}{tail}", host.to_ascii_lowercase()),
        None => format!("{}{tail}", host.to_ascii_lowercase()),
    }
}
