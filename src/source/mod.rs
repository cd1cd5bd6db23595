// src/source/mod.rs
pub mod fixture;
pub mod rss_feed;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::model::{Action, AvailabilityVerdict, Candidate, CandidateRef, PageSnapshot, Product};

/// One monitored origin (retailer, aggregator or feed). Adapters own their
/// sessions and connections; the scheduler only calls these methods under a timeout.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier; must match the source id in config.
    fn id(&self) -> &str;

    /// Called once before the per-product `list_candidates` calls of a check.
    /// Adapters that share one fetch across products reset it here.
    async fn begin_check(&self) {}

    async fn list_candidates(&self, product: &Product) -> Result<Vec<Candidate>>;

    async fn probe(&self, candidate: &CandidateRef) -> Result<AvailabilityVerdict>;

    async fn health_check(&self) -> bool {
        true
    }

    /// Live page access for navigation search, when the adapter drives a browser.
    fn navigator(&self) -> Option<&dyn Navigator> {
        None
    }
}

/// Applies actions against a live page and reports the resulting state.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn open(&self, url: &str) -> Result<PageSnapshot>;

    async fn apply(&self, state: &PageSnapshot, action: &Action) -> Result<PageSnapshot>;
}

pub type DynSource = Arc<dyn SourceAdapter>;
