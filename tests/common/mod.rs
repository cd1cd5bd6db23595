// tests/common/mod.rs
// Scripted fakes shared by the integration tests.
#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use stock_sentinel::error::{MonitorError, MonitorResult};
use stock_sentinel::model::{
    ActionDescriptor, AvailabilityVerdict, Candidate, CandidateRef, Event, PageSnapshot, Product,
};
use stock_sentinel::notify::{Dispatcher, NotificationSink, NotifierMux};
use stock_sentinel::oracle::{Judgment, PerceptionOracle};
use stock_sentinel::source::{Navigator, SourceAdapter};

pub const PRODUCT: &str = "RTX 5090";

pub fn products() -> Vec<Product> {
    vec![Product::new(PRODUCT, &["5090"])]
}

pub fn page(url: &str) -> PageSnapshot {
    PageSnapshot::new(url, format!("content of {url}"))
}

/// Directed page graph: `edges[from]` lists `(action label, to)`.
#[derive(Clone, Default)]
pub struct PageGraph {
    edges: HashMap<String, Vec<(String, String)>>,
    goals: HashSet<String>,
}

impl PageGraph {
    pub fn edge(mut self, from: &str, label: &str, to: &str) -> Self {
        self.edges
            .entry(from.to_string())
            .or_default()
            .push((label.to_string(), to.to_string()));
        self
    }

    pub fn goal(mut self, url: &str) -> Self {
        self.goals.insert(url.to_string());
        self
    }
}

/// Oracle that reads the graph: goal pages affirm, actions are the outgoing edges.
pub struct GraphOracle {
    graph: PageGraph,
    pub classify_calls: AtomicUsize,
    pub enumerate_calls: AtomicUsize,
    fail: bool,
}

impl GraphOracle {
    pub fn new(graph: PageGraph) -> Self {
        Self {
            graph,
            classify_calls: AtomicUsize::new(0),
            enumerate_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(PageGraph::default())
        }
    }
}

#[async_trait]
impl PerceptionOracle for GraphOracle {
    async fn classify(&self, page: &PageSnapshot, _question: &str) -> MonitorResult<Judgment> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MonitorError::OracleUnavailable("scripted outage".into()));
        }
        Ok(if self.graph.goals.contains(&page.url) {
            Judgment::new("Yes, the Add to Cart button is active.")
        } else {
            Judgment::new("No, nothing purchasable here.")
        })
    }

    async fn enumerate_actions(
        &self,
        page: &PageSnapshot,
    ) -> MonitorResult<Vec<ActionDescriptor>> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .graph
            .edges
            .get(&page.url)
            .map(|es| es.iter().map(|(l, _)| ActionDescriptor::new(l)).collect())
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "graph"
    }
}

/// Navigator over the same graph.
#[derive(Clone)]
pub struct GraphNavigator {
    graph: PageGraph,
    stall: Option<Duration>,
}

impl GraphNavigator {
    pub fn new(graph: PageGraph) -> Self {
        Self { graph, stall: None }
    }

    /// Every `apply` sleeps this long first.
    pub fn stalling(mut self, d: Duration) -> Self {
        self.stall = Some(d);
        self
    }
}

#[async_trait]
impl Navigator for GraphNavigator {
    async fn open(&self, url: &str) -> Result<PageSnapshot> {
        Ok(page(url))
    }

    async fn apply(&self, state: &PageSnapshot, action: &ActionDescriptor) -> Result<PageSnapshot> {
        if let Some(d) = self.stall {
            tokio::time::sleep(d).await;
        }
        self.graph
            .edges
            .get(&state.url)
            .and_then(|es| es.iter().find(|(l, _)| *l == action.label))
            .map(|(_, to)| page(to))
            .ok_or_else(|| anyhow!("no element `{}` on {}", action.label, state.url))
    }
}

/// Source with scripted listings, latency and failures.
pub struct FakeSource {
    id: String,
    listings: Vec<(String, String)>,
    delay: Option<Duration>,
    fail: bool,
    healthy: bool,
    probe_tag: Option<String>,
    navigator: Option<GraphNavigator>,
    pub list_calls: AtomicUsize,
    pub probe_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            listings: Vec::new(),
            delay: None,
            fail: false,
            healthy: true,
            probe_tag: None,
            navigator: None,
            list_calls: AtomicUsize::new(0),
            probe_calls: AtomicUsize::new(0),
        }
    }

    /// One listing for [`PRODUCT`] with the given url and raw tag.
    pub fn listing(mut self, url: &str, tag: &str) -> Self {
        self.listings.push((url.to_string(), tag.to_string()));
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn probe_answers(mut self, tag: &str) -> Self {
        self.probe_tag = Some(tag.to_string());
        self
    }

    pub fn with_navigator(mut self, nav: GraphNavigator) -> Self {
        self.navigator = Some(nav);
        self
    }

    pub fn lists(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_candidates(&self, product: &Product) -> Result<Vec<Candidate>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            bail!("{} returned HTTP 503", self.id);
        }
        Ok(self
            .listings
            .iter()
            .map(|(url, tag)| {
                Candidate::observed(&self.id, &product.name, format!("{} listing", product.name), url, tag)
            })
            .collect())
    }

    async fn probe(&self, _candidate: &CandidateRef) -> Result<AvailabilityVerdict> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        match &self.probe_tag {
            Some(t) => Ok(AvailabilityVerdict::new(t.clone())),
            None => bail!("probe not scripted"),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn navigator(&self) -> Option<&dyn Navigator> {
        self.navigator.as_ref().map(|n| n as &dyn Navigator)
    }
}

/// Sink that keeps every delivered event.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn taken(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, event: &Event) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

pub fn recording_dispatcher() -> (Dispatcher, Arc<RecordingSink>, tokio::task::JoinHandle<()>) {
    let sink = Arc::new(RecordingSink::default());
    let (d, h) = Dispatcher::spawn(NotifierMux::new().with_sink(sink.clone()), 256);
    (d, sink, h)
}
