// src/model.rs
//! Shared data types: products, sources, candidates, page snapshots and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A tracked product family, e.g. one GPU SKU line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Product {
    pub fn new(name: impl Into<String>, aliases: &[&str]) -> Self {
        Self {
            name: name.into(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Case-insensitive whole-word match against the name and every alias.
    pub fn matches(&self, text: &str) -> bool {
        let hay = format!(" {} ", normalize_words(text));
        std::iter::once(self.name.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .map(normalize_words)
            .filter(|needle| !needle.is_empty())
            .any(|needle| hay.contains(&format!(" {needle} ")))
    }
}

/// Lowercase, map punctuation to spaces, collapse runs of whitespace.
fn normalize_words(s: &str) -> String {
    let mapped: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Phase a source runs in within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Aggregator,
    Retailer,
    Feed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub supports_search: bool,
    #[serde(default)]
    pub supports_direct_probe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Healthy,
    Degraded,
    Disabled,
}

/// Scheduler-owned view of one monitored origin.
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub role: SourceRole,
    pub capabilities: Capabilities,
    pub health: Health,
    pub consecutive_failures: u32,
}

impl Source {
    pub fn new(id: impl Into<String>, role: SourceRole, capabilities: Capabilities) -> Self {
        Self {
            id: id.into(),
            role,
            capabilities,
            health: Health::Healthy,
            consecutive_failures: 0,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.health = Health::Disabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.health != Health::Disabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Availability {
    #[serde(alias = "available")]
    Available,
    #[serde(alias = "unavailable")]
    Unavailable,
    #[serde(alias = "ambiguous")]
    Ambiguous,
}

/// One observed listing. Never mutated after creation: finalization builds a new
/// value through [`Candidate::resolved`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source_id: String,
    pub product: String,
    pub name: String,
    pub price: Option<String>,
    pub url: String,
    pub raw_tag: String,
    pub availability: Availability,
}

impl Candidate {
    /// A listing as reported by an adapter. Availability stays `Ambiguous` until
    /// the normalization table has been applied.
    pub fn observed(
        source_id: impl Into<String>,
        product: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        raw_tag: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            product: product.into(),
            name: name.into(),
            price: None,
            url: url.into(),
            raw_tag: raw_tag.into(),
            availability: Availability::Ambiguous,
        }
    }

    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = Some(price.into());
        self
    }

    /// New snapshot with a final tag and availability.
    pub fn resolved(&self, raw_tag: &str, availability: Availability) -> Self {
        Self {
            raw_tag: raw_tag.to_string(),
            availability,
            ..self.clone()
        }
    }

    pub fn reference(&self) -> CandidateRef {
        CandidateRef {
            source_id: self.source_id.clone(),
            url: self.url.clone(),
        }
    }
}

/// Handle passed back to an adapter for a direct probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRef {
    pub source_id: String,
    pub url: String,
}

/// Result of a direct probe: the source's own verdict tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailabilityVerdict {
    pub raw_tag: String,
}

impl AvailabilityVerdict {
    pub fn new(raw_tag: impl Into<String>) -> Self {
        Self {
            raw_tag: raw_tag.into(),
        }
    }
}

/// Rendered page state handed to the perception oracle.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub content: String,
    pub markup: Option<String>,
    #[serde(skip)]
    pub screenshot: Option<Vec<u8>>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    /// Hex SHA-256 over the snapshot content only. Two snapshots with the same
    /// content always hash the same, regardless of when or where they were built.
    pub fn state_hash(&self) -> String {
        let mut h = Sha256::new();
        for part in [
            Some(self.url.as_bytes()),
            Some(self.content.as_bytes()),
            self.markup.as_deref().map(str::as_bytes),
            self.screenshot.as_deref(),
        ] {
            match part {
                Some(bytes) => {
                    h.update((bytes.len() as u64).to_le_bytes());
                    h.update(bytes);
                }
                None => h.update(u64::MAX.to_le_bytes()),
            }
        }
        format!("{:x}", h.finalize())
    }
}

/// An actionable element on a page ("click See Details", "select Store pickup").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub label: String,
}

impl ActionDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

pub type Action = ActionDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    StockFound,
    SourceDegraded,
    CycleError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Stock {
        candidate: Candidate,
        /// Actions that reached the goal when availability came from navigation search.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<Action>,
    },
    Diagnostic {
        source_id: String,
        message: String,
    },
}

/// Outward notification unit, consumed once by the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub kind: EventKind,
    pub payload: EventPayload,
    pub at: DateTime<Utc>,
}

impl Event {
    pub fn stock_found(candidate: Candidate, path: Vec<Action>, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::StockFound,
            payload: EventPayload::Stock { candidate, path },
            at,
        }
    }

    pub fn source_degraded(source_id: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::SourceDegraded,
            payload: EventPayload::Diagnostic {
                source_id: source_id.to_string(),
                message: message.into(),
            },
            at,
        }
    }

    pub fn cycle_error(source_id: &str, message: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind: EventKind::CycleError,
            payload: EventPayload::Diagnostic {
                source_id: source_id.to_string(),
                message: message.into(),
            },
            at,
        }
    }

    pub fn candidate(&self) -> Option<&Candidate> {
        match &self.payload {
            EventPayload::Stock { candidate, .. } => Some(candidate),
            EventPayload::Diagnostic { .. } => None,
        }
    }

    pub fn source_id(&self) -> &str {
        match &self.payload {
            EventPayload::Stock { candidate, .. } => &candidate.source_id,
            EventPayload::Diagnostic { source_id, .. } => source_id,
        }
    }

    /// Single-line human summary, used by the log and webhook sinks.
    pub fn summary(&self) -> String {
        match &self.payload {
            EventPayload::Stock { candidate, path } => {
                let price = candidate
                    .price
                    .as_deref()
                    .map(|p| format!(" ({p})"))
                    .unwrap_or_default();
                let via = if path.is_empty() {
                    String::new()
                } else {
                    let steps: Vec<&str> = path.iter().map(|a| a.label.as_str()).collect();
                    format!(" via [{}]", steps.join(" > "))
                };
                format!(
                    "{} in stock at {}: {}{} [{}] {}{}",
                    candidate.product,
                    candidate.source_id,
                    candidate.name,
                    price,
                    candidate.raw_tag,
                    candidate.url,
                    via
                )
            }
            EventPayload::Diagnostic { source_id, message } => match self.kind {
                EventKind::SourceDegraded => format!("source {source_id} degraded: {message}"),
                _ => format!("source {source_id} error: {message}"),
            },
        }
    }
}
