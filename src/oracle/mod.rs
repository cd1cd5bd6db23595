// src/oracle/mod.rs
//! Perception oracle: provider abstraction for page interpretation.
//!
//! The oracle answers free-form questions about a [`PageSnapshot`] and lists the
//! actionable elements on it. Implementations must be safe to call concurrently;
//! no ordering is guaranteed between calls from different sources.

pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::{MonitorError, MonitorResult};
use crate::model::{ActionDescriptor, PageSnapshot};

/// Structured answer to a yes/no or free-text question.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub verdict_text: String,
    pub confidence: Option<f32>,
}

impl Judgment {
    pub fn new(verdict_text: impl Into<String>) -> Self {
        Self {
            verdict_text: verdict_text.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, c: f32) -> Self {
        self.confidence = Some(c.clamp(0.0, 1.0));
        self
    }

    /// True when the answer leads with an affirmative word ("Yes, the page ...").
    pub fn affirms(&self) -> bool {
        let first = self
            .verdict_text
            .trim_start()
            .split(|c: char| !c.is_alphanumeric())
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        matches!(first.as_str(), "yes" | "true" | "affirmative")
    }
}

#[async_trait]
pub trait PerceptionOracle: Send + Sync {
    async fn classify(&self, page: &PageSnapshot, question: &str) -> MonitorResult<Judgment>;

    async fn enumerate_actions(&self, page: &PageSnapshot) -> MonitorResult<Vec<ActionDescriptor>>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynOracle = Arc<dyn PerceptionOracle>;

/// Oracle used when no backend is configured. Every call reports unavailability.
pub struct DisabledOracle;

#[async_trait]
impl PerceptionOracle for DisabledOracle {
    async fn classify(&self, _page: &PageSnapshot, _question: &str) -> MonitorResult<Judgment> {
        Err(MonitorError::OracleUnavailable("oracle disabled".into()))
    }

    async fn enumerate_actions(&self, _page: &PageSnapshot) -> MonitorResult<Vec<ActionDescriptor>> {
        Err(MonitorError::OracleUnavailable("oracle disabled".into()))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Split a free-text action listing into descriptors: one per non-empty line,
/// list bullets and numbering stripped.
pub fn parse_action_lines(text: &str) -> Vec<ActionDescriptor> {
    text.lines()
        .map(|l| {
            l.trim()
                .trim_start_matches(|c: char| {
                    c == '-' || c == '*' || c == '•' || c.is_ascii_digit() || c == '.' || c == ')'
                })
                .trim()
        })
        .filter(|l| !l.is_empty())
        .map(ActionDescriptor::new)
        .collect()
}
