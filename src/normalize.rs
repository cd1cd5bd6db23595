// src/normalize.rs
//! # Availability normalization
//!
//! Sites encode availability differently ("SEE_DETAILS", "PRE_ORDER", "AUTO_NOTIFY").
//! This module maps a `(source, raw tag)` pair onto [`Availability`] through a policy
//! table, so site-specific workarounds live in config instead of in the engine.
//!
//! - Tags compare case-insensitively after trimming; spaces and dashes count as `_`.
//! - A rule for a concrete source wins over a `*` rule for the same tag.
//! - Tags without a rule are `Ambiguous`.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::Availability;

pub const ANY_SOURCE: &str = "*";

/// One row of the policy table, as written in config.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct NormalizationRule {
    #[serde(default = "default_any_source")]
    pub source: String,
    pub tag: String,
    pub availability: Availability,
}

fn default_any_source() -> String {
    ANY_SOURCE.to_string()
}

#[derive(Debug, Clone, Default)]
pub struct NormalizationTable {
    rules: HashMap<(String, String), Availability>,
}

impl NormalizationTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in rules collected from the supported retailers' button labels.
    pub fn default_seed() -> Self {
        use Availability::*;
        let mut t = Self::empty();
        for (source, tag, availability) in [
            (ANY_SOURCE, "AVAILABLE", Available),
            (ANY_SOURCE, "IN_STOCK", Available),
            (ANY_SOURCE, "ADD_TO_CART", Available),
            (ANY_SOURCE, "RETAILER_AVAILABLE", Available),
            (ANY_SOURCE, "PRE_ORDER", Available),
            (ANY_SOURCE, "FEED_MENTION", Available),
            (ANY_SOURCE, "FEED_PRIORITY", Available),
            // Best Buy routes high-demand drops through a queue behind this button.
            ("bestbuy", "SEE_DETAILS", Available),
            (ANY_SOURCE, "SOLD_OUT", Unavailable),
            (ANY_SOURCE, "OUT_OF_STOCK", Unavailable),
            (ANY_SOURCE, "NOT_AVAILABLE", Unavailable),
            (ANY_SOURCE, "AUTO_NOTIFY", Unavailable),
            (ANY_SOURCE, "UNKNOWN", Ambiguous),
        ] {
            t.insert(source, tag, availability);
        }
        t
    }

    /// Seed plus config overrides; later rules replace earlier ones.
    pub fn with_rules(mut self, rules: &[NormalizationRule]) -> Self {
        for r in rules {
            self.insert(&r.source, &r.tag, r.availability);
        }
        self
    }

    pub fn insert(&mut self, source: &str, tag: &str, availability: Availability) {
        self.rules
            .insert((normalize_source(source), normalize_tag(tag)), availability);
    }

    pub fn normalize(&self, source: &str, raw_tag: &str) -> Availability {
        let tag = normalize_tag(raw_tag);
        if tag.is_empty() {
            return Availability::Ambiguous;
        }
        self.rules
            .get(&(normalize_source(source), tag.clone()))
            .or_else(|| self.rules.get(&(ANY_SOURCE.to_string(), tag)))
            .copied()
            .unwrap_or(Availability::Ambiguous)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn normalize_source(s: &str) -> String {
    s.trim().to_ascii_lowercase()
}

/// "See Details" / "see-details" / " SEE_DETAILS " -> "SEE_DETAILS"
pub fn normalize_tag(s: &str) -> String {
    s.trim()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|p| !p.is_empty())
        .map(|p| p.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}
