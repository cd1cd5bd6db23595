// src/source/fixture.rs
//! Source adapter backed by a JSON listing file.
//!
//! The file is re-read on every call, so a dry run can be steered by editing it
//! while the monitor is running.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::{AvailabilityVerdict, Candidate, CandidateRef, Product};
use crate::source::SourceAdapter;

#[derive(Debug, Deserialize)]
struct FixtureFile {
    #[serde(default = "default_true")]
    healthy: bool,
    #[serde(default)]
    listings: Vec<Listing>,
    /// URL -> raw tag returned by a direct probe.
    #[serde(default)]
    probes: HashMap<String, String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Listing {
    product: String,
    name: String,
    url: String,
    tag: String,
    #[serde(default)]
    price: Option<String>,
}

enum Mode {
    File(PathBuf),
    Inline(String),
}

pub struct FixtureSource {
    id: String,
    mode: Mode,
}

impl FixtureSource {
    pub fn from_path(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            mode: Mode::File(path.into()),
        }
    }

    pub fn from_fixture_str(id: impl Into<String>, json: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Inline(json.to_string()),
        }
    }

    async fn load(&self) -> Result<FixtureFile> {
        let raw = match &self.mode {
            Mode::File(p) => tokio::fs::read_to_string(p)
                .await
                .with_context(|| format!("reading fixture {}", p.display()))?,
            Mode::Inline(s) => s.clone(),
        };
        serde_json::from_str(&raw).with_context(|| format!("parsing fixture for {}", self.id))
    }
}

#[async_trait]
impl SourceAdapter for FixtureSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_candidates(&self, product: &Product) -> Result<Vec<Candidate>> {
        let file = self.load().await?;
        Ok(file
            .listings
            .into_iter()
            .filter(|l| product.matches(&l.product) || product.matches(&l.name))
            .map(|l| {
                let c = Candidate::observed(&self.id, &product.name, l.name, l.url, l.tag);
                match l.price {
                    Some(p) => c.with_price(p),
                    None => c,
                }
            })
            .collect())
    }

    async fn probe(&self, candidate: &CandidateRef) -> Result<AvailabilityVerdict> {
        let file = self.load().await?;
        let tag = file
            .probes
            .get(&candidate.url)
            .cloned()
            .or_else(|| {
                file.listings
                    .iter()
                    .find(|l| l.url == candidate.url)
                    .map(|l| l.tag.clone())
            })
            .unwrap_or_else(|| "UNKNOWN".to_string());
        Ok(AvailabilityVerdict::new(tag))
    }

    async fn health_check(&self) -> bool {
        match self.load().await {
            Ok(f) => f.healthy,
            Err(e) => {
                tracing::warn!(source = %self.id, error = %format!("{e:#}"), "fixture health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "listings": [
            {"product": "RTX 5080", "name": "NVIDIA GeForce RTX 5080 FE", "url": "https://bb/5080", "tag": "SEE_DETAILS", "price": "$999"},
            {"product": "RTX 5090", "name": "NVIDIA GeForce RTX 5090 FE", "url": "https://bb/5090", "tag": "SOLD_OUT"}
        ],
        "probes": {"https://bb/5090": "ADD_TO_CART"}
    }"#;

    #[tokio::test]
    async fn lists_only_matching_product() {
        let src = FixtureSource::from_fixture_str("bestbuy", FIXTURE);
        let p = Product::new("RTX 5080", &[]);
        let c = src.list_candidates(&p).await.unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].raw_tag, "SEE_DETAILS");
        assert_eq!(c[0].price.as_deref(), Some("$999"));
        assert_eq!(c[0].source_id, "bestbuy");
    }

    #[tokio::test]
    async fn probe_prefers_explicit_probe_table() {
        let src = FixtureSource::from_fixture_str("bestbuy", FIXTURE);
        let r = |url: &str| CandidateRef {
            source_id: "bestbuy".into(),
            url: url.into(),
        };
        assert_eq!(src.probe(&r("https://bb/5090")).await.unwrap().raw_tag, "ADD_TO_CART");
        assert_eq!(src.probe(&r("https://bb/5080")).await.unwrap().raw_tag, "SEE_DETAILS");
        assert_eq!(src.probe(&r("https://bb/none")).await.unwrap().raw_tag, "UNKNOWN");
    }

    #[tokio::test]
    async fn missing_file_is_unhealthy_and_errors() {
        let src = FixtureSource::from_path("x", "/definitely/not/here.json");
        assert!(!src.health_check().await);
        assert!(src.list_candidates(&Product::new("RTX 5080", &[])).await.is_err());
    }
}
