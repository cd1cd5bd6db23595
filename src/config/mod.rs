// src/config/mod.rs
//! Monitor configuration: TOML file + environment overrides + validation.
//!
//! Lookup order for the file: explicit path (CLI) → `$MONITOR_CONFIG_PATH` →
//! `config/monitor.toml` → built-in defaults. Every invalid value becomes a
//! [`MonitorError::Configuration`], which is fatal at startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};
use crate::model::{Capabilities, Product, SourceRole};
use crate::normalize::NormalizationRule;
use crate::scheduler::cadence::CadenceTable;

pub const ENV_CONFIG_PATH: &str = "MONITOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/monitor.toml";

fn default_extended() -> u64 {
    3600
}
fn default_normal() -> u64 {
    300
}
fn default_intensive() -> u64 {
    60
}
fn default_jitter() -> f64 {
    0.10
}
fn default_feed_interval() -> u64 {
    1800
}
fn default_utc_offset() -> i32 {
    -8
}
fn default_probe_timeout() -> u64 {
    90
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_max_depth() -> usize {
    5
}
fn default_retention() -> u64 {
    6 * 3600
}
fn default_queue() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_oracle_timeout() -> u64 {
    20
}
fn default_feed_max_age() -> u64 {
    24 * 3600
}

fn default_products() -> Vec<Product> {
    vec![
        Product::new("RTX 5080", &["5080", "GeForce RTX 5080"]),
        Product::new("RTX 5090", &["5090", "GeForce RTX 5090"]),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct CadenceConfig {
    /// Low-traffic hours [0, 6).
    #[serde(default = "default_extended")]
    pub extended_secs: u64,
    /// Midday hours [6, 12).
    #[serde(default = "default_normal")]
    pub normal_secs: u64,
    /// Peak hours [12, 24).
    #[serde(default = "default_intensive")]
    pub intensive_secs: u64,
    /// Half-width of the uniform jitter band around 1.0.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Sub-interval for feed-role sources.
    #[serde(default = "default_feed_interval")]
    pub feed_interval_secs: u64,
    /// Fixed offset used to pick the hour bucket.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            extended_secs: default_extended(),
            normal_secs: default_normal(),
            intensive_secs: default_intensive(),
            jitter: default_jitter(),
            feed_interval_secs: default_feed_interval(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl CadenceConfig {
    pub fn table(&self) -> CadenceTable {
        CadenceTable {
            extended: Duration::from_secs(self.extended_secs),
            normal: Duration::from_secs(self.normal_secs),
            intensive: Duration::from_secs(self.intensive_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            model: None,
            endpoint: None,
            timeout_secs: default_oracle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub log: bool,
    /// Webhook URL, or "ENV" for DISCORD_WEBHOOK_URL.
    #[serde(default)]
    pub discord_webhook: Option<String>,
    #[serde(default = "default_queue")]
    pub queue_capacity: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            log: true,
            discord_webhook: None,
            queue_capacity: default_queue(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Fixture,
    Rss,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub kind: SourceKind,
    pub role: SourceRole,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub capabilities: Capabilities,
    /// Fixture file (kind = "fixture").
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Feed URLs (kind = "rss").
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_feed_max_age")]
    pub max_age_secs: u64,
    #[serde(default)]
    pub priority_keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_products")]
    pub products: Vec<Product>,
    #[serde(default)]
    pub cadence: CadenceConfig,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_max_depth")]
    pub max_search_depth: usize,
    #[serde(default)]
    pub search_goal: Option<String>,
    #[serde(default = "default_retention")]
    pub dedup_retention_secs: u64,
    /// Skip the retailer phase when every aggregator probe succeeded.
    #[serde(default)]
    pub aggregator_authoritative: bool,
    /// Prometheus listener, e.g. "0.0.0.0:9000".
    #[serde(default)]
    pub metrics_addr: Option<String>,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub normalization: Vec<NormalizationRule>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            products: default_products(),
            cadence: CadenceConfig::default(),
            probe_timeout_secs: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
            max_search_depth: default_max_depth(),
            search_goal: None,
            dedup_retention_secs: default_retention(),
            aggregator_authoritative: false,
            metrics_addr: None,
            oracle: OracleConfig::default(),
            notify: NotifyConfig::default(),
            sources: Vec::new(),
            normalization: Vec::new(),
        }
    }
}

impl MonitorConfig {
    pub fn from_toml_str(s: &str) -> MonitorResult<Self> {
        toml::from_str(s).map_err(|e| MonitorError::config(format!("invalid config: {e}")))
    }

    pub fn load_from_file(path: &Path) -> MonitorResult<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| {
            MonitorError::config(format!("reading config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&s)
    }

    /// Resolve the file, apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> MonitorResult<Self> {
        let mut cfg = match resolve_path(explicit)? {
            Some(p) => {
                tracing::info!(path = %p.display(), "loading monitor config");
                Self::load_from_file(&p)?
            }
            None => {
                tracing::warn!("no monitor config found; using built-in defaults");
                Self::default()
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.resolve_secrets(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Environment names kept from the original deployment scripts.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> MonitorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_from(&lookup, "EXTENDED_CHECK_INTERVAL", &mut self.cadence.extended_secs)?;
        override_from(&lookup, "NORMAL_CHECK_INTERVAL", &mut self.cadence.normal_secs)?;
        override_from(&lookup, "INTENSIVE_CHECK_INTERVAL", &mut self.cadence.intensive_secs)?;
        override_from(&lookup, "REDDIT_CHECK_INTERVAL", &mut self.cadence.feed_interval_secs)?;
        override_from(&lookup, "CHECK_JITTER", &mut self.cadence.jitter)?;
        override_from(&lookup, "PROBE_TIMEOUT_SECS", &mut self.probe_timeout_secs)?;
        override_from(&lookup, "FAILURE_THRESHOLD", &mut self.failure_threshold)?;
        override_from(&lookup, "MAX_SEARCH_DEPTH", &mut self.max_search_depth)?;
        override_from(&lookup, "DEDUP_RETENTION_SECS", &mut self.dedup_retention_secs)?;
        Ok(())
    }

    /// Replace `"ENV"` placeholders with the matching environment variable.
    pub fn resolve_secrets<F>(&mut self, lookup: F) -> MonitorResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.oracle.enabled && self.oracle.api_key.trim().eq_ignore_ascii_case("env") {
            self.oracle.api_key = lookup("OPENAI_API_KEY")
                .ok_or_else(|| MonitorError::config("Missing OPENAI_API_KEY env var"))?;
        }
        if let Some(hook) = &self.notify.discord_webhook {
            if hook.trim().eq_ignore_ascii_case("env") {
                self.notify.discord_webhook = lookup("DISCORD_WEBHOOK_URL");
                if self.notify.discord_webhook.is_none() {
                    tracing::warn!("discord_webhook = \"ENV\" but DISCORD_WEBHOOK_URL is unset; Discord disabled");
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> MonitorResult<()> {
        if self.products.is_empty() {
            return Err(MonitorError::config("at least one product is required"));
        }
        if let Some(p) = self.products.iter().find(|p| p.name.trim().is_empty()) {
            return Err(MonitorError::config(format!("product with empty name: {p:?}")));
        }
        self.cadence.table().validate()?;
        let j = self.cadence.jitter;
        if !(0.0..1.0).contains(&j) {
            return Err(MonitorError::config(format!("jitter band must be in [0, 1), got {j}")));
        }
        if !(-12..=14).contains(&self.cadence.utc_offset_hours) {
            return Err(MonitorError::config("utc_offset_hours must be within -12..=14"));
        }
        if self.cadence.feed_interval_secs == 0 {
            return Err(MonitorError::config("feed_interval_secs must be > 0"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(MonitorError::config("probe_timeout_secs must be > 0"));
        }
        if self.failure_threshold == 0 {
            return Err(MonitorError::config("failure_threshold must be >= 1"));
        }
        if self.dedup_retention_secs == 0 {
            return Err(MonitorError::config("dedup_retention_secs must be > 0"));
        }

        let mut ids = std::collections::HashSet::new();
        for s in &self.sources {
            if s.id.trim().is_empty() {
                return Err(MonitorError::config("source with empty id"));
            }
            if !ids.insert(s.id.to_ascii_lowercase()) {
                return Err(MonitorError::config(format!("duplicate source id `{}`", s.id)));
            }
            match s.kind {
                SourceKind::Fixture if s.path.is_none() => {
                    return Err(MonitorError::config(format!(
                        "fixture source `{}` needs a `path`",
                        s.id
                    )))
                }
                SourceKind::Rss if s.urls.is_empty() => {
                    return Err(MonitorError::config(format!(
                        "rss source `{}` needs at least one url",
                        s.id
                    )))
                }
                _ => {}
            }
        }
        if let Some(addr) = &self.metrics_addr {
            addr.parse::<std::net::SocketAddr>()
                .map_err(|e| MonitorError::config(format!("metrics_addr `{addr}`: {e}")))?;
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn dedup_retention(&self) -> Duration {
        Duration::from_secs(self.dedup_retention_secs)
    }
}

fn override_from<F, T>(lookup: &F, name: &str, slot: &mut T) -> MonitorResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(name) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e| MonitorError::config(format!("{name}={raw:?}: {e}")))?;
    }
    Ok(())
}

fn resolve_path(explicit: Option<&Path>) -> MonitorResult<Option<PathBuf>> {
    if let Some(p) = explicit {
        return if p.exists() {
            Ok(Some(p.to_path_buf()))
        } else {
            Err(MonitorError::config(format!("config file {} does not exist", p.display())))
        };
    }
    if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
        let pb = PathBuf::from(p);
        return if pb.exists() {
            Ok(Some(pb))
        } else {
            Err(MonitorError::config(format!("{ENV_CONFIG_PATH} points to non-existent path")))
        };
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    Ok(default.exists().then_some(default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let cfg = MonitorConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.products.len(), 2);
        assert_eq!(cfg.cadence.intensive_secs, 60);
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.max_search_depth, 5);
    }

    #[test]
    fn env_overrides_apply_and_reject_garbage() {
        let env: HashMap<&str, &str> =
            [("INTENSIVE_CHECK_INTERVAL", "45"), ("REDDIT_CHECK_INTERVAL", "900")].into();
        let mut cfg = MonitorConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(cfg.cadence.intensive_secs, 45);
        assert_eq!(cfg.cadence.feed_interval_secs, 900);

        let bad: HashMap<&str, &str> = [("FAILURE_THRESHOLD", "three")].into();
        let err = cfg
            .apply_overrides(|k| bad.get(k).map(|v| v.to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), "configuration");
    }

    #[test]
    fn non_monotonic_cadence_is_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.cadence.intensive_secs = 600;
        cfg.cadence.normal_secs = 300;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn jitter_out_of_band_is_rejected() {
        let mut cfg = MonitorConfig::default();
        cfg.cadence.jitter = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn api_key_env_placeholder_is_resolved() {
        let mut cfg = MonitorConfig::from_toml_str(
            r#"
[oracle]
enabled = true
api_key = "ENV"
"#,
        )
        .unwrap();
        cfg.resolve_secrets(|k| (k == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
            .unwrap();
        assert_eq!(cfg.oracle.api_key, "sk-test");

        let mut missing = MonitorConfig::from_toml_str("[oracle]\nenabled = true\napi_key = \"env\"\n").unwrap();
        assert!(missing.resolve_secrets(|_| None).is_err());
    }

    #[test]
    fn sources_and_rules_parse() {
        let cfg = MonitorConfig::from_toml_str(
            r#"
aggregator_authoritative = true

[[sources]]
id = "bestbuy"
kind = "fixture"
role = "retailer"
path = "fixtures/bestbuy.json"
supports_direct_probe = true

[[sources]]
id = "reddit"
kind = "rss"
role = "feed"
urls = ["https://www.reddit.com/r/buildapcsales/new/.rss"]

[[normalization]]
source = "bhphoto"
tag = "PRE_ORDER"
availability = "unavailable"
"#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert!(cfg.aggregator_authoritative);
        assert_eq!(cfg.sources.len(), 2);
        assert!(cfg.sources[0].capabilities.supports_direct_probe);
        assert!(!cfg.sources[0].capabilities.supports_search);
        assert_eq!(cfg.sources[1].role, SourceRole::Feed);
        assert_eq!(cfg.normalization.len(), 1);
    }

    #[test]
    fn fixture_without_path_is_rejected() {
        let cfg = MonitorConfig::from_toml_str(
            "[[sources]]\nid = \"x\"\nkind = \"fixture\"\nrole = \"retailer\"\n",
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
