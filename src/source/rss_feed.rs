// src/source/rss_feed.rs
//! Social-feed source: RSS 2.0 channels (subreddit feeds, deal forums) scanned for
//! product mentions.
//!
//! One check fetches every feed once and shares the items across products. Plain
//! mentions can be screened by the perception oracle; priority-keyword items are
//! always kept.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::model::{AvailabilityVerdict, Candidate, CandidateRef, PageSnapshot, Product};
use crate::oracle::DynOracle;
use crate::source::SourceAdapter;

pub const TAG_MENTION: &str = "FEED_MENTION";
pub const TAG_PRIORITY: &str = "FEED_PRIORITY";

pub const RELEVANCE_QUESTION: &str = "Is this post discussing NVIDIA GPU purchase opportunities, \
     priority access programs, or drawings to buy an RTX 5080/5090? Answer yes or no.";

pub fn default_priority_keywords() -> Vec<String> {
    [
        "priority access",
        "priority program",
        "purchase program",
        "drawing",
        "lottery",
        "nvidia official",
        "founders edition",
        "queue",
        "in stock",
        "restock",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
}

/// Parsed feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    /// Unix seconds; `None` when the feed omits or garbles `pubDate`.
    pub published_at: Option<i64>,
}

enum Mode {
    Fixture(String),
    Http {
        urls: Vec<String>,
        client: reqwest::Client,
    },
}

pub struct RssFeedSource {
    id: String,
    mode: Mode,
    priority_keywords: Vec<String>,
    max_age_secs: Option<i64>,
    oracle: Option<DynOracle>,
    fetched: Mutex<Option<Arc<Vec<FeedItem>>>>,
    fetches: AtomicUsize,
}

impl RssFeedSource {
    pub fn from_urls(id: impl Into<String>, urls: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("stock-sentinel/0.1 (feed monitor)")
            .build()
            .context("building feed http client")?;
        Ok(Self {
            id: id.into(),
            mode: Mode::Http { urls, client },
            priority_keywords: default_priority_keywords(),
            max_age_secs: Some(24 * 3600),
            oracle: None,
            fetched: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn from_fixture_str(id: impl Into<String>, xml: &str) -> Self {
        Self {
            id: id.into(),
            mode: Mode::Fixture(xml.to_string()),
            priority_keywords: default_priority_keywords(),
            max_age_secs: None,
            oracle: None,
            fetched: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_priority_keywords(mut self, keywords: Vec<String>) -> Self {
        self.priority_keywords = keywords;
        self
    }

    /// Screen plain mentions with the oracle; a "no" drops the item.
    pub fn with_oracle(mut self, oracle: DynOracle) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Number of times the feeds were actually fetched.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Items older than this are ignored. `0` disables the filter.
    pub fn with_max_age_secs(mut self, secs: u64) -> Self {
        self.max_age_secs = if secs == 0 { None } else { Some(secs as i64) };
        self
    }

    /// Items of the current check, fetched on first use.
    async fn items(&self) -> Result<Arc<Vec<FeedItem>>> {
        let mut cached = self.fetched.lock().await;
        if let Some(items) = cached.as_ref() {
            return Ok(items.clone());
        }
        let items = Arc::new(self.fetch_items().await?);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        *cached = Some(items.clone());
        Ok(items)
    }

    async fn fetch_items(&self) -> Result<Vec<FeedItem>> {
        match &self.mode {
            Mode::Fixture(s) => parse_items_from_str(s),
            Mode::Http { urls, client } => {
                let mut out = Vec::new();
                for url in urls {
                    let resp = client
                        .get(url)
                        .send()
                        .await
                        .with_context(|| format!("feed http get {url}"))?;
                    let status = resp.status();
                    if !status.is_success() {
                        counter!("feed_fetch_errors_total").increment(1);
                        bail!("feed {url} returned HTTP {status}");
                    }
                    let body = resp.text().await.context("feed http .text()")?;
                    out.extend(parse_items_from_str(&body)?);
                }
                Ok(out)
            }
        }
    }

    fn tag_for(&self, title: &str) -> &'static str {
        let lower = title.to_lowercase();
        if self
            .priority_keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
        {
            TAG_PRIORITY
        } else {
            TAG_MENTION
        }
    }

    /// Oracle screen for a plain mention. Kept when no oracle is set or the
    /// oracle cannot answer.
    async fn relevant(&self, item: &FeedItem) -> bool {
        let Some(oracle) = &self.oracle else {
            return true;
        };
        let post = PageSnapshot::new(&item.url, format!("Title: {}", item.title));
        match oracle.classify(&post, RELEVANCE_QUESTION).await {
            Ok(judgment) => {
                let keep = judgment.affirms();
                if !keep {
                    counter!("feed_mentions_dropped_total").increment(1);
                    debug!(source = %self.id, url = %item.url, "mention judged off-topic");
                }
                keep
            }
            Err(e) => {
                warn!(source = %self.id, error = %e, "relevance check unavailable; keeping mention");
                true
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for RssFeedSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn begin_check(&self) {
        *self.fetched.lock().await = None;
    }

    async fn list_candidates(&self, product: &Product) -> Result<Vec<Candidate>> {
        let items = self.items().await?;
        let now = chrono::Utc::now().timestamp();
        let mut out = Vec::new();
        let fresh = items.iter().filter(|it| match (self.max_age_secs, it.published_at) {
            (Some(max), Some(ts)) => now - ts <= max,
            _ => true,
        });
        for it in fresh.filter(|it| product.matches(&it.title)) {
            let tag = self.tag_for(&it.title);
            if tag == TAG_MENTION && !self.relevant(it).await {
                continue;
            }
            out.push(Candidate::observed(
                &self.id,
                &product.name,
                it.title.clone(),
                it.url.clone(),
                tag,
            ));
        }
        Ok(out)
    }

    async fn probe(&self, _candidate: &CandidateRef) -> Result<AvailabilityVerdict> {
        bail!("feed source `{}` does not support direct probes", self.id)
    }
}

pub fn parse_items_from_str(s: &str) -> Result<Vec<FeedItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(s);
    let rss: Rss = from_str(&xml_clean).context("parsing rss xml")?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = normalize_text(it.title.as_deref().unwrap_or_default());
        let url = it.link.unwrap_or_default().trim().to_string();
        if title.is_empty() || url.is_empty() {
            continue;
        }
        out.push(FeedItem {
            title,
            url,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
        });
    }

    histogram!("feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    counter!("feed_items_total").increment(out.len() as u64);
    Ok(out)
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.unix_timestamp())
}

/// Decode entities, strip tags, fold typographic quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").expect("static regex"));
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").expect("static regex"));
    re_ws.replace_all(&out, " ").trim().to_string()
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
