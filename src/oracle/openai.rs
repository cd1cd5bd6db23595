// src/oracle/openai.rs
//! Chat-completions backed perception oracle (OpenAI-compatible endpoint).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{parse_action_lines, Judgment, PerceptionOracle};
use crate::config::OracleConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::model::{ActionDescriptor, PageSnapshot};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const MAX_PAGE_CHARS: usize = 6_000;

const CLASSIFY_SYSTEM: &str = "You inspect retail web pages. Answer the question about the page. \
Start your answer with 'Yes' or 'No', then one short sentence. \
If you can estimate it, end with 'confidence: <0..1>'.";

const ACTIONS_SYSTEM: &str = "You inspect retail web pages. List the actionable elements on this page \
(buttons, links, selectors) that could help find out whether the product can be bought. \
One action per line, imperative form, no commentary.";

pub struct OpenAiOracle {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: Option<&str>, endpoint: Option<&str>, timeout: Duration) -> MonitorResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("stock-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(timeout)
            .build()
            .map_err(|e| MonitorError::config(format!("oracle http client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.unwrap_or(DEFAULT_ENDPOINT).to_string(),
            api_key,
            model: model.unwrap_or("gpt-4o-mini").to_string(),
        })
    }

    pub fn from_config(cfg: &OracleConfig) -> MonitorResult<Self> {
        if cfg.api_key.is_empty() {
            return Err(MonitorError::config("oracle enabled but api_key is empty"));
        }
        Self::new(
            cfg.api_key.clone(),
            cfg.model.as_deref(),
            cfg.endpoint.as_deref(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    async fn complete(&self, system: &str, user: &str) -> MonitorResult<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens: 200,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| MonitorError::OracleUnavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(MonitorError::OracleUnavailable(format!("HTTP {status}")));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| MonitorError::OracleUnavailable(format!("bad response body: {e}")))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[async_trait]
impl PerceptionOracle for OpenAiOracle {
    async fn classify(&self, page: &PageSnapshot, question: &str) -> MonitorResult<Judgment> {
        let prompt = format!("{}\n\nQuestion: {question}", describe_page(page));
        let text = self.complete(CLASSIFY_SYSTEM, &prompt).await?;
        let mut j = Judgment::new(text.trim());
        if let Some(c) = parse_confidence(&text) {
            j = j.with_confidence(c);
        }
        Ok(j)
    }

    async fn enumerate_actions(&self, page: &PageSnapshot) -> MonitorResult<Vec<ActionDescriptor>> {
        let text = self.complete(ACTIONS_SYSTEM, &describe_page(page)).await?;
        Ok(parse_action_lines(&text))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

fn describe_page(page: &PageSnapshot) -> String {
    let body: String = page.content.chars().take(MAX_PAGE_CHARS).collect();
    format!("URL: {}\nPage text:\n{}", page.url, body)
}

/// Pull a trailing `confidence: 0.8` out of a completion.
fn parse_confidence(text: &str) -> Option<f32> {
    let lower = text.to_ascii_lowercase();
    let idx = lower.rfind("confidence")?;
    lower[idx + "confidence".len()..]
        .trim_start_matches(|c: char| c == ':' || c == '=' || c.is_whitespace())
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .next()
        .and_then(|n| n.parse::<f32>().ok())
        .filter(|c| (0.0..=1.0).contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_is_parsed_when_present() {
        assert_eq!(parse_confidence("Yes, it is. confidence: 0.85"), Some(0.85));
        assert_eq!(parse_confidence("No. Confidence=1"), Some(1.0));
        assert_eq!(parse_confidence("Yes."), None);
        assert_eq!(parse_confidence("yes, confidence: 7"), None);
    }

    #[test]
    fn page_description_is_truncated() {
        let page = PageSnapshot::new("https://x", "a".repeat(MAX_PAGE_CHARS * 2));
        let d = describe_page(&page);
        assert!(d.len() < MAX_PAGE_CHARS + 100);
        assert!(d.starts_with("URL: https://x"));
    }

    #[test]
    fn empty_api_key_is_a_configuration_error() {
        let cfg = OracleConfig {
            enabled: true,
            api_key: String::new(),
            ..OracleConfig::default()
        };
        let err = OpenAiOracle::from_config(&cfg).err().expect("must fail");
        assert_eq!(err.kind(), "configuration");
    }
}
