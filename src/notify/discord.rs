// src/notify/discord.rs
use super::NotificationSink;
use crate::model::{Event, EventKind};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

#[derive(Clone)]
pub struct DiscordSink {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordSink {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(backoff(attempt)).await;
        }
    }
}

fn backoff(attempt: u8) -> Duration {
    Duration::from_millis(500u64 << (attempt.saturating_sub(1)).min(6))
}

#[async_trait]
impl NotificationSink for DiscordSink {
    async fn deliver(&self, event: &Event) -> Result<()> {
        let payload = DiscordWebhookPayload::from_event(event);
        self.post(&payload).await
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

impl DiscordWebhookPayload {
    fn from_event(ev: &Event) -> Self {
        let (title, color) = match ev.kind {
            EventKind::StockFound => match ev.candidate() {
                Some(c) => (format!("In stock: {} @ {}", c.product, c.source_id), 0x2e_cc_71),
                None => ("In stock".to_string(), 0x2e_cc_71),
            },
            EventKind::SourceDegraded => (format!("Source degraded: {}", ev.source_id()), 0xe6_7e_22),
            EventKind::CycleError => (format!("Source error: {}", ev.source_id()), 0xe7_4c_3c),
        };
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title,
                description: ev.summary(),
                color,
                timestamp: ev.at.to_rfc3339(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Availability, Candidate};
    use chrono::Utc;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(1), Duration::from_millis(500));
        assert_eq!(backoff(2), Duration::from_millis(1000));
        assert_eq!(backoff(3), Duration::from_millis(2000));
        assert_eq!(backoff(200), Duration::from_millis(500 << 6));
    }

    #[test]
    fn stock_embed_names_product_and_source() {
        let c = Candidate::observed("bestbuy", "RTX 5090", "FE", "https://bb/5090", "SEE_DETAILS")
            .resolved("SEE_DETAILS", Availability::Available);
        let p = DiscordWebhookPayload::from_event(&Event::stock_found(c, vec![], Utc::now()));
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["embeds"][0]["title"], "In stock: RTX 5090 @ bestbuy");
        assert!(json["embeds"][0]["description"]
            .as_str()
            .unwrap()
            .contains("https://bb/5090"));
    }
}
