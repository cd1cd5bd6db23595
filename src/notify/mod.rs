// src/notify/mod.rs
pub mod discord;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::model::{Event, EventKind};

/// Delivers one event to the user. Errors are logged by the caller and never
/// reach the scheduler.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, event: &Event) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Console/log sink: one tracing line per event.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::StockFound => {
                tracing::info!(target: "alert", source = %event.source_id(), "{}", event.summary())
            }
            EventKind::SourceDegraded | EventKind::CycleError => {
                tracing::warn!(target: "alert", source = %event.source_id(), "{}", event.summary())
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fans one event out to every configured sink. A failing sink does not stop the others.
#[derive(Clone, Default)]
pub struct NotifierMux {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotifierMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn notify(&self, event: &Event) {
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(event).await {
                tracing::warn!(sink = sink.name(), error = %format!("{e:#}"), "notification delivery failed");
                metrics::counter!("notify_delivery_errors_total").increment(1);
            }
        }
    }
}

/// Handle used by the scheduler to hand events to the delivery task.
/// Sending never waits: when the queue is full the event is dropped and logged.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Event>,
}

impl Dispatcher {
    /// Spawn the delivery task. It ends once every `Dispatcher` clone is dropped
    /// and the queue is drained.
    pub fn spawn(mux: NotifierMux, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Event>(capacity.max(1));
        let handle = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                mux.notify(&ev).await;
            }
        });
        (Self { tx }, handle)
    }

    pub fn emit(&self, event: Event) {
        if let Err(e) = self.tx.try_send(event) {
            let dropped = match e {
                mpsc::error::TrySendError::Full(ev) => ev,
                mpsc::error::TrySendError::Closed(ev) => ev,
            };
            tracing::warn!(kind = ?dropped.kind, source = %dropped.source_id(), "notification queue unavailable; event dropped");
            metrics::counter!("notify_dropped_total").increment(1);
        }
    }
}
