// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregate;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod oracle;
pub mod scheduler;
pub mod search;
pub mod source;

// ---- Re-exports for stable public API ----
pub use crate::aggregate::Aggregator;
pub use crate::config::MonitorConfig;
pub use crate::error::{MonitorError, MonitorResult};
pub use crate::model::{Availability, Candidate, Event, EventKind, Product, Source, SourceRole};
pub use crate::notify::{Dispatcher, NotificationSink, NotifierMux};
pub use crate::scheduler::{CycleReport, Scheduler, SchedulerSettings};
pub use crate::search::{NavigationSearch, SearchOutcome};
pub use crate::source::{Navigator, SourceAdapter};
