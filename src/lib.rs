// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod dedup;
pub mod error;
pub mod format;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;
pub mod store;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::config::{AppConfig, ChannelConfig};
pub use crate::dedup::{DedupPolicy, DedupState};
pub use crate::ingest::types::{FeedItem, FeedSource};
pub use crate::notify::{MessageBatch, Notifier, ProviderKind};
pub use crate::orchestrator::{CheckOutcome, CheckReport, Orchestrator, RunSummary};
pub use crate::scheduler::App;
pub use crate::store::{JsonWorkbook, MemoryWorkbook, Workbook};
