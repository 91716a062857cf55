// src/lib.rs
// Public library surface shared by both binaries and the integration tests.

pub mod config;
pub mod dedup;
pub mod logging;
pub mod model;
pub mod moderation;
pub mod relevance;
pub mod rolling;
pub mod scheduler;
pub mod store;

// Stage boundaries (fetch, enrichment, channel) and the cross-process queue
pub mod collect;
pub mod enrich;
pub mod publish;
pub mod queue;

// Background loops
pub mod worker;

// ---- Re-exports for stable public API ----
pub use crate::model::{EnrichedItem, ImportanceLevel, ItemId, RawItem, Sentiment, SourceKind};
pub use crate::moderation::{ModerationVerdict, Moderator};
pub use crate::queue::DurableQueue;
pub use crate::relevance::RelevanceScorer;
pub use crate::scheduler::PublicationScheduler;
