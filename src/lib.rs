//! # observatory-core
//!
//! An AI-news observatory pipeline: heterogeneous feeds are ingested,
//! deduplicated into canonical events, enriched with schema-validated LLM
//! artifacts, and rolled up into a daily roundtable briefing.
//!
//! ## Core Components
//!
//! - **Feeds**: one adapter per external source, normalizing into `RawItem`s
//! - **Queue**: durable named queues with retries, dead-lettering, and
//!   cron-driven repeatable jobs
//! - **Store**: the relational model (sources, snapshots, events, artifacts,
//!   entities, relationships, briefings, run log) over SQLite
//! - **Pipeline**: snapshot → cluster → materialize → score → enrich →
//!   (entities ∥ topics) → relationships → watchlist, plus the daily briefing
//!
//! ## Example
//!
//! ```rust,ignore
//! use observatory_core::{Config, Runtime};
//!
//! let config = Config::from_env()?;
//! let runtime = Runtime::new(config)?;
//! runtime.run().await?;
//! ```

pub mod artifacts;
pub mod config;
pub mod error;
pub mod feeds;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod runtime;
pub mod store;

// Re-exports for convenience
pub use artifacts::ArtifactPayload;
pub use config::Config;
pub use error::{Error, Result};
pub use feeds::{FeedAdapter, FetchOutcome, RawItem, SourceType};
pub use llm::{ChatMessage, CompletionRequest, LlmClient, LlmRouter, LoggedLlm};
pub use pipeline::{
    canonicalize_url, fingerprint, normalize_title, score, status_for, title_similarity,
    BroadcastClient, FanInCoordinator, TrustProfile,
};
pub use queue::{Job, JobHandler, JobOutcome, QueueStore, Worker};
pub use runtime::Runtime;
pub use store::{
    ArtifactKind, Confidence, Event, EventStatus, EvidenceRole, ImpactLevel, SqliteStore,
    TrustTier,
};
