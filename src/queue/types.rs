//! Job types for the durable queue substrate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known pipeline queue names.
pub mod queues {
    pub const INGEST: &str = "ingest";
    pub const SNAPSHOT: &str = "snapshot";
    pub const CLUSTER: &str = "cluster";
    pub const MATERIALIZE: &str = "materialize";
    pub const SCORE: &str = "score";
    pub const ENRICH: &str = "enrich";
    pub const ENTITY_EXTRACT: &str = "entity-extract";
    pub const TOPIC_ASSIGN: &str = "topic-assign";
    pub const RELATIONSHIP_EXTRACT: &str = "relationship-extract";
    pub const WATCHLIST_MATCH: &str = "watchlist-match";
    pub const BRIEFING: &str = "briefing";
}

/// A claimed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    /// 1-based attempt number for the current execution
    pub attempt: u32,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Job lifecycle state as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Active,
    Completed,
    /// Retries exhausted; parked for inspection
    Dead,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

impl std::str::FromStr for JobState {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(crate::error::Error::queue(format!("unknown job state: {other}"))),
        }
    }
}

/// What a handler reports back across the queue boundary. Handlers never
/// propagate errors as panics; failures are data.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Side effects committed; `result` flows to the completion hook.
    Completed(serde_json::Value),
    /// Nothing to do (idempotency); completion hooks do not fire.
    Skipped(String),
    /// Handler failed; retried with backoff until attempts are exhausted.
    Failed(String),
}

/// Options for enqueueing a job.
#[derive(Debug, Clone)]
pub struct EnqueueOpts {
    pub max_attempts: u32,
    pub delay: Option<Duration>,
}

impl Default for EnqueueOpts {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: None,
        }
    }
}

impl EnqueueOpts {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}
