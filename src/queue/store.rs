//! Durable SQLite-backed job storage with at-least-once delivery.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::types::{EnqueueOpts, Job, JobState};

/// Base delay for exponential retry backoff.
const RETRY_BASE_SECS: u64 = 30;

/// Jobs active longer than this are assumed orphaned by a crashed worker and
/// are requeued (at-least-once delivery).
pub const STALE_ACTIVE_SECS: i64 = 15 * 60;

/// Durable named queues over SQLite.
#[derive(Clone)]
pub struct QueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl QueueStore {
    /// Open or create queue tables at the given database path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::queue(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory queue store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::queue(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::queue(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS queue_jobs (
                id TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                payload TEXT NOT NULL,
                state TEXT NOT NULL DEFAULT 'queued',
                attempt INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL DEFAULT 5,
                available_at TEXT NOT NULL,
                enqueued_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_error TEXT
            )",
            [],
        )
        .map_err(|e| Error::queue(e.to_string()))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_queue_jobs_claim
             ON queue_jobs(queue, state, available_at)",
            [],
        )
        .map_err(|e| Error::queue(e.to_string()))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS queue_schedulers (
                name TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                pattern TEXT NOT NULL,
                payload TEXT NOT NULL,
                next_run_at TEXT
            )",
            [],
        )
        .map_err(|e| Error::queue(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock queue connection: {}", e)))?;
        f(&conn).map_err(|e| Error::queue(e.to_string()))
    }

    /// Enqueue a job onto a named queue.
    pub fn enqueue(
        &self,
        queue: &str,
        payload: serde_json::Value,
        opts: EnqueueOpts,
    ) -> Result<Job> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let available_at = opts
            .delay
            .map(|d| now + chrono::Duration::from_std(d).unwrap_or_default())
            .unwrap_or(now);

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO queue_jobs
                    (id, queue, payload, state, attempt, max_attempts, available_at, enqueued_at, updated_at)
                 VALUES (?1, ?2, ?3, 'queued', 0, ?4, ?5, ?6, ?6)",
                params![
                    id,
                    queue,
                    payload.to_string(),
                    opts.max_attempts,
                    available_at.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;

        Ok(Job {
            id,
            queue: queue.to_string(),
            payload,
            attempt: 0,
            max_attempts: opts.max_attempts,
            enqueued_at: now,
        })
    }

    /// Atomically claim the oldest available job on a queue. FIFO best-effort.
    pub fn claim(&self, queue: &str) -> Result<Option<Job>> {
        let now = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let candidate: Option<(String, String, u32, u32, String)> = conn
                .query_row(
                    "SELECT id, payload, attempt, max_attempts, enqueued_at FROM queue_jobs
                     WHERE queue = ?1 AND state = 'queued' AND available_at <= ?2
                     ORDER BY enqueued_at, rowid LIMIT 1",
                    params![queue, now],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, payload, attempt, max_attempts, enqueued_at)) = candidate else {
                return Ok(None);
            };

            // The connection mutex serializes claims in-process; the state
            // guard covers any second process on the same database.
            let claimed = conn.execute(
                "UPDATE queue_jobs SET state = 'active', attempt = attempt + 1, updated_at = ?2
                 WHERE id = ?1 AND state = 'queued'",
                params![id, now],
            )?;
            if claimed == 0 {
                return Ok(None);
            }

            Ok(Some(Job {
                id,
                queue: queue.to_string(),
                payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                attempt: attempt + 1,
                max_attempts,
                enqueued_at: DateTime::parse_from_rfc3339(&enqueued_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            }))
        })
    }

    /// Mark a job completed.
    pub fn complete(&self, job_id: &str) -> Result<()> {
        self.complete_with_next(job_id, &[])
    }

    /// Mark a job completed and enqueue its next-step jobs in the same
    /// transaction. This is the durable chaining primitive: either the
    /// completion and every downstream job land together, or none do and the
    /// job is retried.
    pub fn complete_with_next(
        &self,
        job_id: &str,
        next: &[(String, serde_json::Value)],
    ) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock queue connection: {}", e)))?;
        let tx = conn
            .transaction()
            .map_err(|e| Error::queue(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "UPDATE queue_jobs SET state = 'completed', updated_at = ?2 WHERE id = ?1",
            params![job_id, now],
        )
        .map_err(|e| Error::queue(e.to_string()))?;

        for (queue, payload) in next {
            tx.execute(
                "INSERT INTO queue_jobs
                    (id, queue, payload, state, attempt, max_attempts, available_at, enqueued_at, updated_at)
                 VALUES (?1, ?2, ?3, 'queued', 0, 5, ?4, ?4, ?4)",
                params![Uuid::new_v4().to_string(), queue, payload.to_string(), now],
            )
            .map_err(|e| Error::queue(e.to_string()))?;
        }

        tx.commit().map_err(|e| Error::queue(e.to_string()))
    }

    /// Record a failure: reschedule with exponential backoff, or dead-letter
    /// once attempts are exhausted. Returns the resulting state.
    pub fn fail(&self, job: &Job, error: &str) -> Result<JobState> {
        let exhausted = job.attempt >= job.max_attempts;
        let state = if exhausted { JobState::Dead } else { JobState::Queued };
        let backoff = Duration::from_secs(RETRY_BASE_SECS * 2u64.pow(job.attempt.saturating_sub(1)));
        let available_at = Utc::now() + chrono::Duration::from_std(backoff).unwrap_or_default();

        self.with_conn(|conn| {
            conn.execute(
                "UPDATE queue_jobs SET state = ?2, available_at = ?3, last_error = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    job.id,
                    state.as_str(),
                    available_at.to_rfc3339(),
                    error,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })?;
        Ok(state)
    }

    /// Requeue jobs stuck in `active` longer than the staleness window.
    pub fn requeue_stale(&self) -> Result<usize> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(STALE_ACTIVE_SECS)).to_rfc3339();
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE queue_jobs SET state = 'queued', updated_at = ?2
                 WHERE state = 'active' AND updated_at < ?1",
                params![cutoff, Utc::now().to_rfc3339()],
            )?;
            Ok(n)
        })
    }

    pub fn job_state(&self, job_id: &str) -> Result<Option<JobState>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT state FROM queue_jobs WHERE id = ?1",
                params![job_id],
                |row: &Row<'_>| {
                    let s: String = row.get(0)?;
                    Ok(s)
                },
            )
            .optional()
        })?
        .map(|s| s.parse())
        .transpose()
    }

    pub fn queued_count(&self, queue: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM queue_jobs WHERE queue = ?1 AND state IN ('queued', 'active')",
                params![queue],
                |row| row.get(0),
            )
        })
    }

    pub fn dead_count(&self, queue: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM queue_jobs WHERE queue = ?1 AND state = 'dead'",
                params![queue],
                |row| row.get(0),
            )
        })
    }

    // ==================== Schedulers ====================

    /// Insert or update a repeatable job definition. The cron pattern is
    /// validated here; the scheduler loop computes fire times.
    pub fn upsert_scheduler(
        &self,
        name: &str,
        queue: &str,
        pattern: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        use std::str::FromStr;
        cron::Schedule::from_str(pattern)
            .map_err(|e| Error::queue(format!("invalid cron pattern {pattern:?}: {e}")))?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO queue_schedulers (name, queue, pattern, payload)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (name) DO UPDATE SET
                    queue = excluded.queue, pattern = excluded.pattern, payload = excluded.payload",
                params![name, queue, pattern, payload.to_string()],
            )?;
            Ok(())
        })
    }

    /// All scheduler rows: `(name, queue, pattern, payload, next_run_at)`.
    pub fn schedulers(
        &self,
    ) -> Result<Vec<(String, String, String, serde_json::Value, Option<DateTime<Utc>>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name, queue, pattern, payload, next_run_at FROM queue_schedulers",
            )?;
            let rows = stmt.query_map([], |row| {
                let payload: String = row.get(3)?;
                let next: Option<String> = row.get(4)?;
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
                    next.and_then(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .ok()
                            .map(|t| t.with_timezone(&Utc))
                    }),
                ))
            })?;
            rows.collect()
        })
    }

    pub fn set_scheduler_next_run(&self, name: &str, next_run_at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE queue_schedulers SET next_run_at = ?2 WHERE name = ?1",
                params![name, next_run_at.to_rfc3339()],
            )?;
            Ok(())
        })
    }
}
