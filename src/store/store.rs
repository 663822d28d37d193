//! SQLite-backed persistent store for the observatory pipeline.
//!
//! All writes are idempotent upserts on natural keys or versioned inserts;
//! multi-row writes that must appear atomic (event materialization) run in a
//! single transaction.

use crate::error::{Error, Result};
use crate::store::schema::{initialize_schema, is_initialized};
use crate::store::types::*;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Fields for one LLM run audit row.
#[derive(Debug, Clone)]
pub struct NewLlmRun {
    pub provider: String,
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub latency_ms: i64,
    pub prompt_hash: String,
    pub input_hash: String,
    pub processor: String,
    pub event_id: Option<i64>,
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::Storage(e.to_string()))?;

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
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&conn).map_err(|e| Error::Storage(e.to_string()))
    }

    fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| Error::Internal(format!("Failed to lock connection: {}", e)))?;
        f(&mut conn).map_err(|e| Error::Storage(e.to_string()))
    }

    // ==================== Sources & Snapshots ====================

    /// Insert-or-get a source keyed on its canonical URL. Sources are
    /// immutable after creation, so a second upsert returns the original row.
    pub fn upsert_source(
        &self,
        raw_url: &str,
        canonical_url: &str,
        domain: &str,
        trust_tier: TrustTier,
    ) -> Result<EvidenceSource> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO evidence_sources (raw_url, canonical_url, domain, trust_tier, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    raw_url,
                    canonical_url,
                    domain,
                    trust_tier.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            conn.query_row(
                "SELECT id, raw_url, canonical_url, domain, trust_tier, created_at
                 FROM evidence_sources WHERE canonical_url = ?1",
                params![canonical_url],
                row_to_source,
            )
        })
    }

    pub fn source_by_id(&self, id: i64) -> Result<Option<EvidenceSource>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, raw_url, canonical_url, domain, trust_tier, created_at
                 FROM evidence_sources WHERE id = ?1",
                params![id],
                row_to_source,
            )
            .optional()
        })
    }

    /// Append a snapshot row.
    #[allow(clippy::too_many_arguments)]
    pub fn insert_snapshot(
        &self,
        source_id: i64,
        title: &str,
        author: Option<&str>,
        published_at: Option<DateTime<Utc>>,
        content_hash: &str,
        full_text: Option<&str>,
        http_status: u16,
    ) -> Result<EvidenceSnapshot> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO evidence_snapshots
                    (source_id, title, author, published_at, content_hash, full_text, http_status, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    source_id,
                    title,
                    author,
                    published_at.map(|t| t.to_rfc3339()),
                    content_hash,
                    full_text,
                    http_status,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, source_id, title, author, published_at, content_hash, full_text, http_status, fetched_at
                 FROM evidence_snapshots WHERE id = ?1",
                params![id],
                row_to_snapshot,
            )
        })
    }

    /// Find a snapshot of the same source with an identical content hash
    /// fetched within the dedup window, for idempotent reuse.
    pub fn find_recent_snapshot(
        &self,
        source_id: i64,
        content_hash: &str,
        window: Duration,
    ) -> Result<Option<EvidenceSnapshot>> {
        let cutoff = (Utc::now() - window).to_rfc3339();
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, source_id, title, author, published_at, content_hash, full_text, http_status, fetched_at
                 FROM evidence_snapshots
                 WHERE source_id = ?1 AND content_hash = ?2 AND fetched_at >= ?3
                 ORDER BY fetched_at DESC LIMIT 1",
                params![source_id, content_hash, cutoff],
                row_to_snapshot,
            )
            .optional()
        })
    }

    pub fn snapshot_by_id(&self, id: i64) -> Result<Option<EvidenceSnapshot>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, source_id, title, author, published_at, content_hash, full_text, http_status, fetched_at
                 FROM evidence_snapshots WHERE id = ?1",
                params![id],
                row_to_snapshot,
            )
            .optional()
        })
    }

    // ==================== Events & Evidence ====================

    /// Event a snapshot is already linked to, if any (cluster idempotency).
    pub fn snapshot_event(&self, snapshot_id: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT event_id FROM event_evidence WHERE snapshot_id = ?1 LIMIT 1",
                params![snapshot_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Materialize a new event with its primary evidence link and initial
    /// status history in one transaction. Concurrent inserts on the same
    /// fingerprint resolve to a single row via the unique index; the losing
    /// inserter receives `(existing_event, false)` and should treat the
    /// outcome as a match.
    pub fn create_event_with_primary(
        &self,
        fingerprint: &str,
        title: &str,
        occurred_at: DateTime<Utc>,
        snapshot_id: i64,
    ) -> Result<(Event, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO events (fingerprint, title, occurred_at, status, source_count, created_at)
                 VALUES (?1, ?2, ?3, 'RAW', 0, ?4)",
                params![fingerprint, title, occurred_at.to_rfc3339(), Utc::now().to_rfc3339()],
            )?;
            let created = inserted == 1;

            let event_id: i64 = tx.query_row(
                "SELECT id FROM events WHERE fingerprint = ?1",
                params![fingerprint],
                |row| row.get(0),
            )?;

            if created {
                tx.execute(
                    "INSERT OR IGNORE INTO event_evidence (event_id, snapshot_id, role, created_at)
                     VALUES (?1, ?2, 'PRIMARY', ?3)",
                    params![event_id, snapshot_id, Utc::now().to_rfc3339()],
                )?;
                tx.execute(
                    "UPDATE events SET source_count =
                        (SELECT COUNT(*) FROM event_evidence WHERE event_id = ?1)
                     WHERE id = ?1",
                    params![event_id],
                )?;
                tx.execute(
                    "INSERT INTO event_status_history (event_id, from_status, to_status, reason, created_at)
                     VALUES (?1, NULL, 'RAW', 'event materialized', ?2)",
                    params![event_id, Utc::now().to_rfc3339()],
                )?;
            }

            let event = tx.query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![event_id],
                row_to_event,
            )?;

            tx.commit()?;
            Ok((event, created))
        })
    }

    /// Link a snapshot to an event, idempotent on `(event_id, snapshot_id)`.
    /// Recomputes `source_count` from the evidence rows. Returns whether the
    /// link was newly inserted.
    pub fn link_evidence(
        &self,
        event_id: i64,
        snapshot_id: i64,
        role: EvidenceRole,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO event_evidence (event_id, snapshot_id, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_id, snapshot_id, role.as_str(), Utc::now().to_rfc3339()],
            )?;
            tx.execute(
                "UPDATE events SET source_count =
                    (SELECT COUNT(*) FROM event_evidence WHERE event_id = ?1)
                 WHERE id = ?1",
                params![event_id],
            )?;
            tx.commit()?;
            Ok(inserted == 1)
        })
    }

    pub fn event_by_id(&self, id: i64) -> Result<Option<Event>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM events WHERE id = ?1", EVENT_COLUMNS),
                params![id],
                row_to_event,
            )
            .optional()
        })
    }

    /// Events whose occurred_at falls inside the candidate window.
    pub fn events_in_window(
        &self,
        center: DateTime<Utc>,
        half_width: Duration,
    ) -> Result<Vec<Event>> {
        let lo = (center - half_width).to_rfc3339();
        let hi = (center + half_width).to_rfc3339();
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events WHERE occurred_at BETWEEN ?1 AND ?2",
                EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![lo, hi], row_to_event)?;
            rows.collect()
        })
    }

    /// Number of SUPPORTING evidence rows for an event.
    pub fn supporting_count(&self, event_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM event_evidence WHERE event_id = ?1 AND role = 'SUPPORTING'",
                params![event_id],
                |row| row.get(0),
            )
        })
    }

    pub fn evidence_for_event(&self, event_id: i64) -> Result<Vec<EventEvidence>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, snapshot_id, role, created_at
                 FROM event_evidence WHERE event_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![event_id], |row| {
                Ok(EventEvidence {
                    event_id: row.get(0)?,
                    snapshot_id: row.get(1)?,
                    role: parse_col(row, 2)?,
                    created_at: parse_ts(row, 3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Trust tiers of all sources evidencing an event.
    pub fn evidence_tiers(&self, event_id: i64) -> Result<Vec<TrustTier>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.trust_tier
                 FROM event_evidence ee
                 JOIN evidence_snapshots sn ON sn.id = ee.snapshot_id
                 JOIN evidence_sources s ON s.id = sn.source_id
                 WHERE ee.event_id = ?1",
            )?;
            let rows = stmt.query_map(params![event_id], |row| parse_col(row, 0))?;
            rows.collect()
        })
    }

    /// Set confidence and status, recording the history transition. Writes
    /// nothing when both values are unchanged; returns whether a transition
    /// was recorded.
    pub fn set_event_confidence_status(
        &self,
        event_id: i64,
        confidence: Confidence,
        status: EventStatus,
        reason: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (old_status, old_confidence): (String, Option<String>) = tx.query_row(
                "SELECT status, confidence FROM events WHERE id = ?1",
                params![event_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let unchanged =
                old_status == status.as_str() && old_confidence.as_deref() == Some(confidence.as_str());
            if unchanged {
                tx.commit()?;
                return Ok(false);
            }

            tx.execute(
                "UPDATE events SET confidence = ?2, status = ?3 WHERE id = ?1",
                params![event_id, confidence.as_str(), status.as_str()],
            )?;
            if old_status != status.as_str() {
                tx.execute(
                    "INSERT INTO event_status_history (event_id, from_status, to_status, reason, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![event_id, old_status, status.as_str(), reason, Utc::now().to_rfc3339()],
                )?;
            }
            tx.commit()?;
            Ok(true)
        })
    }

    /// Set status only, recording the history transition when it changes.
    pub fn set_event_status(&self, event_id: i64, status: EventStatus, reason: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let old_status: String = tx.query_row(
                "SELECT status FROM events WHERE id = ?1",
                params![event_id],
                |row| row.get(0),
            )?;
            if old_status == status.as_str() {
                tx.commit()?;
                return Ok(false);
            }
            tx.execute(
                "UPDATE events SET status = ?2 WHERE id = ?1",
                params![event_id, status.as_str()],
            )?;
            tx.execute(
                "INSERT INTO event_status_history (event_id, from_status, to_status, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![event_id, old_status, status.as_str(), reason, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn set_event_impact(&self, event_id: i64, impact: ImpactLevel) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE events SET impact_level = ?2 WHERE id = ?1",
                params![event_id, impact.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn set_event_title_hr(&self, event_id: i64, title_hr: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE events SET title_hr = ?2 WHERE id = ?1",
                params![event_id, title_hr],
            )?;
            Ok(())
        })
    }

    pub fn status_history(&self, event_id: i64) -> Result<Vec<StatusTransition>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, event_id, from_status, to_status, reason, created_at
                 FROM event_status_history WHERE event_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![event_id], |row| {
                let from: Option<String> = row.get(2)?;
                Ok(StatusTransition {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    from_status: from.and_then(|s| s.parse().ok()),
                    to_status: parse_col(row, 3)?,
                    reason: row.get(4)?,
                    created_at: parse_ts(row, 5)?,
                })
            })?;
            rows.collect()
        })
    }

    // ==================== Artifacts ====================

    /// Persist an artifact at `version = max(existing) + 1`.
    pub fn insert_artifact(
        &self,
        event_id: i64,
        kind: ArtifactKind,
        payload: &serde_json::Value,
        model_used: &str,
    ) -> Result<Artifact> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO artifacts (event_id, artifact_type, payload, version, model_used, created_at)
                 VALUES (?1, ?2, ?3,
                    COALESCE((SELECT MAX(version) FROM artifacts WHERE event_id = ?1 AND artifact_type = ?2), 0) + 1,
                    ?4, ?5)",
                params![
                    event_id,
                    kind.as_str(),
                    payload.to_string(),
                    model_used,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, event_id, artifact_type, payload, version, model_used, created_at
                 FROM artifacts WHERE id = ?1",
                params![id],
                row_to_artifact,
            )
        })
    }

    /// Latest version of an artifact kind for an event.
    pub fn latest_artifact(&self, event_id: i64, kind: ArtifactKind) -> Result<Option<Artifact>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, event_id, artifact_type, payload, version, model_used, created_at
                 FROM artifacts WHERE event_id = ?1 AND artifact_type = ?2
                 ORDER BY version DESC LIMIT 1",
                params![event_id, kind.as_str()],
                row_to_artifact,
            )
            .optional()
        })
    }

    /// Whether every required artifact kind exists for the event.
    pub fn has_required_artifacts(&self, event_id: i64) -> Result<bool> {
        let count: i64 = self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(DISTINCT artifact_type) FROM artifacts
                 WHERE event_id = ?1 AND artifact_type IN ('HEADLINE', 'SUMMARY', 'GM_TAKE', 'WHY_MATTERS')",
                params![event_id],
                |row| row.get(0),
            )
        })?;
        Ok(count as usize == ArtifactKind::REQUIRED.len())
    }

    /// Events holding both fan-in parent artifacts but no relationship
    /// artifact. Serves the crash-recovery sweeper.
    pub fn events_missing_relationship_sweep(&self) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT e.id FROM events e
                 WHERE EXISTS (SELECT 1 FROM artifacts a WHERE a.event_id = e.id AND a.artifact_type = 'ENTITY_EXTRACT')
                   AND EXISTS (SELECT 1 FROM artifacts a WHERE a.event_id = e.id AND a.artifact_type = 'TOPIC_ASSIGN')
                   AND NOT EXISTS (SELECT 1 FROM artifacts a WHERE a.event_id = e.id AND a.artifact_type = 'RELATIONSHIP_EXTRACT')",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect()
        })
    }

    // ==================== Entities, Topics, Relationships ====================

    /// Insert-or-get an entity by slug, merging any new aliases.
    pub fn upsert_entity(
        &self,
        slug: &str,
        name: &str,
        entity_type: EntityType,
        aliases: &[String],
    ) -> Result<Entity> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO entities (slug, name, entity_type, aliases)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    slug,
                    name,
                    entity_type.as_str(),
                    serde_json::to_string(aliases).unwrap_or_else(|_| "[]".into()),
                ],
            )?;
            let mut entity = conn.query_row(
                "SELECT id, slug, name, name_hr, entity_type, aliases FROM entities WHERE slug = ?1",
                params![slug],
                row_to_entity,
            )?;
            let mut merged = false;
            for alias in aliases {
                if !entity.aliases.contains(alias) {
                    entity.aliases.push(alias.clone());
                    merged = true;
                }
            }
            if merged {
                conn.execute(
                    "UPDATE entities SET aliases = ?2 WHERE id = ?1",
                    params![
                        entity.id,
                        serde_json::to_string(&entity.aliases).unwrap_or_else(|_| "[]".into())
                    ],
                )?;
            }
            Ok(entity)
        })
    }

    pub fn entity_by_slug(&self, slug: &str) -> Result<Option<Entity>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, slug, name, name_hr, entity_type, aliases FROM entities WHERE slug = ?1",
                params![slug],
                row_to_entity,
            )
            .optional()
        })
    }

    /// Upsert a mention; the highest-confidence extraction wins.
    pub fn insert_mention(
        &self,
        event_id: i64,
        entity_id: i64,
        role: MentionRole,
        confidence: f64,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO mentions (event_id, entity_id, role, confidence)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (event_id, entity_id) DO UPDATE SET
                    role = excluded.role, confidence = excluded.confidence
                 WHERE excluded.confidence > mentions.confidence",
                params![event_id, entity_id, role.as_str(), confidence],
            )?;
            Ok(())
        })
    }

    pub fn mentions_for_event(&self, event_id: i64) -> Result<Vec<Mention>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT event_id, entity_id, role, confidence FROM mentions WHERE event_id = ?1",
            )?;
            let rows = stmt.query_map(params![event_id], |row| {
                Ok(Mention {
                    event_id: row.get(0)?,
                    entity_id: row.get(1)?,
                    role: parse_col(row, 2)?,
                    confidence: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Entities mentioned by an event.
    pub fn entities_for_event(&self, event_id: i64) -> Result<Vec<Entity>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.slug, e.name, e.name_hr, e.entity_type, e.aliases
                 FROM mentions m JOIN entities e ON e.id = m.entity_id
                 WHERE m.event_id = ?1",
            )?;
            let rows = stmt.query_map(params![event_id], row_to_entity)?;
            rows.collect()
        })
    }

    pub fn upsert_topic(&self, slug: &str) -> Result<Topic> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO topics (slug) VALUES (?1)",
                params![slug],
            )?;
            conn.query_row(
                "SELECT id, slug FROM topics WHERE slug = ?1",
                params![slug],
                |row| {
                    Ok(Topic {
                        id: row.get(0)?,
                        slug: row.get(1)?,
                    })
                },
            )
        })
    }

    /// Upsert an event-topic link; like mentions, the highest-confidence
    /// assignment wins, so a retried job cannot regress an existing link.
    pub fn link_event_topic(&self, event_id: i64, topic_id: i64, confidence: f64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO event_topics (event_id, topic_id, confidence)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (event_id, topic_id) DO UPDATE SET
                    confidence = excluded.confidence
                 WHERE excluded.confidence > event_topics.confidence",
                params![event_id, topic_id, confidence],
            )?;
            Ok(())
        })
    }

    pub fn topics_for_event(&self, event_id: i64) -> Result<Vec<(i64, f64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT topic_id, confidence FROM event_topics WHERE event_id = ?1",
            )?;
            let rows = stmt.query_map(params![event_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    pub fn insert_relationship(
        &self,
        source_entity_id: i64,
        target_entity_id: i64,
        relationship_type: RelationshipType,
        event_id: i64,
        model_confidence: f64,
    ) -> Result<Relationship> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO relationships
                    (source_entity_id, target_entity_id, relationship_type, event_id, status, model_confidence, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?6)",
                params![
                    source_entity_id,
                    target_entity_id,
                    relationship_type.as_str(),
                    event_id,
                    model_confidence,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, source_entity_id, target_entity_id, relationship_type, event_id, status, model_confidence, created_at
                 FROM relationships WHERE id = ?1",
                params![id],
                row_to_relationship,
            )
        })
    }

    pub fn set_relationship_status(&self, id: i64, status: RelationshipStatus) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE relationships SET status = ?2 WHERE id = ?1",
                params![id, status.as_str()],
            )?;
            Ok(())
        })
    }

    pub fn relationships_for_event(&self, event_id: i64) -> Result<Vec<Relationship>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_entity_id, target_entity_id, relationship_type, event_id, status, model_confidence, created_at
                 FROM relationships WHERE event_id = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![event_id], row_to_relationship)?;
            rows.collect()
        })
    }

    // ==================== Briefings ====================

    /// Top events whose occurred_at falls on the given day, ranked by impact
    /// level then source count.
    pub fn top_events_for_day(&self, date: NaiveDate, limit: usize) -> Result<Vec<Event>> {
        let lo = format!("{date}T00:00:00+00:00");
        let hi = format!("{date}T23:59:59.999999999+00:00");
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events
                 WHERE occurred_at BETWEEN ?1 AND ?2 AND status = 'PUBLISHED'
                 ORDER BY CASE impact_level
                        WHEN 'BREAKING' THEN 0
                        WHEN 'HIGH' THEN 1
                        WHEN 'MEDIUM' THEN 2
                        ELSE 3 END,
                    source_count DESC
                 LIMIT ?3",
                EVENT_COLUMNS
            ))?;
            let rows = stmt.query_map(params![lo, hi, limit as i64], row_to_event)?;
            rows.collect()
        })
    }

    pub fn upsert_daily_briefing(
        &self,
        date: NaiveDate,
        payload: &serde_json::Value,
        top_event_ids: &[i64],
    ) -> Result<DailyBriefing> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO daily_briefings (briefing_date, payload, top_event_ids, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (briefing_date) DO UPDATE SET
                    payload = excluded.payload, top_event_ids = excluded.top_event_ids",
                params![
                    date.to_string(),
                    payload.to_string(),
                    serde_json::to_string(top_event_ids).unwrap_or_else(|_| "[]".into()),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            conn.query_row(
                "SELECT id, briefing_date, payload, top_event_ids, created_at
                 FROM daily_briefings WHERE briefing_date = ?1",
                params![date.to_string()],
                row_to_briefing,
            )
        })
    }

    pub fn briefing_for_date(&self, date: NaiveDate) -> Result<Option<DailyBriefing>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, briefing_date, payload, top_event_ids, created_at
                 FROM daily_briefings WHERE briefing_date = ?1",
                params![date.to_string()],
                row_to_briefing,
            )
            .optional()
        })
    }

    // ==================== LLM Runs ====================

    pub fn insert_llm_run(&self, run: &NewLlmRun) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO llm_runs
                    (provider, model, input_tokens, output_tokens, cost_usd, latency_ms,
                     prompt_hash, input_hash, processor, event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run.provider,
                    run.model,
                    run.input_tokens,
                    run.output_tokens,
                    run.cost_usd,
                    run.latency_ms,
                    run.prompt_hash,
                    run.input_hash,
                    run.processor,
                    run.event_id,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn llm_runs_for_processor(&self, processor: &str) -> Result<Vec<LlmRun>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, provider, model, input_tokens, output_tokens, cost_usd, latency_ms,
                        prompt_hash, input_hash, processor, event_id, created_at
                 FROM llm_runs WHERE processor = ?1 ORDER BY id",
            )?;
            let rows = stmt.query_map(params![processor], row_to_llm_run)?;
            rows.collect()
        })
    }

    // ==================== Watchlist ====================

    pub fn insert_watchlist_entry(
        &self,
        label: &str,
        entity_slug: Option<&str>,
        title_pattern: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO watchlist (label, entity_slug, title_pattern) VALUES (?1, ?2, ?3)",
                params![label, entity_slug, title_pattern],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn watchlist_entries(&self) -> Result<Vec<WatchlistEntry>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, label, entity_slug, title_pattern FROM watchlist")?;
            let rows = stmt.query_map([], |row| {
                Ok(WatchlistEntry {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    entity_slug: row.get(2)?,
                    title_pattern: row.get(3)?,
                })
            })?;
            rows.collect()
        })
    }

    /// Record a watchlist hit, idempotent on `(watchlist_id, event_id)`.
    pub fn record_watchlist_hit(
        &self,
        watchlist_id: i64,
        event_id: i64,
        matched_on: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO watchlist_hits (watchlist_id, event_id, matched_on, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![watchlist_id, event_id, matched_on, Utc::now().to_rfc3339()],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn watchlist_hits_for_event(&self, event_id: i64) -> Result<Vec<WatchlistHit>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, watchlist_id, event_id, matched_on, created_at
                 FROM watchlist_hits WHERE event_id = ?1",
            )?;
            let rows = stmt.query_map(params![event_id], |row| {
                Ok(WatchlistHit {
                    id: row.get(0)?,
                    watchlist_id: row.get(1)?,
                    event_id: row.get(2)?,
                    matched_on: row.get(3)?,
                    created_at: parse_ts(row, 4)?,
                })
            })?;
            rows.collect()
        })
    }

    // ==================== Legacy backfill ====================

    pub fn insert_legacy_item(
        &self,
        url: &str,
        title: &str,
        source_type: &str,
        published_at: Option<DateTime<Utc>>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO legacy_items (url, title, source_type, published_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![url, title, source_type, published_at.map(|t| t.to_rfc3339())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn unmigrated_legacy_items(
        &self,
    ) -> Result<Vec<(i64, String, String, String, Option<DateTime<Utc>>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, url, title, source_type, published_at
                 FROM legacy_items WHERE migrated_at IS NULL ORDER BY id",
            )?;
            let rows = stmt.query_map([], |row| {
                let published: Option<String> = row.get(4)?;
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    published.and_then(|s| {
                        DateTime::parse_from_rfc3339(&s)
                            .ok()
                            .map(|t| t.with_timezone(&Utc))
                    }),
                ))
            })?;
            rows.collect()
        })
    }

    pub fn mark_legacy_migrated(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE legacy_items SET migrated_at = ?2 WHERE id = ?1",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }
}

const EVENT_COLUMNS: &str =
    "id, fingerprint, title, title_hr, occurred_at, impact_level, status, confidence, source_count, created_at";

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| {
            // Columns defaulted by SQLite use 'YYYY-MM-DD HH:MM:SS'
            chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S")
                .map(|t| t.and_utc())
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        idx,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })
        })
}

fn parse_col<T: std::str::FromStr>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: T::Err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_source(row: &Row<'_>) -> rusqlite::Result<EvidenceSource> {
    Ok(EvidenceSource {
        id: row.get(0)?,
        raw_url: row.get(1)?,
        canonical_url: row.get(2)?,
        domain: row.get(3)?,
        trust_tier: parse_col(row, 4)?,
        created_at: parse_ts(row, 5)?,
    })
}

fn row_to_snapshot(row: &Row<'_>) -> rusqlite::Result<EvidenceSnapshot> {
    let published: Option<String> = row.get(4)?;
    Ok(EvidenceSnapshot {
        id: row.get(0)?,
        source_id: row.get(1)?,
        title: row.get(2)?,
        author: row.get(3)?,
        published_at: published.and_then(|s| {
            DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| t.with_timezone(&Utc))
        }),
        content_hash: row.get(5)?,
        full_text: row.get(6)?,
        http_status: row.get::<_, i64>(7)? as u16,
        fetched_at: parse_ts(row, 8)?,
    })
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let confidence: Option<String> = row.get(7)?;
    Ok(Event {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        title: row.get(2)?,
        title_hr: row.get(3)?,
        occurred_at: parse_ts(row, 4)?,
        impact_level: parse_col(row, 5)?,
        status: parse_col(row, 6)?,
        confidence: confidence.and_then(|s| s.parse().ok()),
        source_count: row.get(8)?,
        created_at: parse_ts(row, 9)?,
    })
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    let payload: String = row.get(3)?;
    Ok(Artifact {
        id: row.get(0)?,
        event_id: row.get(1)?,
        kind: parse_col(row, 2)?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        version: row.get(4)?,
        model_used: row.get(5)?,
        created_at: parse_ts(row, 6)?,
    })
}

fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Entity> {
    let aliases: String = row.get(5)?;
    Ok(Entity {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        name_hr: row.get(3)?,
        entity_type: parse_col(row, 4)?,
        aliases: serde_json::from_str(&aliases).unwrap_or_default(),
    })
}

fn row_to_relationship(row: &Row<'_>) -> rusqlite::Result<Relationship> {
    Ok(Relationship {
        id: row.get(0)?,
        source_entity_id: row.get(1)?,
        target_entity_id: row.get(2)?,
        relationship_type: parse_col(row, 3)?,
        event_id: row.get(4)?,
        status: parse_col(row, 5)?,
        model_confidence: row.get(6)?,
        created_at: parse_ts(row, 7)?,
    })
}

fn row_to_briefing(row: &Row<'_>) -> rusqlite::Result<DailyBriefing> {
    let date: String = row.get(1)?;
    let payload: String = row.get(2)?;
    let top: String = row.get(3)?;
    Ok(DailyBriefing {
        id: row.get(0)?,
        briefing_date: date.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        top_event_ids: serde_json::from_str(&top).unwrap_or_default(),
        created_at: parse_ts(row, 4)?,
    })
}

fn row_to_llm_run(row: &Row<'_>) -> rusqlite::Result<LlmRun> {
    Ok(LlmRun {
        id: row.get(0)?,
        provider: row.get(1)?,
        model: row.get(2)?,
        input_tokens: row.get(3)?,
        output_tokens: row.get(4)?,
        cost_usd: row.get(5)?,
        latency_ms: row.get(6)?,
        prompt_hash: row.get(7)?,
        input_hash: row.get(8)?,
        processor: row.get(9)?,
        event_id: row.get(10)?,
        created_at: parse_ts(row, 11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> SqliteStore {
        SqliteStore::in_memory().unwrap()
    }

    fn seed_snapshot(store: &SqliteStore, url: &str, tier: TrustTier, title: &str) -> EvidenceSnapshot {
        let source = store
            .upsert_source(url, url, url.split('/').nth(2).unwrap_or("x"), tier)
            .unwrap();
        store
            .insert_snapshot(source.id, title, None, Some(Utc::now()), "hash", Some("body"), 200)
            .unwrap()
    }

    #[test]
    fn test_source_upsert_is_idempotent() {
        let store = store();
        let a = store
            .upsert_source("http://a.com/x", "https://a.com/x", "a.com", TrustTier::Low)
            .unwrap();
        let b = store
            .upsert_source("http://a.com/x?utm_source=t", "https://a.com/x", "a.com", TrustTier::Standard)
            .unwrap();
        assert_eq!(a.id, b.id);
        // Immutable after creation: second tier is ignored
        assert_eq!(b.trust_tier, TrustTier::Low);
    }

    #[test]
    fn test_snapshot_dedup_window() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/x", TrustTier::Low, "t");
        let found = store
            .find_recent_snapshot(snap.source_id, "hash", Duration::hours(24))
            .unwrap();
        assert!(found.is_some());
        let missing = store
            .find_recent_snapshot(snap.source_id, "other-hash", Duration::hours(24))
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_create_event_with_primary() {
        let store = store();
        let snap = seed_snapshot(&store, "https://openai.com/a", TrustTier::Authoritative, "t");
        let (event, created) = store
            .create_event_with_primary("fp1", "Title", Utc::now(), snap.id)
            .unwrap();
        assert!(created);
        assert_eq!(event.status, EventStatus::Raw);
        assert_eq!(event.source_count, 1);

        let evidence = store.evidence_for_event(event.id).unwrap();
        assert_eq!(evidence.len(), 1);
        assert_eq!(evidence[0].role, EvidenceRole::Primary);

        let history = store.status_history(event.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, None);
        assert_eq!(history[0].to_status, EventStatus::Raw);
    }

    #[test]
    fn test_fingerprint_conflict_resolves_to_existing() {
        let store = store();
        let s1 = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let s2 = seed_snapshot(&store, "https://b.com/2", TrustTier::Low, "t");

        let (e1, created1) = store
            .create_event_with_primary("fp", "Title", Utc::now(), s1.id)
            .unwrap();
        let (e2, created2) = store
            .create_event_with_primary("fp", "Title", Utc::now(), s2.id)
            .unwrap();

        assert!(created1);
        assert!(!created2);
        assert_eq!(e1.id, e2.id);
        // Loser did not get a primary link
        assert_eq!(store.evidence_for_event(e1.id).unwrap().len(), 1);
    }

    #[test]
    fn test_link_evidence_keeps_source_count_consistent() {
        let store = store();
        let s1 = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let s2 = seed_snapshot(&store, "https://b.com/2", TrustTier::Standard, "t2");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), s1.id)
            .unwrap();

        assert!(store.link_evidence(event.id, s2.id, EvidenceRole::Supporting).unwrap());
        // Idempotent
        assert!(!store.link_evidence(event.id, s2.id, EvidenceRole::Supporting).unwrap());

        let event = store.event_by_id(event.id).unwrap().unwrap();
        assert_eq!(event.source_count, 2);
        assert_eq!(
            event.source_count,
            store.evidence_for_event(event.id).unwrap().len() as i64
        );

        let primaries: Vec<_> = store
            .evidence_for_event(event.id)
            .unwrap()
            .into_iter()
            .filter(|e| e.role == EvidenceRole::Primary)
            .collect();
        assert_eq!(primaries.len(), 1);
    }

    #[test]
    fn test_artifact_versions_are_monotonic() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
            .unwrap();

        let v1 = store
            .insert_artifact(event.id, ArtifactKind::Headline, &serde_json::json!({"n": 1}), "m")
            .unwrap();
        let v2 = store
            .insert_artifact(event.id, ArtifactKind::Headline, &serde_json::json!({"n": 2}), "m")
            .unwrap();

        assert_eq!(v1.version, 1);
        assert_eq!(v2.version, 2);

        let latest = store
            .latest_artifact(event.id, ArtifactKind::Headline)
            .unwrap()
            .unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.payload["n"], 2);
    }

    #[test]
    fn test_has_required_artifacts() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
            .unwrap();

        assert!(!store.has_required_artifacts(event.id).unwrap());
        for kind in ArtifactKind::REQUIRED {
            store
                .insert_artifact(event.id, kind, &serde_json::json!({}), "m")
                .unwrap();
        }
        assert!(store.has_required_artifacts(event.id).unwrap());
    }

    #[test]
    fn test_status_transitions_record_history() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
            .unwrap();

        let changed = store
            .set_event_confidence_status(event.id, Confidence::Medium, EventStatus::Published, "scored")
            .unwrap();
        assert!(changed);
        // Unchanged re-score writes nothing
        let changed = store
            .set_event_confidence_status(event.id, Confidence::Medium, EventStatus::Published, "scored")
            .unwrap();
        assert!(!changed);

        let history = store.status_history(event.id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].from_status, Some(EventStatus::Raw));
        assert_eq!(history[1].to_status, EventStatus::Published);
    }

    #[test]
    fn test_entity_upsert_merges_aliases() {
        let store = store();
        let a = store
            .upsert_entity("openai", "OpenAI", EntityType::Company, &["Open AI".into()])
            .unwrap();
        let b = store
            .upsert_entity("openai", "OpenAI", EntityType::Company, &["OAI".into()])
            .unwrap();
        assert_eq!(a.id, b.id);
        assert!(b.aliases.contains(&"Open AI".to_string()));
        assert!(b.aliases.contains(&"OAI".to_string()));
    }

    #[test]
    fn test_junction_upserts_keep_highest_confidence() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
            .unwrap();

        let entity = store
            .upsert_entity("openai", "OpenAI", EntityType::Company, &[])
            .unwrap();
        store
            .insert_mention(event.id, entity.id, MentionRole::Subject, 0.9)
            .unwrap();
        // A retried extraction with a worse confidence must not regress
        store
            .insert_mention(event.id, entity.id, MentionRole::Mentioned, 0.4)
            .unwrap();
        let mentions = store.mentions_for_event(event.id).unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].role, MentionRole::Subject);
        assert!((mentions[0].confidence - 0.9).abs() < 1e-9);

        let topic = store.upsert_topic("model-release").unwrap();
        store.link_event_topic(event.id, topic.id, 0.8).unwrap();
        store.link_event_topic(event.id, topic.id, 0.3).unwrap();
        let topics = store.topics_for_event(event.id).unwrap();
        assert_eq!(topics.len(), 1);
        assert!((topics[0].1 - 0.8).abs() < 1e-9);

        // A better assignment still upgrades
        store.link_event_topic(event.id, topic.id, 0.95).unwrap();
        let topics = store.topics_for_event(event.id).unwrap();
        assert!((topics[0].1 - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_sweep_finds_events_missing_relationship() {
        let store = store();
        let snap = seed_snapshot(&store, "https://a.com/1", TrustTier::Low, "t");
        let (event, _) = store
            .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
            .unwrap();

        assert!(store.events_missing_relationship_sweep().unwrap().is_empty());

        store
            .insert_artifact(event.id, ArtifactKind::EntityExtract, &serde_json::json!({}), "m")
            .unwrap();
        store
            .insert_artifact(event.id, ArtifactKind::TopicAssign, &serde_json::json!({}), "m")
            .unwrap();
        assert_eq!(store.events_missing_relationship_sweep().unwrap(), vec![event.id]);

        store
            .insert_artifact(event.id, ArtifactKind::RelationshipExtract, &serde_json::json!({}), "m")
            .unwrap();
        assert!(store.events_missing_relationship_sweep().unwrap().is_empty());
    }

    #[test]
    fn test_briefing_upsert_on_date() {
        let store = store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let b1 = store
            .upsert_daily_briefing(date, &serde_json::json!({"v": 1}), &[1, 2])
            .unwrap();
        let b2 = store
            .upsert_daily_briefing(date, &serde_json::json!({"v": 2}), &[3])
            .unwrap();
        assert_eq!(b1.id, b2.id);
        assert_eq!(b2.payload["v"], 2);
        assert_eq!(b2.top_event_ids, vec![3]);
    }

    #[test]
    fn test_top_events_ranked_by_impact_then_sources() {
        let store = store();
        let date = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let at = DateTime::parse_from_rfc3339("2026-02-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let mut ids = Vec::new();
        for (i, impact) in [ImpactLevel::Medium, ImpactLevel::Breaking, ImpactLevel::High]
            .iter()
            .enumerate()
        {
            let snap = seed_snapshot(&store, &format!("https://a.com/{i}"), TrustTier::Low, "t");
            let (event, _) = store
                .create_event_with_primary(&format!("fp{i}"), &format!("T{i}"), at, snap.id)
                .unwrap();
            store.set_event_impact(event.id, *impact).unwrap();
            store
                .set_event_confidence_status(event.id, Confidence::Medium, EventStatus::Published, "t")
                .unwrap();
            ids.push(event.id);
        }

        let top = store.top_events_for_day(date, 5).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].id, ids[1]); // BREAKING
        assert_eq!(top[1].id, ids[2]); // HIGH
        assert_eq!(top[2].id, ids[0]); // MEDIUM
    }

    #[test]
    fn test_llm_run_insert_and_query() {
        let store = store();
        store
            .insert_llm_run(&NewLlmRun {
                provider: "ollama".into(),
                model: "test".into(),
                input_tokens: 10,
                output_tokens: 5,
                cost_usd: 0.0,
                latency_ms: 42,
                prompt_hash: "p".repeat(32),
                input_hash: "i".repeat(32),
                processor: "cluster-judge".into(),
                event_id: None,
            })
            .unwrap();
        let runs = store.llm_runs_for_processor("cluster-judge").unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].latency_ms, 42);
    }

    #[test]
    fn test_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("observatory.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            let snap = seed_snapshot(&store, "https://a.com/x", TrustTier::Standard, "t");
            store
                .create_event_with_primary("fp", "Title", Utc::now(), snap.id)
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let event = store.event_by_id(1).unwrap().unwrap();
        assert_eq!(event.fingerprint, "fp");
        assert_eq!(event.source_count, 1);
    }

    #[test]
    fn test_legacy_backfill_bookkeeping() {
        let store = store();
        let id = store
            .insert_legacy_item("https://a.com/x", "Old", "newsapi", None)
            .unwrap();
        assert_eq!(store.unmigrated_legacy_items().unwrap().len(), 1);
        store.mark_legacy_migrated(id).unwrap();
        assert!(store.unmigrated_legacy_items().unwrap().is_empty());
    }
}
