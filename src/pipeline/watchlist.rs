//! Watchlist matching: the terminal, deterministic enrichment step.
//!
//! Matches the event's mentioned entities against watchlist slugs and the
//! event title against watchlist patterns. Hits are persisted and logged; no
//! LLM involved.

use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::json;
use tracing::{info, warn};

use crate::queue::{Job, JobHandler, JobOutcome};
use crate::store::SqliteStore;

const PROCESSOR: &str = "watchlist-match";

pub struct WatchlistMatchHandler {
    store: SqliteStore,
}

impl WatchlistMatchHandler {
    pub fn new(store: SqliteStore) -> Self {
        Self { store }
    }

    async fn process(&self, event_id: i64) -> JobOutcome {
        let event = match self.store.event_by_id(event_id) {
            Ok(Some(event)) => event,
            Ok(None) => return JobOutcome::Skipped(format!("event {event_id} not found")),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        let entries = match self.store.watchlist_entries() {
            Ok(entries) => entries,
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };
        if entries.is_empty() {
            return JobOutcome::Completed(json!({ "event_id": event_id, "hits": 0 }));
        }

        let entity_slugs: Vec<String> = match self.store.entities_for_event(event_id) {
            Ok(entities) => entities.into_iter().map(|e| e.slug).collect(),
            Err(e) => return JobOutcome::Failed(e.to_string()),
        };

        let mut hits = 0;
        for entry in &entries {
            let matched_on = if let Some(slug) = entry
                .entity_slug
                .as_ref()
                .filter(|slug| entity_slugs.iter().any(|s| s == *slug))
            {
                Some(format!("entity:{slug}"))
            } else if let Some(pattern) = &entry.title_pattern {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(regex) if regex.is_match(&event.title) => {
                        Some(format!("pattern:{pattern}"))
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(watchlist_id = entry.id, error = %e, "bad watchlist pattern");
                        None
                    }
                }
            } else {
                None
            };

            if let Some(matched_on) = matched_on {
                match self
                    .store
                    .record_watchlist_hit(entry.id, event_id, &matched_on)
                {
                    Ok(true) => {
                        info!(
                            event_id,
                            watchlist = %entry.label,
                            %matched_on,
                            "watchlist hit"
                        );
                        hits += 1;
                    }
                    Ok(false) => {}
                    Err(e) => return JobOutcome::Failed(e.to_string()),
                }
            }
        }

        JobOutcome::Completed(json!({ "event_id": event_id, "hits": hits }))
    }
}

#[async_trait]
impl JobHandler for WatchlistMatchHandler {
    async fn handle(&self, job: &Job) -> JobOutcome {
        let Some(event_id) = job.payload["event_id"].as_i64() else {
            return JobOutcome::Failed(format!("{PROCESSOR} payload missing event_id"));
        };
        self.process(event_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{EntityType, MentionRole, TrustTier};
    use chrono::Utc;

    fn seed_event(store: &SqliteStore, title: &str) -> i64 {
        let source = store
            .upsert_source("https://a.com/1", "https://a.com/1", "a.com", TrustTier::Standard)
            .unwrap();
        let snapshot = store
            .insert_snapshot(source.id, title, None, Some(Utc::now()), "h", None, 200)
            .unwrap();
        store
            .create_event_with_primary("fp", title, Utc::now(), snapshot.id)
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn test_entity_slug_match_records_hit() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, "OpenAI ships something");
        let entity = store
            .upsert_entity("openai", "OpenAI", EntityType::Company, &[])
            .unwrap();
        store
            .insert_mention(event_id, entity.id, MentionRole::Subject, 0.9)
            .unwrap();
        store
            .insert_watchlist_entry("OpenAI watch", Some("openai"), None)
            .unwrap();

        let handler = WatchlistMatchHandler::new(store.clone());
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["hits"], 1);
        assert_eq!(store.watchlist_hits_for_event(event_id).unwrap().len(), 1);

        // Re-running does not duplicate the hit
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["hits"], 0);
    }

    #[tokio::test]
    async fn test_title_pattern_match() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, "EU finalizes AI Act enforcement rules");
        store
            .insert_watchlist_entry("Regulation watch", None, Some(r"ai\s+act"))
            .unwrap();

        let handler = WatchlistMatchHandler::new(store.clone());
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["hits"], 1);
    }

    #[tokio::test]
    async fn test_no_entries_no_hits() {
        let store = SqliteStore::in_memory().unwrap();
        let event_id = seed_event(&store, "Anything");
        let handler = WatchlistMatchHandler::new(store.clone());
        let outcome = handler.process(event_id).await;
        let JobOutcome::Completed(result) = outcome else {
            panic!("expected completion");
        };
        assert_eq!(result["hits"], 0);
    }
}
