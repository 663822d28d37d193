//! Core data model: sources, snapshots, events, artifacts, entities,
//! relationships, briefings, and the LLM run log.
//!
//! Enum columns are stored as their canonical uppercase string form so the
//! database stays readable and the query layer can filter without a mapping
//! table.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(Error::Storage(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Authority classification of a source's domain. Drives confidence
    /// scoring and the relationship safety gate.
    TrustTier {
        Authoritative => "AUTHORITATIVE",
        Standard => "STANDARD",
        Low => "LOW",
    }
}

string_enum! {
    /// Event lifecycle status. BLOCKED is reserved for admin action; the
    /// pipeline never sets it.
    EventStatus {
        Raw => "RAW",
        Enriched => "ENRICHED",
        Published => "PUBLISHED",
        Quarantined => "QUARANTINED",
        Blocked => "BLOCKED",
    }
}

string_enum! {
    /// Confidence grade derived solely from trust tiers and source count.
    Confidence {
        High => "HIGH",
        Medium => "MEDIUM",
        Low => "LOW",
    }
}

string_enum! {
    /// Editorial impact classification.
    ImpactLevel {
        Breaking => "BREAKING",
        High => "HIGH",
        Medium => "MEDIUM",
        Low => "LOW",
    }
}

string_enum! {
    /// Role of a snapshot within an event's evidence set.
    EvidenceRole {
        Primary => "PRIMARY",
        Supporting => "SUPPORTING",
        Context => "CONTEXT",
    }
}

string_enum! {
    /// The seven LLM artifact kinds attached to events.
    ArtifactKind {
        Headline => "HEADLINE",
        Summary => "SUMMARY",
        GmTake => "GM_TAKE",
        WhyMatters => "WHY_MATTERS",
        EntityExtract => "ENTITY_EXTRACT",
        TopicAssign => "TOPIC_ASSIGN",
        RelationshipExtract => "RELATIONSHIP_EXTRACT",
    }
}

impl ArtifactKind {
    /// Artifacts an event must carry before it counts as enriched.
    pub const REQUIRED: [ArtifactKind; 4] = [
        ArtifactKind::Headline,
        ArtifactKind::Summary,
        ArtifactKind::GmTake,
        ArtifactKind::WhyMatters,
    ];
}

string_enum! {
    /// Canonical named-entity categories.
    EntityType {
        Company => "COMPANY",
        Lab => "LAB",
        Model => "MODEL",
        Product => "PRODUCT",
        Person => "PERSON",
        Regulation => "REGULATION",
        Dataset => "DATASET",
        Benchmark => "BENCHMARK",
    }
}

string_enum! {
    /// How an entity participates in an event.
    MentionRole {
        Subject => "SUBJECT",
        Object => "OBJECT",
        Mentioned => "MENTIONED",
    }
}

string_enum! {
    /// Entity-to-entity relationship kinds, spanning three risk classes.
    RelationshipType {
        Released => "RELEASED",
        Announced => "ANNOUNCED",
        Published => "PUBLISHED",
        Partnered => "PARTNERED",
        Integrated => "INTEGRATED",
        Funded => "FUNDED",
        Acquired => "ACQUIRED",
        Banned => "BANNED",
        Beats => "BEATS",
        Criticized => "CRITICIZED",
    }
}

string_enum! {
    /// Admission status of a proposed relationship.
    RelationshipStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Quarantined => "QUARANTINED",
        Rejected => "REJECTED",
    }
}

/// One row per canonical URL. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub id: i64,
    pub raw_url: String,
    pub canonical_url: String,
    pub domain: String,
    pub trust_tier: TrustTier,
    pub created_at: DateTime<Utc>,
}

/// One row per retrieval of a source. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub id: i64,
    pub source_id: i64,
    pub title: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub content_hash: String,
    pub full_text: Option<String>,
    pub http_status: u16,
    pub fetched_at: DateTime<Utc>,
}

/// The canonical real-world event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub fingerprint: String,
    pub title: String,
    pub title_hr: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub impact_level: ImpactLevel,
    pub status: EventStatus,
    pub confidence: Option<Confidence>,
    pub source_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Event ↔ snapshot link with an evidence role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEvidence {
    pub event_id: i64,
    pub snapshot_id: i64,
    pub role: EvidenceRole,
    pub created_at: DateTime<Utc>,
}

/// Versioned LLM output attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub event_id: i64,
    pub kind: ArtifactKind,
    pub payload: serde_json::Value,
    pub version: i64,
    pub model_used: String,
    pub created_at: DateTime<Utc>,
}

/// Canonical named entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub name_hr: Option<String>,
    pub entity_type: EntityType,
    pub aliases: Vec<String>,
}

/// Event ↔ entity mention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub event_id: i64,
    pub entity_id: i64,
    pub role: MentionRole,
    pub confidence: f64,
}

/// Entity → entity edge evidenced by an event. Stored as adjacency rows;
/// `model_confidence` is recorded for analysis and never consulted by the
/// safety gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub source_entity_id: i64,
    pub target_entity_id: i64,
    pub relationship_type: RelationshipType,
    pub event_id: i64,
    pub status: RelationshipStatus,
    pub model_confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Canonical topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i64,
    pub slug: String,
}

/// One briefing per calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyBriefing {
    pub id: i64,
    pub briefing_date: NaiveDate,
    pub payload: serde_json::Value,
    pub top_event_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// Immutable audit row for one LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRun {
    pub id: i64,
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
    pub created_at: DateTime<Utc>,
}

/// Append-only status transition audit row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: i64,
    pub event_id: i64,
    pub from_status: Option<EventStatus>,
    pub to_status: EventStatus,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Operator-maintained watch target: an entity slug or a title pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub id: i64,
    pub label: String,
    pub entity_slug: Option<String>,
    pub title_pattern: Option<String>,
}

/// Recorded watchlist hit for an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistHit {
    pub id: i64,
    pub watchlist_id: i64,
    pub event_id: i64,
    pub matched_on: String,
    pub created_at: DateTime<Utc>,
}

/// Trust-tier policy over domains. Unknown domains default to LOW.
pub fn trust_tier_for_domain(domain: &str) -> TrustTier {
    const AUTHORITATIVE: [&str; 12] = [
        "openai.com",
        "anthropic.com",
        "deepmind.google",
        "ai.meta.com",
        "blog.google",
        "arxiv.org",
        "microsoft.com",
        "nvidia.com",
        "huggingface.co",
        "mistral.ai",
        "stability.ai",
        "ec.europa.eu",
    ];
    const STANDARD: [&str; 12] = [
        "techcrunch.com",
        "theverge.com",
        "arstechnica.com",
        "wired.com",
        "reuters.com",
        "bloomberg.com",
        "venturebeat.com",
        "theinformation.com",
        "semianalysis.com",
        "github.com",
        "news.ycombinator.com",
        "producthunt.com",
    ];

    let domain = domain.trim_start_matches("www.");
    if AUTHORITATIVE.iter().any(|d| domain == *d || domain.ends_with(&format!(".{d}"))) {
        TrustTier::Authoritative
    } else if STANDARD.iter().any(|d| domain == *d || domain.ends_with(&format!(".{d}"))) {
        TrustTier::Standard
    } else {
        TrustTier::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_round_trip() {
        for tier in [TrustTier::Authoritative, TrustTier::Standard, TrustTier::Low] {
            assert_eq!(tier.as_str().parse::<TrustTier>().unwrap(), tier);
        }
        for status in [
            EventStatus::Raw,
            EventStatus::Enriched,
            EventStatus::Published,
            EventStatus::Quarantined,
            EventStatus::Blocked,
        ] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert_eq!("ACQUIRED".parse::<RelationshipType>().unwrap(), RelationshipType::Acquired);
        assert!("SHIPPED".parse::<RelationshipType>().is_err());
    }

    #[test]
    fn test_serde_uses_screaming_snake() {
        let json = serde_json::to_string(&ArtifactKind::GmTake).unwrap();
        assert_eq!(json, "\"GM_TAKE\"");
        let back: ArtifactKind = serde_json::from_str("\"WHY_MATTERS\"").unwrap();
        assert_eq!(back, ArtifactKind::WhyMatters);
    }

    #[test]
    fn test_trust_tier_policy() {
        assert_eq!(trust_tier_for_domain("openai.com"), TrustTier::Authoritative);
        assert_eq!(trust_tier_for_domain("www.openai.com"), TrustTier::Authoritative);
        assert_eq!(trust_tier_for_domain("blog.openai.com"), TrustTier::Authoritative);
        assert_eq!(trust_tier_for_domain("techcrunch.com"), TrustTier::Standard);
        assert_eq!(trust_tier_for_domain("example.org"), TrustTier::Low);
    }

    #[test]
    fn test_required_artifacts() {
        assert_eq!(ArtifactKind::REQUIRED.len(), 4);
        assert!(ArtifactKind::REQUIRED.contains(&ArtifactKind::GmTake));
        assert!(!ArtifactKind::REQUIRED.contains(&ArtifactKind::EntityExtract));
    }
}
