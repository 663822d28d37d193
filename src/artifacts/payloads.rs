//! Typed payloads for the seven artifact kinds.

use serde::{Deserialize, Serialize};

use crate::store::{ArtifactKind, EntityType, ImpactLevel, MentionRole, RelationshipType};

/// HEADLINE: editorial headline, optional Croatian rendering, and the
/// model's impact assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlinePayload {
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline_hr: Option<String>,
    pub impact_level: ImpactLevel,
}

/// SUMMARY: what happened, with optional background context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub what_happened: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// GM_TAKE: the analyst's read on the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmTakePayload {
    pub take: String,
}

/// WHY_MATTERS: short list of reasons the event matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhyMattersPayload {
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub entity_type: EntityType,
    pub role: MentionRole,
    pub confidence: f64,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// ENTITY_EXTRACT: entities mentioned by the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityExtractPayload {
    pub entities: Vec<ExtractedEntity>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignedTopic {
    pub slug: String,
    pub confidence: f64,
}

/// TOPIC_ASSIGN: canonical topic slugs with assignment confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicAssignPayload {
    pub topics: Vec<AssignedTopic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedRelationship {
    pub source: String,
    pub target: String,
    pub relationship_type: RelationshipType,
    pub confidence: f64,
}

/// RELATIONSHIP_EXTRACT: proposed entity-to-entity edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipExtractPayload {
    pub relationships: Vec<ProposedRelationship>,
}

/// Tagged sum over the seven artifact kinds. The database stores the kind in
/// its own column; this enum carries the typed payload through the pipeline.
#[derive(Debug, Clone)]
pub enum ArtifactPayload {
    Headline(HeadlinePayload),
    Summary(SummaryPayload),
    GmTake(GmTakePayload),
    WhyMatters(WhyMattersPayload),
    EntityExtract(EntityExtractPayload),
    TopicAssign(TopicAssignPayload),
    RelationshipExtract(RelationshipExtractPayload),
}

impl ArtifactPayload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Headline(_) => ArtifactKind::Headline,
            Self::Summary(_) => ArtifactKind::Summary,
            Self::GmTake(_) => ArtifactKind::GmTake,
            Self::WhyMatters(_) => ArtifactKind::WhyMatters,
            Self::EntityExtract(_) => ArtifactKind::EntityExtract,
            Self::TopicAssign(_) => ArtifactKind::TopicAssign,
            Self::RelationshipExtract(_) => ArtifactKind::RelationshipExtract,
        }
    }

    /// Serialize the inner payload for persistence.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Headline(p) => serde_json::to_value(p),
            Self::Summary(p) => serde_json::to_value(p),
            Self::GmTake(p) => serde_json::to_value(p),
            Self::WhyMatters(p) => serde_json::to_value(p),
            Self::EntityExtract(p) => serde_json::to_value(p),
            Self::TopicAssign(p) => serde_json::to_value(p),
            Self::RelationshipExtract(p) => serde_json::to_value(p),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}
