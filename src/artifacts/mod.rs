//! Artifact payloads: a tagged sum over the seven LLM artifact kinds with a
//! single validation boundary over untrusted model output.

pub mod payloads;
pub mod validate;

pub use payloads::{
    ArtifactPayload, AssignedTopic, EntityExtractPayload, ExtractedEntity, GmTakePayload,
    HeadlinePayload, ProposedRelationship, RelationshipExtractPayload, SummaryPayload,
    TopicAssignPayload, WhyMattersPayload,
};
pub use validate::extract_json;
