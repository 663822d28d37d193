//! The single validation boundary for untrusted LLM JSON.
//!
//! Every artifact payload enters the system through [`ArtifactPayload::from_llm_json`];
//! nothing downstream re-checks field shapes.

use crate::error::{Error, Result};
use crate::store::ArtifactKind;

use super::payloads::*;

/// Maximum characters for headline text.
const MAX_HEADLINE: usize = 200;
/// Maximum characters for prose fields (summary, take, context).
const MAX_PROSE: usize = 2000;
/// Maximum characters for a why-matters bullet.
const MAX_POINT: usize = 500;
/// Maximum characters for entity names, aliases, and topic slugs.
const MAX_NAME: usize = 120;
/// Maximum rows in any extracted list.
const MAX_LIST: usize = 25;

/// Pull the first JSON object or array out of a model response, tolerating
/// markdown code fences and surrounding prose.
pub fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let inner = if let Some(stripped) = trimmed.strip_prefix("```") {
        let stripped = stripped.strip_prefix("json").unwrap_or(stripped);
        stripped.split("```").next().unwrap_or(stripped)
    } else {
        trimmed
    };

    let start = inner.find(['{', '['])?;
    let open = inner.as_bytes()[start];
    let close = if open == b'{' { '}' } else { ']' };
    let end = inner.rfind(close)?;
    if end < start {
        return None;
    }
    Some(inner[start..=end].trim())
}

fn check_len(field: &str, value: &str, max: usize, errors: &mut Vec<String>) {
    if value.trim().is_empty() {
        errors.push(format!("{field} is empty"));
    } else if value.chars().count() > max {
        errors.push(format!("{field} exceeds {max} characters"));
    }
}

fn check_confidence(field: &str, value: f64, errors: &mut Vec<String>) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{field} confidence {value} outside [0, 1]"));
    }
}

fn check_list_len(field: &str, len: usize, errors: &mut Vec<String>) {
    if len > MAX_LIST {
        errors.push(format!("{field} has {len} rows, max {MAX_LIST}"));
    }
}

impl ArtifactPayload {
    /// Parse and validate a raw LLM response as the given artifact kind.
    pub fn from_llm_json(kind: ArtifactKind, raw: &str) -> Result<Self> {
        let json = extract_json(raw)
            .ok_or_else(|| Error::LlmOutput(format!("{kind}: no JSON found in response")))?;

        let payload = match kind {
            ArtifactKind::Headline => Self::Headline(parse(kind, json)?),
            ArtifactKind::Summary => Self::Summary(parse(kind, json)?),
            ArtifactKind::GmTake => Self::GmTake(parse(kind, json)?),
            ArtifactKind::WhyMatters => Self::WhyMatters(parse(kind, json)?),
            ArtifactKind::EntityExtract => Self::EntityExtract(parse(kind, json)?),
            ArtifactKind::TopicAssign => Self::TopicAssign(parse(kind, json)?),
            ArtifactKind::RelationshipExtract => Self::RelationshipExtract(parse(kind, json)?),
        };

        let errors = payload.validation_errors();
        if errors.is_empty() {
            Ok(payload)
        } else {
            Err(Error::LlmOutput(format!("{kind}: {}", errors.join("; "))))
        }
    }

    fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::Headline(p) => {
                check_len("headline", &p.headline, MAX_HEADLINE, &mut errors);
                if let Some(hr) = &p.headline_hr {
                    check_len("headline_hr", hr, MAX_HEADLINE, &mut errors);
                }
            }
            Self::Summary(p) => {
                check_len("what_happened", &p.what_happened, MAX_PROSE, &mut errors);
                if let Some(context) = &p.context {
                    check_len("context", context, MAX_PROSE, &mut errors);
                }
            }
            Self::GmTake(p) => {
                check_len("take", &p.take, MAX_PROSE, &mut errors);
            }
            Self::WhyMatters(p) => {
                if p.points.is_empty() {
                    errors.push("points is empty".into());
                }
                check_list_len("points", p.points.len(), &mut errors);
                for (i, point) in p.points.iter().enumerate() {
                    check_len(&format!("points[{i}]"), point, MAX_POINT, &mut errors);
                }
            }
            Self::EntityExtract(p) => {
                check_list_len("entities", p.entities.len(), &mut errors);
                for (i, entity) in p.entities.iter().enumerate() {
                    check_len(&format!("entities[{i}].name"), &entity.name, MAX_NAME, &mut errors);
                    check_confidence(&format!("entities[{i}]"), entity.confidence, &mut errors);
                    for alias in &entity.aliases {
                        check_len(&format!("entities[{i}].alias"), alias, MAX_NAME, &mut errors);
                    }
                }
            }
            Self::TopicAssign(p) => {
                check_list_len("topics", p.topics.len(), &mut errors);
                for (i, topic) in p.topics.iter().enumerate() {
                    check_len(&format!("topics[{i}].slug"), &topic.slug, MAX_NAME, &mut errors);
                    check_confidence(&format!("topics[{i}]"), topic.confidence, &mut errors);
                }
            }
            Self::RelationshipExtract(p) => {
                check_list_len("relationships", p.relationships.len(), &mut errors);
                for (i, rel) in p.relationships.iter().enumerate() {
                    check_len(&format!("relationships[{i}].source"), &rel.source, MAX_NAME, &mut errors);
                    check_len(&format!("relationships[{i}].target"), &rel.target, MAX_NAME, &mut errors);
                    check_confidence(&format!("relationships[{i}]"), rel.confidence, &mut errors);
                }
            }
        }
        errors
    }
}

fn parse<T: serde::de::DeserializeOwned>(kind: ArtifactKind, json: &str) -> Result<T> {
    serde_json::from_str(json).map_err(|e| Error::LlmOutput(format!("{kind}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ImpactLevel;

    #[test]
    fn test_extract_json_from_fenced_response() {
        let raw = "Here you go:\n```json\n{\"headline\": \"x\"}\n```\nHope that helps!";
        assert_eq!(extract_json(raw), Some("{\"headline\": \"x\"}"));
    }

    #[test]
    fn test_extract_json_bare_and_missing() {
        assert_eq!(extract_json("  {\"a\": 1}  "), Some("{\"a\": 1}"));
        assert_eq!(extract_json("[1, 2]"), Some("[1, 2]"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_headline_round_trip() {
        let raw = r#"{"headline": "OpenAI ships GPT-5", "impact_level": "BREAKING"}"#;
        let payload = ArtifactPayload::from_llm_json(ArtifactKind::Headline, raw).unwrap();
        let ArtifactPayload::Headline(headline) = payload else {
            panic!("wrong variant");
        };
        assert_eq!(headline.impact_level, ImpactLevel::Breaking);
        assert_eq!(headline.headline_hr, None);
    }

    #[test]
    fn test_headline_length_bound() {
        let long = "x".repeat(500);
        let raw = format!(r#"{{"headline": "{long}", "impact_level": "LOW"}}"#);
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::Headline, &raw).is_err());
    }

    #[test]
    fn test_invalid_enum_rejected() {
        let raw = r#"{"headline": "x", "impact_level": "CATACLYSMIC"}"#;
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::Headline, raw).is_err());
    }

    #[test]
    fn test_entity_confidence_range() {
        let raw = r#"{"entities": [{"name": "OpenAI", "entity_type": "COMPANY",
            "role": "SUBJECT", "confidence": 1.5}]}"#;
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::EntityExtract, raw).is_err());

        let raw = r#"{"entities": [{"name": "OpenAI", "entity_type": "COMPANY",
            "role": "SUBJECT", "confidence": 0.9}]}"#;
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::EntityExtract, raw).is_ok());
    }

    #[test]
    fn test_why_matters_requires_points() {
        let raw = r#"{"points": []}"#;
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::WhyMatters, raw).is_err());
        let raw = r#"{"points": ["Shifts the frontier", "Raises compute stakes"]}"#;
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::WhyMatters, raw).is_ok());
    }

    #[test]
    fn test_non_json_response_fails() {
        assert!(ArtifactPayload::from_llm_json(ArtifactKind::Summary, "I couldn't do that").is_err());
    }

    #[test]
    fn test_relationship_parse() {
        let raw = r#"{"relationships": [{"source": "openai", "target": "gpt-5",
            "relationship_type": "RELEASED", "confidence": 0.95}]}"#;
        let payload = ArtifactPayload::from_llm_json(ArtifactKind::RelationshipExtract, raw).unwrap();
        assert_eq!(payload.kind(), ArtifactKind::RelationshipExtract);
    }
}
