//! Normalized feed item types shared by every adapter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The eleven external sources. The serde form matches [`SourceType::as_str`]
/// so queue payloads and fingerprints agree on one slug per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    #[serde(rename = "hackernews")]
    HackerNews,
    Github,
    Arxiv,
    Reddit,
    Devto,
    Lobsters,
    #[serde(rename = "huggingface")]
    HuggingFace,
    Leaderboard,
    Youtube,
    #[serde(rename = "producthunt")]
    ProductHunt,
    #[serde(rename = "newsapi")]
    NewsApi,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HackerNews => "hackernews",
            Self::Github => "github",
            Self::Arxiv => "arxiv",
            Self::Reddit => "reddit",
            Self::Devto => "devto",
            Self::Lobsters => "lobsters",
            Self::HuggingFace => "huggingface",
            Self::Leaderboard => "leaderboard",
            Self::Youtube => "youtube",
            Self::ProductHunt => "producthunt",
            Self::NewsApi => "newsapi",
        }
    }

    pub const ALL: [SourceType; 11] = [
        Self::HackerNews,
        Self::Github,
        Self::Arxiv,
        Self::Reddit,
        Self::Devto,
        Self::Lobsters,
        Self::HuggingFace,
        Self::Leaderboard,
        Self::Youtube,
        Self::ProductHunt,
        Self::NewsApi,
    ];
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::Internal(format!("unknown source type: {s}")))
    }
}

/// One normalized item from an external feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawItem {
    pub source_type: SourceType,
    pub external_id: String,
    pub url: String,
    pub title: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub score: Option<i64>,
    pub tags: Vec<String>,
}

/// Result of one adapter fetch. Adapters tolerate partial failure by
/// returning whatever they collected plus warnings; they never error across
/// the boundary.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub items: Vec<RawItem>,
    pub warnings: Vec<String>,
}

impl FetchOutcome {
    pub fn items(items: Vec<RawItem>) -> Self {
        Self {
            items,
            warnings: Vec::new(),
        }
    }

    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            warnings: vec![warning.into()],
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_round_trip() {
        for t in SourceType::ALL {
            assert_eq!(t.as_str().parse::<SourceType>().unwrap(), t);
        }
        assert!("myspace".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_serde_form_matches_slug() {
        for t in SourceType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            let back: SourceType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, t);
        }
    }
}
