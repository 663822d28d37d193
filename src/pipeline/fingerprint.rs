//! Event fingerprints: deterministic identity over source, day, and title.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::feeds::SourceType;

/// Collapse whitespace, lowercase, and strip non-alphanumerics so cosmetic
/// title differences do not change identity.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// `SHA256(sourceType:YYYY-MM-DD:normalizedTitle)` truncated to 32 hex chars.
pub fn fingerprint(source_type: SourceType, date: NaiveDate, title: &str) -> String {
    let input = format!("{}:{}:{}", source_type, date.format("%Y-%m-%d"), normalize_title(title));
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(SourceType::HackerNews, day(), "OpenAI releases GPT-5");
        let b = fingerprint(SourceType::HackerNews, day(), "OpenAI releases GPT-5");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_whitespace_and_case_do_not_change_identity() {
        let a = fingerprint(SourceType::Arxiv, day(), "OpenAI releases GPT-5");
        let b = fingerprint(SourceType::Arxiv, day(), "  openai   RELEASES gpt-5 ");
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_and_date_change_identity() {
        let base = fingerprint(SourceType::Arxiv, day(), "Title");
        assert_ne!(base, fingerprint(SourceType::Reddit, day(), "Title"));
        let other_day = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert_ne!(base, fingerprint(SourceType::Arxiv, other_day, "Title"));
    }

    proptest! {
        #[test]
        fn prop_normalization_is_idempotent(title in ".{0,80}") {
            let once = normalize_title(&title);
            prop_assert_eq!(normalize_title(&once), once);
        }
    }
}
