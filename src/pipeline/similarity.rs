//! Dice–Sørensen bigram similarity for the cluster prefilter.

use std::collections::HashMap;

/// Lowercase, strip non-alphanumerics, split on whitespace, and emit
/// 2-character intra-word bigrams as a multiset.
fn bigrams(text: &str) -> HashMap<[char; 2], usize> {
    let mut counts = HashMap::new();
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    for word in cleaned.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for pair in chars.windows(2) {
            *counts.entry([pair[0], pair[1]]).or_insert(0) += 1;
        }
    }
    counts
}

/// Dice–Sørensen similarity over title bigrams, in `[0, 1]`.
///
/// Titles too short to produce bigrams compare by normalized equality.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let bigrams_a = bigrams(a);
    let bigrams_b = bigrams(b);

    let total: usize = bigrams_a.values().sum::<usize>() + bigrams_b.values().sum::<usize>();
    if total == 0 {
        let normalize = |s: &str| {
            s.to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
        };
        let (na, nb) = (normalize(a), normalize(b));
        return if !na.is_empty() && na == nb { 1.0 } else { 0.0 };
    }

    let overlap: usize = bigrams_a
        .iter()
        .map(|(bigram, count)| count.min(bigrams_b.get(bigram).unwrap_or(&0)))
        .sum();

    (2.0 * overlap as f64) / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_titles_score_one() {
        assert_eq!(title_similarity("OpenAI releases GPT-5", "OpenAI releases GPT-5"), 1.0);
        // Case and punctuation are normalized away
        assert_eq!(title_similarity("OpenAI Releases GPT-5!", "openai releases gpt 5"), 1.0);
    }

    #[test]
    fn test_related_titles_clear_the_floor() {
        let sim = title_similarity(
            "OpenAI releases GPT-5",
            "OpenAI launches GPT-5 model",
        );
        assert!(sim >= 0.15, "similarity {sim} below prefilter floor");
    }

    #[test]
    fn test_unrelated_titles_score_low() {
        let sim = title_similarity(
            "OpenAI releases GPT-5",
            "Sourdough starters for beginners",
        );
        assert!(sim < 0.15, "similarity {sim} unexpectedly high");
    }

    #[test]
    fn test_short_words_compare_by_equality() {
        assert_eq!(title_similarity("a", "a"), 1.0);
        assert_eq!(title_similarity("a", "b"), 0.0);
        assert_eq!(title_similarity("", ""), 0.0);
    }

    proptest! {
        #[test]
        fn prop_self_similarity_is_one(title in "[a-zA-Z0-9 ]{2,60}") {
            // Needs at least one bigram or one alphanumeric char
            prop_assume!(title.chars().any(|c| c.is_alphanumeric()));
            let sim = title_similarity(&title, &title);
            prop_assert!((sim - 1.0).abs() < 1e-12);
        }

        #[test]
        fn prop_symmetric(a in "[a-zA-Z0-9 ]{0,40}", b in "[a-zA-Z0-9 ]{0,40}") {
            prop_assert_eq!(title_similarity(&a, &b), title_similarity(&b, &a));
        }

        #[test]
        fn prop_bounded(a in ".{0,40}", b in ".{0,40}") {
            let sim = title_similarity(&a, &b);
            prop_assert!((0.0..=1.0).contains(&sim));
        }
    }
}
