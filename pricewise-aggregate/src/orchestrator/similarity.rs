//! Title canonicalisation and fuzzy similarity for deduplication.
//!
//! Titles are reduced to a match key (case-folded, punctuation replaced by
//! spaces, whitespace collapsed, marketing filler words removed) and
//! compared with a character-level sequence-match ratio:
//!
//! ```text
//! ratio = 2 * M / T
//! ```
//!
//! where `M` is the number of matching characters in an optimal diff and
//! `T` the combined length of both keys. The default merge threshold of
//! 0.85 is calibrated against this scale.

use similar::TextDiff;

/// Filler words that carry no identity for a product.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "for", "with", "in", "on", "at", "new", "latest", "original",
    "genuine", "authentic", "official", "pack", "set", "combo", "bundle", "piece", "pcs", "unit",
];

/// Reduce a title to its comparison key.
///
/// # Examples
///
/// ```
/// use pricewise_aggregate::orchestrator::similarity::match_key;
///
/// assert_eq!(match_key("  NEW Wireless-Mouse (Black) "), "wireless mouse black");
/// ```
pub fn match_key(title: &str) -> String {
    let folded: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    folded
        .split_whitespace()
        .filter(|token| !STOPWORDS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Similarity of two match keys in `[0, 1]`.
///
/// Symmetric and deterministic. An empty key never matches anything,
/// including another empty key.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(a, b).ratio())
}

/// Similarity of two raw titles, canonicalising both first.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    similarity(&match_key(a), &match_key(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_key_folds_case_and_whitespace() {
        assert_eq!(match_key("Wireless   Mouse "), "wireless mouse");
        assert_eq!(match_key("WIRELESS MOUSE"), "wireless mouse");
    }

    #[test]
    fn match_key_strips_punctuation_and_stopwords() {
        assert_eq!(
            match_key("Apple iPhone 15 (128GB) - Official, Genuine"),
            "apple iphone 15 128gb"
        );
        assert_eq!(match_key("Combo Pack of 2"), "of 2");
    }

    #[test]
    fn match_key_keeps_non_ascii_letters() {
        assert_eq!(match_key("Café Crème"), "café crème");
    }

    #[test]
    fn identical_keys_score_one() {
        assert!((similarity("wireless mouse", "wireless mouse") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_keys_score_zero() {
        assert!(similarity("", "wireless mouse").abs() < f64::EPSILON);
        assert!(similarity("", "").abs() < f64::EPSILON);
    }

    #[test]
    fn disjoint_keys_score_low() {
        assert!(similarity("wireless mouse", "garden hose") < 0.5);
    }

    #[test]
    fn near_duplicates_score_high() {
        let score = title_similarity(
            "Logitech M331 Silent Plus Wireless Mouse",
            "Logitech M331 Silent Plus Wireless Mouse, Black",
        );
        assert!(score >= 0.85, "score was {score}");
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "samsung galaxy s23 ultra 256gb";
        let b = "samsung galaxy s23 256gb green";
        assert!((similarity(a, b) - similarity(b, a)).abs() < 1e-6);
    }

    #[test]
    fn ratio_matches_two_m_over_t() {
        // "abcd" vs "abce": 3 matching chars out of 8 total.
        assert!((similarity("abcd", "abce") - 0.75).abs() < 1e-6);
    }
}
