use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::mapping::PlaceholderMap;
use crate::placeholder::{locate, PLACEHOLDER_TOKEN};
use crate::substitute::{overlaps_claimed, splice};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeanonymizationStats {
    /// Mapping keys whose placeholder never occurs in the anonymized text.
    pub unused_mappings: Vec<String>,
    /// Placeholder-shaped tokens in the text that the mapping does not know.
    pub not_found_mappings: Vec<String>,
}

impl DeanonymizationStats {
    pub fn is_clean(&self) -> bool {
        self.unused_mappings.is_empty() && self.not_found_mappings.is_empty()
    }
}

/// Restore original text from placeholder tokens.
///
/// The mapping's own placeholders are replaced longest-first wherever they
/// occur, including directly against letters or CJK text. `PERSON_1` inside
/// `PERSON_1.v_2` or `PERSON_12` is never touched. Unknown tokens stay in
/// place and are reported; this never fails.
pub fn reverse(text: &str, mapping: &PlaceholderMap) -> (String, DeanonymizationStats) {
    let claimed = locate(text, mapping.placeholders());
    let spans: BTreeMap<usize, (usize, &str)> = claimed
        .iter()
        .map(|(start, (end, placeholder))| {
            (*start, (*end, mapping.get(placeholder).unwrap_or(*placeholder)))
        })
        .collect();
    let restored = splice(text, &spans);

    let seen: BTreeSet<&str> = claimed.values().map(|(_, placeholder)| *placeholder).collect();
    let not_found: BTreeSet<String> = PLACEHOLDER_TOKEN
        .find_iter(text)
        .filter(|token| !overlaps_claimed(&claimed, token.start(), token.end()))
        .filter(|token| !mapping.contains(token.as_str()))
        .map(|token| token.as_str().to_string())
        .collect();
    let unused: BTreeSet<String> = mapping
        .placeholders()
        .filter(|placeholder| !seen.contains(placeholder))
        .map(str::to_string)
        .collect();
    if !not_found.is_empty() || !unused.is_empty() {
        tracing::warn!(
            not_found = not_found.len(),
            unused = unused.len(),
            "deanonymization left unresolved placeholders"
        );
    }
    let stats = DeanonymizationStats {
        unused_mappings: unused.into_iter().collect(),
        not_found_mappings: not_found.into_iter().collect(),
    };
    (restored, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(pairs: &[(&str, &str)]) -> PlaceholderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn reports_unused_and_unknown_placeholders() {
        let map = mapping(&[
            ("PERSON_1", "John Doe"),
            ("LOCATION_1", "New York"),
            ("EMAIL_1", "john.doe@example.com"),
            ("PERSON_37", "Unused Person"),
        ]);
        let (text, stats) = reverse(
            "Hello PERSON_1, welcome to LOCATION_1. Your email is EMAIL_1. \
             We don't know about PERSON_4.",
            &map,
        );
        assert_eq!(
            text,
            "Hello John Doe, welcome to New York. Your email is john.doe@example.com. \
             We don't know about PERSON_4."
        );
        assert_eq!(stats.not_found_mappings, ["PERSON_4"]);
        assert_eq!(stats.unused_mappings, ["PERSON_37"]);
        assert!(!stats.is_clean());
    }

    #[test]
    fn variant_tokens_are_not_swallowed_by_their_base() {
        let map = mapping(&[
            ("PERSON_1", "John Doe"),
            ("PERSON_1.v_1", "Mr. John Doe"),
            ("PERSON_1.v_2", "John's"),
        ]);
        let (text, stats) = reverse("PERSON_1.v_1 met PERSON_1 about PERSON_1.v_2 report.", &map);
        assert_eq!(text, "Mr. John Doe met John Doe about John's report.");
        assert!(stats.is_clean());
    }

    #[test]
    fn longer_index_is_not_a_prefix_match() {
        let map = mapping(&[("PERSON_1", "John Doe")]);
        let (text, stats) = reverse("PERSON_12 and PERSON_1", &map);
        assert_eq!(text, "PERSON_12 and John Doe");
        assert_eq!(stats.not_found_mappings, ["PERSON_12"]);
    }

    #[test]
    fn restores_placeholders_next_to_word_characters() {
        let map = mapping(&[
            ("PERSON_1", "张三"),
            ("LOCATION_1", "北京"),
            ("PERSON_2", "Anna"),
        ]);
        let (text, stats) = reverse("PERSON_1在LOCATION_1工作. PERSON_2 met PERSON_2bel.", &map);
        assert_eq!(text, "张三在北京工作. Anna met Annabel.");
        assert!(stats.is_clean());
    }

    #[test]
    fn glued_known_token_is_not_reported_as_unknown() {
        let map = mapping(&[("PERSON_1", "Smith")]);
        let (text, stats) = reverse("ACME-ID:XPERSON_1", &map);
        assert_eq!(text, "ACME-ID:XSmith");
        assert!(stats.is_clean());
    }

    #[test]
    fn stats_are_sorted_and_deduplicated() {
        let map = mapping(&[("ZIP_1", "12345"), ("CITY_2", "Paris"), ("CITY_1", "Rome")]);
        let (_, stats) = reverse("PHONE_2 PHONE_1 PHONE_2", &map);
        assert_eq!(stats.not_found_mappings, ["PHONE_1", "PHONE_2"]);
        assert_eq!(stats.unused_mappings, ["CITY_1", "CITY_2", "ZIP_1"]);
    }
}
