//! Mapping helpers from retrieved passages to response fields.

use crate::vector::RetrievedPassage;
use std::collections::HashSet;

/// Collapse passage titles into a duplicate-free list, keeping first-seen order.
///
/// Passages without a title contribute no source.
pub(crate) fn dedupe_titles(passages: &[RetrievedPassage]) -> Vec<String> {
    let mut seen = HashSet::new();
    passages
        .iter()
        .filter(|passage| !passage.title.trim().is_empty())
        .filter(|passage| seen.insert(passage.title.as_str()))
        .map(|passage| passage.title.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> RetrievedPassage {
        RetrievedPassage {
            id: title.to_string(),
            relevance_score: 0.5,
            title: title.to_string(),
            text: String::new(),
            source_id: 0,
            chunk_index: 0,
        }
    }

    #[test]
    fn keeps_first_seen_order_without_duplicates() {
        let passages = [
            titled("НК РФ"),
            titled("ПБУ 17/02"),
            titled("НК РФ"),
            titled("Письмо Минфина"),
            titled("ПБУ 17/02"),
        ];
        assert_eq!(
            dedupe_titles(&passages),
            vec!["НК РФ", "ПБУ 17/02", "Письмо Минфина"]
        );
    }

    #[test]
    fn untitled_passages_are_skipped() {
        let passages = [titled(""), titled("НК РФ"), titled("   "), titled("")];
        assert_eq!(dedupe_titles(&passages), vec!["НК РФ"]);
        assert!(dedupe_titles(&[titled("")]).is_empty());
    }

    #[test]
    fn empty_input_yields_no_sources() {
        assert!(dedupe_titles(&[]).is_empty());
    }
}
