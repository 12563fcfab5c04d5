//! Citation bound enforcement for synthesized answers.
//!
//! Markers are recognized case-insensitively in singular and plural form, with a list of
//! indices and ranges: `[Источник 2]`, `[источники 1, 3]`, `[Источник 2–4: НК РФ]`.

use regex::{Captures, Regex};
use std::sync::OnceLock;

fn citation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\s?)\[(источники?)\s+([^\]:]+)(:[^\]]*)?\]")
            .expect("citation pattern is valid")
    })
}

/// Inclusive index range parsed from one list entry; a single index is `(n, n)`.
type Span = (usize, usize);

/// Parse `1, 3; 5–7` into spans. Returns `None` unless every entry is numeric.
fn parse_spans(list: &str) -> Option<Vec<Span>> {
    list.split([',', ';'])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once(['-', '–', '—']) {
            Some((low, high)) => Some((
                low.trim().parse::<usize>().ok()?,
                high.trim().parse::<usize>().ok()?,
            )),
            None => entry.parse::<usize>().ok().map(|index| (index, index)),
        })
        .collect::<Option<Vec<_>>>()
        .filter(|spans| !spans.is_empty())
}

/// Indices of every citation marker in `answer`, in order of appearance, ranges expanded.
pub fn cited_indices(answer: &str) -> Vec<usize> {
    citation_pattern()
        .captures_iter(answer)
        .filter_map(|captures| parse_spans(&captures[3]))
        .flatten()
        .flat_map(|(low, high)| low..=high)
        .collect()
}

/// Remove indices outside `1..=passage_count` from every marker.
///
/// A marker left with no valid index is dropped together with the space before it. Markers
/// whose indices are all valid are returned untouched.
pub fn enforce_citation_bound(answer: &str, passage_count: usize) -> String {
    let mut removed = 0usize;
    let cleaned = citation_pattern().replace_all(answer, |captures: &Captures<'_>| {
        let Some(spans) = parse_spans(&captures[3]) else {
            return captures[0].to_string();
        };
        let in_range = |&(low, high): &Span| low >= 1 && low <= high && high <= passage_count;
        if spans.iter().all(in_range) {
            return captures[0].to_string();
        }

        let mut kept: Vec<usize> = Vec::new();
        for (low, high) in spans {
            for index in low.max(1)..=high.min(passage_count) {
                if !kept.contains(&index) {
                    kept.push(index);
                }
            }
        }
        removed += 1;
        if kept.is_empty() {
            return String::new();
        }

        let list = kept
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let title = captures.get(4).map_or("", |title| title.as_str());
        format!("{}[{} {list}{title}]", &captures[1], &captures[2])
    });

    if removed > 0 {
        tracing::warn!(removed, passage_count, "Corrected out-of-range citation markers");
    }
    cleaned.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_markers_within_range() {
        let answer = "Вычет применяется с коэффициентом 1,5 [Источник 1]. Нужен отчёт [Источник 3].";
        assert_eq!(enforce_citation_bound(answer, 3), answer);
    }

    #[test]
    fn drops_fabricated_and_zero_markers() {
        let answer = "Льгота есть [Источник 1]. Срок три года [Источник 7]. Ноль [Источник 0].";
        let cleaned = enforce_citation_bound(answer, 2);
        assert_eq!(cleaned, "Льгота есть [Источник 1]. Срок три года. Ноль.");
        assert!(cited_indices(&cleaned).iter().all(|index| (1..=2).contains(index)));
    }

    #[test]
    fn grouped_plural_and_range_markers_are_bounded() {
        let answer = "Льгота есть [Источник 1, 7]. Также [Источники 2, 9]. И [Источник 3–8].";
        let cleaned = enforce_citation_bound(answer, 2);
        assert_eq!(cleaned, "Льгота есть [Источник 1]. Также [Источники 2]. И.");
        assert!(cited_indices(&cleaned).iter().all(|index| (1..=2).contains(index)));
    }

    #[test]
    fn ranges_are_clipped_to_available_passages() {
        assert_eq!(
            enforce_citation_bound("См. [Источники 2-5].", 3),
            "См. [Источники 2, 3]."
        );
        assert_eq!(
            enforce_citation_bound("См. [Источники 1–3].", 3),
            "См. [Источники 1–3]."
        );
    }

    #[test]
    fn lowercase_markers_are_checked() {
        let answer = "Вычет [источник 9] и отчёт [источник 1].";
        assert_eq!(enforce_citation_bound(answer, 1), "Вычет и отчёт [источник 1].");
        assert_eq!(cited_indices(answer), vec![9, 1]);
    }

    #[test]
    fn handles_titled_markers() {
        let answer = "См. [Источник 2: НК РФ, ст. 262] и [Источник 4: Письмо Минфина].";
        assert_eq!(cited_indices(answer), vec![2, 4]);
        assert_eq!(
            enforce_citation_bound(answer, 2),
            "См. [Источник 2: НК РФ, ст. 262] и."
        );
    }

    #[test]
    fn titled_group_keeps_its_title() {
        assert_eq!(
            enforce_citation_bound("Да [Источник 1, 4: НК РФ].", 2),
            "Да [Источник 1: НК РФ]."
        );
    }

    #[test]
    fn non_numeric_and_practice_markers_are_untouched() {
        let answer = "Так делают многие [Практика]. См. [Источник НК РФ].";
        assert_eq!(enforce_citation_bound(answer, 0), answer);
        assert!(cited_indices(answer).is_empty());
    }
}
