//! Multi-value detection and splitting on inline break markers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// `<br>`, `<br/>`, `<br />` in any case, with any whitespace before the slash
static BREAK_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("break marker pattern is valid"));

/// Same marker, with the pieces captured so variants can be told apart
static BREAK_MARKER_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(br)(\s*)(/?)>").expect("break marker pattern is valid"));

/// True when the text holds at least one break marker.
pub fn is_multi_valued(raw: &str) -> bool {
    !raw.is_empty() && BREAK_MARKER.is_match(raw)
}

/// Split on every break marker, trimming fragments and dropping the empty ones.
///
/// Consecutive and leading/trailing markers collapse instead of producing
/// empty entries. Source order is kept.
pub fn split_values(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }

    BREAK_MARKER
        .split(raw)
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Number of values normalization yields for the text: the surviving
/// fragments when multi-valued, otherwise one, or none for empty text.
pub fn fragment_count(raw: &str) -> usize {
    if is_multi_valued(raw) {
        split_values(raw).len()
    } else {
        usize::from(!raw.is_empty())
    }
}

/// Tally of break-marker spellings seen across raw data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorStats {
    /// `<br>`
    pub plain: usize,
    /// `<br/>`
    pub self_closing: usize,
    /// `<br />`, any whitespace before the slash
    pub spaced: usize,
    /// markers whose tag letters are not all lowercase (also counted above)
    pub uppercase: usize,
    pub total: usize,
}

impl SeparatorStats {
    pub fn tally(&mut self, raw: &str) {
        for caps in BREAK_MARKER_PARTS.captures_iter(raw) {
            let tag = &caps[1];
            let has_space = !caps[2].is_empty();
            let has_slash = !caps[3].is_empty();

            match (has_space, has_slash) {
                (_, false) => self.plain += 1,
                (false, true) => self.self_closing += 1,
                (true, true) => self.spaced += 1,
            }
            if tag != "br" {
                self.uppercase += 1;
            }
            self.total += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_basic() {
        assert_eq!(
            split_values("Value 1<br>Value 2<br>Value 3"),
            vec!["Value 1", "Value 2", "Value 3"]
        );
    }

    #[test]
    fn test_split_drops_empty_fragments() {
        assert_eq!(split_values("Value 1<br><br>Value 2"), vec!["Value 1", "Value 2"]);
        assert_eq!(split_values("<br>Value 1<br> <br>"), vec!["Value 1"]);
    }

    #[test]
    fn test_split_marker_variants() {
        assert_eq!(split_values("A<br>B<br/>C<br />D"), vec!["A", "B", "C", "D"]);
        assert_eq!(split_values("A<BR>B<Br\t/>C<bR   >D"), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_split_without_markers() {
        assert_eq!(split_values("  Single value "), vec!["Single value"]);
        assert!(split_values("").is_empty());
        assert!(split_values("   ").is_empty());
        assert!(!is_multi_valued("Single value"));
        assert!(!is_multi_valued(""));
    }

    #[test]
    fn test_unrelated_tags_are_not_markers() {
        assert!(!is_multi_valued("<b>bold</b> and <brand>"));
        assert_eq!(split_values("<strong>total:</strong> 5"), vec!["<strong>total:</strong> 5"]);
    }

    #[test]
    fn test_fragment_count_matches_marker_count() {
        let samples = [
            "a<br>b<br>c",
            "a<br><br>b",
            "<br>a",
            "a<br/>",
            "x",
            "<br><br>",
        ];
        for sample in samples {
            let pieces = BREAK_MARKER.split(sample).collect::<Vec<_>>();
            let empty = pieces.iter().filter(|p| p.trim().is_empty()).count();
            assert_eq!(
                split_values(sample).len(),
                BREAK_MARKER.find_iter(sample).count() + 1 - empty,
                "sample {:?}",
                sample
            );
        }
    }

    #[test]
    fn test_separator_stats() {
        let mut stats = SeparatorStats::default();
        stats.tally("a<br>b<br/>c<br />d<BR>e");
        stats.tally("no markers");

        assert_eq!(stats.plain, 2);
        assert_eq!(stats.self_closing, 1);
        assert_eq!(stats.spaced, 1);
        assert_eq!(stats.uppercase, 1);
        assert_eq!(stats.total, 4);
    }

    #[test]
    fn test_fragment_count() {
        assert_eq!(fragment_count("a<br>b<br><br>c"), 3);
        assert_eq!(fragment_count("A<br>"), 1);
        assert_eq!(fragment_count("single"), 1);
        assert_eq!(fragment_count(""), 0);
    }
}
