//! Year extraction from value text such as `"0.6% of GDP (2024 est.)"`.
//!
//! Narrative values often quote several historical dates, or one date in
//! passing inside a long sentence. Two gates suppress extraction for those:
//! more than `max_years_in_value` year mentions, or exactly one mention in a
//! value longer than `max_value_length` characters.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::pipeline::processing::normalize::{
    FieldValues, KeySubValues, KeyValuePair, NormalizedField, NormalizedValue, SubValue,
};

/// `(2024 est.)` or `(2024)`; at any position the `est.` form wins
static YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([0-9]{4})(?: est\.)?\)").expect("year pattern is valid"));

pub const DEFAULT_MAX_VALUE_LENGTH: usize = 120;
pub const DEFAULT_MAX_YEARS_IN_VALUE: usize = 1;

/// Thresholds for the narrative-text gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearHeuristics {
    /// Longest value (in characters) that may carry a single extracted year
    pub max_value_length: usize,
    /// Most year mentions a value may contain before it counts as narrative
    pub max_years_in_value: usize,
}

impl Default for YearHeuristics {
    fn default() -> Self {
        Self {
            max_value_length: DEFAULT_MAX_VALUE_LENGTH,
            max_years_in_value: DEFAULT_MAX_YEARS_IN_VALUE,
        }
    }
}

impl YearHeuristics {
    /// Whether both gates let this value through.
    pub fn should_extract(&self, value: &str) -> bool {
        if value.is_empty() {
            return false;
        }

        let mentions = count_year_mentions(value);
        if mentions > self.max_years_in_value {
            return false;
        }
        if mentions == 1 && value.chars().count() > self.max_value_length {
            return false;
        }
        true
    }

    /// Gated extraction: the first year mention, unless a gate trips.
    pub fn extract(&self, value: &str) -> Option<String> {
        if !self.should_extract(value) {
            return None;
        }
        extract_year(value)
    }

    /// Copy of `values` with `year` set from the current gates: a year stored by
    /// an earlier, more lenient pass is dropped when the value no longer passes.
    pub fn apply_to_values(&self, values: &[NormalizedValue]) -> Vec<NormalizedValue> {
        values
            .iter()
            .map(|v| NormalizedValue {
                year: self.extract(&v.value),
                ..v.clone()
            })
            .collect()
    }

    /// Same as [`Self::apply_to_values`], reading each pair's `value`.
    pub fn apply_to_pairs(&self, pairs: &[KeyValuePair]) -> Vec<KeyValuePair> {
        pairs
            .iter()
            .map(|p| KeyValuePair {
                year: self.extract(&p.value),
                ..p.clone()
            })
            .collect()
    }

    /// Extract per sub-value; the key itself is never inspected.
    pub fn apply_to_group(&self, group: &KeySubValues) -> KeySubValues {
        KeySubValues {
            key: group.key.clone(),
            sub_values: group
                .sub_values
                .iter()
                .map(|s| SubValue {
                    value: s.value.clone(),
                    year: self.extract(&s.value),
                })
                .collect(),
        }
    }

    /// Year enrichment for a whole field, whatever its structure.
    pub fn apply_to_field(&self, field: &NormalizedField) -> NormalizedField {
        let values = match &field.values {
            FieldValues::Simple(values) => FieldValues::Simple(self.apply_to_values(values)),
            FieldValues::KeyValuePairs(pairs) => {
                FieldValues::KeyValuePairs(self.apply_to_pairs(pairs))
            }
            FieldValues::KeySubValues(groups) => FieldValues::KeySubValues(
                groups.iter().map(|g| self.apply_to_group(g)).collect(),
            ),
        };

        NormalizedField {
            values,
            ..field.clone()
        }
    }
}

/// A value that is nothing but a year, e.g. an already-extracted `"2024"`
fn bare_year(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (trimmed.len() == 4 && trimmed.bytes().all(|b| b.is_ascii_digit())).then_some(trimmed)
}

/// Number of `(YYYY)` / `(YYYY est.)` mentions in the value.
pub fn count_year_mentions(value: &str) -> usize {
    if bare_year(value).is_some() {
        return 1;
    }
    YEAR_PATTERN.find_iter(value).count()
}

/// Ungated extraction: the leftmost year mention, if any.
pub fn extract_year(value: &str) -> Option<String> {
    if let Some(year) = bare_year(value) {
        return Some(year.to_string());
    }
    YEAR_PATTERN
        .captures(value)
        .map(|caps| caps[1].to_string())
}

/// Gated extraction with the default thresholds.
pub fn extract_year_smart(value: &str) -> Option<String> {
    YearHeuristics::default().extract(value)
}
