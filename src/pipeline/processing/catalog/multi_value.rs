//! Value-count statistics per field, measured on the raw text.
//!
//! Counts are split fragments before any keying, so a field later grouped
//! into `key_sub_values` still reports every fragment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::RawField;
use crate::pipeline::processing::split::{fragment_count, is_multi_valued, SeparatorStats};
use crate::pipeline::processing::{percentage, round1};

const TOP_FIELDS: usize = 20;

/// How one field name splits across the corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMultiValueStats {
    pub countries_analyzed: usize,
    pub multi_valued_count: usize,
    pub single_valued_count: usize,
    pub multi_valued_percentage: f64,
    pub avg_value_count: f64,
    pub min_value_count: usize,
    pub max_value_count: usize,
    /// Most frequent value count; the smaller count wins a tie
    pub typical_value_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopMultiValuedField {
    pub field_name: String,
    pub multi_valued_percentage: f64,
    pub avg_values: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiValueSummary {
    pub total_fields_analyzed: usize,
    pub multi_valued_occurrences: usize,
    pub single_valued_occurrences: usize,
    pub multi_value_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiValueReport {
    pub analyzed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_date: Option<String>,
    pub total_countries: usize,
    pub summary: MultiValueSummary,
    pub by_field: BTreeMap<String, FieldMultiValueStats>,
    pub top_multi_valued_fields: Vec<TopMultiValuedField>,
    /// Break-marker spellings in the raw data
    #[serde(default)]
    pub separators: SeparatorStats,
}

#[derive(Default)]
struct Tally {
    multi: usize,
    single: usize,
    counts: Vec<usize>,
}

impl MultiValueReport {
    pub fn analyze<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a [RawField]>,
    {
        let mut tallies: BTreeMap<String, Tally> = BTreeMap::new();
        let mut summary = MultiValueSummary::default();
        let mut separators = SeparatorStats::default();
        let mut total_countries = 0;

        for fields in records {
            total_countries += 1;
            for field in fields {
                separators.tally(&field.data);
                let tally = tallies.entry(field.name.clone()).or_default();
                tally.counts.push(fragment_count(&field.data));
                if is_multi_valued(&field.data) {
                    tally.multi += 1;
                    summary.multi_valued_occurrences += 1;
                } else {
                    tally.single += 1;
                }
                summary.total_fields_analyzed += 1;
            }
        }
        summary.single_valued_occurrences =
            summary.total_fields_analyzed - summary.multi_valued_occurrences;
        summary.multi_value_percentage =
            percentage(summary.multi_valued_occurrences, summary.total_fields_analyzed);

        let by_field: BTreeMap<String, FieldMultiValueStats> = tallies
            .into_iter()
            .map(|(name, tally)| (name, field_stats(tally)))
            .collect();

        let mut top: Vec<TopMultiValuedField> = by_field
            .iter()
            .filter(|(_, stats)| stats.multi_valued_count > 0)
            .map(|(name, stats)| TopMultiValuedField {
                field_name: name.clone(),
                multi_valued_percentage: stats.multi_valued_percentage,
                avg_values: stats.avg_value_count,
            })
            .collect();
        // by_field iterates in name order, and the sort is stable
        top.sort_by(|a, b| b.multi_valued_percentage.total_cmp(&a.multi_valued_percentage));
        top.truncate(TOP_FIELDS);

        Self {
            analyzed_at: Utc::now(),
            snapshot_date: None,
            total_countries,
            summary,
            by_field,
            top_multi_valued_fields: top,
            separators,
        }
    }

    pub fn with_snapshot_date(mut self, date: impl Into<String>) -> Self {
        self.snapshot_date = Some(date.into());
        self
    }
}

fn field_stats(tally: Tally) -> FieldMultiValueStats {
    let analyzed = tally.multi + tally.single;
    let sum: usize = tally.counts.iter().sum();
    let avg = if tally.counts.is_empty() {
        0.0
    } else {
        round1(sum as f64 / tally.counts.len() as f64)
    };

    let mut frequency: BTreeMap<usize, usize> = BTreeMap::new();
    for &count in &tally.counts {
        *frequency.entry(count).or_default() += 1;
    }
    // ascending keys: the first maximum is the smallest count
    let typical = frequency
        .iter()
        .fold(None, |best: Option<(usize, usize)>, (&count, &freq)| match best {
            Some((_, best_freq)) if best_freq >= freq => best,
            _ => Some((count, freq)),
        })
        .map(|(count, _)| count)
        .unwrap_or(0);

    FieldMultiValueStats {
        countries_analyzed: analyzed,
        multi_valued_count: tally.multi,
        single_valued_count: tally.single,
        multi_valued_percentage: percentage(tally.multi, analyzed),
        avg_value_count: avg,
        min_value_count: tally.counts.iter().copied().min().unwrap_or(0),
        max_value_count: tally.counts.iter().copied().max().unwrap_or(0),
        typical_value_count: typical,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::normalize::{normalize_field, FieldValues};
    use crate::pipeline::processing::structure::classify_field;

    fn record(fields: &[(&str, &str)]) -> Vec<RawField> {
        fields
            .iter()
            .map(|(name, data)| RawField::new(*name, *data))
            .collect()
    }

    fn analyze(records: &[Vec<RawField>]) -> MultiValueReport {
        MultiValueReport::analyze(records.iter().map(Vec::as_slice))
    }

    #[test]
    fn test_per_field_statistics() {
        let records = vec![
            record(&[("Languages", "a<br>b"), ("Capital", "Paris")]),
            record(&[("Languages", "a<br>b<br>c"), ("Capital", "Rome")]),
            record(&[("Languages", "a"), ("Capital", "")]),
        ];
        let report = analyze(&records);

        let languages = &report.by_field["Languages"];
        assert_eq!(languages.countries_analyzed, 3);
        assert_eq!(languages.multi_valued_count, 2);
        assert_eq!(languages.multi_valued_percentage, 66.7);
        assert_eq!(languages.avg_value_count, 2.0);
        assert_eq!((languages.min_value_count, languages.max_value_count), (1, 3));
        // counts 2, 3, 1 all tie: smallest wins
        assert_eq!(languages.typical_value_count, 1);

        let capital = &report.by_field["Capital"];
        assert_eq!(capital.single_valued_count, 3);
        assert_eq!(capital.typical_value_count, 1);

        assert_eq!(report.total_countries, 3);
        assert_eq!(report.summary.total_fields_analyzed, 6);
        assert_eq!(report.summary.multi_valued_occurrences, 2);
        assert_eq!(report.summary.multi_value_percentage, 33.3);
    }

    #[test]
    fn test_top_fields_sorted_with_name_ties() {
        let records = vec![record(&[("B", "x<br>y"), ("A", "x<br>y"), ("C", "x")])];
        let top = analyze(&records).top_multi_valued_fields;
        let names: Vec<&str> = top.iter().map(|t| t.field_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_top_list_is_capped() {
        let fields: Vec<(String, &str)> = (0..25).map(|i| (format!("F{:02}", i), "a<br>b")).collect();
        let borrowed: Vec<(&str, &str)> = fields.iter().map(|(n, d)| (n.as_str(), *d)).collect();
        let report = analyze(&[record(&borrowed)]);
        assert_eq!(report.top_multi_valued_fields.len(), TOP_FIELDS);
        assert_eq!(report.by_field.len(), 25);
    }

    #[test]
    fn test_grouped_field_counts_every_fragment() {
        let data = "<strong>0-14 years:</strong> 17.3%<br>male 5,975,000<br>female 5,700,000<br>\
                    <strong>15-64 years:</strong> 61.2%<br>male 20,000,000<br>female 20,100,000<br>\
                    <strong>65 years and over:</strong> 21.5%<br>male 6,300,000";
        let records = vec![record(&[("Age structure", data)])];

        let refined = classify_field(&normalize_field(&records[0][0]));
        assert!(matches!(&refined.values, FieldValues::KeySubValues(groups) if groups.len() == 3));

        let report = analyze(&records);
        let stats = &report.by_field["Age structure"];
        assert_eq!(stats.max_value_count, 8);
        assert_eq!(stats.typical_value_count, 8);
        assert_eq!(report.separators.plain, 7);
    }

    #[test]
    fn test_empty_corpus() {
        let report = analyze(&[]);
        assert_eq!(report.summary, MultiValueSummary::default());
        assert!(report.top_multi_valued_fields.is_empty());
    }
}
