//! Field-presence catalog across a corpus of records.
//!
//! A [`FieldRegistry`] is created empty, folds in one record at a time, and is
//! finalized once into a [`FieldCatalog`]. Source records are only read.

pub mod multi_value;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::pipeline::processing::normalize::NormalizedField;
use crate::pipeline::processing::{percentage, round1};

pub use multi_value::{MultiValueReport, MultiValueSummary};

/// Category label used in rollups for fields with no category
pub const UNKNOWN_CATEGORY: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageClass {
    /// Present in every record
    Universal,
    /// Present in at least half the records
    Common,
    Rare,
}

impl CoverageClass {
    /// Classify from exact counts so rounding never promotes 99.96% to universal.
    pub fn from_counts(present: usize, total: usize) -> Self {
        if total > 0 && present >= total {
            CoverageClass::Universal
        } else if present * 2 >= total && total > 0 {
            CoverageClass::Common
        } else {
            CoverageClass::Rare
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coverage {
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCatalogEntry {
    pub database_id: Option<String>,
    pub category: Option<String>,
    pub coverage: Coverage,
    /// Number of records containing the field
    pub present_in: usize,
    pub coverage_class: CoverageClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRollup {
    pub field_count: usize,
    pub avg_coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageDistribution {
    pub universal_fields: usize,
    pub common_fields: usize,
    pub rare_fields: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSummary {
    pub by_category: BTreeMap<String, CategoryRollup>,
    pub coverage_distribution: CoverageDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub analyzed_at: DateTime<Utc>,
    pub total_records_analyzed: usize,
    pub total_unique_fields: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCatalog {
    pub metadata: CatalogMetadata,
    pub summary: CatalogSummary,
    pub fields: BTreeMap<String, FieldCatalogEntry>,
}

#[derive(Debug, Clone)]
struct RegistryEntry {
    database_id: Option<String>,
    category: Option<String>,
    present_in: usize,
}

/// Accumulates field presence, first-seen metadata wins
#[derive(Debug, Default)]
pub struct FieldRegistry {
    entries: BTreeMap<String, RegistryEntry>,
    records_seen: usize,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one record's fields in. A name repeated within a record counts once;
    /// fields without a name are skipped.
    pub fn observe_record(&mut self, fields: &[NormalizedField]) {
        self.records_seen += 1;

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for field in fields {
            if field.name.is_empty() || !seen.insert(field.name.as_str()) {
                continue;
            }

            self.entries
                .entry(field.name.clone())
                .or_insert_with(|| RegistryEntry {
                    database_id: field.database_id.clone(),
                    category: field.category.clone(),
                    present_in: 0,
                })
                .present_in += 1;
        }
    }

    pub fn records_seen(&self) -> usize {
        self.records_seen
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compute coverage against `total_records` and build the catalog.
    ///
    /// A total smaller than the number of records folded in is raised to that
    /// number, so coverage stays within 0..=100. A total of zero gives 0%.
    pub fn finalize(self, total_records: usize) -> FieldCatalog {
        let total_records = if total_records > 0 && total_records < self.records_seen {
            warn!(
                given = total_records,
                observed = self.records_seen,
                "Record total below observed records; using observed count"
            );
            self.records_seen
        } else {
            total_records
        };

        let mut fields = BTreeMap::new();
        let mut distribution = CoverageDistribution::default();
        let mut category_totals: BTreeMap<String, (usize, f64)> = BTreeMap::new();

        for (name, entry) in self.entries {
            let pct = percentage(entry.present_in, total_records);
            let class = CoverageClass::from_counts(entry.present_in, total_records);
            match class {
                CoverageClass::Universal => distribution.universal_fields += 1,
                CoverageClass::Common => distribution.common_fields += 1,
                CoverageClass::Rare => distribution.rare_fields += 1,
            }

            let bucket = category_totals
                .entry(
                    entry
                        .category
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_CATEGORY.to_string()),
                )
                .or_insert((0, 0.0));
            bucket.0 += 1;
            bucket.1 += pct;

            debug!(field = %name, present_in = entry.present_in, coverage = pct, "Catalogued field");
            fields.insert(
                name,
                FieldCatalogEntry {
                    database_id: entry.database_id,
                    category: entry.category,
                    coverage: Coverage { percentage: pct },
                    present_in: entry.present_in,
                    coverage_class: class,
                },
            );
        }

        let by_category = category_totals
            .into_iter()
            .map(|(category, (count, total))| {
                (
                    category,
                    CategoryRollup {
                        field_count: count,
                        avg_coverage: round1(total / count as f64),
                    },
                )
            })
            .collect();

        info!(
            records = total_records,
            fields = fields.len(),
            universal = distribution.universal_fields,
            common = distribution.common_fields,
            rare = distribution.rare_fields,
            "Field catalog built"
        );

        FieldCatalog {
            metadata: CatalogMetadata {
                analyzed_at: Utc::now(),
                total_records_analyzed: total_records,
                total_unique_fields: fields.len(),
            },
            summary: CatalogSummary {
                by_category,
                coverage_distribution: distribution,
            },
            fields,
        }
    }
}

/// Fold every record's field set and finalize against `total_record_count`.
pub fn build_catalog<'a, I>(records: I, total_record_count: usize) -> FieldCatalog
where
    I: IntoIterator<Item = &'a [NormalizedField]>,
{
    let mut registry = FieldRegistry::new();
    for fields in records {
        registry.observe_record(fields);
    }
    debug!(
        records = registry.records_seen(),
        fields = registry.len(),
        "Folded records into field registry"
    );
    registry.finalize(total_record_count)
}
