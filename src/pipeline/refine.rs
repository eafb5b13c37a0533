//! Raw record → refined record, and the batch driver over a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};

use crate::config::RefineConfig;
use crate::domain::{CountryMetadata, FieldIssue, IssueKind, RawCountry, RawField};
use crate::error::{Result, ScraperError};
use crate::observability::metrics;
use crate::pipeline::processing::enrich::{enrich, CategoryMapping, EnrichmentStats};
use crate::pipeline::processing::normalize::validate::validate_field;
use crate::pipeline::processing::normalize::{normalize_field, NormalizedField};
use crate::pipeline::processing::structure::classify_field;
use crate::pipeline::processing::years::YearHeuristics;

/// Per-record counts written next to the refined fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineStatistics {
    pub total_fields: usize,
    pub multi_valued_fields: usize,
    pub single_valued_fields: usize,
    pub fields_with_categories: usize,
    pub values_with_years: usize,
}

impl RefineStatistics {
    pub fn from_fields(fields: &[NormalizedField]) -> Self {
        let mut stats = Self::default();
        for field in fields {
            stats.total_fields += 1;
            if field.is_multi_valued {
                stats.multi_valued_fields += 1;
            } else {
                stats.single_valued_fields += 1;
            }
            if field.category.is_some() {
                stats.fields_with_categories += 1;
            }
            stats.values_with_years += field.values.year_count();
        }
        stats
    }

    pub fn add(&mut self, other: &RefineStatistics) {
        self.total_fields += other.total_fields;
        self.multi_valued_fields += other.multi_valued_fields;
        self.single_valued_fields += other.single_valued_fields;
        self.fields_with_categories += other.fields_with_categories;
        self.values_with_years += other.values_with_years;
    }
}

/// Stored as `refined/<slug>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinedCountry {
    pub country_slug: String,
    pub refined_at: DateTime<Utc>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub metadata: CountryMetadata,
    pub fields: Vec<NormalizedField>,
    #[serde(default)]
    pub statistics: RefineStatistics,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<FieldIssue>,
}

impl RefinedCountry {
    /// Display name, falling back to the slug
    pub fn display_name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or(&self.country_slug)
    }

    pub fn has_validation_issues(&self) -> bool {
        self.issues.iter().any(|i| i.kind == IssueKind::Validation)
    }
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    /// Records that could not be refined or written
    pub failed: Vec<String>,
    /// Records written with structural violations
    pub invalid: Vec<String>,
    pub totals: RefineStatistics,
}

impl BatchReport {
    pub fn category_coverage_percentage(&self) -> f64 {
        crate::pipeline::processing::percentage(
            self.totals.fields_with_categories,
            self.totals.total_fields,
        )
    }
}

/// The refinement stages with their run-wide inputs
#[derive(Debug, Clone)]
pub struct Refiner {
    mapping: CategoryMapping,
    heuristics: YearHeuristics,
    classify: bool,
}

impl Refiner {
    pub fn new(mapping: CategoryMapping) -> Self {
        Self {
            mapping,
            heuristics: YearHeuristics::default(),
            classify: true,
        }
    }

    /// Build from the `[refine]` section. An empty mapping is fatal only when
    /// categories are required.
    pub fn from_config(config: &RefineConfig, mapping: CategoryMapping) -> Result<Self> {
        if mapping.is_empty() {
            if config.require_categories {
                return Err(ScraperError::EmptyCategoryMapping);
            }
            warn!("Category mapping is empty; refined fields will have no category");
        } else {
            info!(
                fields = mapping.len(),
                categories = mapping.category_count(),
                "Category mapping ready"
            );
        }

        Ok(Self {
            mapping,
            heuristics: config.heuristics(),
            classify: config.classify_structures,
        })
    }

    /// Normalize, classify, enrich and date one field.
    pub fn refine_field(&self, raw: &RawField) -> NormalizedField {
        let normalized = normalize_field(raw);
        let shaped = if self.classify {
            classify_field(&normalized)
        } else {
            normalized
        };
        let enriched = enrich(&shaped, &self.mapping);
        self.heuristics.apply_to_field(&enriched)
    }

    /// Refine every field of a record. Validation problems are attached to the
    /// record as issues; only a record with nothing refinable fails.
    pub fn refine_country(&self, raw: &RawCountry) -> Result<RefinedCountry> {
        let span = info_span!("refine_country", slug = %raw.country_slug);
        let _enter = span.enter();

        if raw.country_slug.trim().is_empty() {
            return Err(ScraperError::Record {
                slug: raw.country_slug.clone(),
                message: "record has no country slug".to_string(),
            });
        }
        if raw.fields.is_empty() && !raw.issues.is_empty() {
            return Err(ScraperError::Record {
                slug: raw.country_slug.clone(),
                message: format!("all {} fields were unreadable", raw.issues.len()),
            });
        }

        let fields: Vec<NormalizedField> = raw.fields.iter().map(|f| self.refine_field(f)).collect();

        let mut issues = raw.issues.clone();
        for field in &fields {
            if let Err(e) = validate_field(field) {
                warn!(field = %field.name, error = %e, "Refined field failed validation");
                issues.push(FieldIssue {
                    field: field.name.clone(),
                    kind: IssueKind::Validation,
                    message: e.to_string(),
                });
            }
        }

        let statistics = RefineStatistics::from_fields(&fields);
        let enrichment = EnrichmentStats::from_fields(&fields);
        metrics::enrich::fields_enriched(enrichment.total_fields, enrichment.fields_with_categories);
        metrics::years::years_extracted(statistics.values_with_years);
        metrics::refine::fields_refined(statistics.total_fields);
        metrics::refine::issues_found(issues.len());

        debug!(
            fields = statistics.total_fields,
            multi_valued = statistics.multi_valued_fields,
            categorized = statistics.fields_with_categories,
            years = statistics.values_with_years,
            issues = issues.len(),
            "Refined record"
        );

        Ok(RefinedCountry {
            country_slug: raw.country_slug.clone(),
            refined_at: Utc::now(),
            source_url: raw.source_url.clone(),
            metadata: CountryMetadata {
                field_count: fields.len(),
                ..raw.metadata.clone()
            },
            fields,
            statistics,
            issues,
        })
    }

    /// Refine records one at a time, handing each result to `sink`.
    ///
    /// A record that fails to refine, or that `sink` rejects, is listed in
    /// `failed` and the run moves on.
    pub fn run_batch<F>(&self, records: &[RawCountry], mut sink: F) -> BatchReport
    where
        F: FnMut(&RefinedCountry) -> Result<()>,
    {
        let mut report = BatchReport {
            total: records.len(),
            ..Default::default()
        };

        for raw in records {
            let refined = match self.refine_country(raw) {
                Ok(refined) => refined,
                Err(e) => {
                    error!(slug = %raw.country_slug, error = %e, "Failed to refine record");
                    metrics::refine::record_failed();
                    report.failed.push(raw.country_slug.clone());
                    continue;
                }
            };

            if let Err(e) = sink(&refined) {
                error!(slug = %raw.country_slug, error = %e, "Failed to store refined record");
                metrics::refine::record_failed();
                report.failed.push(raw.country_slug.clone());
                continue;
            }

            if refined.has_validation_issues() {
                metrics::refine::record_invalid();
                report.invalid.push(refined.country_slug.clone());
            }
            metrics::refine::record_refined();
            report.successful += 1;
            report.totals.add(&refined.statistics);
        }

        info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed.len(),
            invalid = report.invalid.len(),
            category_coverage = report.category_coverage_percentage(),
            "Refinement batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::processing::normalize::{FieldValues, StructureType};

    fn mapping() -> CategoryMapping {
        let mut mapping = CategoryMapping::new();
        mapping.insert("208", "Economy");
        mapping.insert("344", "People and Society");
        mapping
    }

    fn france() -> RawCountry {
        let mut country = RawCountry::new(
            "france",
            vec![
                RawField::new("Military expenditures", "1.9% of GDP (2024 est.)<br>2% of GDP (2023 est.)")
                    .with_database_id("208"),
                RawField::new(
                    "Life expectancy at birth",
                    "<strong>male:</strong> 80 years (2024 est.)<br><strong>female:</strong> 86 years",
                )
                .with_database_id("344"),
                RawField::new("Capital", "Paris"),
                RawField::new("Holiday", "Fête de la Fédération<br>"),
            ],
        );
        country.metadata.name = Some("France".to_string());
        country
    }

    #[test]
    fn test_refine_country() {
        let refined = Refiner::new(mapping()).refine_country(&france()).unwrap();

        assert_eq!(refined.display_name(), "France");
        assert_eq!(refined.metadata.field_count, 4);

        let military = &refined.fields[0];
        assert_eq!(military.category.as_deref(), Some("Economy"));
        assert_eq!(military.values.year_count(), 2);

        let life = &refined.fields[1];
        assert_eq!(life.structure_type(), StructureType::KeyValuePairs);
        match &life.values {
            FieldValues::KeyValuePairs(pairs) => {
                assert_eq!(pairs[0].year.as_deref(), Some("2024"));
                assert_eq!(pairs[1].year, None);
            }
            other => panic!("unexpected {:?}", other.structure_type()),
        }

        assert_eq!(
            refined.statistics,
            RefineStatistics {
                total_fields: 4,
                multi_valued_fields: 3,
                single_valued_fields: 1,
                fields_with_categories: 2,
                values_with_years: 3,
            }
        );

        // trailing marker leaves one value: reported, not dropped
        assert_eq!(refined.issues.len(), 1);
        assert_eq!(refined.issues[0].field, "Holiday");
        assert!(refined.has_validation_issues());
    }

    #[test]
    fn test_classification_can_be_disabled() {
        let config = RefineConfig {
            classify_structures: false,
            ..RefineConfig::default()
        };
        let refined = Refiner::from_config(&config, mapping())
            .unwrap()
            .refine_country(&france())
            .unwrap();
        assert!(refined
            .fields
            .iter()
            .all(|f| f.structure_type() == StructureType::Simple));
    }

    #[test]
    fn test_empty_mapping_required() {
        let config = RefineConfig {
            require_categories: true,
            ..RefineConfig::default()
        };
        assert!(matches!(
            Refiner::from_config(&config, CategoryMapping::new()),
            Err(ScraperError::EmptyCategoryMapping)
        ));
        assert!(Refiner::from_config(&RefineConfig::default(), CategoryMapping::new()).is_ok());
    }

    #[test]
    fn test_batch_isolates_failures() {
        let mut unreadable = RawCountry::new("atlantis", Vec::new());
        unreadable.issues.push(FieldIssue {
            field: "#0".to_string(),
            kind: IssueKind::Parse,
            message: "field #0 is not a JSON object (found string)".to_string(),
        });
        let records = vec![france(), unreadable, RawCountry::new("spain", vec![RawField::new("Capital", "Madrid")])];

        let mut stored = Vec::new();
        let report = Refiner::new(mapping()).run_batch(&records, |refined| {
            if refined.country_slug == "spain" {
                return Err(ScraperError::Snapshot("disk full".to_string()));
            }
            stored.push(refined.country_slug.clone());
            Ok(())
        });

        assert_eq!(report.total, 3);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, vec!["atlantis", "spain"]);
        assert_eq!(report.invalid, vec!["france"]);
        assert_eq!(stored, vec!["france"]);
        assert_eq!(report.totals.total_fields, 4);
        assert_eq!(report.category_coverage_percentage(), 50.0);
    }

    #[test]
    fn test_refined_record_json_round_trip() {
        let refined = Refiner::new(mapping()).refine_country(&france()).unwrap();
        let json = serde_json::to_string(&refined).unwrap();
        let back: RefinedCountry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, refined);
    }
}
