use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::id_to_string;
use crate::error::Result;
use crate::pipeline::processing::normalize::NormalizedField;
use crate::pipeline::processing::percentage;
use crate::pipeline::storage::write_json_atomic;

/// Read-only `database_id -> category name` table, loaded once per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMapping(BTreeMap<String, String>);

/// Header stored alongside the mapping on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingMetadata {
    pub fetched_at: DateTime<Utc>,
    pub source_url: String,
    pub total_categories: usize,
    pub total_fields: usize,
}

/// On-disk shape: `{metadata, mapping}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMappingFile {
    pub metadata: MappingMetadata,
    pub mapping: CategoryMapping,
}

impl CategoryMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract the mapping from the site's category JSON
    /// (`data.allLaunchpadCategory.nodes[]{name, fieldLabels[]{databaseId}}`).
    ///
    /// Returns the mapping and the number of named categories seen.
    pub fn from_category_json(payload: &Value) -> (Self, usize) {
        let nodes = payload
            .pointer("/data/allLaunchpadCategory/nodes")
            .and_then(Value::as_array);

        let Some(nodes) = nodes else {
            warn!("Category payload has no data.allLaunchpadCategory.nodes array");
            return (Self::default(), 0);
        };

        let mut mapping = BTreeMap::new();
        let mut categories = 0;
        for node in nodes {
            let Some(name) = node.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())
            else {
                debug!("Skipping unnamed category node");
                continue;
            };
            categories += 1;

            let labels = node
                .get("fieldLabels")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for label in labels {
                if let Some(id) = label.get("databaseId").and_then(id_to_string) {
                    mapping.insert(id, name.to_string());
                }
            }
        }

        (Self(mapping), categories)
    }

    pub fn insert(&mut self, database_id: impl Into<String>, category: impl Into<String>) {
        self.0.insert(database_id.into(), category.into());
    }

    pub fn get(&self, database_id: &str) -> Option<&str> {
        self.0.get(database_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distinct category names
    pub fn category_count(&self) -> usize {
        let mut names: Vec<&String> = self.0.values().collect();
        names.sort();
        names.dedup();
        names.len()
    }

    /// Load a saved mapping file. A missing file is an empty mapping.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Category mapping not found; fields will have no category");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let file: CategoryMappingFile = serde_json::from_str(&contents)?;
        info!(
            path = %path.display(),
            fields = file.mapping.len(),
            categories = file.metadata.total_categories,
            "Loaded category mapping"
        );
        Ok(file.mapping)
    }

    pub fn save(&self, path: &Path, source_url: &str, total_categories: usize) -> Result<()> {
        let file = CategoryMappingFile {
            metadata: MappingMetadata {
                fetched_at: Utc::now(),
                source_url: source_url.to_string(),
                total_categories,
                total_fields: self.len(),
            },
            mapping: self.clone(),
        };
        write_json_atomic(path, &file)?;
        info!(path = %path.display(), fields = self.len(), "Saved category mapping");
        Ok(())
    }
}

/// Something that can attach context to a normalized field
pub trait Enricher {
    fn enrich(&self, field: &NormalizedField) -> NormalizedField;
}

impl Enricher for CategoryMapping {
    fn enrich(&self, field: &NormalizedField) -> NormalizedField {
        enrich(field, self)
    }
}

/// Set `category` from the mapping; unmapped or id-less fields get `None`.
pub fn enrich(field: &NormalizedField, mapping: &CategoryMapping) -> NormalizedField {
    let category = field
        .database_id
        .as_deref()
        .and_then(|id| mapping.get(id))
        .map(str::to_string);

    NormalizedField {
        category,
        ..field.clone()
    }
}

pub fn enrich_fields(fields: &[NormalizedField], mapping: &CategoryMapping) -> Vec<NormalizedField> {
    fields.iter().map(|f| enrich(f, mapping)).collect()
}

/// Category coverage folded from enriched fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub total_fields: usize,
    pub fields_with_categories: usize,
    pub category_coverage_percentage: f64,
}

impl EnrichmentStats {
    pub fn from_fields<'a>(fields: impl IntoIterator<Item = &'a NormalizedField>) -> Self {
        let mut stats = Self::default();
        for field in fields {
            stats.total_fields += 1;
            if field.category.is_some() {
                stats.fields_with_categories += 1;
            }
        }
        stats.category_coverage_percentage =
            percentage(stats.fields_with_categories, stats.total_fields);
        stats
    }
}
