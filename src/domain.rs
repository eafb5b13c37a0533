//! Raw record shapes produced by the page parser and stored in `raw/`.
//!
//! This is the boundary where loosely-typed JSON becomes typed data. Everything
//! downstream of [`RawCountry`] works with plain fields, never `Value` lookups.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{json_kind, FieldError};

/// A media attachment on a field (charts, flags, population pyramids)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// One field of a country page, exactly as the parser found it.
///
/// `data` is the verbatim source text and may contain inline markup such as
/// `<br>` separators; nothing here strips or decodes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawField {
    pub name: String,
    pub database_id: Option<String>,
    pub data: String,
    pub subfields: Vec<String>,
    pub has_ranking: bool,
    pub media: Vec<MediaRef>,
}

impl RawField {
    pub fn new(name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database_id: None,
            data: data.into(),
            subfields: Vec::new(),
            has_ranking: false,
            media: Vec::new(),
        }
    }

    pub fn with_database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    /// Read a field from a stored raw record.
    ///
    /// Only a non-object is an error. Every other irregularity degrades to a
    /// default: missing name becomes `""`, non-string data becomes `""`,
    /// numeric database ids are stringified, unknown subfield entries are dropped.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, FieldError> {
        let obj = value.as_object().ok_or(FieldError::NotAnObject {
            index,
            found: json_kind(value),
        })?;

        let name = obj
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let data = match obj.get("data") {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => String::new(),
            Some(other) => {
                warn!(
                    field = %name,
                    index,
                    kind = json_kind(other),
                    "Non-string data replaced with empty text"
                );
                String::new()
            }
        };

        let database_id = obj.get("database_id").and_then(id_to_string);

        let subfields = obj
            .get("subfields")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(subfield_label).collect())
            .unwrap_or_default();

        let has_ranking = obj
            .get("has_ranking")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let media = obj
            .get("media")
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| serde_json::from_value::<MediaRef>(m.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name,
            database_id,
            data,
            subfields,
            has_ranking,
            media,
        })
    }
}

/// Database ids arrive as strings or integers depending on the source.
pub(crate) fn id_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn subfield_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(obj) => obj
            .get("label")
            .and_then(|l| l.as_str())
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

/// Country-level metadata carried alongside the fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountryMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub field_count: usize,
}

/// Something that went wrong with one field while processing a record.
///
/// Collected per record instead of aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub kind: IssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// The field could not be read and was skipped
    Parse,
    /// The refined field breaks a structural invariant
    Validation,
}

/// On-disk layout of `raw/<slug>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCountryFile {
    pub country_slug: String,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source_url: Option<String>,
    pub data: RawCountryData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawCountryData {
    #[serde(default)]
    pub metadata: CountryMetadata,
    #[serde(default)]
    pub fields: Vec<Value>,
}

/// A country record with typed fields, ready for refinement
#[derive(Debug, Clone, PartialEq)]
pub struct RawCountry {
    pub country_slug: String,
    pub scraped_at: Option<DateTime<Utc>>,
    pub source_url: Option<String>,
    pub metadata: CountryMetadata,
    pub fields: Vec<RawField>,
    /// Fields that were skipped while reading the record
    pub issues: Vec<FieldIssue>,
}

impl RawCountry {
    pub fn new(country_slug: impl Into<String>, fields: Vec<RawField>) -> Self {
        Self {
            country_slug: country_slug.into(),
            scraped_at: None,
            source_url: None,
            metadata: CountryMetadata::default(),
            fields,
            issues: Vec::new(),
        }
    }

    /// Type the fields of a stored record, skipping the ones that cannot be read.
    pub fn from_file(file: RawCountryFile) -> Self {
        let mut fields = Vec::with_capacity(file.data.fields.len());
        let mut issues = Vec::new();

        for (index, value) in file.data.fields.iter().enumerate() {
            match RawField::from_value(index, value) {
                Ok(field) => fields.push(field),
                Err(e) => {
                    warn!(country = %file.country_slug, error = %e, "Skipping unreadable field");
                    issues.push(FieldIssue {
                        field: format!("#{}", index),
                        kind: IssueKind::Parse,
                        message: e.to_string(),
                    });
                }
            }
        }

        Self {
            country_slug: file.country_slug,
            scraped_at: file.scraped_at,
            source_url: file.source_url,
            metadata: file.data.metadata,
            fields,
            issues,
        }
    }

    pub fn into_file(self) -> serde_json::Result<RawCountryFile> {
        let fields = self
            .fields
            .iter()
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;

        Ok(RawCountryFile {
            country_slug: self.country_slug,
            scraped_at: self.scraped_at,
            source_url: self.source_url,
            data: RawCountryData {
                metadata: self.metadata,
                fields,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_reads_all_attributes() {
        let value = json!({
            "name": "GDP (official exchange rate)",
            "database_id": 208,
            "data": "$82B (2023)<br>$80B (2022)",
            "subfields": ["2023", {"label": "2022"}, 7],
            "has_ranking": true,
            "media": [{"type": "image", "url": "/img/x.png"}, {"type": "image"}]
        });

        let field = RawField::from_value(0, &value).unwrap();
        assert_eq!(field.name, "GDP (official exchange rate)");
        assert_eq!(field.database_id.as_deref(), Some("208"));
        assert_eq!(field.data, "$82B (2023)<br>$80B (2022)");
        assert_eq!(field.subfields, vec!["2023", "2022"]);
        assert!(field.has_ranking);
        assert_eq!(field.media.len(), 1);
    }

    #[test]
    fn test_from_value_degrades_malformed_attributes() {
        let value = json!({"data": 42, "has_ranking": "yes", "subfields": "none"});

        let field = RawField::from_value(3, &value).unwrap();
        assert_eq!(field.name, "");
        assert_eq!(field.data, "");
        assert_eq!(field.database_id, None);
        assert!(field.subfields.is_empty());
        assert!(!field.has_ranking);
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        let err = RawField::from_value(5, &json!("oops")).unwrap_err();
        assert_eq!(err, FieldError::NotAnObject { index: 5, found: "string" });
    }

    #[test]
    fn test_from_file_skips_bad_fields_and_keeps_siblings() {
        let file: RawCountryFile = serde_json::from_value(json!({
            "country_slug": "france",
            "data": {
                "metadata": {"name": "France"},
                "fields": [
                    {"name": "Capital", "data": "Paris"},
                    [1, 2, 3],
                    {"name": "Area", "data": "643,801 sq km"}
                ]
            }
        }))
        .unwrap();

        let country = RawCountry::from_file(file);
        assert_eq!(country.fields.len(), 2);
        assert_eq!(country.fields[1].name, "Area");
        assert_eq!(country.issues.len(), 1);
        assert_eq!(country.issues[0].kind, IssueKind::Parse);
        assert_eq!(country.issues[0].field, "#1");
    }
}
