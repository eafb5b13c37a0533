use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::RawField;
use crate::pipeline::processing::split::{is_multi_valued, split_values};

pub mod validate;

/// Shape of the entries in a normalized field's `values` array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    Simple,
    KeyValuePairs,
    KeySubValues,
}

impl StructureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructureType::Simple => "simple",
            StructureType::KeyValuePairs => "key_value_pairs",
            StructureType::KeySubValues => "key_sub_values",
        }
    }
}

/// One atomic value of a `simple` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub value: String,
    /// 0-based position after splitting
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValuePair {
    pub key: String,
    pub value: String,
    pub order: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

/// A sub-value under a key. Stored records may hold bare strings here, which
/// are read as `{value}` records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SubValueRepr")]
pub struct SubValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SubValueRepr {
    Bare(String),
    Record {
        value: String,
        #[serde(default)]
        year: Option<String>,
    },
}

impl From<SubValueRepr> for SubValue {
    fn from(repr: SubValueRepr) -> Self {
        match repr {
            SubValueRepr::Bare(value) => SubValue { value, year: None },
            SubValueRepr::Record { value, year } => SubValue { value, year },
        }
    }
}

impl From<&str> for SubValue {
    fn from(value: &str) -> Self {
        SubValue {
            value: value.to_string(),
            year: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySubValues {
    pub key: String,
    pub sub_values: Vec<SubValue>,
}

/// The `values` array of a normalized field; the variant is the structure type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValues {
    Simple(Vec<NormalizedValue>),
    KeyValuePairs(Vec<KeyValuePair>),
    KeySubValues(Vec<KeySubValues>),
}

impl FieldValues {
    pub fn structure_type(&self) -> StructureType {
        match self {
            FieldValues::Simple(_) => StructureType::Simple,
            FieldValues::KeyValuePairs(_) => StructureType::KeyValuePairs,
            FieldValues::KeySubValues(_) => StructureType::KeySubValues,
        }
    }

    /// Number of top-level entries
    pub fn len(&self) -> usize {
        match self {
            FieldValues::Simple(values) => values.len(),
            FieldValues::KeyValuePairs(pairs) => pairs.len(),
            FieldValues::KeySubValues(groups) => groups.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries that carry an extracted year, sub-values included
    pub fn year_count(&self) -> usize {
        match self {
            FieldValues::Simple(values) => values.iter().filter(|v| v.year.is_some()).count(),
            FieldValues::KeyValuePairs(pairs) => pairs.iter().filter(|p| p.year.is_some()).count(),
            FieldValues::KeySubValues(groups) => groups
                .iter()
                .flat_map(|g| g.sub_values.iter())
                .filter(|s| s.year.is_some())
                .count(),
        }
    }
}

/// A field after refinement: uniform values array plus copied-through metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "NormalizedFieldRepr", into = "NormalizedFieldRepr")]
pub struct NormalizedField {
    pub name: String,
    pub database_id: Option<String>,
    pub category: Option<String>,
    pub subfields: Vec<String>,
    pub has_ranking: bool,
    pub is_multi_valued: bool,
    pub values: FieldValues,
}

impl NormalizedField {
    pub fn structure_type(&self) -> StructureType {
        self.values.structure_type()
    }
}

/// Wire shape: `structure_type` travels next to `values` and decides how the
/// array is read back.
#[derive(Serialize, Deserialize)]
struct NormalizedFieldRepr {
    #[serde(default)]
    name: String,
    #[serde(default)]
    database_id: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    subfields: Vec<String>,
    #[serde(default)]
    has_ranking: bool,
    structure_type: StructureType,
    #[serde(default)]
    is_multi_valued: bool,
    #[serde(default)]
    values: Value,
}

impl TryFrom<NormalizedFieldRepr> for NormalizedField {
    type Error = serde_json::Error;

    fn try_from(repr: NormalizedFieldRepr) -> Result<Self, Self::Error> {
        let raw_values = match repr.values {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        let values = match repr.structure_type {
            StructureType::Simple => FieldValues::Simple(serde_json::from_value(raw_values)?),
            StructureType::KeyValuePairs => {
                FieldValues::KeyValuePairs(serde_json::from_value(raw_values)?)
            }
            StructureType::KeySubValues => {
                FieldValues::KeySubValues(serde_json::from_value(raw_values)?)
            }
        };

        Ok(NormalizedField {
            name: repr.name,
            database_id: repr.database_id,
            category: repr.category,
            subfields: repr.subfields,
            has_ranking: repr.has_ranking,
            is_multi_valued: repr.is_multi_valued,
            values,
        })
    }
}

impl From<NormalizedField> for NormalizedFieldRepr {
    fn from(field: NormalizedField) -> Self {
        let structure_type = field.values.structure_type();
        let values = match field.values {
            FieldValues::Simple(values) => serde_json::to_value(values),
            FieldValues::KeyValuePairs(pairs) => serde_json::to_value(pairs),
            FieldValues::KeySubValues(groups) => serde_json::to_value(groups),
        }
        // plain structs of strings and integers always serialize
        .unwrap_or_default();

        NormalizedFieldRepr {
            name: field.name,
            database_id: field.database_id,
            category: field.category,
            subfields: field.subfields,
            has_ranking: field.has_ranking,
            structure_type,
            is_multi_valued: field.is_multi_valued,
            values,
        }
    }
}

/// Turn a raw field into the uniform `simple` shape.
///
/// Multi-valued text is split on break markers; single-valued text becomes one
/// value verbatim, or no value at all when empty. `category` starts out unset.
pub fn normalize_field(raw: &RawField) -> NormalizedField {
    let multi_valued = is_multi_valued(&raw.data);

    let fragments = if multi_valued {
        split_values(&raw.data)
    } else if raw.data.is_empty() {
        Vec::new()
    } else {
        vec![raw.data.clone()]
    };

    let values = fragments
        .into_iter()
        .enumerate()
        .map(|(order, value)| NormalizedValue {
            value,
            order,
            year: None,
        })
        .collect::<Vec<_>>();

    debug!(
        field = %raw.name,
        multi_valued,
        values = values.len(),
        "Normalized field"
    );

    NormalizedField {
        name: raw.name.clone(),
        database_id: raw.database_id.clone(),
        category: None,
        subfields: raw.subfields.clone(),
        has_ranking: raw.has_ranking,
        is_multi_valued: multi_valued,
        values: FieldValues::Simple(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn simple_values(field: &NormalizedField) -> Vec<(String, usize)> {
        match &field.values {
            FieldValues::Simple(values) => values.iter().map(|v| (v.value.clone(), v.order)).collect(),
            other => panic!("expected simple values, got {:?}", other.structure_type()),
        }
    }

    #[test]
    fn test_normalize_multi_valued_field() {
        let mut raw = RawField::new("GDP", "$82B (2023)<br>$80B (2022)").with_database_id("208");
        raw.subfields = vec!["2023".to_string(), "2022".to_string()];
        raw.has_ranking = true;

        let field = normalize_field(&raw);
        assert!(field.is_multi_valued);
        assert_eq!(field.structure_type(), StructureType::Simple);
        assert_eq!(
            simple_values(&field),
            vec![("$82B (2023)".to_string(), 0), ("$80B (2022)".to_string(), 1)]
        );
        assert_eq!(field.database_id.as_deref(), Some("208"));
        assert_eq!(field.subfields, vec!["2023", "2022"]);
        assert!(field.has_ranking);
        assert_eq!(field.category, None);
    }

    #[test]
    fn test_normalize_single_value_is_kept_verbatim() {
        let field = normalize_field(&RawField::new("Capital", "Paris "));
        assert!(!field.is_multi_valued);
        assert_eq!(simple_values(&field), vec![("Paris ".to_string(), 0)]);
    }

    #[test]
    fn test_normalize_empty_data_has_no_values() {
        let field = normalize_field(&RawField::new("Notes", ""));
        assert!(!field.is_multi_valued);
        assert!(field.values.is_empty());
    }

    #[test]
    fn test_field_json_shape() {
        let field = normalize_field(&RawField::new("Area", "a<br>b").with_database_id("279"));
        let v = serde_json::to_value(&field).unwrap();

        assert_eq!(v["structure_type"], "simple");
        assert_eq!(v["is_multi_valued"], true);
        assert_eq!(v["values"][1], json!({"value": "b", "order": 1}));
        assert_eq!(v["category"], Value::Null);

        let back: NormalizedField = serde_json::from_value(v).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn test_key_sub_values_accept_bare_strings() {
        let field: NormalizedField = serde_json::from_value(json!({
            "name": "Age structure",
            "structure_type": "key_sub_values",
            "is_multi_valued": true,
            "values": [
                {"key": "0-14 years", "sub_values": ["21.7%", {"value": "male 1 (2024 est.)", "year": "2024"}]}
            ]
        }))
        .unwrap();

        match field.values {
            FieldValues::KeySubValues(groups) => {
                assert_eq!(groups[0].sub_values[0], SubValue::from("21.7%"));
                assert_eq!(groups[0].sub_values[1].year.as_deref(), Some("2024"));
            }
            other => panic!("unexpected {:?}", other.structure_type()),
        }
    }

    #[test]
    fn test_mismatched_structure_is_rejected() {
        let result = serde_json::from_value::<NormalizedField>(json!({
            "name": "Broken",
            "structure_type": "key_value_pairs",
            "values": [{"value": "no key", "order": 0}]
        }));
        assert!(result.is_err());
    }
}
