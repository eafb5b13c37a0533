//! Structural checks on refined fields.
//!
//! Violations are reported to the caller and never repaired here: a
//! multi-valued field with fewer than two values means the splitter or the
//! source markup misbehaved, and hiding that would skew row counts downstream.

use thiserror::Error;

use super::{FieldValues, NormalizedField};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("multi-valued field '{field}' has {count} values, expected at least 2")]
    TooFewValues { field: String, count: usize },

    #[error("single-valued field '{field}' has {count} values, expected 0 or 1")]
    TooManyValues { field: String, count: usize },

    #[error("field '{field}' has order {found} at position {position}")]
    OrderGap {
        field: String,
        position: usize,
        found: usize,
    },

    #[error("multi-valued field '{field}' has no key groups")]
    NoKeyGroups { field: String },

    #[error("field '{field}' carries malformed year '{year}'")]
    MalformedYear { field: String, year: String },
}

/// Check one field's cardinality, ordering and year invariants.
pub fn validate_field(field: &NormalizedField) -> Result<(), ValidationError> {
    let count = field.values.len();

    match &field.values {
        FieldValues::KeySubValues(_) => {
            // groups collapse several fragments into one entry
            if field.is_multi_valued && count == 0 {
                return Err(ValidationError::NoKeyGroups {
                    field: field.name.clone(),
                });
            }
        }
        _ if field.is_multi_valued && count < 2 => {
            return Err(ValidationError::TooFewValues {
                field: field.name.clone(),
                count,
            });
        }
        _ if !field.is_multi_valued && count > 1 => {
            return Err(ValidationError::TooManyValues {
                field: field.name.clone(),
                count,
            });
        }
        _ => {}
    }

    let orders: Vec<usize> = match &field.values {
        FieldValues::Simple(values) => values.iter().map(|v| v.order).collect(),
        FieldValues::KeyValuePairs(pairs) => pairs.iter().map(|p| p.order).collect(),
        FieldValues::KeySubValues(_) => Vec::new(),
    };
    if let Some((position, &found)) = orders
        .iter()
        .enumerate()
        .find(|(position, order)| *position != **order)
    {
        return Err(ValidationError::OrderGap {
            field: field.name.clone(),
            position,
            found,
        });
    }

    let years: Vec<&String> = match &field.values {
        FieldValues::Simple(values) => values.iter().filter_map(|v| v.year.as_ref()).collect(),
        FieldValues::KeyValuePairs(pairs) => pairs.iter().filter_map(|p| p.year.as_ref()).collect(),
        FieldValues::KeySubValues(groups) => groups
            .iter()
            .flat_map(|g| g.sub_values.iter())
            .filter_map(|s| s.year.as_ref())
            .collect(),
    };
    if let Some(year) = years
        .into_iter()
        .find(|y| y.len() != 4 || !y.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(ValidationError::MalformedYear {
            field: field.name.clone(),
            year: year.clone(),
        });
    }

    Ok(())
}

/// Validate every field of a record, collecting all violations.
pub fn validate_record(fields: &[NormalizedField]) -> Vec<ValidationError> {
    fields
        .iter()
        .filter_map(|field| validate_field(field).err())
        .collect()
}
