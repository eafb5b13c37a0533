//! Promotion of `simple` fields to keyed structures.
//!
//! Runs after normalization. Values that start with a short label and a colon,
//! such as `<strong>male:</strong> 70.1 years`, are keyed. A field whose values
//! are all keyed with content becomes `key_value_pairs`; a field where keyed
//! labels head runs of unkeyed values becomes `key_sub_values`. Anything else
//! stays `simple`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::pipeline::processing::normalize::{
    FieldValues, KeySubValues, KeyValuePair, NormalizedField, NormalizedValue, SubValue,
};

static KEYED_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)^\s*(?:<(?:strong|b)>\s*)?([^<>:]{1,60}?)\s*(?:</(?:strong|b)>\s*)?:\s*(?:</(?:strong|b)>)?\s*(.*)$",
    )
    .expect("keyed value pattern is valid")
});

const MAX_LABEL_WORDS: usize = 6;

/// Split `label: rest` into its parts. `rest` may be empty.
pub fn parse_keyed(value: &str) -> Option<(String, String)> {
    let caps = KEYED_VALUE.captures(value)?;
    let label = caps[1].trim();
    if label.is_empty() || label.split_whitespace().count() > MAX_LABEL_WORDS {
        return None;
    }
    Some((label.to_string(), caps[2].trim().to_string()))
}

/// Pick the richest structure the field's values support.
pub fn classify_field(field: &NormalizedField) -> NormalizedField {
    let values = match &field.values {
        FieldValues::Simple(values) if values.len() >= 2 => values,
        _ => return field.clone(),
    };

    let parsed: Vec<Option<(String, String)>> =
        values.iter().map(|v| parse_keyed(&v.value)).collect();

    let promoted = if let Some(pairs) = as_pairs(values, &parsed) {
        FieldValues::KeyValuePairs(pairs)
    } else if let Some(groups) = as_groups(values, &parsed) {
        FieldValues::KeySubValues(groups)
    } else {
        return field.clone();
    };

    NormalizedField {
        values: promoted,
        ..field.clone()
    }
}

fn as_pairs(
    values: &[NormalizedValue],
    parsed: &[Option<(String, String)>],
) -> Option<Vec<KeyValuePair>> {
    values
        .iter()
        .zip(parsed)
        .enumerate()
        .map(|(order, (source, keyed))| match keyed {
            Some((key, rest)) if !rest.is_empty() => Some(KeyValuePair {
                key: key.clone(),
                value: rest.clone(),
                order,
                year: source.year.clone(),
            }),
            _ => None,
        })
        .collect()
}

fn as_groups(
    values: &[NormalizedValue],
    parsed: &[Option<(String, String)>],
) -> Option<Vec<KeySubValues>> {
    // an unkeyed leading value has no group to join
    parsed.first()?.as_ref()?;

    let mut groups: Vec<KeySubValues> = Vec::new();
    for (source, keyed) in values.iter().zip(parsed) {
        match keyed {
            Some((key, rest)) => {
                let mut sub_values = Vec::new();
                if !rest.is_empty() {
                    sub_values.push(SubValue {
                        value: rest.clone(),
                        year: source.year.clone(),
                    });
                }
                groups.push(KeySubValues {
                    key: key.clone(),
                    sub_values,
                });
            }
            None => groups.last_mut()?.sub_values.push(SubValue {
                value: source.value.clone(),
                year: source.year.clone(),
            }),
        }
    }
    Some(groups)
}
