//! Country `page-data.json` → [`RawCountry`].
//!
//! Keeps only what refinement needs: country metadata and, per field, the
//! name, verbatim `data`, database id, ranking flag, subfield labels and media.

use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{id_to_string, CountryMetadata, MediaRef, RawCountry, RawField};
use crate::error::{json_kind, Result, ScraperError};

/// Parse one country's page data. Fails only when `result.data` is missing or
/// holds neither `country` nor `fields`.
pub fn parse_page_data(slug: &str, page: &Value, source_url: Option<&str>) -> Result<RawCountry> {
    let data = page
        .pointer("/result/data")
        .and_then(Value::as_object)
        .ok_or_else(|| ScraperError::InvalidPageData(format!("{}: missing result.data object", slug)))?;
    if !data.contains_key("country") && !data.contains_key("fields") {
        return Err(ScraperError::InvalidPageData(format!(
            "{}: result.data has neither country nor fields",
            slug
        )));
    }

    let nodes: &[Value] = data
        .get("fields")
        .and_then(|f| f.get("nodes"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let fields: Vec<RawField> = nodes
        .iter()
        .enumerate()
        .filter_map(|(index, node)| {
            let field = parse_field_node(node);
            if field.is_none() {
                debug!(slug, index, kind = json_kind(node), "Skipping non-object field node");
            }
            field
        })
        .collect();

    let country = data.get("country");
    let text = |key: &str| {
        country
            .and_then(|c| c.get(key))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let metadata = CountryMetadata {
        name: text("name"),
        region: text("region"),
        updated: text("updated").map(|u| normalize_date(&u)),
        field_count: fields.len(),
    };

    info!(
        slug,
        name = metadata.name.as_deref().unwrap_or("Unknown"),
        fields = fields.len(),
        "Parsed country page"
    );

    let mut record = RawCountry::new(slug, fields);
    record.scraped_at = Some(Utc::now());
    record.source_url = source_url.map(str::to_string);
    record.metadata = metadata;
    Ok(record)
}

fn parse_field_node(node: &Value) -> Option<RawField> {
    let obj = node.as_object()?;

    let label = obj
        .get("fieldLabel")
        .and_then(Value::as_array)
        .and_then(|labels| labels.first());

    let subfields = obj
        .get("subfields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|s| s.get("label").and_then(Value::as_str))
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let media = obj
        .get("media")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(parse_media).collect())
        .unwrap_or_default();

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let data = match obj.get("data") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => String::new(),
        Some(other) => {
            warn!(
                field = %name,
                kind = json_kind(other),
                "Non-string data replaced with empty text"
            );
            String::new()
        }
    };

    Some(RawField {
        name,
        database_id: label.and_then(|l| l.get("databaseId")).and_then(id_to_string),
        data,
        subfields,
        has_ranking: label
            .and_then(|l| l.get("rank"))
            .map(truthy)
            .unwrap_or(false),
        media,
    })
}

fn parse_media(item: &Value) -> Option<MediaRef> {
    let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);
    let media_type = text("type").filter(|t| !t.is_empty())?;
    let url = item
        .pointer("/localFile/publicURL")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())?
        .to_string();

    Some(MediaRef {
        media_type,
        url,
        label: text("label"),
        alt_text: text("altText"),
        caption: text("caption"),
    })
}

/// Ranking flags show up as booleans, numbers or strings.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

/// `YYYY-MM-DD` for the date spellings the site uses; anything else is
/// returned trimmed but otherwise unchanged.
pub fn normalize_date(raw: &str) -> String {
    let text = raw.trim();

    for format in ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    // "September 2025"
    if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {}", text), "%d %B %Y") {
        return date.format("%Y-%m-%d").to_string();
    }
    if text.len() == 4 && text.bytes().all(|b| b.is_ascii_digit()) {
        return format!("{}-01-01", text);
    }

    debug!(date = text, "Could not normalize date");
    text.to_string()
}
