//! Refined records → newline-delimited JSON rows.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::processing::flatten::{flatten_country, CountryContext, ExportFilter};
use crate::pipeline::refine::RefinedCountry;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub records: usize,
    pub rows: usize,
}

/// Write filtered, flattened rows as NDJSON.
pub fn export_records<W: Write>(
    records: &[RefinedCountry],
    filter: &ExportFilter,
    writer: W,
) -> Result<ExportSummary> {
    let mut out = BufWriter::new(writer);
    let mut summary = ExportSummary::default();

    for record in records {
        let Some(fields) = filter.select(&record.country_slug, &record.fields) else {
            debug!(slug = %record.country_slug, "Record excluded by filter");
            continue;
        };
        let context = CountryContext {
            name: record.display_name(),
            slug: &record.country_slug,
        };

        let rows = flatten_country(fields, context);
        for row in &rows {
            serde_json::to_writer(&mut out, row)?;
            out.write_all(b"\n")?;
        }

        summary.records += 1;
        summary.rows += rows.len();
        metrics::export::record_exported();
        metrics::export::rows_written(rows.len());
    }

    out.flush()?;
    info!(records = summary.records, rows = summary.rows, "Export finished");
    Ok(summary)
}

/// [`export_records`] into a file, creating parent directories.
pub fn export_to_file(
    records: &[RefinedCountry],
    filter: &ExportFilter,
    path: &Path,
) -> Result<ExportSummary> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path)?;
    export_records(records, filter, file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RawCountry, RawField};
    use crate::pipeline::processing::enrich::CategoryMapping;
    use crate::pipeline::refine::Refiner;
    use serde_json::Value;

    fn refined() -> Vec<RefinedCountry> {
        let mut mapping = CategoryMapping::new();
        mapping.insert("1", "Government");

        let refiner = Refiner::new(mapping);
        let mut france = RawCountry::new(
            "france",
            vec![
                RawField::new("Capital", "Paris").with_database_id("1"),
                RawField::new("Languages", "French<br>Breton"),
            ],
        );
        france.metadata.name = Some("France".to_string());
        let spain = RawCountry::new("spain", vec![RawField::new("Capital", "Madrid").with_database_id("1")]);

        vec![
            refiner.refine_country(&france).unwrap(),
            refiner.refine_country(&spain).unwrap(),
        ]
    }

    #[test]
    fn test_ndjson_lines() {
        let mut buffer = Vec::new();
        let summary = export_records(&refined(), &ExportFilter::default(), &mut buffer).unwrap();
        assert_eq!(summary, ExportSummary { records: 2, rows: 4 });

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["country"], "France");
        assert_eq!(lines[0]["category"], "Government");
        assert_eq!(lines[0]["key"], "-");
        assert_eq!(lines[2]["value"], "Breton");
        assert_eq!(lines[2]["order"], 1);
        assert_eq!(lines[2]["category"], Value::Null);
        // no name in metadata: slug stands in
        assert_eq!(lines[3]["country"], "spain");
        assert_eq!(lines[3]["structure_type"], "simple");
    }

    #[test]
    fn test_filter_applies_before_flattening() {
        let filter = ExportFilter {
            categories: vec!["Government".into()],
            ..Default::default()
        };
        let mut buffer = Vec::new();
        let summary = export_records(&refined(), &filter, &mut buffer).unwrap();
        assert_eq!(summary, ExportSummary { records: 2, rows: 2 });
        let text = String::from_utf8(buffer).unwrap();
        assert!(text
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap())
            .all(|row| row["field_name"] == "Capital"));

        let filter = ExportFilter {
            countries: vec!["spain".into()],
            ..Default::default()
        };
        let mut buffer = Vec::new();
        let summary = export_records(&refined(), &filter, &mut buffer).unwrap();
        assert_eq!(summary, ExportSummary { records: 1, rows: 1 });
    }
}
