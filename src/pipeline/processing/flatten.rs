//! Projection of refined fields into flat `(key, value, order)` rows.

use serde::{Deserialize, Serialize};

use crate::pipeline::processing::normalize::{FieldValues, NormalizedField, StructureType};

/// Key used for rows of `simple` fields
pub const SIMPLE_KEY: &str = "-";

/// One export row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub country: String,
    pub country_slug: String,
    pub field_name: String,
    pub database_id: Option<String>,
    pub category: Option<String>,
    pub structure_type: StructureType,
    pub key: String,
    pub value: String,
    pub order: usize,
    pub has_ranking: bool,
}

/// The record a field belongs to
#[derive(Debug, Clone, Copy)]
pub struct CountryContext<'a> {
    pub name: &'a str,
    pub slug: &'a str,
}

/// Rows for one field, in value order.
///
/// `key_sub_values` rows carry the outer key and the sub-value's position
/// within that key.
pub fn flatten(field: &NormalizedField, country: CountryContext<'_>) -> Vec<Row> {
    let row = |key: &str, value: &str, order: usize| Row {
        country: country.name.to_string(),
        country_slug: country.slug.to_string(),
        field_name: field.name.clone(),
        database_id: field.database_id.clone(),
        category: field.category.clone(),
        structure_type: field.structure_type(),
        key: key.to_string(),
        value: value.to_string(),
        order,
        has_ranking: field.has_ranking,
    };

    match &field.values {
        FieldValues::Simple(values) => values
            .iter()
            .map(|v| row(SIMPLE_KEY, &v.value, v.order))
            .collect(),
        FieldValues::KeyValuePairs(pairs) => pairs
            .iter()
            .map(|p| row(&p.key, &p.value, p.order))
            .collect(),
        FieldValues::KeySubValues(groups) => groups
            .iter()
            .flat_map(|g| {
                g.sub_values
                    .iter()
                    .enumerate()
                    .map(|(order, s)| row(&g.key, &s.value, order))
                    .collect::<Vec<_>>()
            })
            .collect(),
    }
}

/// Rows for a whole record, fields in their source sequence.
pub fn flatten_country<'a>(
    fields: impl IntoIterator<Item = &'a NormalizedField>,
    country: CountryContext<'_>,
) -> Vec<Row> {
    fields
        .into_iter()
        .flat_map(|field| flatten(field, country))
        .collect()
}

/// Country and category selection applied before flattening.
/// An empty list places no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportFilter {
    pub countries: Vec<String>,
    pub categories: Vec<String>,
}

impl ExportFilter {
    pub fn allows_country(&self, slug: &str) -> bool {
        self.countries.is_empty() || self.countries.iter().any(|c| c == slug)
    }

    pub fn allows_field(&self, field: &NormalizedField) -> bool {
        if self.categories.is_empty() {
            return true;
        }
        field
            .category
            .as_deref()
            .is_some_and(|category| self.categories.iter().any(|c| c == category))
    }

    /// The record's surviving fields, or `None` when nothing of it remains.
    pub fn select<'a>(
        &self,
        slug: &str,
        fields: &'a [NormalizedField],
    ) -> Option<Vec<&'a NormalizedField>> {
        if !self.allows_country(slug) {
            return None;
        }
        let kept: Vec<&NormalizedField> = fields.iter().filter(|f| self.allows_field(f)).collect();
        (!kept.is_empty()).then_some(kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawField;
    use crate::pipeline::processing::normalize::{
        normalize_field, KeySubValues, KeyValuePair, NormalizedValue, SubValue,
    };

    const FRANCE: CountryContext<'static> = CountryContext {
        name: "France",
        slug: "france",
    };

    fn simple(name: &str, data: &str, category: Option<&str>) -> NormalizedField {
        let mut field = normalize_field(&RawField::new(name, data));
        field.category = category.map(str::to_string);
        field
    }

    #[test]
    fn test_simple_rows_use_dash_key() {
        let rows = flatten(&simple("Languages", "French<br>Breton", None), FRANCE);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, SIMPLE_KEY);
        assert_eq!(rows[1].value, "Breton");
        assert_eq!(rows[1].order, 1);
        assert_eq!(rows[0].country, "France");
        assert_eq!(rows[0].structure_type, StructureType::Simple);
    }

    #[test]
    fn test_pair_rows_use_pair_key() {
        let mut field = simple("Life expectancy", "", None);
        field.values = FieldValues::KeyValuePairs(vec![
            KeyValuePair { key: "male".into(), value: "70".into(), order: 0, year: None },
            KeyValuePair { key: "female".into(), value: "74".into(), order: 1, year: None },
        ]);
        let rows = flatten(&field, FRANCE);
        assert_eq!(
            rows.iter().map(|r| (r.key.as_str(), r.order)).collect::<Vec<_>>(),
            vec![("male", 0), ("female", 1)]
        );
    }

    #[test]
    fn test_sub_value_order_restarts_per_key() {
        let mut field = simple("Age structure", "", None);
        field.values = FieldValues::KeySubValues(vec![
            KeySubValues { key: "0-14".into(), sub_values: vec![SubValue::from("a"), SubValue::from("b")] },
            KeySubValues { key: "15-64".into(), sub_values: vec![SubValue::from("c")] },
            KeySubValues { key: "empty".into(), sub_values: vec![] },
        ]);
        let rows = flatten(&field, FRANCE);
        assert_eq!(
            rows.iter().map(|r| (r.key.as_str(), r.value.as_str(), r.order)).collect::<Vec<_>>(),
            vec![("0-14", "a", 0), ("0-14", "b", 1), ("15-64", "c", 0)]
        );
    }

    #[test]
    fn test_simple_rows_regroup_to_original_values() {
        let field = simple("F", "x<br>y<br>z (2024 est.)", None);
        let regrouped: Vec<NormalizedValue> = flatten(&field, FRANCE)
            .into_iter()
            .map(|r| NormalizedValue { value: r.value, order: r.order, year: None })
            .collect();
        assert_eq!(field.values, FieldValues::Simple(regrouped));
    }

    #[test]
    fn test_country_rows_keep_field_sequence() {
        let fields = vec![simple("B", "1<br>2", None), simple("A", "3", None)];
        let rows = flatten_country(&fields, FRANCE);
        let names: Vec<&str> = rows.iter().map(|r| r.field_name.as_str()).collect();
        assert_eq!(names, vec!["B", "B", "A"]);
    }

    #[test]
    fn test_export_filter() {
        let fields = vec![
            simple("GDP", "1", Some("Economy")),
            simple("Area", "2", Some("Geography")),
            simple("Flag", "3", None),
        ];

        assert_eq!(ExportFilter::default().select("france", &fields).map(|f| f.len()), Some(3));

        let by_country = ExportFilter { countries: vec!["spain".into()], ..Default::default() };
        assert!(by_country.select("france", &fields).is_none());

        let by_category = ExportFilter { categories: vec!["Economy".into()], ..Default::default() };
        let kept = by_category.select("france", &fields).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "GDP");

        let nothing = ExportFilter { categories: vec!["Military".into()], ..Default::default() };
        assert!(nothing.select("france", &fields).is_none());
    }
}
