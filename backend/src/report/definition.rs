//! Report definitions.
//!
//! A definition declares everything about a report except the request
//! options: the base table, columns, grouping, sort, dynamic fields and
//! filters. Columns may be given as a list of objects or as the parallel
//! `fields`/`headers`/`types`/`totals`/`widths` arrays.
//!
//! ```json
//! {
//!   "title": "Monthly sales",
//!   "model": "sales",
//!   "columns": [
//!     {"field": "region", "header": "Region"},
//!     {"field": "product", "header": "Product"},
//!     {"field": "quantity", "header": "Quantity", "type": "number", "total": true}
//!   ],
//!   "grouping": ["region"],
//!   "dynamic_headers": [{"lookup": "months.name", "field": "quantity"}]
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::api::logs::log_warning;
use crate::error::{DefinitionError, DefinitionResult};
use crate::filters::FilterDefinition;
use crate::models::{Column, ColumnSpec, ColumnType, DynamicHeader, GroupingSpec};

fn default_true() -> bool {
    true
}

/// A declared report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDefinition")]
pub struct ReportDefinition {
    pub title: String,

    /// Base table rows are fetched from
    pub model: String,

    pub columns: ColumnSpec,

    pub grouping: GroupingSpec,

    /// Sort fields applied after the grouping fields
    pub sort: Vec<String>,

    /// Dynamic field declarations, kept raw and parsed leniently
    pub dynamic_headers: Vec<Value>,

    pub filters: Vec<FilterDefinition>,

    /// Whether totals boxes are drawn after each group
    pub draw_totals: bool,
}

/// Wire form of a definition, before column validation.
#[derive(Debug, Deserialize)]
struct RawDefinition {
    #[serde(default)]
    title: String,
    model: String,
    #[serde(default)]
    columns: Option<Vec<Column>>,
    #[serde(default)]
    fields: Option<Vec<String>>,
    #[serde(default)]
    headers: Vec<String>,
    #[serde(default)]
    types: Vec<ColumnType>,
    #[serde(default)]
    totals: Vec<bool>,
    #[serde(default)]
    widths: Vec<f64>,
    #[serde(default)]
    grouping: Vec<String>,
    #[serde(default)]
    sort: Vec<String>,
    #[serde(default)]
    dynamic_headers: Vec<Value>,
    #[serde(default)]
    filters: Vec<FilterDefinition>,
    #[serde(default = "default_true")]
    draw_totals: bool,
}

impl TryFrom<RawDefinition> for ReportDefinition {
    type Error = DefinitionError;

    fn try_from(raw: RawDefinition) -> Result<Self, Self::Error> {
        let columns = match (raw.columns, raw.fields) {
            (Some(columns), _) => ColumnSpec::new(columns),
            (None, Some(fields)) => ColumnSpec::from_parallel(
                &fields,
                &raw.headers,
                &raw.types,
                &raw.totals,
                &raw.widths,
            )?,
            (None, None) => return Err(DefinitionError::NoColumns),
        };

        let definition = Self {
            title: raw.title,
            model: raw.model,
            columns,
            grouping: GroupingSpec::new(raw.grouping),
            sort: raw.sort,
            dynamic_headers: raw.dynamic_headers,
            filters: raw.filters,
            draw_totals: raw.draw_totals,
        };
        definition.validate()?;
        Ok(definition)
    }
}

impl ReportDefinition {
    /// Create a definition without grouping, sort, dynamic fields or filters.
    pub fn new(title: impl Into<String>, model: impl Into<String>, columns: ColumnSpec) -> Self {
        Self {
            title: title.into(),
            model: model.into(),
            columns,
            grouping: GroupingSpec::default(),
            sort: Vec::new(),
            dynamic_headers: Vec::new(),
            filters: Vec::new(),
            draw_totals: true,
        }
    }

    pub fn with_grouping(mut self, grouping: GroupingSpec) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_dynamic_header(mut self, header: &DynamicHeader) -> Self {
        self.dynamic_headers
            .push(serde_json::to_value(header).unwrap_or(Value::Null));
        self
    }

    pub fn with_filter(mut self, filter: FilterDefinition) -> Self {
        self.filters.push(filter);
        self
    }

    /// Parse a definition from JSON.
    pub fn from_json(json: &str) -> DefinitionResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> DefinitionResult<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> DefinitionResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check column and grouping consistency.
    pub fn validate(&self) -> DefinitionResult<()> {
        if self.columns.is_empty() {
            return Err(DefinitionError::NoColumns);
        }

        let mut seen = HashSet::new();
        for column in self.columns.iter() {
            if !seen.insert(column.field.as_str()) {
                return Err(DefinitionError::DuplicateField(column.field.clone()));
            }
        }

        for field in self.grouping.fields() {
            if self.columns.index_of(field).is_none() {
                return Err(DefinitionError::UnknownField(field.clone()));
            }
        }
        Ok(())
    }

    /// Well-formed dynamic headers, in declaration order.
    ///
    /// Malformed entries disable pivoting for that entry only.
    pub fn dynamic_headers(&self) -> Vec<DynamicHeader> {
        self.dynamic_headers
            .iter()
            .enumerate()
            .filter_map(|(i, value)| {
                match serde_json::from_value::<DynamicHeader>(value.clone()) {
                    Ok(header) if !header.lookup.trim().is_empty() && !header.field.trim().is_empty() => {
                        Some(header)
                    }
                    Ok(_) => {
                        log_warning(format!("Dynamic header #{} has an empty lookup or field, skipped", i + 1));
                        None
                    }
                    Err(e) => {
                        log_warning(format!("Dynamic header #{} is malformed ({}), skipped", i + 1, e));
                        None
                    }
                }
            })
            .collect()
    }

    /// Fetch order: grouping fields first, then the declared sort fields.
    pub fn sort_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.grouping.fields().to_vec();
        for field in &self.sort {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }
}

/// A small sales report used by the CLI demo and tests.
pub fn example_definition() -> ReportDefinition {
    let columns = ColumnSpec::new(vec![
        Column::new("region", "Region").with_width(25.0),
        Column::new("product", "Product").with_width(35.0),
        Column::total("amount", "Amount").with_width(20.0),
        Column::total("units", "Units").with_width(20.0),
    ]);
    ReportDefinition::new("Sales by region", "sales", columns)
        .with_grouping(GroupingSpec::new(["region"]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SingletonMode;
    use serde_json::json;

    #[test]
    fn test_parse_column_objects() {
        let def = ReportDefinition::from_value(json!({
            "title": "Sales",
            "model": "sales",
            "columns": [
                {"field": "region", "header": "Region"},
                {"field": "amount", "header": "Amount", "type": "number", "total": true, "width": 20}
            ],
            "grouping": ["region", ""],
            "sort": ["amount"]
        }))
        .unwrap();

        assert_eq!(def.columns.len(), 2);
        assert_eq!(def.grouping.depth(), 1);
        assert!(def.draw_totals);
        assert_eq!(def.sort_fields(), vec!["region", "amount"]);
    }

    #[test]
    fn test_parse_parallel_arrays() {
        let def = ReportDefinition::from_value(json!({
            "model": "sales",
            "fields": ["region", "amount"],
            "headers": ["Region", "Amount"],
            "types": ["string", "number"],
            "totals": [false, true],
            "widths": [50, 50]
        }))
        .unwrap();
        assert_eq!(def.columns.total_flags(), vec![false, true]);

        let mismatch = ReportDefinition::from_value(json!({
            "model": "sales",
            "fields": ["region", "amount"],
            "headers": ["Region"],
            "types": ["string", "number"],
            "totals": [false, true],
            "widths": [50, 50]
        }));
        assert!(mismatch.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let no_columns = ReportDefinition::from_value(json!({"model": "sales", "columns": []}));
        assert!(no_columns.is_err());

        let duplicate = ReportDefinition::new(
            "x",
            "sales",
            ColumnSpec::new(vec![Column::new("a", "A"), Column::new("a", "A again")]),
        );
        assert!(matches!(duplicate.validate(), Err(DefinitionError::DuplicateField(f)) if f == "a"));

        let bad_grouping = example_definition().with_grouping(GroupingSpec::new(["city"]));
        assert!(matches!(bad_grouping.validate(), Err(DefinitionError::UnknownField(f)) if f == "city"));
    }

    #[test]
    fn test_malformed_dynamic_headers_are_skipped() {
        let mut def = example_definition();
        def.dynamic_headers = vec![
            json!({"lookup": "months.name", "field": "units"}),
            json!("months.name"),
            json!({"lookup": "", "field": "amount"}),
            json!({"lookup": "weeks.name", "field": "amount", "singleton": "broadcast"}),
        ];

        let headers = def.dynamic_headers();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[0].singleton, SingletonMode::Match);
        assert_eq!(headers[1].singleton, SingletonMode::Broadcast);
    }

    #[test]
    fn test_json_roundtrip_keeps_definition() {
        let def = example_definition().with_dynamic_header(&DynamicHeader {
            lookup: "months.name".into(),
            field: "units".into(),
            singleton: SingletonMode::Match,
        });
        let parsed = ReportDefinition::from_json(&def.to_json().unwrap()).unwrap();
        assert_eq!(parsed, def);
    }
}
