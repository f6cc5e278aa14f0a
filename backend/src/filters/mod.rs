//! Report filters and the report options form.
//!
//! Every filter reads its own request parameters and contributes
//! `(field, operator, value)` clauses to the data query:
//!
//! | Kind          | Option parameter  | Options                        | Values                              |
//! |---------------|-------------------|--------------------------------|-------------------------------------|
//! | `date`        | `<name>_option`   | LESS, GREATER, EQUALS, BETWEEN | `<name>_start_date`, `<name>_end_date` |
//! | `referenced`  | `<name>_option`   | IS_ANY_OF, IS_NONE_OF          | `<name>_value` (repeated)           |
//! | `enumeration` | `<name>_option`   | INCLUDE, EXCLUDE               | `<name>_value` (repeated)           |
//! | `field`       |                   |                                | `<name>_value`                      |
//!
//! A filter without submitted values contributes nothing.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};
use crate::models::{ColumnSpec, GroupingSpec, LookupEntry};
use crate::params::RequestParams;
use crate::sink::ReportFormat;
use crate::store::LookupResolver;

// =============================================================================
// Clauses
// =============================================================================

/// Comparison applied by a filter clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    Less,
    Greater,
    /// Inclusive range over two values
    Between,
    In,
    NotIn,
}

/// One `(field, operator, value)` condition of a data query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl FilterClause {
    pub fn new(field: impl Into<String>, operator: FilterOperator, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            values,
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::Equals, vec![value.into()])
    }
}

// =============================================================================
// Filter Definitions
// =============================================================================

/// Filter kind, with the options each kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterKind {
    /// Date comparison, `default_option` preselected on the form
    Date {
        #[serde(default)]
        default_option: Option<String>,
    },
    /// Multi-select over the entries of a lookup table (`model.label_field`)
    Referenced { lookup: String },
    /// Multi-select over fixed options
    Enumeration { options: Vec<LookupEntry> },
    /// Plain equality on the submitted value
    Field,
}

/// A filter declared by a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDefinition {
    /// Machine name, prefix of the request parameters
    pub name: String,

    pub label: String,

    /// Data field the filter applies to
    pub field: String,

    #[serde(flatten)]
    pub kind: FilterKind,
}

impl FilterDefinition {
    fn param(&self, suffix: &str) -> String {
        format!("{}_{}", self.name, suffix)
    }

    /// Clauses contributed by the submitted parameters.
    pub fn to_clauses(&self, params: &RequestParams) -> ReportResult<Vec<FilterClause>> {
        let option_param = self.param("option");
        let option = params.get_non_empty(&option_param).map(str::to_uppercase);

        match &self.kind {
            FilterKind::Date { default_option } => {
                let start_param = self.param("start_date");
                let end_param = self.param("end_date");
                let start = parse_date(params, &start_param)?;
                let end = parse_date(params, &end_param)?;
                let option = option
                    .or_else(|| default_option.as_ref().map(|o| o.to_uppercase()))
                    .unwrap_or_else(|| "EQUALS".to_string());

                let operator = match option.as_str() {
                    "LESS" => FilterOperator::Less,
                    "GREATER" => FilterOperator::Greater,
                    "EQUALS" => FilterOperator::Equals,
                    "BETWEEN" => FilterOperator::Between,
                    _ => return Err(ReportError::invalid_param(option_param, option.clone())),
                };

                if operator == FilterOperator::Between {
                    return match (start, end) {
                        (None, None) => Ok(Vec::new()),
                        (Some(s), Some(e)) => Ok(vec![FilterClause::new(
                            &self.field,
                            operator,
                            vec![s, e],
                        )]),
                        (Some(_), None) => Err(ReportError::invalid_param(end_param, "")),
                        (None, Some(_)) => Err(ReportError::invalid_param(start_param, "")),
                    };
                }
                Ok(start
                    .map(|s| FilterClause::new(&self.field, operator, vec![s]))
                    .into_iter()
                    .collect())
            }
            FilterKind::Referenced { .. } => {
                let operator = match option.as_deref().unwrap_or("IS_ANY_OF") {
                    "IS_ANY_OF" => FilterOperator::In,
                    "IS_NONE_OF" => FilterOperator::NotIn,
                    other => return Err(ReportError::invalid_param(option_param, other)),
                };
                Ok(self.multi_value(params, operator))
            }
            FilterKind::Enumeration { .. } => {
                let operator = match option.as_deref().unwrap_or("INCLUDE") {
                    "INCLUDE" => FilterOperator::In,
                    "EXCLUDE" => FilterOperator::NotIn,
                    other => return Err(ReportError::invalid_param(option_param, other)),
                };
                Ok(self.multi_value(params, operator))
            }
            FilterKind::Field => Ok(params
                .get_non_empty(&self.param("value"))
                .map(|v| FilterClause::equals(&self.field, v))
                .into_iter()
                .collect()),
        }
    }

    fn multi_value(&self, params: &RequestParams, operator: FilterOperator) -> Vec<FilterClause> {
        let values: Vec<String> = params
            .get_all(&self.param("value"))
            .into_iter()
            .map(String::from)
            .collect();
        if values.is_empty() {
            return Vec::new();
        }
        vec![FilterClause::new(&self.field, operator, values)]
    }
}

/// Parse an ISO date parameter, normalized to `YYYY-MM-DD`.
fn parse_date(params: &RequestParams, key: &str) -> ReportResult<Option<String>> {
    params
        .get_non_empty(key)
        .map(|raw| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string())
                .map_err(|_| ReportError::invalid_param(key, raw))
        })
        .transpose()
}

/// Clauses of every filter, in declaration order.
pub fn collect_clauses(
    filters: &[FilterDefinition],
    params: &RequestParams,
) -> ReportResult<Vec<FilterClause>> {
    let mut clauses = Vec::new();
    for filter in filters {
        clauses.extend(filter.to_clauses(params)?);
    }
    Ok(clauses)
}

// =============================================================================
// Options Form
// =============================================================================

/// One choice of a selection field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormOption {
    pub label: String,
    pub value: String,
}

impl FormOption {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A single-choice selection with its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectField {
    pub name: String,
    pub label: String,
    pub options: Vec<FormOption>,
    pub value: String,
}

/// A filter row of the form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFilter {
    pub name: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Operator selection, absent for plain field filters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option: Option<SelectField>,
    /// Parameters the filter reads its values from
    pub value_params: Vec<String>,
    /// Selectable values of multi-select filters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<FormOption>,
}

/// Checkbox starting each group of a level on a new page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToggle {
    pub name: String,
    pub label: String,
    pub level: usize,
}

/// Serializable description of the report options form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportForm {
    pub title: String,
    pub format: Vec<SelectField>,
    pub filters: Vec<FormFilter>,
    pub page_breaks: Vec<PageToggle>,
    pub submit: String,
}

impl ReportForm {
    /// Build the form for a report's filters and grouping levels.
    ///
    /// Referenced filters list the entries of their lookup table.
    pub fn build(
        title: &str,
        filters: &[FilterDefinition],
        columns: &ColumnSpec,
        grouping: &GroupingSpec,
        resolver: &dyn LookupResolver,
    ) -> ReportResult<Self> {
        let mut format = vec![
            SelectField {
                name: "report_format".into(),
                label: "File Format".into(),
                options: [
                    ReportFormat::Html,
                    ReportFormat::HtmlNoHeaders,
                    ReportFormat::Pdf,
                    ReportFormat::Xls,
                    ReportFormat::Doc,
                ]
                .iter()
                .map(|f| FormOption::new(f.label(), f.as_str()))
                .collect(),
                value: ReportFormat::default().as_str().into(),
            },
            SelectField {
                name: "page_orientation".into(),
                label: "Page Orientation".into(),
                options: vec![FormOption::new("Landscape", "L"), FormOption::new("Portrait", "P")],
                value: "L".into(),
            },
            SelectField {
                name: "paper_size".into(),
                label: "Paper Size".into(),
                options: vec![FormOption::new("A4", "A4"), FormOption::new("A3", "A3")],
                value: "A4".into(),
            },
        ];

        if !grouping.is_empty() {
            format.push(SelectField {
                name: "report_mode".into(),
                label: "Report Mode".into(),
                options: vec![
                    FormOption::new("Grouped", "grouped"),
                    FormOption::new("Summary", "summary"),
                ],
                value: "grouped".into(),
            });
            format.push(SelectField {
                name: "grouping_level".into(),
                label: "Grouping Levels".into(),
                options: (1..=grouping.depth())
                    .map(|n| FormOption::new(n.to_string(), n.to_string()))
                    .collect(),
                value: grouping.depth().to_string(),
            });
        }

        let filters = filters
            .iter()
            .map(|f| form_filter(f, resolver))
            .collect::<ReportResult<Vec<_>>>()?;

        let page_breaks = grouping
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| {
                let header = columns
                    .index_of(field)
                    .and_then(|p| columns.get(p))
                    .map(|c| c.header.as_str())
                    .unwrap_or(field.as_str());
                PageToggle {
                    name: format!("grouping_{}_newpage", i + 1),
                    label: format!("Start each {header} on a new page"),
                    level: i + 1,
                }
            })
            .collect();

        Ok(Self {
            title: title.to_string(),
            format,
            filters,
            page_breaks,
            submit: "Generate".into(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn option_select(filter: &FilterDefinition, options: &[(&str, &str)], value: &str) -> SelectField {
    SelectField {
        name: filter.param("option"),
        label: String::new(),
        options: options
            .iter()
            .map(|(label, value)| FormOption::new(*label, *value))
            .collect(),
        value: value.to_string(),
    }
}

fn form_filter(filter: &FilterDefinition, resolver: &dyn LookupResolver) -> ReportResult<FormFilter> {
    let (kind, option, value_params, choices) = match &filter.kind {
        FilterKind::Date { default_option } => (
            "date",
            Some(option_select(
                filter,
                &[
                    ("Before", "LESS"),
                    ("After", "GREATER"),
                    ("On", "EQUALS"),
                    ("Between", "BETWEEN"),
                ],
                default_option.as_deref().unwrap_or("EQUALS"),
            )),
            vec![filter.param("start_date"), filter.param("end_date")],
            Vec::new(),
        ),
        FilterKind::Referenced { lookup } => {
            let table = resolver.resolve_headers(lookup)?;
            (
                "referenced",
                Some(option_select(
                    filter,
                    &[("Is any of", "IS_ANY_OF"), ("Is none of", "IS_NONE_OF")],
                    "IS_ANY_OF",
                )),
                vec![filter.param("value")],
                table
                    .entries
                    .into_iter()
                    .map(|e| FormOption::new(e.label, e.key))
                    .collect(),
            )
        }
        FilterKind::Enumeration { options } => (
            "enumeration",
            Some(option_select(
                filter,
                &[("Is any of", "INCLUDE"), ("Is none of", "EXCLUDE")],
                "INCLUDE",
            )),
            vec![filter.param("value")],
            options
                .iter()
                .map(|e| FormOption::new(e.label.replace("\\n", " "), e.key.clone()))
                .collect(),
        ),
        FilterKind::Field => ("field", None, vec![filter.param("value")], Vec::new()),
    };

    Ok(FormFilter {
        name: filter.name.clone(),
        label: filter.label.clone(),
        kind: kind.to_string(),
        option,
        value_params,
        choices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PivotError, PivotResult};
    use crate::models::Column;
    use crate::store::LookupTable;
    use serde_json::json;

    struct Customers;

    impl LookupResolver for Customers {
        fn resolve_headers(&self, path: &str) -> PivotResult<LookupTable> {
            if path != "customers.name" {
                return Err(PivotError::UnknownModel(path.into()));
            }
            Ok(LookupTable {
                model: "customers".into(),
                key_field: "id".into(),
                entries: vec![LookupEntry::new("7", "Acme"), LookupEntry::new("9", "Globex")],
            })
        }
    }

    fn date_filter() -> FilterDefinition {
        serde_json::from_value(json!({
            "name": "sold",
            "label": "Sale date",
            "field": "sold_on",
            "type": "date"
        }))
        .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        RequestParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_date_between() {
        let clauses = date_filter()
            .to_clauses(&params(&[
                ("sold_option", "BETWEEN"),
                ("sold_start_date", "2024-01-01"),
                ("sold_end_date", "2024-03-31"),
            ]))
            .unwrap();
        assert_eq!(
            clauses,
            vec![FilterClause::new(
                "sold_on",
                FilterOperator::Between,
                vec!["2024-01-01".into(), "2024-03-31".into()]
            )]
        );
    }

    #[test]
    fn test_date_before_uses_start_date() {
        let clauses = date_filter()
            .to_clauses(&params(&[("sold_option", "less"), ("sold_start_date", "2024-02-01")]))
            .unwrap();
        assert_eq!(clauses[0].operator, FilterOperator::Less);
        assert_eq!(clauses[0].values, vec!["2024-02-01"]);
    }

    #[test]
    fn test_date_errors() {
        let bad_date = date_filter().to_clauses(&params(&[("sold_start_date", "01/02/2024")]));
        assert!(matches!(bad_date, Err(ReportError::InvalidParam { ref name, .. }) if name == "sold_start_date"));

        let half_range = date_filter().to_clauses(&params(&[
            ("sold_option", "BETWEEN"),
            ("sold_start_date", "2024-01-01"),
        ]));
        assert!(matches!(half_range, Err(ReportError::InvalidParam { ref name, .. }) if name == "sold_end_date"));
    }

    #[test]
    fn test_missing_values_contribute_nothing() {
        assert!(date_filter().to_clauses(&RequestParams::new()).unwrap().is_empty());

        let referenced = FilterDefinition {
            name: "customer".into(),
            label: "Customer".into(),
            field: "customer_id".into(),
            kind: FilterKind::Referenced {
                lookup: "customers.name".into(),
            },
        };
        assert!(referenced
            .to_clauses(&params(&[("customer_option", "IS_NONE_OF")]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_multi_value_filters() {
        let referenced = FilterDefinition {
            name: "customer".into(),
            label: "Customer".into(),
            field: "customer_id".into(),
            kind: FilterKind::Referenced {
                lookup: "customers.name".into(),
            },
        };
        let clauses = referenced
            .to_clauses(&params(&[
                ("customer_option", "IS_NONE_OF"),
                ("customer_value[]", "7"),
                ("customer_value[]", "9"),
            ]))
            .unwrap();
        assert_eq!(
            clauses,
            vec![FilterClause::new(
                "customer_id",
                FilterOperator::NotIn,
                vec!["7".into(), "9".into()]
            )]
        );

        let status = FilterDefinition {
            name: "status".into(),
            label: "Status".into(),
            field: "status".into(),
            kind: FilterKind::Enumeration {
                options: vec![LookupEntry::new("open", "Open")],
            },
        };
        let clauses = status.to_clauses(&params(&[("status_value", "open")])).unwrap();
        assert_eq!(clauses[0].operator, FilterOperator::In);
    }

    #[test]
    fn test_field_filter_equals() {
        let filter = FilterDefinition {
            name: "region".into(),
            label: "Region".into(),
            field: "region".into(),
            kind: FilterKind::Field,
        };
        let clauses = collect_clauses(&[filter], &params(&[("region_value", "North")])).unwrap();
        assert_eq!(clauses, vec![FilterClause::equals("region", "North")]);
    }

    #[test]
    fn test_form_lists_filters_and_page_toggles() {
        let columns = ColumnSpec::new(vec![
            Column::new("region", "Region"),
            Column::new("product", "Product"),
            Column::total("amount", "Amount"),
        ]);
        let filters = vec![
            date_filter(),
            FilterDefinition {
                name: "customer".into(),
                label: "Customer".into(),
                field: "customer_id".into(),
                kind: FilterKind::Referenced {
                    lookup: "customers.name".into(),
                },
            },
        ];
        let form = ReportForm::build(
            "Sales",
            &filters,
            &columns,
            &GroupingSpec::new(["region", "product"]),
            &Customers,
        )
        .unwrap();

        assert_eq!(form.format[0].value, "pdf");
        assert_eq!(form.filters[0].value_params, vec!["sold_start_date", "sold_end_date"]);
        assert_eq!(form.filters[1].choices[1], FormOption::new("Globex", "9"));
        assert_eq!(form.page_breaks[1].name, "grouping_2_newpage");
        assert_eq!(form.page_breaks[1].label, "Start each Product on a new page");
    }
}
