//! In-memory tabular store.
//!
//! Implements the two data collaborators of report generation:
//!
//! - [`DataSource`] - fetch rows for a field list, filter and sort
//! - [`LookupResolver`] - resolve `model.label_field` into `(key, label)` pairs
//!
//! Tables are loaded from CSV. Field names resolve against the queried table
//! either verbatim or with a `model.` prefix stripped, so lookup key columns
//! such as `months.month_id` find the `month_id` column of the data table.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CsvResult, FetchError, FetchResult, PivotError, PivotResult};
use crate::filters::{FilterClause, FilterOperator};
use crate::models::{cell_text, Cell, FieldList, LookupEntry, ReportRow};
use crate::parser;
use crate::report::pivot::split_lookup_path;

// =============================================================================
// Collaborator Traits
// =============================================================================

/// A data query: table, fields to return, conjunctive filter and sort order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub table: String,
    pub fields: FieldList,
    #[serde(default)]
    pub filter: Vec<FilterClause>,
    #[serde(default)]
    pub sort: Vec<String>,
}

impl Query {
    pub fn new(table: impl Into<String>, fields: FieldList) -> Self {
        Self {
            table: table.into(),
            fields,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: Vec<FilterClause>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: Vec<String>) -> Self {
        self.sort = sort;
        self
    }
}

/// Fetches positional rows, one cell per requested field.
pub trait DataSource {
    fn fetch(&self, query: &Query) -> FetchResult<Vec<ReportRow>>;
}

/// A resolved lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupTable {
    pub model: String,
    /// Field whose values data rows store
    pub key_field: String,
    /// `(key, label)` pairs in table order
    pub entries: Vec<LookupEntry>,
}

/// Resolves lookup paths of the form `model.label_field`.
pub trait LookupResolver {
    fn resolve_headers(&self, path: &str) -> PivotResult<LookupTable>;
}

// =============================================================================
// Tables
// =============================================================================

/// A named table of positional rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub name: String,
    pub fields: FieldList,
    pub rows: Vec<ReportRow>,
    /// Key field of the table; the first field unless set
    pub key_field: String,
}

impl Table {
    pub fn new(name: impl Into<String>, fields: FieldList, rows: Vec<ReportRow>) -> Self {
        let key_field = fields.first().cloned().unwrap_or_default();
        Self {
            name: name.into(),
            fields,
            rows,
            key_field,
        }
    }

    pub fn with_key_field(mut self, field: impl Into<String>) -> Self {
        self.key_field = field.into();
        self
    }

    /// Position of a field, accepting a `model.` prefix.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f == field)
            .or_else(|| {
                let (_, bare) = field.rsplit_once('.')?;
                self.fields.iter().position(|f| f == bare)
            })
    }

    fn require(&self, field: &str) -> FetchResult<usize> {
        self.position(field).ok_or_else(|| FetchError::UnknownField {
            table: self.name.clone(),
            field: field.to_string(),
        })
    }
}

/// Named tables held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Table>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Load a table from CSV bytes, detecting encoding and delimiter.
    pub fn load_csv_bytes(&mut self, name: &str, bytes: &[u8]) -> CsvResult<usize> {
        let parsed = parser::parse_bytes_auto(bytes)?;
        let count = parsed.rows.len();
        self.insert(Table::new(name, parsed.headers, parsed.rows));
        Ok(count)
    }

    /// Load a table from a CSV file.
    pub fn load_csv_file<P: AsRef<Path>>(&mut self, name: &str, path: P) -> CsvResult<usize> {
        let bytes = std::fs::read(path.as_ref())?;
        self.load_csv_bytes(name, &bytes)
    }
}

impl DataSource for MemoryStore {
    fn fetch(&self, query: &Query) -> FetchResult<Vec<ReportRow>> {
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| FetchError::UnknownTable(query.table.clone()))?;

        let positions = query
            .fields
            .iter()
            .map(|f| table.require(f))
            .collect::<FetchResult<Vec<_>>>()?;
        let filters = query
            .filter
            .iter()
            .map(|c| table.require(&c.field).map(|p| (p, c)))
            .collect::<FetchResult<Vec<_>>>()?;
        let sort = query
            .sort
            .iter()
            .map(|f| table.require(f))
            .collect::<FetchResult<Vec<_>>>()?;

        let mut rows: Vec<&ReportRow> = table
            .rows
            .iter()
            .filter(|row| {
                filters
                    .iter()
                    .all(|(p, clause)| matches_clause(row.get(*p).and_then(Option::as_ref), clause))
            })
            .collect();

        let sort: Vec<(usize, SortKind)> = sort
            .into_iter()
            .map(|p| (p, SortKind::of_column(&rows, p)))
            .collect();
        rows.sort_by(|a, b| {
            sort.iter()
                .map(|&(p, kind)| compare_cells(kind, cell_at(a, p), cell_at(b, p)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(rows
            .into_iter()
            .map(|row| positions.iter().map(|&p| cell_at(row, p).clone()).collect())
            .collect())
    }
}

impl LookupResolver for MemoryStore {
    fn resolve_headers(&self, path: &str) -> PivotResult<LookupTable> {
        let (model, field) = split_lookup_path(path)?;
        let table = self
            .tables
            .get(model)
            .ok_or_else(|| PivotError::UnknownModel(model.to_string()))?;
        let unknown = |f: &str| PivotError::UnknownField {
            model: model.to_string(),
            field: f.to_string(),
        };
        let label = table.position(field).ok_or_else(|| unknown(field))?;
        let key = table
            .position(&table.key_field)
            .ok_or_else(|| unknown(table.key_field.as_str()))?;

        Ok(LookupTable {
            model: model.to_string(),
            key_field: table.key_field.clone(),
            entries: table
                .rows
                .iter()
                .map(|row| {
                    LookupEntry::new(cell_text(cell_at(row, key)), cell_text(cell_at(row, label)))
                })
                .collect(),
        })
    }
}

// =============================================================================
// Comparison
// =============================================================================

const NULL: Cell = None;

fn cell_at(row: &ReportRow, position: usize) -> &Cell {
    row.get(position).unwrap_or(&NULL)
}

fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Compare two values: numerically, then as dates, then as text.
pub fn compare_values(a: &str, b: &str) -> Ordering {
    if let (Some(x), Some(y)) = (parse_numeric(a), parse_numeric(b)) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    if let (Some(x), Some(y)) = (parse_date(a), parse_date(b)) {
        return x.cmp(&y);
    }
    a.cmp(b)
}

/// How one sort column is ordered, decided once over all fetched values.
///
/// Equal typed values fall back to text order, so the sort is total and
/// rows holding the same text always end up next to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortKind {
    Numeric,
    Date,
    Text,
}

impl SortKind {
    fn of_column(rows: &[&ReportRow], position: usize) -> Self {
        let values = || rows.iter().filter_map(|r| cell_at(r, position).as_deref());
        if values().all(|v| parse_numeric(v).is_some()) {
            Self::Numeric
        } else if values().all(|v| parse_date(v).is_some()) {
            Self::Date
        } else {
            Self::Text
        }
    }

    fn compare(self, a: &str, b: &str) -> Ordering {
        let typed = match self {
            Self::Numeric => match (parse_numeric(a), parse_numeric(b)) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => Ordering::Equal,
            },
            Self::Date => match (parse_date(a), parse_date(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => Ordering::Equal,
            },
            Self::Text => Ordering::Equal,
        };
        typed.then_with(|| a.cmp(b))
    }
}

/// Nulls sort first.
fn compare_cells(kind: SortKind, a: &Cell, b: &Cell) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => kind.compare(x, y),
    }
}

/// Whether a cell satisfies a clause. Null only satisfies `NotIn`.
fn matches_clause(cell: Option<&String>, clause: &FilterClause) -> bool {
    let Some(value) = cell else {
        return clause.operator == FilterOperator::NotIn;
    };
    let first = clause.values.first().map(String::as_str);
    let cmp = |other: &str| compare_values(value, other);

    match clause.operator {
        FilterOperator::Equals => first.is_some_and(|v| cmp(v) == Ordering::Equal),
        FilterOperator::Less => first.is_some_and(|v| cmp(v) == Ordering::Less),
        FilterOperator::Greater => first.is_some_and(|v| cmp(v) == Ordering::Greater),
        FilterOperator::Between => match (first, clause.values.get(1)) {
            (Some(low), Some(high)) => cmp(low) != Ordering::Less && cmp(high) != Ordering::Greater,
            _ => false,
        },
        FilterOperator::In => clause.values.iter().any(|v| cmp(v) == Ordering::Equal),
        FilterOperator::NotIn => clause.values.iter().all(|v| cmp(v) != Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sales_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .load_csv_bytes(
                "sales",
                b"id,region,product,month_id,amount,sold_on\n\
                  1,South,Widget,1,500,2024-02-10\n\
                  2,North,Widget,2,\"1,200\",2024-01-15\n\
                  3,North,Gadget,1,800,2024-03-01\n\
                  4,East,Gizmo,,90,2023-12-31\n",
            )
            .unwrap();
        store
            .load_csv_bytes("months", b"month_id,name\n1,Jan\n2,Feb\n")
            .unwrap();
        store
    }

    fn texts(rows: &[ReportRow]) -> Vec<Vec<&str>> {
        rows.iter().map(|r| r.iter().map(cell_text).collect()).collect()
    }

    #[test]
    fn test_fetch_projects_and_sorts() {
        let store = sales_store();
        let query = Query::new("sales", vec!["region".into(), "product".into(), "amount".into()])
            .with_sort(vec!["region".into(), "product".into()]);

        let rows = store.fetch(&query).unwrap();
        assert_eq!(
            texts(&rows),
            vec![
                vec!["East", "Gizmo", "90"],
                vec!["North", "Gadget", "800"],
                vec!["North", "Widget", "1,200"],
                vec!["South", "Widget", "500"],
            ]
        );
    }

    #[test]
    fn test_numeric_sort_strips_separators() {
        let store = sales_store();
        let query = Query::new("sales", vec!["amount".into()]).with_sort(vec!["amount".into()]);
        let rows = store.fetch(&query).unwrap();
        assert_eq!(texts(&rows), vec![vec!["90"], vec!["500"], vec!["800"], vec!["1,200"]]);
    }

    fn sorted_codes(codes: &[&str]) -> Vec<String> {
        let mut csv = String::from("code\n");
        for code in codes {
            csv.push_str(code);
            csv.push('\n');
        }
        let mut store = MemoryStore::new();
        store.load_csv_bytes("codes", csv.as_bytes()).unwrap();
        let rows = store
            .fetch(&Query::new("codes", vec!["code".into()]).with_sort(vec!["code".into()]))
            .unwrap();
        rows.into_iter().map(|r| cell_text(&r[0]).to_string()).collect()
    }

    #[test]
    fn test_equal_numbers_with_different_text_stay_apart() {
        assert_eq!(sorted_codes(&["1", "1.0", "1"]), vec!["1", "1", "1.0"]);
    }

    #[test]
    fn test_mixed_column_sorts_as_text() {
        assert_eq!(
            sorted_codes(&["1a", "10", "9", "1a", "9", "10"]),
            vec!["10", "10", "1a", "1a", "9", "9"]
        );
        assert_eq!(sorted_codes(&["10", "9", "9"]), vec!["9", "9", "10"]);
    }

    #[test]
    fn test_nulls_sort_first() {
        let store = sales_store();
        let rows = store
            .fetch(
                &Query::new("sales", vec!["id".into(), "month_id".into()])
                    .with_sort(vec!["month_id".into(), "id".into()]),
            )
            .unwrap();
        assert_eq!(
            texts(&rows),
            vec![vec!["4", ""], vec!["1", "1"], vec!["3", "1"], vec!["2", "2"]]
        );
    }

    #[test]
    fn test_model_prefixed_fields_resolve() {
        let store = sales_store();
        let rows = store
            .fetch(&Query::new("sales", vec!["id".into(), "months.month_id".into()]))
            .unwrap();
        assert_eq!(rows[0], vec![Some("1".to_string()), Some("1".to_string())]);
        assert_eq!(rows[3][1], None);
    }

    #[test]
    fn test_filters() {
        let store = sales_store();
        let fetch_ids = |filter: Vec<FilterClause>| {
            let rows = store
                .fetch(&Query::new("sales", vec!["id".into()]).with_filter(filter))
                .unwrap();
            rows.into_iter()
                .map(|r| r[0].clone().unwrap_or_default())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            fetch_ids(vec![FilterClause::new(
                "sold_on",
                FilterOperator::Between,
                vec!["2024-01-01".into(), "2024-02-10".into()]
            )]),
            vec!["1", "2"]
        );
        assert_eq!(
            fetch_ids(vec![FilterClause::new("amount", FilterOperator::Greater, vec!["800".into()])]),
            vec!["2"]
        );
        assert_eq!(
            fetch_ids(vec![FilterClause::new(
                "month_id",
                FilterOperator::NotIn,
                vec!["1".into()]
            )]),
            vec!["2", "4"]
        );
        assert_eq!(
            fetch_ids(vec![
                FilterClause::new("region", FilterOperator::In, vec!["North".into(), "East".into()]),
                FilterClause::equals("product", "Widget"),
            ]),
            vec!["2"]
        );
    }

    #[test]
    fn test_unknown_table_and_field() {
        let store = sales_store();
        assert!(matches!(
            store.fetch(&Query::new("orders", vec![])),
            Err(FetchError::UnknownTable(t)) if t == "orders"
        ));
        assert!(matches!(
            store.fetch(&Query::new("sales", vec!["price".into()])),
            Err(FetchError::UnknownField { ref field, .. }) if field == "price"
        ));
    }

    #[test]
    fn test_resolve_headers() {
        let store = sales_store();
        let lookup = store.resolve_headers("months.name").unwrap();
        assert_eq!(lookup.key_field, "month_id");
        assert_eq!(
            lookup.entries,
            vec![LookupEntry::new("1", "Jan"), LookupEntry::new("2", "Feb")]
        );

        assert!(matches!(
            store.resolve_headers("weeks.name"),
            Err(PivotError::UnknownModel(_))
        ));
        assert!(matches!(
            store.resolve_headers("months.label"),
            Err(PivotError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_resolve_headers_with_explicit_key() {
        let mut store = MemoryStore::new();
        store.insert(
            Table::new(
                "regions",
                vec!["name".into(), "code".into()],
                vec![
                    vec![Some("North".into()), Some("N".into())],
                    vec![Some("South".into()), Some("S".into())],
                ],
            )
            .with_key_field("code"),
        );

        let lookup = store.resolve_headers("regions.name").unwrap();
        assert_eq!(lookup.key_field, "code");
        assert_eq!(lookup.entries[1], LookupEntry::new("S", "South"));
    }

    #[test]
    fn test_load_csv_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "code;label").unwrap();
        writeln!(file, "A;Alpha").unwrap();
        writeln!(file, "B;Beta").unwrap();

        let mut store = MemoryStore::new();
        assert_eq!(store.load_csv_file("codes", file.path()).unwrap(), 2);
        assert_eq!(store.table("codes").unwrap().key_field, "code");
        assert_eq!(store.table_names(), vec!["codes"]);
    }

    #[test]
    fn test_compare_values() {
        assert_eq!(compare_values("9", "10"), Ordering::Less);
        assert_eq!(compare_values("2024-01-02", "2023-12-31"), Ordering::Greater);
        assert_eq!(compare_values("apple", "banana"), Ordering::Less);
    }
}
