//! Domain models for the report generation pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`ReportRow`] - One positional row of cells, aligned to a field list
//! - [`Column`] / [`ColumnSpec`] - Per-column metadata (header, type, total, width)
//! - [`GroupingSpec`] - Ordered grouping fields defining the nesting depth
//! - [`DynamicFieldSpec`] - A resolved pivot expansion over a lookup table
//! - [`RenderInstruction`] - What the engine hands to the output sink

use serde::{Deserialize, Serialize};

use crate::error::{DefinitionError, DefinitionResult, GroupingError, GroupingResult};

// =============================================================================
// Rows and Fields
// =============================================================================

/// A single scalar cell. `None` is a null cell.
pub type Cell = Option<String>;

/// An ordered sequence of cells, positionally aligned to a [`FieldList`].
pub type ReportRow = Vec<Cell>;

/// Ordered sequence of column identifiers.
pub type FieldList = Vec<String>;

/// Text of a cell, with null rendered as the empty string.
pub fn cell_text(cell: &Cell) -> &str {
    cell.as_deref().unwrap_or("")
}

// =============================================================================
// Column Metadata
// =============================================================================

/// Data type of a column, as declared by the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    String,
    Number,
    Date,
}

/// Metadata of one report column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column identifier, as requested from the data source
    pub field: String,

    /// Display header
    pub header: String,

    /// Declared data type
    #[serde(rename = "type", default)]
    pub kind: ColumnType,

    /// Whether the column participates in totals
    #[serde(default)]
    pub total: bool,

    /// Relative display width
    #[serde(default = "default_width")]
    pub width: f64,
}

fn default_width() -> f64 {
    1.0
}

impl Column {
    /// Create a string column with default width.
    pub fn new(field: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header: header.into(),
            kind: ColumnType::String,
            total: false,
            width: default_width(),
        }
    }

    /// Create a numeric column that participates in totals.
    pub fn total(field: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            kind: ColumnType::Number,
            total: true,
            ..Self::new(field, header)
        }
    }

    /// Set the display width.
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }
}

/// Column metadata for every field of a report, in field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnSpec {
    columns: Vec<Column>,
}

impl ColumnSpec {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Build column metadata from the parallel arrays a report declares.
    ///
    /// Every array must have exactly one entry per field.
    pub fn from_parallel(
        fields: &[String],
        headers: &[String],
        types: &[ColumnType],
        totals: &[bool],
        widths: &[f64],
    ) -> DefinitionResult<Self> {
        let n = fields.len();
        if headers.len() != n || types.len() != n || totals.len() != n || widths.len() != n {
            return Err(DefinitionError::ColumnCountMismatch {
                fields: n,
                headers: headers.len(),
                types: types.len(),
                totals: totals.len(),
                widths: widths.len(),
            });
        }

        let columns = (0..n)
            .map(|i| Column {
                field: fields[i].clone(),
                header: headers[i].clone(),
                kind: types[i],
                total: totals[i],
                width: widths[i],
            })
            .collect();

        Ok(Self { columns })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    /// Field identifiers in column order.
    pub fn fields(&self) -> FieldList {
        self.columns.iter().map(|c| c.field.clone()).collect()
    }

    /// Display headers in column order.
    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.header.clone()).collect()
    }

    /// Total flags in column order.
    pub fn total_flags(&self) -> Vec<bool> {
        self.columns.iter().map(|c| c.total).collect()
    }

    /// Position of a field, if present.
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    /// Metadata of the given positions, in the given order.
    pub fn project(&self, positions: &[usize]) -> Vec<Column> {
        positions
            .iter()
            .filter_map(|&i| self.columns.get(i).cloned())
            .collect()
    }
}

impl FromIterator<Column> for ColumnSpec {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// =============================================================================
// Grouping
// =============================================================================

/// Ordered grouping fields. Level 0 is the outermost group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupingSpec {
    fields: Vec<String>,
}

impl GroupingSpec {
    /// Create a grouping spec. An empty field name ends the sequence.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = fields
            .into_iter()
            .map(Into::into)
            .take_while(|f: &String| !f.trim().is_empty())
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Number of grouping levels.
    pub fn depth(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Grouping field at a level.
    pub fn field(&self, level: usize) -> Option<&str> {
        self.fields.get(level).map(String::as_str)
    }

    /// Whether `level` is the deepest grouping level.
    pub fn is_leaf(&self, level: usize) -> bool {
        self.field(level + 1).is_none()
    }

    /// Keep only the outermost `levels` grouping levels.
    pub fn truncated(&self, levels: usize) -> Self {
        Self {
            fields: self.fields.iter().take(levels).cloned().collect(),
        }
    }

    /// Resolve grouping fields to column positions.
    pub fn resolve(&self, columns: &ColumnSpec) -> GroupingResult<Vec<usize>> {
        self.fields
            .iter()
            .map(|f| {
                columns
                    .index_of(f)
                    .ok_or_else(|| GroupingError::UnknownField(f.clone()))
            })
            .collect()
    }
}

// =============================================================================
// Dynamic Fields
// =============================================================================

/// One entry of a lookup table: the key stored in data rows and its label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub key: String,
    pub label: String,
}

impl LookupEntry {
    pub fn new(key: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
        }
    }
}

/// How a block made of a single row is expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingletonMode {
    /// Match the row's key against the lookup like any other block
    #[default]
    Match,
    /// Duplicate the row's value across every lookup column
    Broadcast,
}

/// A dynamic field as declared by a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicHeader {
    /// Lookup path `model.label_field`
    pub lookup: String,

    /// Value column to redistribute over the lookup entries
    pub field: String,

    #[serde(default)]
    pub singleton: SingletonMode,
}

/// A dynamic field resolved against its lookup table and the query fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DynamicFieldSpec {
    /// Value column to redistribute
    pub field: String,

    /// Lookup path it was resolved from
    pub lookup: String,

    /// Lookup entries, in output column order
    pub headers: Vec<LookupEntry>,

    /// Position of the value column in fetched rows
    pub replace_index: usize,

    /// Position of the appended lookup key column in fetched rows
    pub key_index: usize,

    pub singleton: SingletonMode,
}

impl DynamicFieldSpec {
    /// Number of columns this field expands into.
    pub fn num_fields(&self) -> usize {
        self.headers.len()
    }

    /// Field name of the column expanded for one lookup entry.
    pub fn expanded_field(&self, entry: &LookupEntry) -> String {
        format!("{}_{}", self.field, entry.key)
    }

    /// Field names of every expanded column, in lookup order.
    pub fn expanded_fields(&self) -> Vec<String> {
        self.headers.iter().map(|e| self.expanded_field(e)).collect()
    }
}

// =============================================================================
// Render Instructions
// =============================================================================

/// A table handed to the output sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableContent {
    pub headers: Vec<String>,
    pub rows: Vec<ReportRow>,
    pub columns: Vec<Column>,

    /// Set for the totals row of a just-closed group
    #[serde(default)]
    pub is_totals_box: bool,

    /// Group label of a totals box
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl TableContent {
    /// Create a data table over the given columns.
    pub fn new(columns: Vec<Column>, rows: Vec<ReportRow>) -> Self {
        Self {
            headers: columns.iter().map(|c| c.header.clone()).collect(),
            rows,
            columns,
            is_totals_box: false,
            label: None,
        }
    }

    /// Create a single-row totals box.
    pub fn totals_box(columns: Vec<Column>, row: ReportRow, label: impl Into<String>) -> Self {
        Self {
            is_totals_box: true,
            label: Some(label.into()),
            ..Self::new(columns, vec![row])
        }
    }
}

/// One step of report output, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderInstruction {
    /// Group heading at a nesting level
    Heading { text: String, level: usize },

    /// A data table or a totals box
    Table(TableContent),

    /// Start a new page before the next group of `level` (1-based)
    PageBreak { level: usize },
}

impl RenderInstruction {
    pub fn heading(text: impl Into<String>, level: usize) -> Self {
        Self::Heading {
            text: text.into(),
            level,
        }
    }

    pub fn as_table(&self) -> Option<&TableContent> {
        match self {
            Self::Table(t) => Some(t),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_from_parallel_builds_columns() {
        let spec = ColumnSpec::from_parallel(
            &s(&["region", "amount"]),
            &s(&["Region", "Amount"]),
            &[ColumnType::String, ColumnType::Number],
            &[false, true],
            &[30.0, 20.0],
        )
        .unwrap();

        assert_eq!(spec.len(), 2);
        assert_eq!(spec.fields(), s(&["region", "amount"]));
        assert_eq!(spec.total_flags(), vec![false, true]);
        assert_eq!(spec.get(1).unwrap().width, 20.0);
    }

    #[test]
    fn test_from_parallel_rejects_length_mismatch() {
        let result = ColumnSpec::from_parallel(
            &s(&["region", "amount"]),
            &s(&["Region"]),
            &[ColumnType::String, ColumnType::Number],
            &[false, true],
            &[30.0, 20.0],
        );
        assert!(matches!(
            result,
            Err(DefinitionError::ColumnCountMismatch { fields: 2, headers: 1, .. })
        ));
    }

    #[test]
    fn test_grouping_stops_at_empty_field() {
        let grouping = GroupingSpec::new(["region", "", "product"]);
        assert_eq!(grouping.depth(), 1);
        assert!(grouping.is_leaf(0));
    }

    #[test]
    fn test_grouping_resolve() {
        let spec = ColumnSpec::new(vec![
            Column::new("region", "Region"),
            Column::new("product", "Product"),
            Column::total("amount", "Amount"),
        ]);
        let grouping = GroupingSpec::new(["product", "region"]);
        assert_eq!(grouping.resolve(&spec).unwrap(), vec![1, 0]);

        let unknown = GroupingSpec::new(["city"]);
        assert!(matches!(
            unknown.resolve(&spec),
            Err(GroupingError::UnknownField(f)) if f == "city"
        ));
    }

    #[test]
    fn test_instruction_serialization_is_tagged() {
        let heading = RenderInstruction::heading("North", 0);
        let json = serde_json::to_value(&heading).unwrap();
        assert_eq!(json["kind"], "heading");
        assert_eq!(json["text"], "North");

        let table = RenderInstruction::Table(TableContent::new(
            vec![Column::total("amount", "Amount")],
            vec![vec![Some("1,200".into())]],
        ));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["kind"], "table");
        assert_eq!(json["headers"][0], "Amount");
        assert_eq!(json["is_totals_box"], false);
    }

    #[test]
    fn test_column_deserialize_defaults() {
        let col: Column = serde_json::from_str(r#"{"field": "name", "header": "Name"}"#).unwrap();
        assert_eq!(col.kind, ColumnType::String);
        assert!(!col.total);
        assert_eq!(col.width, 1.0);
    }
}
