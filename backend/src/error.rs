//! Error types for the report generation pipeline.
//!
//! One error enum per layer:
//!
//! - [`CsvError`] - CSV loading errors
//! - [`DefinitionError`] - Invalid report definitions (columns, fields)
//! - [`FetchError`] - Data-fetch collaborator errors
//! - [`PivotError`] - Dynamic field (lookup) expansion errors
//! - [`GroupingError`] - Grouping walk errors (unsorted input)
//! - [`ReportError`] - Top-level orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Loading Errors
// =============================================================================

/// Errors while loading tabular data from CSV.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to decode the file contents.
    #[error("Failed to decode content: {0}")]
    EncodingError(String),

    /// Invalid CSV format.
    #[error("Invalid CSV format at line {line}: {message}")]
    ParseError { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Definition Errors
// =============================================================================

/// Errors in a report definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// Parallel column metadata arrays disagree in length.
    #[error("Column metadata mismatch: {fields} fields but {headers} headers, {types} types, {totals} total flags, {widths} widths")]
    ColumnCountMismatch {
        fields: usize,
        headers: usize,
        types: usize,
        totals: usize,
        widths: usize,
    },

    /// A referenced field is not part of the field list.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// The same field appears twice in the field list.
    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    /// The definition declares no columns.
    #[error("Report definition has no columns")]
    NoColumns,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors from the data-fetch collaborator.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Requested table does not exist.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Requested field does not exist in the table.
    #[error("Unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },
}

// =============================================================================
// Pivot Errors
// =============================================================================

/// Errors while expanding dynamic fields.
///
/// These are configuration errors and are never retried.
#[derive(Debug, Error)]
pub enum PivotError {
    /// Lookup path is not of the form `model.field`.
    #[error("Invalid lookup path '{0}', expected 'model.field'")]
    InvalidPath(String),

    /// Lookup model cannot be resolved.
    #[error("Unknown lookup model: {0}")]
    UnknownModel(String),

    /// Lookup field cannot be resolved on the model.
    #[error("Unknown lookup field '{field}' on model '{model}'")]
    UnknownField { model: String, field: String },

    /// The value column to redistribute is not in the field list.
    #[error("Dynamic value field '{0}' is not part of the report fields")]
    MissingValueField(String),

    /// Two dynamic fields redistribute the same value column.
    #[error("Value field '{0}' is pivoted more than once")]
    DuplicateValueField(String),

    /// An expanded column name is already taken by another column.
    #[error("Expanded column '{0}' collides with an existing column")]
    ColumnCollision(String),

    /// A fetched row does not match the query field list.
    #[error("Row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

// =============================================================================
// Grouping Errors
// =============================================================================

/// Errors during the grouping walk.
#[derive(Debug, Error)]
pub enum GroupingError {
    /// Rows are not contiguous per grouping key.
    #[error("Rows not sorted by grouping key: row {row} reopens group '{value}' of field '{field}' (level {level})")]
    Unsorted {
        row: usize,
        level: usize,
        field: String,
        value: String,
    },

    /// A grouping field is not part of the field list.
    #[error("Unknown grouping field: {0}")]
    UnknownField(String),
}

// =============================================================================
// Report Errors (top-level)
// =============================================================================

/// Top-level report generation errors.
///
/// This is the main error type returned by [`crate::report::pipeline::generate_report`].
/// It wraps all lower-level errors and adds request-specific variants.
#[derive(Debug, Error)]
pub enum ReportError {
    /// CSV loading error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Definition error.
    #[error("Definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// Data-fetch error.
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Pivot error.
    #[error("Pivot error: {0}")]
    Pivot(#[from] PivotError),

    /// Grouping error.
    #[error("Grouping error: {0}")]
    Grouping(#[from] GroupingError),

    /// A request parameter holds an unusable value.
    #[error("Invalid value '{value}' for parameter '{name}'")]
    InvalidParam { name: String, value: String },
}

impl ReportError {
    pub fn invalid_param(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidParam {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Report error.
    #[error("Report error: {0}")]
    Report(#[from] ReportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for definition handling.
pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Result type for data fetching.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for pivot operations.
pub type PivotResult<T> = Result<T, PivotError>;

/// Result type for grouping operations.
pub type GroupingResult<T> = Result<T, GroupingError>;

/// Result type for report generation.
pub type ReportResult<T> = Result<T, ReportError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        // CsvError -> ReportError
        let csv_err = CsvError::EmptyFile;
        let report_err: ReportError = csv_err.into();
        assert!(report_err.to_string().contains("empty"));

        // PivotError -> ReportError
        let pivot_err = PivotError::UnknownModel("months".into());
        let report_err: ReportError = pivot_err.into();
        assert!(report_err.to_string().contains("months"));

        // ReportError -> ServerError
        let server_err: ServerError = ReportError::invalid_param("report_format", "rtf").into();
        assert!(server_err.to_string().contains("rtf"));
    }

    #[test]
    fn test_unsorted_error_format() {
        let err = GroupingError::Unsorted {
            row: 3,
            level: 0,
            field: "region".into(),
            value: "North".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("not sorted"));
        assert!(msg.contains("North"));
        assert!(msg.contains("region"));
    }

    #[test]
    fn test_column_mismatch_format() {
        let err = DefinitionError::ColumnCountMismatch {
            fields: 3,
            headers: 3,
            types: 2,
            totals: 3,
            widths: 3,
        };
        assert!(err.to_string().contains("2 types"));
    }
}
