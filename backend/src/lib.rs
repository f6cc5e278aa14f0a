//! # Reportkit - grouped report generation
//!
//! Reportkit turns flat tabular query results into grouped reports: lookup
//! data is pivoted into wide columns, rows are nested by grouping fields and
//! every group is closed by a totals box. The engine only emits render
//! instructions; turning them into PDF, HTML, XLS or DOC is left to the sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ DataSource  │────▶│   Pivot     │────▶│  Grouping   │────▶│ ReportSink  │
//! │ (fetch rows)│     │ (lookups)   │     │ (+ totals)  │     │ (instrs)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                                    └──▶ Summary (report_mode=summary)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use reportkit::{example_definition, render_document, MemoryStore, RequestParams};
//!
//! let mut store = MemoryStore::new();
//! store.load_csv_file("sales", "sales.csv")?;
//! let params = RequestParams::from_pairs([("report_format", "html")]);
//! let (document, outcome) = render_document(&example_definition(), &params, &store)?;
//! println!("{} instructions", outcome.instructions);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, columns, grouping and render instructions
//! - [`params`] - Request parameters
//! - [`filters`] - Filter clauses and the options form
//! - [`sink`] - Output formats and instruction sinks
//! - [`store`] - In-memory data source and lookup resolution
//! - [`parser`] - CSV parsing with auto-detection
//! - [`report`] - Pivot, totals, grouping, summary and the pipeline
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod params;

// Data
pub mod filters;
pub mod parser;
pub mod store;

// Engine
pub mod report;
pub mod sink;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    CsvError, DefinitionError, FetchError, GroupingError, PivotError, ReportError, ReportResult,
    ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    Cell, Column, ColumnSpec, ColumnType, DynamicFieldSpec, DynamicHeader, FieldList,
    GroupingSpec, LookupEntry, RenderInstruction, ReportRow, SingletonMode, TableContent,
};
pub use params::RequestParams;

// =============================================================================
// Re-exports - Data
// =============================================================================

pub use filters::{FilterClause, FilterDefinition, FilterKind, FilterOperator, ReportForm};
pub use parser::{parse_bytes_auto, parse_file_auto, parse_str, CsvTable};
pub use store::{DataSource, LookupResolver, LookupTable, MemoryStore, Query, Table};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use report::{
    build_form, example_definition, generate_report, render_document, GrandTotal,
    GroupingEngine, PivotPlan, ReportDefinition, ReportMode, ReportOutcome, SummaryDigester,
    Totals,
};
pub use sink::{DocumentKind, ReportDocument, ReportFormat, ReportSink};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
