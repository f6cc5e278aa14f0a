//! Report aggregation engine.
//!
//! - [`pivot`] - Dynamic field expansion over lookup tables
//! - [`totals`] - Column totals and their propagation to parent groups
//! - [`grouping`] - Nested headings, leaf tables and totals boxes
//! - [`summary`] - Flat one-row-per-group overview
//! - [`definition`] - Declared reports (columns, grouping, filters)
//! - [`pipeline`] - Request orchestration into a sink

pub mod definition;
pub mod grouping;
pub mod pipeline;
pub mod pivot;
pub mod summary;
pub mod totals;

pub use definition::{example_definition, ReportDefinition};
pub use grouping::GroupingEngine;
pub use pipeline::{build_form, generate_report, render_document, GrandTotal, ReportMode, ReportOutcome};
pub use pivot::PivotPlan;
pub use summary::SummaryDigester;
pub use totals::{format_total, parse_number, Totals};
