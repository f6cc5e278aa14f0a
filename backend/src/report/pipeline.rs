//! Report generation pipeline.
//!
//! Orchestrates one report request from definition and parameters to render
//! instructions:
//!
//! ```text
//! definition + params
//!       │
//!       ▼
//! PivotPlan::prepare ──▶ DataSource::fetch ──▶ PivotPlan::expand
//!                                                    │
//!                           ┌────────────────────────┴──────────────┐
//!                           ▼                                       ▼
//!                   GroupingEngine::run                   SummaryDigester::run
//!                           │        (report_mode=summary)          │
//!                           └───────────────▶ ReportSink ◀──────────┘
//! ```
//!
//! All working state lives in this call; nothing is shared between requests.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::logs::{log_info, log_info_indent, log_success, log_warning};
use crate::error::{ReportError, ReportResult};
use crate::filters::{collect_clauses, ReportForm};
use crate::models::{ColumnSpec, GroupingSpec, RenderInstruction};
use crate::params::RequestParams;
use crate::sink::{ReportDocument, ReportSink};
use crate::store::{DataSource, LookupResolver, Query};

use super::definition::ReportDefinition;
use super::grouping::GroupingEngine;
use super::pivot::PivotPlan;
use super::summary::SummaryDigester;
use super::totals::Totals;

/// Which table layout was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Grouped,
    Summary,
}

/// Grand total of one total column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrandTotal {
    pub field: String,
    pub header: String,
    pub value: f64,
}

/// What a generation run produced, besides its render instructions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub title: String,
    pub mode: ReportMode,
    /// Rows returned by the data source
    pub fetched_rows: usize,
    /// Rows after dynamic field expansion
    pub report_rows: usize,
    /// Instructions handed to the sink
    pub instructions: usize,
    pub grand_totals: Vec<GrandTotal>,
    pub generated_at: DateTime<Utc>,
}

/// Request options resolved against the expanded columns.
#[derive(Debug, Clone)]
struct ReportOptions {
    mode: ReportMode,
    grouping: GroupingSpec,
    page_breaks: Vec<usize>,
    ignored: Vec<usize>,
}

impl ReportOptions {
    fn resolve(
        definition: &ReportDefinition,
        params: &RequestParams,
        plan: &PivotPlan,
        columns: &ColumnSpec,
    ) -> ReportResult<Self> {
        let mode = if params.summary_mode()? {
            ReportMode::Summary
        } else {
            ReportMode::Grouped
        };
        if mode == ReportMode::Summary && definition.grouping.is_empty() {
            return Err(ReportError::invalid_param("report_mode", "summary"));
        }

        let grouping = match params.grouping_level()? {
            Some(0) => return Err(ReportError::invalid_param("grouping_level", "0")),
            Some(levels) => definition.grouping.truncated(levels),
            None => definition.grouping.clone(),
        };

        let mut ignored = Vec::new();
        for name in params.list("ignored_fields") {
            // A pivoted field stands for all of its expanded columns.
            let expanded: Vec<String> = plan
                .dynamic_fields()
                .iter()
                .filter(|d| d.field == name)
                .flat_map(|d| d.expanded_fields())
                .collect();
            let positions: Vec<usize> = columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.field == name || expanded.contains(&c.field))
                .map(|(i, _)| i)
                .collect();
            if positions.is_empty() {
                log_warning(format!("Ignored field '{name}' is not a report column"));
            }
            ignored.extend(positions);
        }

        Ok(Self {
            mode,
            grouping,
            page_breaks: params.page_break_levels(),
            ignored,
        })
    }
}

/// Fetch order: grouping fields, then the declared sort.
///
/// With dynamic fields the rows of one block must arrive contiguous, so every
/// block field is sorted on before any declared sort field that is pivoted
/// or not a report column.
fn fetch_order(definition: &ReportDefinition, plan: &PivotPlan) -> Vec<String> {
    let declared = definition.sort_fields();
    if plan.is_identity() {
        return declared;
    }

    let block = plan.block_fields();
    let (mut order, rest): (Vec<String>, Vec<String>) =
        declared.into_iter().partition(|f| block.contains(f));
    for field in block {
        if !order.contains(&field) {
            order.push(field);
        }
    }
    order.extend(rest);
    order
}

/// Forwards instructions while counting them.
struct CountingSink<'s> {
    inner: &'s mut dyn ReportSink,
    count: usize,
}

impl ReportSink for CountingSink<'_> {
    fn add(&mut self, instruction: RenderInstruction) {
        self.count += 1;
        self.inner.add(instruction);
    }
}

/// Generate a report into the given sink.
pub fn generate_report(
    definition: &ReportDefinition,
    params: &RequestParams,
    source: &dyn DataSource,
    resolver: &dyn LookupResolver,
    sink: &mut dyn ReportSink,
) -> ReportResult<ReportOutcome> {
    log_info(format!("📊 Generating report \"{}\"", definition.title));
    definition.validate()?;

    let headers = definition.dynamic_headers();
    let plan = PivotPlan::prepare(&definition.columns, &headers, resolver)?;
    for spec in plan.dynamic_fields() {
        log_info_indent(
            format!("{} → {} columns from {}", spec.field, spec.num_fields(), spec.lookup),
            1,
        );
    }
    let columns = plan.expanded_columns();
    let options = ReportOptions::resolve(definition, params, &plan, &columns)?;

    let query = Query::new(definition.model.clone(), plan.query_fields().to_vec())
        .with_filter(collect_clauses(&definition.filters, params)?)
        .with_sort(fetch_order(definition, &plan));
    if !query.filter.is_empty() {
        log_info_indent(format!("{} filter clause(s)", query.filter.len()), 1);
    }

    let fetched = source.fetch(&query)?;
    let fetched_rows = fetched.len();
    log_success(format!("Fetched {} rows from '{}'", fetched_rows, definition.model));

    let rows = plan.expand(fetched)?;
    if !plan.is_identity() {
        log_success(format!("Expanded into {} rows", rows.len()));
    }

    let mut counting = CountingSink { inner: sink, count: 0 };
    let totals = match options.mode {
        ReportMode::Summary => {
            let field = options.grouping.field(0).unwrap_or_default();
            SummaryDigester::new(&columns, field)?.run(&rows, &mut counting)?
        }
        ReportMode::Grouped => GroupingEngine::new(&columns, &options.grouping)?
            .with_page_breaks(options.page_breaks.iter().copied())
            .with_ignored_fields(&options.ignored)
            .with_totals(definition.draw_totals)
            .run(&rows, &mut counting)?,
    };

    let outcome = ReportOutcome {
        title: definition.title.clone(),
        mode: options.mode,
        fetched_rows,
        report_rows: rows.len(),
        instructions: counting.count,
        grand_totals: grand_totals(&columns, totals.as_ref()),
        generated_at: Utc::now(),
    };
    log_success(format!(
        "Report ready: {} instructions over {} rows",
        outcome.instructions, outcome.report_rows
    ));
    Ok(outcome)
}

/// Generate a report into the document selected by `report_format`.
pub fn render_document<S>(
    definition: &ReportDefinition,
    params: &RequestParams,
    store: &S,
) -> ReportResult<(ReportDocument, ReportOutcome)>
where
    S: DataSource + LookupResolver,
{
    let mut document = ReportDocument::from_params(definition.title.clone(), params)?;
    log_info_indent(format!("Output format: {}", document.kind.format()), 1);
    let outcome = generate_report(definition, params, store, store, &mut document)?;
    Ok((document, outcome))
}

/// Build the options form of a report.
pub fn build_form(
    definition: &ReportDefinition,
    resolver: &dyn LookupResolver,
) -> ReportResult<ReportForm> {
    ReportForm::build(
        &definition.title,
        &definition.filters,
        &definition.columns,
        &definition.grouping,
        resolver,
    )
}

fn grand_totals(columns: &ColumnSpec, totals: Option<&Totals>) -> Vec<GrandTotal> {
    let Some(totals) = totals else {
        return Vec::new();
    };
    columns
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            totals.get(i).map(|value| GrandTotal {
                field: c.field.clone(),
                header: c.header.clone(),
                value,
            })
        })
        .collect()
}
