//! One-row-per-group summary table.
//!
//! A flat overview of the outermost grouping level: each contiguous run of
//! equal keys is merged into a single row carrying the key followed by the
//! sums of every total column. No headings, no nested levels, no totals boxes.

use crate::error::{GroupingError, GroupingResult};
use crate::models::{Column, ColumnSpec, RenderInstruction, ReportRow, TableContent};
use crate::sink::ReportSink;

use super::grouping::{contiguous_runs, validate_contiguous};
use super::totals::{format_total, Totals};

/// Merges rows sharing a top-level key into summary rows.
#[derive(Debug, Clone)]
pub struct SummaryDigester<'a> {
    columns: &'a ColumnSpec,
    key: usize,
    totals: Vec<usize>,
}

impl<'a> SummaryDigester<'a> {
    pub fn new(columns: &'a ColumnSpec, group_field: &str) -> GroupingResult<Self> {
        let key = columns
            .index_of(group_field)
            .ok_or_else(|| GroupingError::UnknownField(group_field.to_string()))?;
        let totals = (0..columns.len())
            .filter(|&p| p != key && columns.get(p).is_some_and(|c| c.total))
            .collect();
        Ok(Self {
            columns,
            key,
            totals,
        })
    }

    /// Output columns: the key column, then every total column.
    pub fn output_columns(&self) -> Vec<Column> {
        let mut out = Vec::with_capacity(self.totals.len() + 1);
        if let Some(key) = self.columns.get(self.key) {
            out.push(Column {
                total: false,
                ..key.clone()
            });
        }
        out.extend(self.columns.project(&self.totals));
        out
    }

    /// Build the summary rows and the grand totals.
    pub fn digest(&self, rows: &[ReportRow]) -> GroupingResult<(Vec<ReportRow>, Totals)> {
        validate_contiguous(rows, &[self.key], self.columns)?;

        let flags = self.columns.total_flags();
        let mut grand = Totals::zeroed(&flags);
        let mut out = Vec::new();

        for group in contiguous_runs(rows, self.key) {
            let totals = Totals::for_block(group, &flags);
            let mut row: ReportRow = Vec::with_capacity(self.totals.len() + 1);
            row.push(group[0].get(self.key).cloned().flatten());
            row.extend(
                self.totals
                    .iter()
                    .map(|&p| Some(format_total(totals.get(p).unwrap_or(0.0)))),
            );
            grand.merge(&totals);
            out.push(row);
        }

        Ok((out, grand))
    }

    /// Emit the summary as a single flat table.
    ///
    /// Empty input emits nothing and yields no totals.
    pub fn run(
        &self,
        rows: &[ReportRow],
        sink: &mut dyn ReportSink,
    ) -> GroupingResult<Option<Totals>> {
        if rows.is_empty() {
            return Ok(None);
        }
        let (data, grand) = self.digest(rows)?;
        sink.add(RenderInstruction::Table(TableContent::new(
            self.output_columns(),
            data,
        )));
        Ok(Some(grand).filter(|t| !t.is_null()))
    }
}
