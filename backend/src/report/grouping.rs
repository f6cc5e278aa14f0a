//! Nested grouping of sorted report rows.
//!
//! This module walks a flat row sequence that is already sorted by the
//! grouping fields and emits one heading per group, a leaf table per
//! innermost group and a totals box after each closed group.
//!
//! # Architecture
//!
//! ```text
//! Sorted rows (Region, Product, Amount)     Render instructions
//! ┌──────────────────────────────┐         ┌─────────────────────────────┐
//! │ North  Widget  1,200         │         │ Heading  "North"  (level 0) │
//! │ North  Gadget    800         │   →     │ Table    Widget 1,200       │
//! │ South  Widget    500         │         │          Gadget   800       │
//! └──────────────────────────────┘         │ Totals   North 2000         │
//!                                          │ Heading  "South"  (level 0) │
//!                                          │ Table    Widget   500       │
//!                                          │ Totals   South 500          │
//!                                          └─────────────────────────────┘
//! ```
//!
//! Every call works on a slice of rows that share all ancestor keys, so the
//! recursion carries its own state and the engine itself is immutable.

use std::collections::HashSet;

use crate::error::{GroupingError, GroupingResult};
use crate::models::{ColumnSpec, GroupingSpec, RenderInstruction, ReportRow, TableContent};
use crate::sink::ReportSink;

use super::totals::Totals;

/// Emits nested headings, tables and totals boxes for grouped rows.
#[derive(Debug, Clone)]
pub struct GroupingEngine<'a> {
    columns: &'a ColumnSpec,
    /// Column position of each grouping level
    grouping: Vec<usize>,
    /// Columns shown in leaf tables and totals boxes
    visible: Vec<usize>,
    /// Levels (1-based) that start on a new page
    page_breaks: HashSet<usize>,
    draw_totals: bool,
}

impl<'a> GroupingEngine<'a> {
    /// Create an engine for the given columns and grouping fields.
    pub fn new(columns: &'a ColumnSpec, grouping: &GroupingSpec) -> GroupingResult<Self> {
        let grouping = grouping.resolve(columns)?;
        let mut engine = Self {
            columns,
            grouping,
            visible: Vec::new(),
            page_breaks: HashSet::new(),
            draw_totals: true,
        };
        engine.visible = engine.compute_visible(&[]);
        Ok(engine)
    }

    /// Request a page break before every heading of the given levels (1-based).
    pub fn with_page_breaks(mut self, levels: impl IntoIterator<Item = usize>) -> Self {
        self.page_breaks.extend(levels);
        self
    }

    /// Hide additional columns from every table.
    pub fn with_ignored_fields(mut self, positions: &[usize]) -> Self {
        self.visible = self.compute_visible(positions);
        self
    }

    /// Enable or disable totals boxes.
    pub fn with_totals(mut self, draw: bool) -> Self {
        self.draw_totals = draw;
        self
    }

    /// Column positions shown in emitted tables.
    pub fn visible_columns(&self) -> &[usize] {
        &self.visible
    }

    fn compute_visible(&self, ignored: &[usize]) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|i| !self.grouping.contains(i) && !ignored.contains(i))
            .collect()
    }

    /// Walk the rows, emitting render instructions into the sink.
    ///
    /// Returns the accumulated totals of the outermost level, or `None` for
    /// empty input or when no column carries totals.
    pub fn run(
        &self,
        rows: &[ReportRow],
        sink: &mut dyn ReportSink,
    ) -> GroupingResult<Option<Totals>> {
        if rows.is_empty() {
            return Ok(None);
        }

        validate_contiguous(rows, &self.grouping, self.columns)?;

        let totals = if self.grouping.is_empty() {
            self.emit_leaf(rows, sink)
        } else {
            self.walk(rows, 0, sink)
        };

        Ok(Some(totals).filter(|t| !t.is_null()))
    }

    /// One grouping level over rows sharing every ancestor key.
    fn walk(&self, rows: &[ReportRow], level: usize, sink: &mut dyn ReportSink) -> Totals {
        let position = self.grouping[level];
        let is_leaf = level + 1 == self.grouping.len();
        let mut accumulated = Totals::default();

        for group in contiguous_runs(rows, position) {
            if self.page_breaks.contains(&(level + 1)) {
                sink.add_page(level + 1);
            }

            let heading = key(&group[0], position).unwrap_or("").to_string();
            sink.add(RenderInstruction::heading(heading.clone(), level));

            let totals = if is_leaf {
                self.emit_leaf(group, sink)
            } else {
                self.walk(group, level + 1, sink)
            };

            if totals.is_null() {
                continue;
            }
            if self.draw_totals {
                self.emit_totals_box(&totals, &heading, sink);
            }
            accumulated.merge(&totals);
        }

        accumulated
    }

    fn emit_leaf(&self, rows: &[ReportRow], sink: &mut dyn ReportSink) -> Totals {
        let data = rows.iter().map(|row| project_row(row, &self.visible)).collect();
        sink.add(RenderInstruction::Table(TableContent::new(
            self.columns.project(&self.visible),
            data,
        )));
        Totals::for_block(rows, &self.columns.total_flags())
    }

    fn emit_totals_box(&self, totals: &Totals, label: &str, sink: &mut dyn ReportSink) {
        let mut row = totals.to_row(&self.visible);
        let label_fits = self
            .visible
            .first()
            .and_then(|&p| self.columns.get(p))
            .is_some_and(|c| !c.total);
        if label_fits {
            row[0] = Some(label.to_string());
        }
        sink.add(RenderInstruction::Table(TableContent::totals_box(
            self.columns.project(&self.visible),
            row,
            label,
        )));
    }
}

/// Keep only the given positions of a row.
pub fn project_row(row: &ReportRow, positions: &[usize]) -> ReportRow {
    positions
        .iter()
        .map(|&p| row.get(p).cloned().flatten())
        .collect()
}

/// Split rows into maximal runs with equal values at `position`.
pub fn contiguous_runs(rows: &[ReportRow], position: usize) -> Vec<&[ReportRow]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=rows.len() {
        if i == rows.len() || key(&rows[i], position) != key(&rows[start], position) {
            runs.push(&rows[start..i]);
            start = i;
        }
    }
    runs
}

fn key(row: &ReportRow, position: usize) -> Option<&str> {
    row.get(position).and_then(|c| c.as_deref())
}

/// Check that every grouping-key prefix forms one contiguous run.
///
/// A group that closes and later reappears means the rows were not sorted by
/// the grouping fields.
pub fn validate_contiguous(
    rows: &[ReportRow],
    grouping: &[usize],
    columns: &ColumnSpec,
) -> GroupingResult<()> {
    let mut closed: HashSet<Vec<Option<&str>>> = HashSet::new();

    for i in 1..rows.len() {
        let (prev, current) = (&rows[i - 1], &rows[i]);
        let Some(level) = grouping
            .iter()
            .position(|&p| key(prev, p) != key(current, p))
        else {
            continue;
        };

        for depth in level..grouping.len() {
            closed.insert(prefix(prev, &grouping[..=depth]));
        }

        if closed.contains(&prefix(current, &grouping[..=level])) {
            let position = grouping[level];
            return Err(GroupingError::Unsorted {
                row: i,
                level,
                field: columns
                    .get(position)
                    .map(|c| c.field.clone())
                    .unwrap_or_default(),
                value: key(current, position).unwrap_or("").to_string(),
            });
        }
    }

    Ok(())
}

fn prefix<'r>(row: &'r ReportRow, positions: &[usize]) -> Vec<Option<&'r str>> {
    positions.iter().map(|&p| key(row, p)).collect()
}
