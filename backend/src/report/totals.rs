//! Group totals.
//!
//! Totals are kept per column position of the full field list, so a leaf
//! group's totals can be added into its parent's accumulator no matter which
//! columns each table ends up showing.
//!
//! ```text
//! "1,200" ─┐
//! "800"   ─┼─▶ parse_number ─▶ Totals[amount] = 2000 ─▶ parent += 2000
//! null    ─┘   (null skipped, garbage = 0)
//! ```

use serde::Serialize;

use crate::models::{Cell, ReportRow};

/// Parse a numeric cell, stripping thousands separators.
///
/// Anything that does not parse after stripping counts as zero.
pub fn parse_number(raw: &str) -> f64 {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Format a total for display in a totals box.
pub fn format_total(value: f64) -> String {
    let rounded = (value * 1_000_000.0).round() / 1_000_000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    rounded.to_string()
}

/// Column-wise totals, indexed by field position.
///
/// `None` marks a column that does not take part in totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Totals(Vec<Option<f64>>);

impl Totals {
    /// Zeroed totals for every flagged column.
    pub fn zeroed(flags: &[bool]) -> Self {
        Self(flags.iter().map(|&f| if f { Some(0.0) } else { None }).collect())
    }

    /// Sum the flagged columns over a block of rows.
    pub fn for_block(rows: &[ReportRow], flags: &[bool]) -> Self {
        let mut totals = Self::zeroed(flags);
        for row in rows {
            totals.add_row(row);
        }
        totals
    }

    /// Add one row into the flagged columns.
    pub fn add_row(&mut self, row: &[Cell]) {
        for (slot, cell) in self.0.iter_mut().zip(row) {
            if let (Some(sum), Some(raw)) = (slot.as_mut(), cell.as_deref()) {
                *sum += parse_number(raw);
            }
        }
    }

    /// Add another totals vector into this one, skipping null entries.
    pub fn merge(&mut self, other: &Totals) {
        if self.0.len() < other.0.len() {
            self.0.resize(other.0.len(), None);
        }
        for (slot, value) in self.0.iter_mut().zip(&other.0) {
            if let Some(v) = value {
                *slot = Some(slot.unwrap_or(0.0) + v);
            }
        }
    }

    /// True when no column carries a total.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn get(&self, position: usize) -> Option<f64> {
        self.0.get(position).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.0
    }

    /// Render the totals of the given positions as a table row.
    pub fn to_row(&self, positions: &[usize]) -> ReportRow {
        positions
            .iter()
            .map(|&p| self.get(p).map(format_total))
            .collect()
    }
}

impl From<Vec<Option<f64>>> for Totals {
    fn from(values: Vec<Option<f64>>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[Option<&str>]) -> ReportRow {
        cells.iter().map(|c| c.map(String::from)).collect()
    }

    #[test]
    fn test_parse_number_strips_separators() {
        assert_eq!(parse_number("1,234.50"), 1234.5);
        assert_eq!(parse_number(" 800 "), 800.0);
        assert_eq!(parse_number("-1,000"), -1000.0);
    }

    #[test]
    fn test_parse_number_failure_is_zero() {
        assert_eq!(parse_number("n/a"), 0.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("1.2.3"), 0.0);
        assert_eq!(parse_number("inf"), 0.0);
    }

    #[test]
    fn test_block_totals_only_flagged_columns() {
        let rows = vec![
            row(&[Some("North"), Some("Widget"), Some("1,200")]),
            row(&[Some("North"), Some("Gadget"), Some("800")]),
            row(&[Some("North"), Some("Gizmo"), None]),
        ];
        let totals = Totals::for_block(&rows, &[false, false, true]);

        assert_eq!(totals.values(), &[None, None, Some(2000.0)]);
        assert!(!totals.is_null());
    }

    #[test]
    fn test_no_total_columns_is_null() {
        let rows = vec![row(&[Some("a"), Some("1")])];
        assert!(Totals::for_block(&rows, &[false, false]).is_null());
        assert!(Totals::default().is_null());
    }

    #[test]
    fn test_partition_sums_match_whole_block() {
        let rows: Vec<ReportRow> = ["1,000.25", "2", "garbage", "3,500", "0.75", "10"]
            .iter()
            .map(|v| row(&[Some("k"), Some(v), Some(v)]))
            .collect();
        let flags = [false, true, true];
        let whole = Totals::for_block(&rows, &flags);

        for split in 0..=rows.len() {
            let mut merged = Totals::default();
            merged.merge(&Totals::for_block(&rows[..split], &flags));
            merged.merge(&Totals::for_block(&rows[split..], &flags));

            for i in 0..flags.len() {
                match (whole.get(i), merged.get(i)) {
                    (Some(a), Some(b)) => assert!((a - b).abs() < 1e-9),
                    (None, None) => {}
                    other => panic!("column {i} differs: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_merge_skips_nulls() {
        let mut acc = Totals::from(vec![None, Some(5.0)]);
        acc.merge(&Totals::from(vec![None, Some(2.5), Some(1.0)]));
        assert_eq!(acc.values(), &[None, Some(7.5), Some(1.0)]);
    }

    #[test]
    fn test_format_total() {
        assert_eq!(format_total(2000.0), "2000");
        assert_eq!(format_total(1234.5), "1234.5");
        assert_eq!(format_total(0.1 + 0.2), "0.3");
        assert_eq!(format_total(-0.0), "0");
    }

    #[test]
    fn test_to_row_projects_positions() {
        let totals = Totals::from(vec![None, None, Some(500.0)]);
        assert_eq!(totals.to_row(&[1, 2]), vec![None, Some("500".to_string())]);
    }
}
