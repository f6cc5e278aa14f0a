//! Dynamic field expansion (lookup pivot).
//!
//! A dynamic field redistributes one value column over the entries of a
//! lookup table. The fetch appends the lookup key of every row, the expander
//! then collapses each block of rows sharing all other columns into one wide
//! row with one column per lookup entry.
//!
//! ```text
//! lookup months: (1, Jan) (2, Feb)
//!
//! product   qty  months.id            product   Jan   Feb
//! ProductA  100  1           ──▶      ProductA  100   120
//! ProductA  120  2                    ProductB  null  80
//! ProductB   80  2
//! ```

use std::collections::HashSet;

use crate::error::{PivotError, PivotResult};
use crate::models::{Column, ColumnSpec, DynamicFieldSpec, DynamicHeader, FieldList, ReportRow, SingletonMode};
use crate::store::LookupResolver;

/// Split a lookup path `model.field` into its parts.
pub fn split_lookup_path(path: &str) -> PivotResult<(&str, &str)> {
    match path.trim().split_once('.') {
        Some((model, field)) if !model.is_empty() && !field.is_empty() && !field.contains('.') => {
            Ok((model, field))
        }
        _ => Err(PivotError::InvalidPath(path.to_string())),
    }
}

/// Resolved dynamic fields of one report, plus the field list to fetch.
#[derive(Debug, Clone)]
pub struct PivotPlan {
    columns: ColumnSpec,
    query_fields: FieldList,
    dynamic: Vec<DynamicFieldSpec>,
}

impl PivotPlan {
    /// A plan that passes rows through untouched.
    pub fn identity(columns: &ColumnSpec) -> Self {
        Self {
            columns: columns.clone(),
            query_fields: columns.fields(),
            dynamic: Vec::new(),
        }
    }

    /// Resolve every dynamic header against its lookup table.
    ///
    /// Each lookup contributes one `model.key_field` column appended to the
    /// query fields, in declaration order. Expanded column names must not
    /// clash with a declared column or with each other.
    pub fn prepare(
        columns: &ColumnSpec,
        headers: &[DynamicHeader],
        resolver: &dyn LookupResolver,
    ) -> PivotResult<Self> {
        let mut plan = Self::identity(columns);
        let mut taken: HashSet<String> = columns.iter().map(|c| c.field.clone()).collect();

        for header in headers {
            let replace_index = columns
                .index_of(&header.field)
                .ok_or_else(|| PivotError::MissingValueField(header.field.clone()))?;
            if plan.dynamic.iter().any(|d| d.replace_index == replace_index) {
                return Err(PivotError::DuplicateValueField(header.field.clone()));
            }

            let lookup = resolver.resolve_headers(&header.lookup)?;
            let key_index = plan.query_fields.len();
            plan.query_fields
                .push(format!("{}.{}", lookup.model, lookup.key_field));

            let spec = DynamicFieldSpec {
                field: header.field.clone(),
                lookup: header.lookup.clone(),
                headers: lookup.entries,
                replace_index,
                key_index,
                singleton: header.singleton,
            };
            for name in spec.expanded_fields() {
                if !taken.insert(name.clone()) {
                    return Err(PivotError::ColumnCollision(name));
                }
            }
            plan.dynamic.push(spec);
        }

        Ok(plan)
    }

    /// Fields to request from the data source.
    pub fn query_fields(&self) -> &[String] {
        &self.query_fields
    }

    pub fn dynamic_fields(&self) -> &[DynamicFieldSpec] {
        &self.dynamic
    }

    pub fn is_identity(&self) -> bool {
        self.dynamic.is_empty()
    }

    fn dynamic_at(&self, position: usize) -> Option<&DynamicFieldSpec> {
        self.dynamic.iter().find(|d| d.replace_index == position)
    }

    /// Positions of the columns that are not pivoted.
    fn block_positions(&self) -> Vec<usize> {
        (0..self.columns.len())
            .filter(|&p| self.dynamic_at(p).is_none())
            .collect()
    }

    /// Fields that identify a block: every column that is not pivoted.
    ///
    /// Rows of one block only collapse when they arrive next to each other,
    /// so the fetch has to be ordered on these fields.
    pub fn block_fields(&self) -> FieldList {
        self.block_positions()
            .into_iter()
            .filter_map(|p| self.columns.get(p).map(|c| c.field.clone()))
            .collect()
    }

    /// Column metadata of expanded rows.
    ///
    /// Each pivoted column is replaced in place by one column per lookup
    /// entry, inheriting its metadata with the lookup label as header.
    pub fn expanded_columns(&self) -> ColumnSpec {
        let mut out = Vec::with_capacity(self.columns.len());
        for (position, column) in self.columns.iter().enumerate() {
            match self.dynamic_at(position) {
                Some(spec) => out.extend(spec.headers.iter().map(|entry| Column {
                    field: spec.expanded_field(entry),
                    header: entry.label.clone(),
                    ..column.clone()
                })),
                None => out.push(column.clone()),
            }
        }
        ColumnSpec::new(out)
    }

    /// Collapse fetched rows into wide rows.
    ///
    /// Rows must carry one cell per query field. Without dynamic fields the
    /// rows are returned as fetched.
    pub fn expand(&self, rows: Vec<ReportRow>) -> PivotResult<Vec<ReportRow>> {
        let expected = self.query_fields.len();
        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != expected)
            .map(|(i, r)| (i, r.len()))
        {
            return Err(PivotError::RowWidth { row, expected, found });
        }

        if self.is_identity() {
            return Ok(rows);
        }

        let stable = self.block_positions();

        let mut out = Vec::new();
        let mut start = 0;
        for i in 1..=rows.len() {
            let block_ends = i == rows.len()
                || stable.iter().any(|&p| rows[i][p] != rows[start][p]);
            if block_ends {
                out.push(self.collapse(&rows[start..i]));
                start = i;
            }
        }
        Ok(out)
    }

    fn collapse(&self, block: &[ReportRow]) -> ReportRow {
        let first = &block[0];
        let mut row = Vec::with_capacity(self.columns.len());
        for (position, cell) in first.iter().take(self.columns.len()).enumerate() {
            match self.dynamic_at(position) {
                Some(spec) => row.extend(redistribute(spec, block)),
                None => row.push(cell.clone()),
            }
        }
        row
    }
}

/// One cell per lookup entry, taken from the first row carrying that key.
fn redistribute(spec: &DynamicFieldSpec, block: &[ReportRow]) -> ReportRow {
    if block.len() == 1 && spec.singleton == SingletonMode::Broadcast {
        return vec![block[0][spec.replace_index].clone(); spec.num_fields()];
    }

    spec.headers
        .iter()
        .map(|entry| {
            block
                .iter()
                .find(|r| r[spec.key_index].as_deref().map(str::trim) == Some(entry.key.trim()))
                .and_then(|r| r[spec.replace_index].clone())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PivotResult;
    use crate::models::LookupEntry;
    use crate::store::LookupTable;

    struct Months;

    impl LookupResolver for Months {
        fn resolve_headers(&self, path: &str) -> PivotResult<LookupTable> {
            let (model, field) = split_lookup_path(path)?;
            match (model, field) {
                ("months", "name") => Ok(LookupTable {
                    model: "months".into(),
                    key_field: "month_id".into(),
                    entries: vec![LookupEntry::new("1", "Jan"), LookupEntry::new("2", "Feb")],
                }),
                ("months", _) => Err(PivotError::UnknownField {
                    model: model.into(),
                    field: field.into(),
                }),
                _ => Err(PivotError::UnknownModel(model.into())),
            }
        }
    }

    fn cells(data: &[Option<&str>]) -> ReportRow {
        data.iter().map(|c| c.map(String::from)).collect()
    }

    fn product_columns() -> ColumnSpec {
        ColumnSpec::new(vec![
            Column::new("product", "Product"),
            Column::total("quantity", "Quantity"),
        ])
    }

    fn months_on(field: &str, singleton: SingletonMode) -> DynamicHeader {
        DynamicHeader {
            lookup: "months.name".into(),
            field: field.into(),
            singleton,
        }
    }

    #[test]
    fn test_prepare_appends_key_field() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Match)],
            &Months,
        )
        .unwrap();

        assert_eq!(plan.query_fields(), &["product", "quantity", "months.month_id"]);
        let spec = &plan.dynamic_fields()[0];
        assert_eq!(spec.replace_index, 1);
        assert_eq!(spec.key_index, 2);
        assert_eq!(spec.num_fields(), 2);
    }

    #[test]
    fn test_single_row_matches_its_key() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Match)],
            &Months,
        )
        .unwrap();

        let out = plan
            .expand(vec![cells(&[Some("ProductA"), Some("100"), Some("1")])])
            .unwrap();

        assert_eq!(out, vec![cells(&[Some("ProductA"), Some("100"), None])]);
        assert_eq!(plan.expanded_columns().headers(), vec!["Product", "Jan", "Feb"]);
    }

    #[test]
    fn test_single_row_broadcast_fills_every_column() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Broadcast)],
            &Months,
        )
        .unwrap();

        let out = plan
            .expand(vec![cells(&[Some("ProductA"), Some("100"), Some("1")])])
            .unwrap();

        assert_eq!(out[0][1], out[0][2]);
        assert_eq!(out[0][1].as_deref(), Some("100"));
    }

    #[test]
    fn test_blocks_collapse_into_wide_rows() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Broadcast)],
            &Months,
        )
        .unwrap();

        let out = plan
            .expand(vec![
                cells(&[Some("ProductA"), Some("100"), Some("1")]),
                cells(&[Some("ProductA"), Some("120"), Some("2")]),
                cells(&[Some("ProductB"), Some("80"), Some("2")]),
                cells(&[Some("ProductB"), Some("5"), Some("9")]),
            ])
            .unwrap();

        assert_eq!(
            out,
            vec![
                cells(&[Some("ProductA"), Some("100"), Some("120")]),
                cells(&[Some("ProductB"), None, Some("80")]),
            ]
        );
        let columns = plan.expanded_columns();
        assert_eq!(columns.fields(), vec!["product", "quantity_1", "quantity_2"]);
        assert_eq!(columns.total_flags(), vec![false, true, true]);
    }

    #[test]
    fn test_two_dynamic_fields_share_blocks() {
        let columns = ColumnSpec::new(vec![
            Column::new("product", "Product"),
            Column::total("quantity", "Quantity"),
            Column::total("revenue", "Revenue"),
        ]);
        let plan = PivotPlan::prepare(
            &columns,
            &[
                months_on("quantity", SingletonMode::Match),
                months_on("revenue", SingletonMode::Match),
            ],
            &Months,
        )
        .unwrap();
        assert_eq!(plan.query_fields().len(), 5);

        let out = plan
            .expand(vec![
                cells(&[Some("A"), Some("1"), Some("10"), Some("1"), Some("1")]),
                cells(&[Some("A"), Some("2"), Some("20"), Some("2"), Some("2")]),
            ])
            .unwrap();

        assert_eq!(
            out,
            vec![cells(&[Some("A"), Some("1"), Some("2"), Some("10"), Some("20")])]
        );
        assert_eq!(
            plan.expanded_columns().headers(),
            vec!["Product", "Jan", "Feb", "Jan", "Feb"]
        );
    }

    #[test]
    fn test_empty_input_is_empty_output() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Match)],
            &Months,
        )
        .unwrap();
        assert!(plan.expand(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_resolution_failures_are_fatal() {
        let unknown_model = DynamicHeader {
            lookup: "weeks.name".into(),
            ..months_on("quantity", SingletonMode::Match)
        };
        assert!(matches!(
            PivotPlan::prepare(&product_columns(), &[unknown_model], &Months),
            Err(PivotError::UnknownModel(m)) if m == "weeks"
        ));

        let bad_path = DynamicHeader {
            lookup: "months".into(),
            ..months_on("quantity", SingletonMode::Match)
        };
        assert!(matches!(
            PivotPlan::prepare(&product_columns(), &[bad_path], &Months),
            Err(PivotError::InvalidPath(_))
        ));

        assert!(matches!(
            PivotPlan::prepare(&product_columns(), &[months_on("price", SingletonMode::Match)], &Months),
            Err(PivotError::MissingValueField(f)) if f == "price"
        ));
    }

    #[test]
    fn test_expanded_name_clash_is_rejected() {
        let columns = ColumnSpec::new(vec![
            Column::new("product", "Product"),
            Column::total("quantity", "Quantity"),
            Column::new("quantity_2", "Quantity (February)"),
        ]);
        assert!(matches!(
            PivotPlan::prepare(&columns, &[months_on("quantity", SingletonMode::Match)], &Months),
            Err(PivotError::ColumnCollision(f)) if f == "quantity_2"
        ));
    }

    #[test]
    fn test_block_fields_skip_pivoted_columns() {
        let columns = ColumnSpec::new(vec![
            Column::new("product", "Product"),
            Column::total("quantity", "Quantity"),
            Column::new("sku", "SKU"),
        ]);
        let plan =
            PivotPlan::prepare(&columns, &[months_on("quantity", SingletonMode::Match)], &Months)
                .unwrap();
        assert_eq!(plan.block_fields(), vec!["product", "sku"]);
        assert_eq!(PivotPlan::identity(&columns).block_fields().len(), 3);
    }

    #[test]
    fn test_row_width_mismatch() {
        let plan = PivotPlan::prepare(
            &product_columns(),
            &[months_on("quantity", SingletonMode::Match)],
            &Months,
        )
        .unwrap();
        let err = plan
            .expand(vec![cells(&[Some("ProductA"), Some("100")])])
            .unwrap_err();
        assert!(matches!(err, PivotError::RowWidth { row: 0, expected: 3, found: 2 }));
    }

    #[test]
    fn test_identity_plan_passes_rows_through() {
        let plan = PivotPlan::identity(&product_columns());
        let rows = vec![
            cells(&[Some("A"), Some("1")]),
            cells(&[Some("A"), Some("2")]),
        ];
        assert_eq!(plan.expand(rows.clone()).unwrap(), rows);
        assert_eq!(plan.expanded_columns(), product_columns());
    }
}
