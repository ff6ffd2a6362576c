use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::data::model::{ColumnData, Table};

/// Columns with at most this many distinct values are always categorical.
pub const CATEGORICAL_MIN_DISTINCT: usize = 20;
/// Above the minimum, a column stays categorical up to this share of rows.
pub const CATEGORICAL_ROW_RATIO: f64 = 0.05;

/// Semantic kind of a column, recomputed whenever it is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Categorical => "categorical",
            ColumnKind::Datetime => "datetime",
            ColumnKind::Text => "text",
        };
        f.write_str(s)
    }
}

/// Largest distinct-value count still treated as categorical for a table
/// with `n_rows` rows.
pub fn categorical_limit(n_rows: usize) -> usize {
    CATEGORICAL_MIN_DISTINCT.max((CATEGORICAL_ROW_RATIO * n_rows as f64) as usize)
}

/// Classify one column. Storage type decides numeric and datetime; text
/// columns split on how many distinct values they hold.
pub fn infer_kind(data: &ColumnData, n_rows: usize) -> ColumnKind {
    match data {
        ColumnData::Numeric(_) => ColumnKind::Numeric,
        ColumnData::Timestamp(_) => ColumnKind::Datetime,
        ColumnData::Text(_) => {
            if data.distinct_count() <= categorical_limit(n_rows) {
                ColumnKind::Categorical
            } else {
                ColumnKind::Text
            }
        }
    }
}

/// Kinds of every column, in table order.
pub fn infer_column_kinds(table: &Table) -> IndexMap<String, ColumnKind> {
    table
        .columns()
        .iter()
        .map(|col| (col.name.clone(), infer_kind(&col.data, table.n_rows())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Column;

    #[test]
    fn storage_type_decides_numeric_and_datetime() {
        let nums = ColumnData::Numeric((0..1000).map(|i| Some(i as f64)).collect());
        assert_eq!(infer_kind(&nums, 1000), ColumnKind::Numeric);

        let when = ColumnData::Timestamp(vec![None]);
        assert_eq!(infer_kind(&when, 1), ColumnKind::Datetime);
    }

    #[test]
    fn few_distinct_values_are_categorical() {
        let values = (0..1000).map(|i| Some(format!("cat{}", i % 20))).collect();
        let data = ColumnData::Text(values);
        assert_eq!(infer_kind(&data, 1000), ColumnKind::Categorical);
    }

    #[test]
    fn threshold_scales_with_row_count() {
        assert_eq!(categorical_limit(10), 20);
        assert_eq!(categorical_limit(1000), 50);

        let at_limit = ColumnData::Text((0..1000).map(|i| Some(format!("v{}", i % 50))).collect());
        assert_eq!(infer_kind(&at_limit, 1000), ColumnKind::Categorical);

        let over = ColumnData::Text((0..1000).map(|i| Some(format!("v{}", i % 51))).collect());
        assert_eq!(infer_kind(&over, 1000), ColumnKind::Text);
    }

    #[test]
    fn missing_values_are_not_counted() {
        let mut values: Vec<Option<String>> = (0..20).map(|i| Some(format!("v{i}"))).collect();
        values.extend(std::iter::repeat(None).take(5));
        let data = ColumnData::Text(values);
        assert_eq!(infer_kind(&data, 25), ColumnKind::Categorical);
    }

    #[test]
    fn kinds_follow_column_order() {
        let table = Table::new(vec![
            Column::text("b", vec![Some("x")]),
            Column::numeric("a", vec![Some(1.0)]),
        ])
        .unwrap();
        let kinds = infer_column_kinds(&table);
        let order: Vec<_> = kinds.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        assert_eq!(
            order,
            [("b", ColumnKind::Categorical), ("a", ColumnKind::Numeric)]
        );
    }
}
