use log::debug;

use super::model::{dedupe_names, Column, ColumnData, Table};
use super::timestamp;

/// Normalize a freshly loaded table.
///
/// 1. trim headers, suffixing any duplicates trimming produced
/// 2. drop columns with no values
/// 3. trim every text cell
/// 4. turn text columns that fully parse as timestamps into timestamp columns
///
/// Every step is total, so cleaning never fails, and applying it twice gives
/// the same table as applying it once.
pub fn clean_table(raw: Table) -> Table {
    let columns = raw.into_columns();

    let names = dedupe_names(columns.iter().map(|c| c.name.trim().to_string()).collect());

    let cleaned: Vec<Column> = columns
        .into_iter()
        .zip(names)
        .filter_map(|(col, name)| {
            if col.data.is_all_missing() {
                debug!("dropping empty column '{name}'");
                return None;
            }
            Some(Column::new(name, clean_data(col.data)))
        })
        .collect();

    // Names were just deduplicated and lengths are untouched.
    Table::from_trusted(cleaned)
}

fn clean_data(data: ColumnData) -> ColumnData {
    let ColumnData::Text(cells) = data else {
        return data;
    };
    let trimmed: Vec<Option<String>> = cells
        .into_iter()
        .map(|cell| cell.map(|s| s.trim().to_string()))
        .collect();

    match timestamp::parse_column(&trimmed) {
        Ok(parsed) => ColumnData::Timestamp(parsed),
        Err(not_ts) => {
            debug!(
                "kept as text: row {} '{}' is not a timestamp",
                not_ts.row, not_ts.value
            );
            ColumnData::Text(trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{CellValue, StorageType};

    fn table(columns: Vec<Column>) -> Table {
        Table::new(columns).unwrap()
    }

    #[test]
    fn trims_headers_and_cells() {
        let cleaned = clean_table(table(vec![
            Column::text(" Region ", vec![Some(" North"), Some("South  ")]),
            Column::numeric("Sales\t", vec![Some(1.0), Some(2.0)]),
        ]));
        assert_eq!(cleaned.column_names(), ["Region", "Sales"]);
        assert_eq!(
            cleaned.column("Region").unwrap().data.cell(0),
            CellValue::Text("North".into())
        );
    }

    #[test]
    fn suffixes_names_that_collide_after_trimming() {
        let cleaned = clean_table(table(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric(" a", vec![Some(2.0)]),
        ]));
        assert_eq!(cleaned.column_names(), ["a", "a.1"]);
    }

    #[test]
    fn drops_all_missing_columns() {
        let cleaned = clean_table(table(vec![
            Column::numeric("keep", vec![Some(1.0), None]),
            Column::numeric("empty", vec![None, None]),
            Column::text::<String>("blank", vec![None, None]),
        ]));
        assert_eq!(cleaned.column_names(), ["keep"]);
        assert_eq!(cleaned.n_rows(), 2);
    }

    #[test]
    fn reparses_date_columns_and_keeps_missing() {
        let cleaned = clean_table(table(vec![Column::text(
            "date",
            vec![Some(" 2024-01-01 "), None, Some("2024-01-03")],
        )]));
        let data = &cleaned.column("date").unwrap().data;
        assert_eq!(data.storage(), StorageType::Timestamp);
        assert!(data.cell(1).is_missing());
    }

    #[test]
    fn mixed_column_stays_text() {
        let cleaned = clean_table(table(vec![Column::text(
            "when",
            vec![Some("2024-01-01"), Some("tomorrow")],
        )]));
        assert_eq!(
            cleaned.column("when").unwrap().data.storage(),
            StorageType::Text
        );
    }

    #[test]
    fn cleaning_twice_changes_nothing() {
        let once = clean_table(table(vec![
            Column::text(" name ", vec![Some(" x "), None]),
            Column::text("name", vec![Some("2024-02-02"), Some("")]),
            Column::numeric("gone", vec![None, None]),
        ]));
        let twice = clean_table(once.clone());
        assert_eq!(once, twice);
    }
}
