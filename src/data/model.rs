use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDateTime;

use crate::error::TableError;

// ---------------------------------------------------------------------------
// CellValue – a single cell viewed independently of its column
// ---------------------------------------------------------------------------

/// A dynamically-typed cell. Used for grouping and labels, so it must be
/// `Ord` and `Hash` even though it carries floats.
#[derive(Debug, Clone)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Missing,
}

// -- Manual Eq/Ord/Hash so CellValue can key a BTreeMap or HashMap --
//
// Numbers compare by `total_cmp` with -0.0 folded into 0.0, so equality,
// ordering and hashing all agree.

/// The bit pattern numbers are compared and hashed by.
fn number_key(v: f64) -> f64 {
    v + 0.0
}

impl PartialEq for CellValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for CellValue {}

impl PartialOrd for CellValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use CellValue::*;
        // Missing sorts last, like a sorted group-by with missing keys kept.
        fn discriminant(v: &CellValue) -> u8 {
            match v {
                Number(_) => 0,
                Text(_) => 1,
                Timestamp(_) => 2,
                Missing => 3,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Number(a), Number(b)) => number_key(*a).total_cmp(&number_key(*b)),
            (Text(a), Text(b)) => a.cmp(b),
            (Timestamp(a), Timestamp(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for CellValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            CellValue::Number(v) => number_key(*v).to_bits().hash(state),
            CellValue::Text(s) => s.hash(state),
            CellValue::Timestamp(t) => t.hash(state),
            CellValue::Missing => {}
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                write!(f, "{}", *v as i64)
            }
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Timestamp(t) if t.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", t.format("%Y-%m-%d"))
            }
            CellValue::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Missing => write!(f, "<missing>"),
        }
    }
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }
}

// ---------------------------------------------------------------------------
// ColumnData – typed storage for one column
// ---------------------------------------------------------------------------

/// Storage type of a column, decided by the loader and the cleaner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    Numeric,
    Text,
    Timestamp,
}

/// Cells of one column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn storage(&self) -> StorageType {
        match self {
            ColumnData::Numeric(_) => StorageType::Numeric,
            ColumnData::Text(_) => StorageType::Text,
            ColumnData::Timestamp(_) => StorageType::Timestamp,
        }
    }

    /// The cell at `row`, or `Missing` past the end.
    pub fn cell(&self, row: usize) -> CellValue {
        match self {
            ColumnData::Numeric(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(CellValue::Missing, CellValue::Number),
            ColumnData::Text(v) => v
                .get(row)
                .cloned()
                .flatten()
                .map_or(CellValue::Missing, CellValue::Text),
            ColumnData::Timestamp(v) => v
                .get(row)
                .copied()
                .flatten()
                .map_or(CellValue::Missing, CellValue::Timestamp),
        }
    }

    /// Position of the cell on a numeric axis. Timestamps map to seconds
    /// since the Unix epoch; text has no position.
    pub fn position(&self, row: usize) -> Option<f64> {
        match self {
            ColumnData::Numeric(v) => v.get(row).copied().flatten(),
            ColumnData::Timestamp(v) => v
                .get(row)
                .copied()
                .flatten()
                .map(|t| t.and_utc().timestamp() as f64),
            ColumnData::Text(_) => None,
        }
    }

    pub fn is_all_missing(&self) -> bool {
        match self {
            ColumnData::Numeric(v) => v.iter().all(Option::is_none),
            ColumnData::Text(v) => v.iter().all(Option::is_none),
            ColumnData::Timestamp(v) => v.iter().all(Option::is_none),
        }
    }

    /// Number of distinct non-missing values.
    pub fn distinct_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v
                .iter()
                .flatten()
                // -0.0 and 0.0 are the same value
                .map(|x| (x + 0.0).to_bits())
                .collect::<HashSet<_>>()
                .len(),
            ColumnData::Text(v) => v
                .iter()
                .flatten()
                .map(String::as_str)
                .collect::<HashSet<_>>()
                .len(),
            ColumnData::Timestamp(v) => v.iter().flatten().collect::<HashSet<_>>().len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Column / Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Column {
            name: name.into(),
            data,
        }
    }

    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Column::new(name, ColumnData::Numeric(values))
    }

    pub fn text<S: Into<String>>(name: impl Into<String>, values: Vec<Option<S>>) -> Self {
        let values = values.into_iter().map(|v| v.map(Into::into)).collect();
        Column::new(name, ColumnData::Text(values))
    }
}

/// An ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table, checking that names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self, TableError> {
        let n_rows = columns.first().map_or(0, |c| c.data.len());
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(TableError::DuplicateColumn(col.name.clone()));
            }
            if col.data.len() != n_rows {
                return Err(TableError::RaggedColumn {
                    name: col.name.clone(),
                    len: col.data.len(),
                    expected: n_rows,
                });
            }
        }
        Ok(Table { columns, n_rows })
    }

    /// Build a table from columns already known to satisfy the invariants.
    pub(crate) fn from_trusted(columns: Vec<Column>) -> Self {
        debug_assert!(Table::new(columns.clone()).is_ok());
        let n_rows = columns.first().map_or(0, |c| c.data.len());
        Table { columns, n_rows }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Make names unique by appending `.1`, `.2`, … to repeats, keeping order.
pub fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut n = 1;
        while taken.contains(&candidate) {
            candidate = format!("{name}.{n}");
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}
