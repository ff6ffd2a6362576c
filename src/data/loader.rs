use std::borrow::Cow;
use std::fmt;

use anyhow::{bail, Context, Result};
use encoding_rs::{UTF_8, WINDOWS_1252};
use log::{debug, info, warn};

use super::model::{dedupe_names, Column, ColumnData, Table};
use crate::error::ParseError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Cell texts read as missing values.
const NA_VALUES: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "NULL", "null", "None", "<NA>", "#N/A",
    "#NA",
];

const SNIFF_DELIMITERS: &[u8] = b",;\t|";

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// One way of turning bytes into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStrategy {
    /// Strict UTF-8, comma-delimited.
    Utf8,
    /// Windows-1252, comma-delimited.
    Windows1252,
    /// Lossy UTF-8, sniffed delimiter, tolerant of overlong rows.
    Sniff,
}

impl DecodeStrategy {
    /// The fallback chain, in the order it is tried.
    pub const ORDER: [DecodeStrategy; 3] = [
        DecodeStrategy::Utf8,
        DecodeStrategy::Windows1252,
        DecodeStrategy::Sniff,
    ];

    /// Decode and parse `bytes` with this strategy alone.
    pub fn load(self, bytes: &[u8]) -> Result<Table> {
        match self {
            DecodeStrategy::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                let text = UTF_8
                    .decode_without_bom_handling_and_without_replacement(body)
                    .context("input is not valid UTF-8")?;
                parse_delimited(&text, b',', RowPolicy::Strict)
            }
            DecodeStrategy::Windows1252 => {
                let text = WINDOWS_1252
                    .decode_without_bom_handling_and_without_replacement(bytes)
                    .context("input is not valid windows-1252")?;
                parse_delimited(&text, b',', RowPolicy::Strict)
            }
            DecodeStrategy::Sniff => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                let text: Cow<'_, str> = String::from_utf8_lossy(body);
                let delimiter = sniff_delimiter(&text);
                debug!("sniffed delimiter {:?}", delimiter as char);
                parse_delimited(&text, delimiter, RowPolicy::Permissive)
            }
        }
    }
}

impl fmt::Display for DecodeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeStrategy::Utf8 => write!(f, "utf-8"),
            DecodeStrategy::Windows1252 => write!(f, "windows-1252"),
            DecodeStrategy::Sniff => write!(f, "sniffed"),
        }
    }
}

/// Load CSV bytes into a raw table, trying each [`DecodeStrategy`] in turn.
pub fn load_csv(bytes: &[u8]) -> Result<Table, ParseError> {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ParseError::Empty);
    }

    let mut attempts = Vec::new();
    for strategy in DecodeStrategy::ORDER {
        match strategy.load(bytes) {
            Ok(table) => {
                info!(
                    "Loaded {} rows x {} columns ({strategy})",
                    table.n_rows(),
                    table.n_cols()
                );
                return Ok(table);
            }
            Err(e) => {
                debug!("{strategy} attempt failed: {e:#}");
                attempts.push(format!("{strategy}: {e:#}"));
            }
        }
    }
    Err(ParseError::Unreadable { attempts })
}

// ---------------------------------------------------------------------------
// Delimited text → Table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowPolicy {
    /// Rows wider than the header fail the attempt.
    Strict,
    /// Extra fields are dropped.
    Permissive,
}

/// Header row required. Short rows are padded with missing cells.
fn parse_delimited(text: &str, delimiter: u8, policy: RowPolicy) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().context("reading CSV headers")?.clone();
    if headers.is_empty() {
        bail!("no header row");
    }
    let width = headers.len();
    let names = dedupe_names(
        headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if h.trim().is_empty() {
                    format!("Unnamed: {i}")
                } else {
                    h.to_string()
                }
            })
            .collect(),
    );

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); width];
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {}", row_no + 1))?;
        if record.len() > width {
            match policy {
                RowPolicy::Strict => bail!(
                    "CSV row {}: expected {width} fields, saw {}",
                    row_no + 1,
                    record.len()
                ),
                RowPolicy::Permissive => warn!(
                    "CSV row {}: dropping {} extra field(s)",
                    row_no + 1,
                    record.len() - width
                ),
            }
        }
        for (idx, column) in cells.iter_mut().enumerate() {
            column.push(record.get(idx).and_then(cell_text));
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| Column::new(name, guess_storage(raw)))
        .collect();
    Table::new(columns).context("assembling table")
}

fn cell_text(field: &str) -> Option<String> {
    if NA_VALUES.contains(&field) {
        None
    } else {
        Some(field.to_string())
    }
}

/// Numeric when every present cell is a number (or every one a boolean),
/// text otherwise. A column with no values at all is numeric.
fn guess_storage(raw: Vec<Option<String>>) -> ColumnData {
    let numbers: Option<Vec<Option<f64>>> = raw
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => parse_number(s),
        })
        .collect();
    if let Some(values) = numbers {
        return ColumnData::Numeric(values);
    }

    let bools: Option<Vec<Option<f64>>> = raw
        .iter()
        .map(|cell| match cell {
            None => Some(None),
            Some(s) => parse_bool(s).map(|b| Some(if b { 1.0 } else { 0.0 })),
        })
        .collect();
    if let Some(values) = bools {
        return ColumnData::Numeric(values);
    }

    ColumnData::Text(raw)
}

/// `Some(None)` for a NaN spelling the marker list missed.
fn parse_number(s: &str) -> Option<Option<f64>> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_nan() => Some(None),
        Ok(v) => Some(Some(v)),
        Err(_) => None,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Pick the candidate delimiter that occurs most often in the header line.
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or("");
    let mut best = (b',', 0);
    for &candidate in SNIFF_DELIMITERS {
        let count = header.bytes().filter(|&b| b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}
