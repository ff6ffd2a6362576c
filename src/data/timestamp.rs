use chrono::{DateTime, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

/// Parse a single value as a timestamp, trying the supported formats in
/// order. Offsets are normalized to UTC and dropped.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    if is_year_month(s) {
        return NaiveDate::parse_from_str(&format!("{s}-01"), "%Y-%m-%d")
            .ok()
            .map(|d| d.and_time(chrono::NaiveTime::MIN));
    }
    None
}

/// `YYYY-MM`
fn is_year_month(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b[4] == b'-'
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[5..].iter().all(u8::is_ascii_digit)
}

/// The first cell that is not a timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotTimestamp {
    pub row: usize,
    pub value: String,
}

/// Reparse a whole text column as timestamps. Empty strings become missing.
/// Fails on the first unparseable cell, or when nothing parsed at all.
pub fn parse_column(cells: &[Option<String>]) -> Result<Vec<Option<NaiveDateTime>>, NotTimestamp> {
    let mut parsed = Vec::with_capacity(cells.len());
    let mut any = false;
    for (row, cell) in cells.iter().enumerate() {
        match cell.as_deref().map(str::trim) {
            None | Some("") => parsed.push(None),
            Some(s) => match parse_timestamp(s) {
                Some(t) => {
                    any = true;
                    parsed.push(Some(t));
                }
                None => {
                    return Err(NotTimestamp {
                        row,
                        value: s.to_string(),
                    })
                }
            },
        }
    }
    if !any {
        return Err(NotTimestamp {
            row: 0,
            value: String::new(),
        });
    }
    Ok(parsed)
}
