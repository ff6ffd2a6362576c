use thiserror::Error;

use crate::service::SessionId;

/// No decode strategy produced a table from the uploaded bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no columns to parse: the file is empty")]
    Empty,

    #[error("could not read CSV ({})", .attempts.join("; "))]
    Unreadable { attempts: Vec<String> },
}

/// A table violated one of its structural invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("column '{name}' has {len} rows, expected {expected}")]
    RaggedColumn {
        name: String,
        len: usize,
        expected: usize,
    },
}

/// The requested chart cannot be built from the table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("unsupported chart type '{0}'")]
    UnsupportedChart(String),

    #[error("column '{0}' not found")]
    UnknownColumn(String),

    #[error("{chart} chart needs a '{field}' column")]
    MissingField {
        chart: &'static str,
        field: &'static str,
    },

    #[error("column '{0}' is not numeric")]
    NotNumeric(String),

    #[error("no rows left to plot")]
    NoData,

    #[error("rendering failed: {0}")]
    Render(String),
}

/// Errors surfaced at the service boundary.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to read CSV: {0}")]
    Parse(#[from] ParseError),

    #[error("upload {0} not found or expired, please upload again")]
    NotFound(SessionId),

    #[error("failed to build chart: {0}")]
    Build(#[from] BuildError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing settings file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("environment variable {name}: invalid value '{value}'")]
    Env { name: &'static str, value: String },

    #[error("figure size {width}x{height} is too small")]
    FigureTooSmall { width: u32, height: u32 },
}
