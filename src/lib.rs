//! csvchart: turn an uploaded CSV into chart suggestions and rendered charts.
//!
//! ```text
//!  bytes ─▶ loader ─▶ cleaner ─▶ store ─▶ inference + suggest ─▶ figure ─▶ SVG / PNG
//! ```
//!
//! [`ChartService`] ties the pieces together behind the operations an HTTP or
//! CLI front end needs.

pub mod chart;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod inference;
pub mod service;
pub mod store;
pub mod suggest;

pub use chart::{Aggregation, ChartRequest, ChartSpec, ChartType, Figure};
pub use config::Settings;
pub use data::model::{CellValue, Column, ColumnData, Table};
pub use error::{BuildError, ParseError, ServiceError};
pub use inference::ColumnKind;
pub use service::{ChartExport, ChartService, SessionId};
pub use store::{MemoryStore, TableStore};
pub use suggest::ChartSuggestion;
