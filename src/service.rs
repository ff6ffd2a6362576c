use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::info;
use uuid::Uuid;

use crate::chart::{build_figure, ChartSpec, Figure};
use crate::color::Palette;
use crate::config::Settings;
use crate::data::cleaner::clean_table;
use crate::data::loader::load_csv;
use crate::data::model::Table;
use crate::error::ServiceError;
use crate::inference::{infer_column_kinds, ColumnKind};
use crate::store::{MemoryStore, TableStore};
use crate::suggest::{suggest_charts, ChartSuggestion};

// ---------------------------------------------------------------------------
// Session handle
// ---------------------------------------------------------------------------

/// Opaque handle for one uploaded table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        SessionId::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(SessionId)
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// A rendered PNG and the name to offer it under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartExport {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// `chart_<yyyyMMdd_HHmmss>.png` for the given instant.
pub fn export_filename(at: DateTime<Utc>) -> String {
    at.format("chart_%Y%m%d_%H%M%S.png").to_string()
}

/// Upload, inspect and chart CSV files. Tables are kept in a [`TableStore`]
/// between calls; everything else is recomputed on demand.
pub struct ChartService<S: TableStore = MemoryStore> {
    store: S,
    settings: Settings,
    palette: Palette,
}

impl ChartService<MemoryStore> {
    pub fn new(settings: Settings) -> Self {
        let store = MemoryStore::new(settings.store_capacity);
        ChartService::with_store(settings, store)
    }
}

impl Default for ChartService<MemoryStore> {
    fn default() -> Self {
        ChartService::new(Settings::default())
    }
}

impl<S: TableStore> ChartService<S> {
    pub fn with_store(settings: Settings, store: S) -> Self {
        let palette = settings.palette();
        ChartService {
            store,
            settings,
            palette,
        }
    }

    /// Parse and clean `bytes`, then keep the table under a fresh id.
    pub fn upload(&self, bytes: &[u8]) -> Result<SessionId, ServiceError> {
        let table = clean_table(load_csv(bytes)?);
        let id = SessionId::new();
        info!(
            "upload {id}: {} rows x {} columns",
            table.n_rows(),
            table.n_cols()
        );
        self.store.put(id, Arc::new(table));
        Ok(id)
    }

    pub fn table(&self, id: SessionId) -> Result<Arc<Table>, ServiceError> {
        self.store.get(&id).ok_or(ServiceError::NotFound(id))
    }

    pub fn columns(&self, id: SessionId) -> Result<Vec<String>, ServiceError> {
        Ok(self.table(id)?.column_names())
    }

    pub fn kinds(&self, id: SessionId) -> Result<IndexMap<String, ColumnKind>, ServiceError> {
        let table = self.table(id)?;
        Ok(infer_column_kinds(&table))
    }

    pub fn suggestions(&self, id: SessionId) -> Result<Vec<ChartSuggestion>, ServiceError> {
        Ok(suggest_charts(&self.kinds(id)?))
    }

    pub fn figure(&self, id: SessionId, spec: &ChartSpec) -> Result<Figure, ServiceError> {
        let table = self.table(id)?;
        Ok(build_figure(&table, spec, self.palette)?)
    }

    /// Embeddable chart markup.
    pub fn render_chart(&self, id: SessionId, spec: &ChartSpec) -> Result<String, ServiceError> {
        let html = self
            .figure(id, spec)?
            .to_html(self.settings.figure_width, self.settings.figure_height)?;
        info!("rendered {} chart for {id}", spec.chart);
        Ok(html)
    }

    /// The chart as a PNG download.
    pub fn export_chart(&self, id: SessionId, spec: &ChartSpec) -> Result<ChartExport, ServiceError> {
        let bytes = self
            .figure(id, spec)?
            .to_png(self.settings.figure_width, self.settings.figure_height)?;
        let filename = export_filename(Utc::now());
        info!("exported {} chart for {id} as {filename}", spec.chart);
        Ok(ChartExport { filename, bytes })
    }

    /// Forget an upload. Returns whether it was still stored.
    pub fn discard(&self, id: SessionId) -> bool {
        self.store.delete(&id)
    }
}
