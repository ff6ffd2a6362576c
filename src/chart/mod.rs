//! Chart requests and figure construction.
//!
//! A [`ChartSpec`] names the chart and the columns it maps; [`build_figure`]
//! turns it into a renderer-independent [`Figure`], which `render` draws as
//! SVG markup or a PNG image.

pub mod figure;
pub mod render;

use std::fmt;
use std::str::FromStr;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::BuildError;

pub use figure::{build_figure, Axis, BoxGroup, BoxStats, Figure, Plot, Series, Slice, XyStyle};

// ---------------------------------------------------------------------------
// ChartType
// ---------------------------------------------------------------------------

/// The chart types that can be built. Anything else is rejected when a
/// request is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Bar,
    Scatter,
    Histogram,
    Box,
    Pie,
}

impl ChartType {
    pub const ALL: [ChartType; 6] = [
        ChartType::Line,
        ChartType::Bar,
        ChartType::Pie,
        ChartType::Scatter,
        ChartType::Histogram,
        ChartType::Box,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ChartType::Line => "line",
            ChartType::Bar => "bar",
            ChartType::Scatter => "scatter",
            ChartType::Histogram => "histogram",
            ChartType::Box => "box",
            ChartType::Pie => "pie",
        }
    }

    /// Human-readable label for menus.
    pub fn label(self) -> &'static str {
        match self {
            ChartType::Line => "Line",
            ChartType::Bar => "Bar",
            ChartType::Scatter => "Scatter",
            ChartType::Histogram => "Histogram",
            ChartType::Box => "Box",
            ChartType::Pie => "Pie",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ChartType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ChartType::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| BuildError::UnsupportedChart(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// How grouped values collapse into one. Honoured by pie and bar charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Sum,
    Mean,
    Count,
    Min,
    Max,
}

impl Aggregation {
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Sum,
        Aggregation::Mean,
        Aggregation::Count,
        Aggregation::Min,
        Aggregation::Max,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Aggregation::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
    }

    /// Unknown names are dropped with a warning, as if none was given.
    pub fn resolve(requested: Option<&str>) -> Option<Self> {
        let name = requested?;
        let agg = Aggregation::from_name(name);
        if agg.is_none() {
            warn!("unknown aggregation '{name}', ignoring it");
        }
        agg
    }

    /// Collapse `values`. Sum and count of nothing are zero; the others have
    /// no value.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        match self {
            Aggregation::Sum => Some(values.iter().sum()),
            Aggregation::Count => Some(values.len() as f64),
            Aggregation::Mean if values.is_empty() => None,
            Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregation::Min => values.iter().copied().reduce(f64::min),
            Aggregation::Max => values.iter().copied().reduce(f64::max),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// ChartSpec / ChartRequest
// ---------------------------------------------------------------------------

/// Everything needed to build one chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub chart: ChartType,
    pub x: Option<String>,
    pub y: Option<String>,
    pub color: Option<String>,
    pub agg: Option<Aggregation>,
    pub title: String,
    /// Palette name; unknown names fall back to the configured default.
    pub palette: Option<String>,
}

impl ChartSpec {
    pub fn new(chart: ChartType) -> Self {
        ChartSpec {
            chart,
            x: None,
            y: None,
            color: None,
            agg: None,
            title: String::new(),
            palette: None,
        }
    }

    pub fn x(mut self, column: impl Into<String>) -> Self {
        self.x = Some(column.into());
        self
    }

    pub fn y(mut self, column: impl Into<String>) -> Self {
        self.y = Some(column.into());
        self
    }

    pub fn color(mut self, column: impl Into<String>) -> Self {
        self.color = Some(column.into());
        self
    }

    pub fn agg(mut self, agg: Aggregation) -> Self {
        self.agg = Some(agg);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn palette(mut self, name: impl Into<String>) -> Self {
        self.palette = Some(name.into());
        self
    }
}

/// A chart request as a form submits it: every field optional text, empty
/// strings meaning "not chosen".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartRequest {
    pub chart: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub color: Option<String>,
    pub agg: Option<String>,
    pub title: Option<String>,
    pub palette: Option<String>,
}

impl ChartRequest {
    /// Validate the chart type. An unknown aggregation is ignored.
    pub fn into_spec(self) -> Result<ChartSpec, BuildError> {
        let chart: ChartType = chosen(self.chart).unwrap_or_default().parse()?;
        let agg = Aggregation::resolve(chosen(self.agg).as_deref());
        Ok(ChartSpec {
            chart,
            x: chosen(self.x),
            y: chosen(self.y),
            color: chosen(self.color),
            agg,
            title: self.title.unwrap_or_default(),
            palette: chosen(self.palette),
        })
    }
}

impl TryFrom<ChartRequest> for ChartSpec {
    type Error = BuildError;

    fn try_from(request: ChartRequest) -> Result<Self, Self::Error> {
        request.into_spec()
    }
}

fn chosen(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_chart_types() {
        for chart in ChartType::ALL {
            assert_eq!(chart.name().parse::<ChartType>(), Ok(chart));
        }
        assert_eq!("  Pie ".parse::<ChartType>(), Ok(ChartType::Pie));
    }

    #[test]
    fn radar_is_unsupported() {
        assert_eq!(
            "radar".parse::<ChartType>(),
            Err(BuildError::UnsupportedChart("radar".into()))
        );
    }

    #[test]
    fn aggregations_collapse_values() {
        let v = [1.0, 4.0, 2.5];
        assert_eq!(Aggregation::Sum.apply(&v), Some(7.5));
        assert_eq!(Aggregation::Mean.apply(&v), Some(2.5));
        assert_eq!(Aggregation::Count.apply(&v), Some(3.0));
        assert_eq!(Aggregation::Min.apply(&v), Some(1.0));
        assert_eq!(Aggregation::Max.apply(&v), Some(4.0));
        assert_eq!(Aggregation::Sum.apply(&[]), Some(0.0));
        assert_eq!(Aggregation::Mean.apply(&[]), None);
    }

    #[test]
    fn request_treats_blank_fields_as_absent() {
        let request = ChartRequest {
            chart: Some("bar".into()),
            x: Some("Region".into()),
            y: Some("".into()),
            color: Some("  ".into()),
            agg: Some("mean".into()),
            title: None,
            palette: Some("viridis".into()),
        };
        let spec = ChartSpec::try_from(request).unwrap();
        assert_eq!(
            spec,
            ChartSpec::new(ChartType::Bar)
                .x("Region")
                .agg(Aggregation::Mean)
                .palette("viridis")
        );
    }

    #[test]
    fn request_rejects_missing_chart() {
        assert!(matches!(
            ChartRequest::default().into_spec(),
            Err(BuildError::UnsupportedChart(_))
        ));
    }

    #[test]
    fn unknown_aggregation_is_ignored() {
        let request = ChartRequest {
            chart: Some("line".into()),
            x: Some("date".into()),
            y: Some("sales".into()),
            agg: Some("median".into()),
            ..Default::default()
        };
        let spec = request.into_spec().unwrap();
        assert_eq!(spec.chart, ChartType::Line);
        assert_eq!(spec.agg, None);
        assert_eq!(Aggregation::resolve(Some(" MAX ")), Some(Aggregation::Max));
        assert_eq!(Aggregation::resolve(None), None);
    }

    #[test]
    fn request_deserializes_from_form_json() {
        let request: ChartRequest =
            serde_json::from_str(r#"{"chart":"line","x":"date","y":"sales"}"#).unwrap();
        let spec = request.into_spec().unwrap();
        assert_eq!(spec.chart, ChartType::Line);
        assert_eq!(spec.y.as_deref(), Some("sales"));
    }
}
