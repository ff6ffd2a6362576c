use indexmap::IndexMap;
use serde::Serialize;

use crate::chart::ChartType;
use crate::inference::ColumnKind;

/// One advisory chart configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartSuggestion {
    pub chart: ChartType,
    pub x: String,
    pub y: Option<String>,
}

impl ChartSuggestion {
    fn new(chart: ChartType, x: &str, y: Option<&str>) -> Self {
        ChartSuggestion {
            chart,
            x: x.to_string(),
            y: y.map(str::to_string),
        }
    }
}

/// Suggest charts for a table's column kinds, most relevant first.
///
/// The rules run in a fixed order and each one only fires when the kinds it
/// needs are present:
///
/// | chart     | x                 | y              |
/// |-----------|-------------------|----------------|
/// | line      | first datetime    | first numeric  |
/// | bar       | first categorical | first numeric  |
/// | scatter   | first numeric     | second numeric |
/// | box       | first categorical | first numeric  |
/// | histogram | first numeric     | –              |
/// | pie       | first categorical | first numeric  |
pub fn suggest_charts(kinds: &IndexMap<String, ColumnKind>) -> Vec<ChartSuggestion> {
    let numeric = columns_of(kinds, ColumnKind::Numeric);
    let categorical = columns_of(kinds, ColumnKind::Categorical);
    let datetime = columns_of(kinds, ColumnKind::Datetime);

    let mut suggestions = Vec::new();
    if let (Some(dt), Some(num)) = (datetime.first(), numeric.first()) {
        suggestions.push(ChartSuggestion::new(ChartType::Line, dt, Some(*num)));
    }
    if let (Some(cat), Some(num)) = (categorical.first(), numeric.first()) {
        suggestions.push(ChartSuggestion::new(ChartType::Bar, cat, Some(*num)));
    }
    if let [first, second, ..] = numeric.as_slice() {
        suggestions.push(ChartSuggestion::new(ChartType::Scatter, first, Some(*second)));
    }
    if let (Some(cat), Some(num)) = (categorical.first(), numeric.first()) {
        suggestions.push(ChartSuggestion::new(ChartType::Box, cat, Some(*num)));
    }
    if let Some(num) = numeric.first() {
        suggestions.push(ChartSuggestion::new(ChartType::Histogram, num, None));
    }
    if let (Some(cat), Some(num)) = (categorical.first(), numeric.first()) {
        // Pie slices are the per-category sum of the numeric column.
        suggestions.push(ChartSuggestion::new(ChartType::Pie, cat, Some(*num)));
    }
    suggestions
}

fn columns_of(kinds: &IndexMap<String, ColumnKind>, kind: ColumnKind) -> Vec<&str> {
    kinds
        .iter()
        .filter(|(_, k)| **k == kind)
        .map(|(name, _)| name.as_str())
        .collect()
}
