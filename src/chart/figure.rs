use std::collections::BTreeMap;

use indexmap::IndexMap;
use log::debug;

use super::{Aggregation, ChartSpec, ChartType};
use crate::color::Palette;
use crate::data::model::{CellValue, Column, ColumnData, Table};
use crate::error::BuildError;

// ---------------------------------------------------------------------------
// Figure model
// ---------------------------------------------------------------------------

/// How x positions are labelled.
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    Linear,
    /// Seconds since the Unix epoch.
    Time,
    /// Position `i` is the `i`-th category.
    Category(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XyStyle {
    Line,
    Scatter,
    /// Stacked when several series share an x position.
    Bar,
}

/// One coloured trace. `name` is `None` when no color column split the rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: Option<String>,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramGroup {
    pub name: Option<String>,
    pub counts: Vec<u64>,
}

/// Five-number summary plus the points beyond the whiskers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub lower: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub upper: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxGroup {
    pub label: String,
    pub stats: BoxStats,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub label: String,
    pub value: f64,
}

/// What gets drawn.
#[derive(Debug, Clone, PartialEq)]
pub enum Plot {
    Xy {
        style: XyStyle,
        x_axis: Axis,
        series: Vec<Series>,
    },
    Histogram {
        x_axis: Axis,
        /// `bins + 1` ascending bin edges.
        edges: Vec<f64>,
        groups: Vec<HistogramGroup>,
    },
    Box {
        groups: Vec<BoxGroup>,
    },
    Pie {
        slices: Vec<Slice>,
    },
}

/// A built chart, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub chart: ChartType,
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub palette: Palette,
    pub plot: Plot,
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Build the figure `spec` describes from `table`. `default_palette` applies
/// when the spec names no palette or an unknown one.
pub fn build_figure(
    table: &Table,
    spec: &ChartSpec,
    default_palette: Palette,
) -> Result<Figure, BuildError> {
    let x = lookup(table, spec.x.as_deref())?;
    let y = lookup(table, spec.y.as_deref())?;
    let color = lookup(table, spec.color.as_deref())?;
    let n_rows = table.n_rows();

    if let Some(agg) = spec.agg {
        if !matches!(spec.chart, ChartType::Pie | ChartType::Bar) {
            debug!("aggregation '{agg}' has no effect on {} charts", spec.chart);
        }
    }

    let title_of = |c: Option<&Column>| c.map(|c| c.name.clone()).unwrap_or_default();

    let (plot, x_title, y_title) = match spec.chart {
        ChartType::Line | ChartType::Scatter => {
            let style = if spec.chart == ChartType::Line {
                XyStyle::Line
            } else {
                XyStyle::Scatter
            };
            let chart = spec.chart.name();
            let x = x.ok_or(BuildError::MissingField { chart, field: "x" })?;
            let y = y.ok_or(BuildError::MissingField { chart, field: "y" })?;
            (xy_plot(style, x, y, color, n_rows)?, title_of(Some(x)), title_of(Some(y)))
        }
        ChartType::Bar => {
            let x = x.ok_or(BuildError::MissingField { chart: "bar", field: "x" })?;
            let y_title = y.map_or_else(|| "count".to_string(), |c| c.name.clone());
            (bar_plot(x, y, color, spec.agg, n_rows)?, title_of(Some(x)), y_title)
        }
        ChartType::Histogram => {
            let field = x.or(y).ok_or(BuildError::MissingField {
                chart: "histogram",
                field: "x",
            })?;
            (histogram_plot(field, color, n_rows)?, title_of(Some(field)), "count".to_string())
        }
        ChartType::Box => {
            let (field, group) = match (x, y) {
                (_, Some(y)) => (y, x),
                (Some(x), None) => (x, None),
                (None, None) => {
                    return Err(BuildError::MissingField { chart: "box", field: "y" });
                }
            };
            (box_plot(field, group, color, n_rows)?, title_of(group), title_of(Some(field)))
        }
        ChartType::Pie => (pie_plot(x, y, color, spec.agg, n_rows)?, String::new(), String::new()),
    };

    Ok(Figure {
        chart: spec.chart,
        title: spec.title.clone(),
        x_title,
        y_title,
        palette: Palette::resolve(spec.palette.as_deref(), default_palette),
        plot,
    })
}

fn lookup<'t>(table: &'t Table, name: Option<&str>) -> Result<Option<&'t Column>, BuildError> {
    name.map(|n| {
        table
            .column(n)
            .ok_or_else(|| BuildError::UnknownColumn(n.to_string()))
    })
    .transpose()
}

fn numeric(col: &Column) -> Result<&[Option<f64>], BuildError> {
    match &col.data {
        ColumnData::Numeric(v) => Ok(v.as_slice()),
        _ => Err(BuildError::NotNumeric(col.name.clone())),
    }
}

/// x positions and how to label them. Text maps to category indices in
/// order of first appearance.
fn x_positions(col: &Column, n_rows: usize) -> (Axis, Vec<Option<f64>>) {
    match &col.data {
        ColumnData::Numeric(_) => (Axis::Linear, (0..n_rows).map(|r| col.data.position(r)).collect()),
        ColumnData::Timestamp(_) => (Axis::Time, (0..n_rows).map(|r| col.data.position(r)).collect()),
        ColumnData::Text(cells) => {
            let mut index: IndexMap<&str, usize> = IndexMap::new();
            let positions = cells
                .iter()
                .map(|cell| {
                    cell.as_deref().map(|s| {
                        let next = index.len();
                        *index.entry(s).or_insert(next) as f64
                    })
                })
                .collect();
            let labels = index.keys().map(|s| s.to_string()).collect();
            (Axis::Category(labels), positions)
        }
    }
}

/// Row indices per color value, in order of first appearance. Without a
/// color column every row lands in one unnamed group.
fn color_groups(color: Option<&Column>, n_rows: usize) -> Vec<(Option<String>, Vec<usize>)> {
    let Some(color) = color else {
        return vec![(None, (0..n_rows).collect())];
    };
    let mut groups: IndexMap<String, Vec<usize>> = IndexMap::new();
    for row in 0..n_rows {
        groups
            .entry(color.data.cell(row).to_string())
            .or_default()
            .push(row);
    }
    groups.into_iter().map(|(k, rows)| (Some(k), rows)).collect()
}

// ---------------------------------------------------------------------------
// Per-chart builders
// ---------------------------------------------------------------------------

fn xy_plot(
    style: XyStyle,
    x: &Column,
    y: &Column,
    color: Option<&Column>,
    n_rows: usize,
) -> Result<Plot, BuildError> {
    let ys = numeric(y)?;
    let (x_axis, xs) = x_positions(x, n_rows);

    let series: Vec<Series> = color_groups(color, n_rows)
        .into_iter()
        .map(|(name, rows)| Series {
            name,
            points: rows
                .into_iter()
                .filter_map(|r| Some((xs[r]?, ys[r]?)))
                .collect(),
        })
        .filter(|s| !s.points.is_empty())
        .collect();

    if series.is_empty() {
        return Err(BuildError::NoData);
    }
    Ok(Plot::Xy { style, x_axis, series })
}

/// One bar per row, or one per x value when aggregating. Without y the bar
/// height is the row count.
fn bar_plot(
    x: &Column,
    y: Option<&Column>,
    color: Option<&Column>,
    agg: Option<Aggregation>,
    n_rows: usize,
) -> Result<Plot, BuildError> {
    let ys: Option<&[Option<f64>]> = y.map(numeric).transpose()?;
    let (x_axis, xs) = x_positions(x, n_rows);
    let agg = match ys {
        Some(_) => agg,
        None => Some(Aggregation::Count),
    };

    let mut series = Vec::new();
    for (name, rows) in color_groups(color, n_rows) {
        let rows = rows.into_iter().filter_map(|r| {
            let pos = xs[r]?;
            match ys {
                Some(ys) => Some((pos, ys[r])),
                None => Some((pos, Some(1.0))),
            }
        });

        let points: Vec<(f64, f64)> = match agg {
            None => rows.filter_map(|(p, v)| Some((p, v?))).collect(),
            Some(agg) => {
                let mut grouped: IndexMap<u64, (f64, Vec<f64>)> = IndexMap::new();
                for (p, v) in rows {
                    let entry = grouped.entry(p.to_bits()).or_insert((p, Vec::new()));
                    if let Some(v) = v {
                        entry.1.push(v);
                    }
                }
                grouped
                    .into_values()
                    .filter_map(|(p, values)| Some((p, agg.apply(&values)?)))
                    .collect()
            }
        };
        if !points.is_empty() {
            series.push(Series { name, points });
        }
    }

    if series.is_empty() {
        return Err(BuildError::NoData);
    }
    Ok(Plot::Xy {
        style: XyStyle::Bar,
        x_axis,
        series,
    })
}

fn histogram_plot(field: &Column, color: Option<&Column>, n_rows: usize) -> Result<Plot, BuildError> {
    let x_axis = match field.data {
        ColumnData::Numeric(_) => Axis::Linear,
        ColumnData::Timestamp(_) => Axis::Time,
        // Text histograms are category counts.
        ColumnData::Text(_) => return bar_plot(field, None, color, None, n_rows),
    };

    // Infinite values have no bin.
    let finite_at = |r: usize| field.data.position(r).filter(|v| v.is_finite());
    let values: Vec<f64> = (0..n_rows).filter_map(finite_at).collect();
    if values.is_empty() {
        return Err(BuildError::NoData);
    }
    let edges = bin_edges(&values);
    let bins = edges.len() - 1;
    let lo = edges[0];
    let width = edges[1] - edges[0];

    let groups = color_groups(color, n_rows)
        .into_iter()
        .filter_map(|(name, rows)| {
            let mut counts = vec![0u64; bins];
            let mut any = false;
            for v in rows.into_iter().filter_map(finite_at) {
                let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
                counts[idx] += 1;
                any = true;
            }
            any.then_some(HistogramGroup { name, counts })
        })
        .collect();

    Ok(Plot::Histogram {
        x_axis,
        edges,
        groups,
    })
}

/// Equal-width bin edges, bin count by Sturges' rule. `values` must be
/// non-empty and finite.
fn bin_edges(values: &[f64]) -> Vec<f64> {
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi - lo <= f64::EPSILON * lo.abs().max(1.0) {
        return vec![lo - 0.5, hi + 0.5];
    }
    let bins = ((values.len() as f64).log2().ceil() as usize + 1).max(1);
    let width = (hi - lo) / bins as f64;
    (0..=bins).map(|i| lo + width * i as f64).collect()
}

fn box_plot(
    field: &Column,
    group: Option<&Column>,
    color: Option<&Column>,
    n_rows: usize,
) -> Result<Plot, BuildError> {
    let values = numeric(field)?;

    let mut grouped: IndexMap<String, Vec<f64>> = IndexMap::new();
    for row in 0..n_rows {
        let Some(v) = values[row].filter(|v| v.is_finite()) else {
            continue;
        };
        let g = group.map(|c| c.data.cell(row).to_string());
        let c = color.map(|c| c.data.cell(row).to_string());
        let label = match (g, c) {
            (Some(g), Some(c)) => format!("{g} ({c})"),
            (Some(g), None) => g,
            (None, Some(c)) => c,
            (None, None) => field.name.clone(),
        };
        grouped.entry(label).or_default().push(v);
    }

    let groups: Vec<BoxGroup> = grouped
        .into_iter()
        .map(|(label, values)| BoxGroup {
            label,
            stats: BoxStats::from_values(values),
        })
        .collect();
    if groups.is_empty() {
        return Err(BuildError::NoData);
    }
    Ok(Plot::Box { groups })
}

impl BoxStats {
    /// Quartiles by linear interpolation, whiskers at the furthest points
    /// within 1.5 IQR of the box. `values` must be non-empty.
    pub fn from_values(mut values: Vec<f64>) -> Self {
        values.sort_by(f64::total_cmp);
        let q1 = quantile(&values, 0.25);
        let median = quantile(&values, 0.5);
        let q3 = quantile(&values, 0.75);
        let iqr = q3 - q1;
        let (lo_fence, hi_fence) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

        let inside = || values.iter().copied().filter(|v| (lo_fence..=hi_fence).contains(v));
        let lower = inside().fold(f64::INFINITY, f64::min);
        let upper = inside().fold(f64::NEG_INFINITY, f64::max);
        let outliers = values
            .iter()
            .copied()
            .filter(|v| !(lo_fence..=hi_fence).contains(v))
            .collect();

        BoxStats {
            lower,
            q1,
            median,
            q3,
            upper,
            outliers,
        }
    }
}

/// `sorted` must be non-empty and ascending.
fn quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Slices per x value: aggregated y when both are given, row counts
/// otherwise. Groups come out sorted, missing last.
fn pie_plot(
    x: Option<&Column>,
    y: Option<&Column>,
    color: Option<&Column>,
    agg: Option<Aggregation>,
    n_rows: usize,
) -> Result<Plot, BuildError> {
    let slices: Vec<Slice> = match (x, y) {
        (Some(x), Some(y)) => {
            let ys = numeric(y)?;
            let agg = agg.unwrap_or_default();
            let mut groups: BTreeMap<CellValue, Vec<f64>> = BTreeMap::new();
            for row in 0..n_rows {
                let values = groups.entry(x.data.cell(row)).or_default();
                if let Some(v) = ys[row] {
                    values.push(v);
                }
            }
            groups
                .into_iter()
                .filter_map(|(key, values)| {
                    Some(Slice {
                        label: key.to_string(),
                        value: agg.apply(&values)?,
                    })
                })
                .collect()
        }
        _ => {
            let names = x.or(y).or(color).ok_or(BuildError::MissingField {
                chart: "pie",
                field: "x",
            })?;
            let mut counts: BTreeMap<CellValue, usize> = BTreeMap::new();
            for row in 0..n_rows {
                *counts.entry(names.data.cell(row)).or_default() += 1;
            }
            counts
                .into_iter()
                .map(|(key, n)| Slice {
                    label: key.to_string(),
                    value: n as f64,
                })
                .collect()
        }
    };

    if slices.is_empty() {
        return Err(BuildError::NoData);
    }
    Ok(Plot::Pie { slices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sales() -> Table {
        Table::new(vec![
            Column::text("Region", vec![Some("A"), Some("A"), Some("B")]),
            Column::numeric("Sales", vec![Some(10.0), Some(20.0), Some(5.0)]),
            Column::text("Rep", vec![Some("x"), Some("y"), Some("x")]),
        ])
        .unwrap()
    }

    fn build(spec: ChartSpec) -> Result<Figure, BuildError> {
        build_figure(&sales(), &spec, Palette::default())
    }

    fn slices(fig: &Figure) -> Vec<(String, f64)> {
        match &fig.plot {
            Plot::Pie { slices } => slices.iter().map(|s| (s.label.clone(), s.value)).collect(),
            other => panic!("expected a pie, got {other:?}"),
        }
    }

    #[test]
    fn pie_sums_y_per_x_group() {
        let fig = build(ChartSpec::new(ChartType::Pie).x("Region").y("Sales")).unwrap();
        assert_eq!(slices(&fig), [("A".to_string(), 30.0), ("B".to_string(), 5.0)]);
    }

    #[test]
    fn pie_honours_aggregation() {
        let fig = build(
            ChartSpec::new(ChartType::Pie)
                .x("Region")
                .y("Sales")
                .agg(Aggregation::Mean),
        )
        .unwrap();
        assert_eq!(slices(&fig), [("A".to_string(), 15.0), ("B".to_string(), 5.0)]);
    }

    #[test]
    fn pie_with_one_column_counts_rows() {
        let fig = build(ChartSpec::new(ChartType::Pie).x("Region")).unwrap();
        assert_eq!(slices(&fig), [("A".to_string(), 2.0), ("B".to_string(), 1.0)]);

        let by_color = build(ChartSpec::new(ChartType::Pie).color("Rep")).unwrap();
        assert_eq!(slices(&by_color), [("x".to_string(), 2.0), ("y".to_string(), 1.0)]);
    }

    #[test]
    fn pie_keeps_missing_keys_last() {
        let table = Table::new(vec![
            Column::text("k", vec![None, Some("b"), Some("a")]),
            Column::numeric("v", vec![Some(1.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap();
        let spec = ChartSpec::new(ChartType::Pie).x("k").y("v");
        let fig = build_figure(&table, &spec, Palette::default()).unwrap();
        let labels: Vec<String> = slices(&fig).into_iter().map(|(l, _)| l).collect();
        assert_eq!(labels, ["a", "b", "<missing>"]);
    }

    #[test]
    fn line_splits_series_by_color() {
        let fig = build(ChartSpec::new(ChartType::Line).x("Region").y("Sales").color("Rep")).unwrap();
        let Plot::Xy { style, x_axis, series } = fig.plot else {
            panic!("expected xy plot");
        };
        assert_eq!(style, XyStyle::Line);
        assert_eq!(x_axis, Axis::Category(vec!["A".into(), "B".into()]));
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].name.as_deref(), Some("x"));
        assert_eq!(series[0].points, [(0.0, 10.0), (1.0, 5.0)]);
        assert_eq!(series[1].points, [(0.0, 20.0)]);
    }

    #[test]
    fn line_needs_numeric_y() {
        assert_eq!(
            build(ChartSpec::new(ChartType::Line).x("Sales").y("Region")),
            Err(BuildError::NotNumeric("Region".into()))
        );
        assert_eq!(
            build(ChartSpec::new(ChartType::Scatter).x("Sales")),
            Err(BuildError::MissingField { chart: "scatter", field: "y" })
        );
    }

    #[test]
    fn unknown_columns_are_rejected() {
        assert_eq!(
            build(ChartSpec::new(ChartType::Bar).x("Nope")),
            Err(BuildError::UnknownColumn("Nope".into()))
        );
    }

    #[test]
    fn bar_without_y_counts_rows() {
        let fig = build(ChartSpec::new(ChartType::Bar).x("Region")).unwrap();
        let Plot::Xy { series, .. } = fig.plot else {
            panic!("expected xy plot");
        };
        assert_eq!(series[0].points, [(0.0, 2.0), (1.0, 1.0)]);
        assert_eq!(fig.y_title, "count");
    }

    #[test]
    fn bar_aggregates_only_when_asked() {
        let raw = build(ChartSpec::new(ChartType::Bar).x("Region").y("Sales")).unwrap();
        let Plot::Xy { series, .. } = raw.plot else {
            panic!("expected xy plot");
        };
        assert_eq!(series[0].points.len(), 3);

        let summed = build(
            ChartSpec::new(ChartType::Bar)
                .x("Region")
                .y("Sales")
                .agg(Aggregation::Max),
        )
        .unwrap();
        let Plot::Xy { series, .. } = summed.plot else {
            panic!("expected xy plot");
        };
        assert_eq!(series[0].points, [(0.0, 20.0), (1.0, 5.0)]);
    }

    #[test]
    fn histogram_falls_back_to_y() {
        let fig = build(ChartSpec::new(ChartType::Histogram).y("Sales")).unwrap();
        assert_eq!(fig.x_title, "Sales");
        let Plot::Histogram { edges, groups, .. } = fig.plot else {
            panic!("expected histogram");
        };
        // 3 values: ceil(log2 3) + 1 = 3 bins
        assert_eq!(edges.len(), 4);
        assert_relative_eq!(edges[0], 5.0);
        assert_relative_eq!(edges[3], 20.0);
        assert_eq!(groups[0].counts.iter().sum::<u64>(), 3);
        assert_eq!(groups[0].counts[2], 1);
    }

    #[test]
    fn histogram_of_constant_values_has_one_bin() {
        assert_eq!(bin_edges(&[4.0, 4.0]), [3.5, 4.5]);
    }

    #[test]
    fn histogram_ignores_infinite_values() {
        let table = Table::new(vec![Column::numeric(
            "v",
            vec![Some(1.0), Some(2.0), Some(f64::INFINITY), Some(f64::NEG_INFINITY)],
        )])
        .unwrap();
        let spec = ChartSpec::new(ChartType::Histogram).x("v");
        let fig = build_figure(&table, &spec, Palette::default()).unwrap();
        let Plot::Histogram { edges, groups, .. } = fig.plot else {
            panic!("expected histogram");
        };
        assert!(edges.iter().all(|e| e.is_finite()));
        assert_eq!(groups[0].counts.iter().sum::<u64>(), 2);

        let only_inf = Table::new(vec![Column::numeric("v", vec![Some(f64::INFINITY)])]).unwrap();
        assert_eq!(
            build_figure(&only_inf, &spec, Palette::default()),
            Err(BuildError::NoData)
        );
    }

    #[test]
    fn box_ignores_infinite_values() {
        let table = Table::new(vec![Column::numeric(
            "v",
            vec![Some(1.0), Some(3.0), Some(f64::INFINITY)],
        )])
        .unwrap();
        let spec = ChartSpec::new(ChartType::Box).y("v");
        let fig = build_figure(&table, &spec, Palette::default()).unwrap();
        let Plot::Box { groups } = fig.plot else {
            panic!("expected box plot");
        };
        assert_relative_eq!(groups[0].stats.median, 2.0);
        assert!(groups[0].stats.outliers.is_empty());
    }

    #[test]
    fn text_histogram_counts_categories() {
        let fig = build(ChartSpec::new(ChartType::Histogram).x("Region")).unwrap();
        assert!(matches!(fig.plot, Plot::Xy { style: XyStyle::Bar, .. }));
    }

    #[test]
    fn box_groups_by_x() {
        let fig = build(ChartSpec::new(ChartType::Box).x("Region").y("Sales")).unwrap();
        let Plot::Box { groups } = fig.plot else {
            panic!("expected box plot");
        };
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, ["A", "B"]);
        assert_relative_eq!(groups[0].stats.median, 15.0);
    }

    #[test]
    fn box_stats_flag_outliers() {
        let stats = BoxStats::from_values(vec![1.0, 2.0, 3.0, 4.0, 100.0]);
        assert_relative_eq!(stats.q1, 2.0);
        assert_relative_eq!(stats.median, 3.0);
        assert_relative_eq!(stats.q3, 4.0);
        assert_relative_eq!(stats.lower, 1.0);
        assert_relative_eq!(stats.upper, 4.0);
        assert_eq!(stats.outliers, [100.0]);
    }

    #[test]
    fn box_needs_a_field() {
        assert_eq!(
            build(ChartSpec::new(ChartType::Box)),
            Err(BuildError::MissingField { chart: "box", field: "y" })
        );
    }
}
