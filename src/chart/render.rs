use std::collections::{BTreeSet, HashMap};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::io::Cursor;
use std::ops::Range;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveTime};
use image::{ImageFormat, RgbImage};
use log::debug;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontStyle;

use super::figure::{Axis, BoxGroup, Figure, HistogramGroup, Plot, Series, Slice, XyStyle};
use crate::error::BuildError;

const FONT: &str = "sans-serif";
/// Smallest canvas the margins and label areas fit on.
pub const MIN_WIDTH: u32 = 200;
pub const MIN_HEIGHT: u32 = 150;

/// DejaVu Sans, see `assets/DejaVuSans-LICENSE`.
static FONT_BYTES: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

type XyChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// One drawn bar: bottom-left and top-right corners in data coordinates.
type Bar = ((f64, f64), (f64, f64));

fn render_err<E: std::fmt::Display>(e: E) -> BuildError {
    BuildError::Render(e.to_string())
}

/// Register the embedded font with plotters once per process. Every text
/// element, mesh labels included, is drawn with it.
fn ensure_font() -> Result<(), BuildError> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let ok = *REGISTERED.get_or_init(|| {
        let ok = plotters::style::register_font(FONT, FontStyle::Normal, FONT_BYTES).is_ok();
        if ok {
            debug!("registered embedded '{FONT}' font");
        }
        ok
    });
    if ok {
        Ok(())
    } else {
        Err(BuildError::Render("embedded font could not be loaded".into()))
    }
}

// ---------------------------------------------------------------------------
// Output formats
// ---------------------------------------------------------------------------

impl Figure {
    /// Standalone SVG document.
    pub fn to_svg(&self, width: u32, height: u32) -> Result<String, BuildError> {
        check_size(width, height)?;
        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, (width, height)).into_drawing_area();
            draw(&root, self)?;
            root.present().map_err(render_err)?;
        }
        Ok(svg)
    }

    /// SVG wrapped in a `<figure>` element, ready to embed in a page.
    pub fn to_html(&self, width: u32, height: u32) -> Result<String, BuildError> {
        let svg = self.to_svg(width, height)?;
        Ok(format!(
            "<figure class=\"csvchart csvchart-{}\" aria-label=\"{}\">\n{svg}\n</figure>",
            self.chart,
            escape_attr(&self.title)
        ))
    }

    /// PNG-encoded raster image.
    pub fn to_png(&self, width: u32, height: u32) -> Result<Vec<u8>, BuildError> {
        check_size(width, height)?;
        let mut pixels = vec![0u8; width as usize * height as usize * 3];
        {
            let root = BitMapBackend::with_buffer(&mut pixels, (width, height)).into_drawing_area();
            draw(&root, self)?;
            root.present().map_err(render_err)?;
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| BuildError::Render("pixel buffer does not match image size".into()))?;
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(render_err)?;
        Ok(png.into_inner())
    }
}

fn check_size(width: u32, height: u32) -> Result<(), BuildError> {
    if width < MIN_WIDTH || height < MIN_HEIGHT {
        return Err(BuildError::Render(format!(
            "canvas {width}x{height} is smaller than {MIN_WIDTH}x{MIN_HEIGHT}"
        )));
    }
    Ok(())
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn draw<DB: DrawingBackend>(root: &DrawingArea<DB, Shift>, fig: &Figure) -> Result<(), BuildError> {
    ensure_font()?;
    root.fill(&WHITE).map_err(render_err)?;
    match &fig.plot {
        Plot::Xy {
            style,
            x_axis,
            series,
        } => draw_xy(root, fig, *style, x_axis, series),
        Plot::Histogram {
            x_axis,
            edges,
            groups,
        } => draw_histogram(root, fig, x_axis, edges, groups),
        Plot::Box { groups } => draw_boxes(root, fig, groups),
        Plot::Pie { slices } => draw_pie(root, fig, slices),
    }
}

fn cartesian<'a, DB: DrawingBackend>(
    root: &'a DrawingArea<DB, Shift>,
    title: &str,
    x: Range<f64>,
    y: Range<f64>,
) -> Result<XyChart<'a, DB>, BuildError> {
    // plotters never returns from a mesh over a non-finite range.
    let finite = |r: &Range<f64>| r.start.is_finite() && r.end.is_finite() && r.start < r.end;
    if !finite(&x) || !finite(&y) {
        return Err(BuildError::NoData);
    }
    let mut builder = ChartBuilder::on(root);
    builder
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60);
    if !title.is_empty() {
        builder.caption(title, (FONT, 24));
    }
    builder.build_cartesian_2d(x, y).map_err(render_err)
}

fn draw_mesh<DB: DrawingBackend>(
    chart: &mut XyChart<'_, DB>,
    fig: &Figure,
    axis: &Axis,
) -> Result<(), BuildError> {
    let x_fmt = |v: &f64| axis_label(axis, *v);
    let y_fmt = |v: &f64| format_number(*v);
    let mut mesh = chart.configure_mesh();
    mesh.x_desc(fig.x_title.as_str())
        .y_desc(fig.y_title.as_str())
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt);
    if let Axis::Category(labels) = axis {
        mesh.x_labels(labels.len().max(2)).disable_x_mesh();
    }
    mesh.draw().map_err(render_err)
}

fn draw_legend<'a, DB: DrawingBackend + 'a>(chart: &mut XyChart<'a, DB>) -> Result<(), BuildError> {
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(render_err)
}

fn draw_xy<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    fig: &Figure,
    style: XyStyle,
    axis: &Axis,
    series: &[Series],
) -> Result<(), BuildError> {
    let colors = fig.palette.colors(series.len());
    let bars = if style == XyStyle::Bar {
        stack_bars(series, bar_half_width(axis, series))
    } else {
        Vec::new()
    };

    let mut xs = Extent::default();
    let mut ys = Extent::default();
    if style == XyStyle::Bar {
        ys.add(0.0);
        for &((x0, y0), (x1, y1)) in bars.iter().flatten() {
            xs.add(x0);
            xs.add(x1);
            ys.add(y0);
            ys.add(y1);
        }
    } else {
        for &(x, y) in series.iter().flat_map(|s| &s.points) {
            xs.add(x);
            ys.add(y);
        }
    }
    let x_range = match axis {
        Axis::Category(labels) => -0.5..labels.len() as f64 - 0.5,
        _ => xs.padded(),
    };

    let mut chart = cartesian(root, &fig.title, x_range, ys.padded())?;
    draw_mesh(&mut chart, fig, axis)?;

    for (i, s) in series.iter().enumerate() {
        let color = colors[i];
        let anno = match style {
            XyStyle::Line => chart.draw_series(LineSeries::new(
                s.points.iter().copied(),
                color.stroke_width(2),
            )),
            XyStyle::Scatter => chart.draw_series(
                s.points
                    .iter()
                    .map(|&p| Circle::new(p, 4, color.filled())),
            ),
            XyStyle::Bar => chart.draw_series(
                bars.get(i)
                    .into_iter()
                    .flatten()
                    .map(|&(a, b)| Rectangle::new([a, b], color.filled())),
            ),
        }
        .map_err(render_err)?;

        if let Some(name) = &s.name {
            anno.label(name.as_str()).legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
            });
        }
    }

    if series.iter().any(|s| s.name.is_some()) {
        draw_legend(&mut chart)?;
    }
    Ok(())
}

/// Bars stacked per x position: positive values grow up from zero, negative
/// values down.
fn stack_bars(series: &[Series], half_width: f64) -> Vec<Vec<Bar>> {
    let mut above: HashMap<u64, f64> = HashMap::new();
    let mut below: HashMap<u64, f64> = HashMap::new();
    let mut stacked = Vec::with_capacity(series.len());
    for s in series {
        let mut bars = Vec::with_capacity(s.points.len());
        for &(x, y) in &s.points {
            let tops = if y >= 0.0 { &mut above } else { &mut below };
            let base = tops.entry(x.to_bits()).or_insert(0.0);
            bars.push(((x - half_width, *base), (x + half_width, *base + y)));
            *base += y;
        }
        stacked.push(bars);
    }
    stacked
}

fn bar_half_width(axis: &Axis, series: &[Series]) -> f64 {
    if let Axis::Category(_) = axis {
        return 0.4;
    }
    let xs: BTreeSet<u64> = series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.0.to_bits()))
        .collect();
    let mut sorted: Vec<f64> = xs.into_iter().map(f64::from_bits).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|gap| *gap > 0.0)
        .reduce(f64::min)
        .map_or(0.5, |gap| gap * 0.4)
}

fn draw_histogram<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    fig: &Figure,
    axis: &Axis,
    edges: &[f64],
    groups: &[HistogramGroup],
) -> Result<(), BuildError> {
    let bins = edges.len().saturating_sub(1);
    if bins == 0 {
        return Err(BuildError::NoData);
    }
    let colors = fig.palette.colors(groups.len());

    let mut tops = vec![0.0f64; bins];
    let stacked: Vec<Vec<Bar>> = groups
        .iter()
        .map(|g| {
            g.counts
                .iter()
                .enumerate()
                .filter(|(_, c)| **c > 0)
                .map(|(i, &c)| {
                    let base = tops[i];
                    tops[i] += c as f64;
                    ((edges[i], base), (edges[i + 1], tops[i]))
                })
                .collect()
        })
        .collect();

    let y_max = tops.iter().copied().fold(1.0, f64::max);
    let mut chart = cartesian(root, &fig.title, edges[0]..edges[bins], 0.0..y_max * 1.05)?;
    draw_mesh(&mut chart, fig, axis)?;

    for ((group, bars), &color) in groups.iter().zip(&stacked).zip(&colors) {
        let anno = chart
            .draw_series(
                bars.iter()
                    .map(|&(a, b)| Rectangle::new([a, b], color.mix(0.85).filled())),
            )
            .map_err(render_err)?;
        if let Some(name) = &group.name {
            anno.label(name.as_str()).legend(move |(x, y)| {
                Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
            });
        }
    }

    if groups.iter().any(|g| g.name.is_some()) {
        draw_legend(&mut chart)?;
    }
    Ok(())
}

fn draw_boxes<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    fig: &Figure,
    groups: &[BoxGroup],
) -> Result<(), BuildError> {
    let colors = fig.palette.colors(groups.len());
    let axis = Axis::Category(groups.iter().map(|g| g.label.clone()).collect());

    let mut ys = Extent::default();
    for g in groups {
        ys.add(g.stats.lower);
        ys.add(g.stats.upper);
        for &o in &g.stats.outliers {
            ys.add(o);
        }
    }

    let x_range = -0.5..groups.len() as f64 - 0.5;
    let mut chart = cartesian(root, &fig.title, x_range, ys.padded())?;
    draw_mesh(&mut chart, fig, &axis)?;

    for (i, (g, &color)) in groups.iter().zip(&colors).enumerate() {
        let x = i as f64;
        let s = &g.stats;
        let (left, right) = (x - 0.3, x + 0.3);

        chart
            .draw_series([
                Rectangle::new([(left, s.q1), (right, s.q3)], color.mix(0.35).filled()),
                Rectangle::new([(left, s.q1), (right, s.q3)], color.stroke_width(2)),
            ])
            .map_err(render_err)?;
        chart
            .draw_series([
                PathElement::new(vec![(left, s.median), (right, s.median)], color.stroke_width(3)),
                PathElement::new(vec![(x, s.q3), (x, s.upper)], color.stroke_width(1)),
                PathElement::new(vec![(x, s.q1), (x, s.lower)], color.stroke_width(1)),
                PathElement::new(vec![(x - 0.15, s.upper), (x + 0.15, s.upper)], color.stroke_width(1)),
                PathElement::new(vec![(x - 0.15, s.lower), (x + 0.15, s.lower)], color.stroke_width(1)),
            ])
            .map_err(render_err)?;
        chart
            .draw_series(s.outliers.iter().map(|&o| Circle::new((x, o), 3, color.filled())))
            .map_err(render_err)?;
    }
    Ok(())
}

fn draw_pie<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    fig: &Figure,
    slices: &[Slice],
) -> Result<(), BuildError> {
    let titled;
    let area = if fig.title.is_empty() {
        root
    } else {
        titled = root.titled(&fig.title, (FONT, 24)).map_err(render_err)?;
        &titled
    };

    // Negative and non-finite slices cannot be drawn.
    let drawable = |v: f64| v.is_finite() && v > 0.0;
    let total: f64 = slices.iter().map(|s| s.value).filter(|v| drawable(*v)).sum();
    if !total.is_finite() || total <= 0.0 {
        debug!("pie has nothing positive to draw");
        return Ok(());
    }

    let (w, h) = area.dim_in_pixel();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let radius = w.min(h) as f64 * 0.38;
    let colors = fig.palette.colors(slices.len());
    let at = |angle: f64, r: f64| {
        (
            (cx + r * angle.cos()).round() as i32,
            (cy + r * angle.sin()).round() as i32,
        )
    };

    let mut start = -FRAC_PI_2;
    for (slice, &color) in slices.iter().zip(&colors) {
        if !drawable(slice.value) {
            continue;
        }
        let sweep = TAU * slice.value / total;
        let steps = ((sweep / 0.02).ceil() as usize).max(2);
        let mut points = Vec::with_capacity(steps + 2);
        points.push((cx.round() as i32, cy.round() as i32));
        points.extend((0..=steps).map(|k| at(start + sweep * k as f64 / steps as f64, radius)));
        area.draw(&Polygon::new(points, color.filled()))
            .map_err(render_err)?;

        let label = format!("{} ({:.1}%)", slice.label, 100.0 * slice.value / total);
        area.draw(&Text::new(
            label,
            at(start + sweep / 2.0, radius * 1.12),
            (FONT, 14).into_font(),
        ))
        .map_err(render_err)?;
        start += sweep;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Running min/max of plotted values.
#[derive(Debug, Clone, Copy)]
struct Extent {
    lo: f64,
    hi: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Extent {
            lo: f64::INFINITY,
            hi: f64::NEG_INFINITY,
        }
    }
}

impl Extent {
    fn add(&mut self, v: f64) {
        if v.is_finite() {
            self.lo = self.lo.min(v);
            self.hi = self.hi.max(v);
        }
    }

    /// The extent with 5% headroom on both sides; never empty.
    fn padded(self) -> Range<f64> {
        if self.lo > self.hi {
            return 0.0..1.0;
        }
        let span = self.hi - self.lo;
        if span <= f64::EPSILON * self.lo.abs().max(1.0) {
            return self.lo - 1.0..self.hi + 1.0;
        }
        let pad = span * 0.05;
        self.lo - pad..self.hi + pad
    }
}

fn axis_label(axis: &Axis, v: f64) -> String {
    match axis {
        Axis::Linear => format_number(v),
        Axis::Time => DateTime::from_timestamp(v.round() as i64, 0)
            .map(|t| {
                let t = t.naive_utc();
                if t.time() == NaiveTime::MIN {
                    t.format("%Y-%m-%d").to_string()
                } else {
                    t.format("%Y-%m-%d %H:%M").to_string()
                }
            })
            .unwrap_or_default(),
        Axis::Category(labels) => {
            let r = v.round();
            if (v - r).abs() < 1e-6 && r >= 0.0 {
                labels.get(r as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        }
    }
}

fn format_number(v: f64) -> String {
    let a = v.abs();
    if a >= 1e6 || (a > 0.0 && a < 1e-3) {
        format!("{v:.2e}")
    } else if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        let s = format!("{v:.3}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{build_figure, ChartSpec, ChartType};
    use crate::color::Palette;
    use crate::data::model::{Column, Table};

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

    fn table() -> Table {
        Table::new(vec![
            Column::text("Region", vec![Some("A"), Some("A"), Some("B"), Some("C")]),
            Column::numeric("Sales", vec![Some(10.0), Some(20.0), Some(5.0), Some(-3.0)]),
            Column::numeric("Units", vec![Some(1.0), Some(4.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap()
    }

    fn figure(spec: ChartSpec) -> Figure {
        build_figure(&table(), &spec, Palette::default()).unwrap()
    }

    #[test]
    fn every_chart_type_renders_to_png_and_svg() {
        let specs = [
            ChartSpec::new(ChartType::Line).x("Units").y("Sales"),
            ChartSpec::new(ChartType::Bar).x("Region").y("Sales").color("Region"),
            ChartSpec::new(ChartType::Scatter).x("Units").y("Sales"),
            ChartSpec::new(ChartType::Histogram).x("Sales"),
            ChartSpec::new(ChartType::Box).x("Region").y("Sales"),
            ChartSpec::new(ChartType::Pie).x("Region").y("Units").title("Units"),
        ];
        for spec in specs {
            let fig = figure(spec.title("Check"));
            let png = fig.to_png(400, 300).unwrap();
            assert!(png.starts_with(PNG_MAGIC), "{:?}", fig.chart);
            let svg = fig.to_svg(400, 300).unwrap();
            assert!(svg.contains("<svg"), "{:?}", fig.chart);
        }
    }

    #[test]
    fn html_embeds_svg_in_a_figure() {
        let fig = figure(ChartSpec::new(ChartType::Pie).x("Region").title("A \"quoted\" <title>"));
        let html = fig.to_html(400, 300).unwrap();
        assert!(html.starts_with("<figure class=\"csvchart csvchart-pie\""));
        assert!(html.contains("aria-label=\"A &quot;quoted&quot; &lt;title&gt;\""));
        assert!(html.contains("<svg"));
        assert!(html.trim_end().ends_with("</figure>"));
    }

    #[test]
    fn embedded_font_draws_labels_into_png() {
        assert_eq!(ensure_font(), Ok(()));
        let fig = figure(ChartSpec::new(ChartType::Bar).x("Region").y("Units").title("Units"));
        let png = fig.to_png(400, 300).unwrap();
        let image = image::load_from_memory(&png).unwrap().to_rgb8();
        // The caption is drawn in black above the plot area.
        let dark = image
            .enumerate_pixels()
            .filter(|(_, y, p)| *y < 50 && p.0.iter().all(|c| *c < 80))
            .count();
        assert!(dark > 0);
    }

    #[test]
    fn non_finite_histogram_is_rejected_not_drawn() {
        let fig = Figure {
            chart: ChartType::Histogram,
            title: String::new(),
            x_title: "v".into(),
            y_title: "count".into(),
            palette: Palette::default(),
            plot: Plot::Histogram {
                x_axis: Axis::Linear,
                edges: vec![f64::NAN, f64::INFINITY],
                groups: vec![HistogramGroup { name: None, counts: vec![3] }],
            },
        };
        assert_eq!(fig.to_svg(400, 300), Err(BuildError::NoData));
        assert_eq!(fig.to_png(400, 300), Err(BuildError::NoData));
    }

    #[test]
    fn pie_skips_infinite_slices() {
        let fig = Figure {
            chart: ChartType::Pie,
            title: String::new(),
            x_title: String::new(),
            y_title: String::new(),
            palette: Palette::default(),
            plot: Plot::Pie {
                slices: vec![
                    Slice { label: "a".into(), value: f64::INFINITY },
                    Slice { label: "b".into(), value: 2.0 },
                ],
            },
        };
        assert!(fig.to_png(400, 300).unwrap().starts_with(PNG_MAGIC));
    }

    #[test]
    fn tiny_canvas_is_rejected() {
        let fig = figure(ChartSpec::new(ChartType::Histogram).x("Units"));
        assert!(matches!(fig.to_png(10, 10), Err(BuildError::Render(_))));
    }

    #[test]
    fn bars_stack_per_x() {
        let series = vec![
            Series { name: None, points: vec![(0.0, 2.0), (1.0, -1.0)] },
            Series { name: None, points: vec![(0.0, 3.0), (1.0, -2.0)] },
        ];
        let stacked = stack_bars(&series, 0.4);
        assert_eq!(stacked[1][0], ((-0.4, 2.0), (0.4, 5.0)));
        assert_eq!(stacked[1][1], ((0.6, -1.0), (1.4, -3.0)));
    }

    #[test]
    fn numeric_bars_are_narrower_than_their_gap() {
        let series = vec![Series { name: None, points: vec![(0.0, 1.0), (10.0, 1.0), (12.0, 1.0)] }];
        assert_eq!(bar_half_width(&Axis::Linear, &series), 0.8);
        assert_eq!(bar_half_width(&Axis::Category(Vec::new()), &series), 0.4);
    }

    #[test]
    fn labels_follow_the_axis() {
        let cats = Axis::Category(vec!["North".into(), "South".into()]);
        assert_eq!(axis_label(&cats, 1.0), "South");
        assert_eq!(axis_label(&cats, 0.5), "");
        assert_eq!(axis_label(&Axis::Time, 1_704_067_200.0), "2024-01-01");
        assert_eq!(axis_label(&Axis::Linear, 2.50), "2.5");
        assert_eq!(format_number(3_000_000.0), "3.00e6");
    }

    #[test]
    fn extent_padding_never_collapses() {
        assert_eq!(Extent::default().padded(), 0.0..1.0);
        let mut e = Extent::default();
        e.add(5.0);
        assert_eq!(e.padded(), 4.0..6.0);
    }
}
