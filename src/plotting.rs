use plotters::prelude::*;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;

use crate::error::PlotError;
use crate::tsne::N_COMPONENTS;

/// matplotlib's default "tab10" cycle
const TAB10: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

/// Color for the `index`-th series, cycling through tab10
fn series_color(index: usize) -> RGBColor {
    TAB10[index % TAB10.len()]
}

/// Points that share one label, drawn in one color.
#[derive(Debug, Clone, PartialEq)]
pub struct ScatterSeries {
    pub label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScatterPlot {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<ScatterSeries>,
}

/// Figure size and marker appearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    /// Marker opacity in [0, 1]
    pub alpha: f64,
    pub marker_size: u32,
}

impl Default for PlotStyle {
    fn default() -> Self {
        // 10x8 inches at 100 dpi
        Self {
            width: 1000,
            height: 800,
            alpha: 0.6,
            marker_size: 4,
        }
    }
}

/// Split rows into one series per distinct label, in order of first appearance.
pub fn group_by_label(
    projected: &[[f64; N_COMPONENTS]],
    labels: &[String],
) -> Result<Vec<ScatterSeries>, PlotError> {
    if projected.len() != labels.len() {
        return Err(PlotError::LengthMismatch {
            points: projected.len(),
            labels: labels.len(),
        });
    }

    let mut series: Vec<ScatterSeries> = Vec::new();
    for (point, label) in projected.iter().zip(labels) {
        let index = match series.iter().position(|s| &s.label == label) {
            Some(index) => index,
            None => {
                series.push(ScatterSeries {
                    label: label.clone(),
                    points: Vec::new(),
                });
                series.len() - 1
            }
        };
        series[index].points.push((point[0], point[1]));
    }
    Ok(series)
}

impl ScatterPlot {
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
        series: Vec<ScatterSeries>,
    ) -> Self {
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            series,
        }
    }

    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }

    /// Axis ranges covering every point with 5% padding.
    pub fn data_bounds(&self) -> (Range<f64>, Range<f64>) {
        let points = self.series.iter().flat_map(|s| s.points.iter());
        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for &(x, y) in points {
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }
        (padded_range(min_x, max_x), padded_range(min_y, max_y))
    }
}

fn padded_range(min: f64, max: f64) -> Range<f64> {
    if !min.is_finite() || !max.is_finite() {
        return -1.0..1.0;
    }
    let span = max - min;
    if span <= f64::EPSILON * max.abs().max(1.0) {
        return (min - 1.0)..(max + 1.0);
    }
    let pad = span * 0.05;
    (min - pad)..(max + pad)
}

/// Render the scatter plot to a PNG file.
pub fn plot_scatter(
    plot: &ScatterPlot,
    style: &PlotStyle,
    output_path: &Path,
) -> Result<(), PlotError> {
    let render_start = Instant::now();
    draw_scatter(plot, style, output_path).map_err(|e| PlotError::Drawing(e.to_string()))?;
    tracing::debug!(
        path = %output_path.display(),
        points = plot.point_count(),
        elapsed = ?render_start.elapsed(),
        "scatter plot rendered"
    );
    Ok(())
}

fn draw_scatter(
    plot: &ScatterPlot,
    style: &PlotStyle,
    output_path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(output_path, (style.width, style.height)).into_drawing_area();
    root.fill(&WHITE)?;

    let (x_range, y_range) = plot.data_bounds();
    let mut chart = ChartBuilder::on(&root)
        .caption(&plot.title, ("sans-serif", 40).into_font())
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(plot.x_label.as_str())
        .y_desc(plot.y_label.as_str())
        .draw()?;

    let alpha = style.alpha.clamp(0.0, 1.0);
    let size = style.marker_size;
    for (index, series) in plot.series.iter().enumerate() {
        let color = series_color(index);
        chart
            .draw_series(
                series
                    .points
                    .iter()
                    .map(move |&(x, y)| Circle::new((x, y), size, color.mix(alpha).filled())),
            )?
            .label(series.label.as_str())
            .legend(move |(x, y)| Circle::new((x + 10, y), size, color.mix(alpha).filled()));
    }

    if !plot.series.is_empty() {
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperRight)
            .background_style(&WHITE.mix(0.8))
            .border_style(&BLACK)
            .draw()?;
    }

    root.present()?;
    Ok(())
}
