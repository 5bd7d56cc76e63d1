use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::buffer::{PlotGroup, ScrollingBuffer};
use crate::drivers::error::RythmError;
/// Maps logical buffer indices to seconds. The buffer itself is unit-free.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeAxis {
    pub delta_ms: f64,
}
impl TimeAxis {
    pub fn new(delta_ms: f64) -> Self {
        Self { delta_ms }
    }
    pub fn seconds(self, logical_index: u64) -> f64 {
        logical_index as f64 * self.delta_ms / 1000.0
    }
    /// `[x, y]` pairs for the visible part of a curve.
    pub fn points(self, buf: &ScrollingBuffer) -> Vec<[f64; 2]> {
        let origin = buf.origin();
        buf.visible()
            .iter()
            .enumerate()
            .map(|(i, v)| [self.seconds(origin + i as u64), *v])
            .collect()
    }
    /// Peak markers of a curve. None while the curve is hidden.
    pub fn peak_points(self, buf: &ScrollingBuffer) -> Vec<[f64; 2]> {
        if buf.is_hidden() {
            return Vec::new();
        }
        buf.peaks()
            .iter()
            .map(|p| [self.seconds(p.index), p.value])
            .collect()
    }
}
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    /// Caption, axis labels and legend. Needs a system font.
    pub labels: bool,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            palette: vec![CYAN, MAGENTA, GREEN, YELLOW, WHITE],
            labels: true,
        }
    }
}
/// Renders every visible curve of `group` with its peak markers as a PNG.
pub fn render_group_png(
    group: &PlotGroup,
    title: &str,
    axis: TimeAxis,
    style: &PlotStyle,
) -> Result<Vec<u8>, RythmError> {
    let curves: Vec<(usize, Vec<[f64; 2]>, Vec<[f64; 2]>)> = group
        .curves()
        .iter()
        .enumerate()
        .map(|(idx, buf)| (idx, axis.points(buf), axis.peak_points(buf)))
        .filter(|(_, points, _)| !points.is_empty())
        .collect();
    if curves.is_empty() {
        return Err(RythmError::Plot(format!("{title}: nothing to draw")));
    }
    let all = || curves.iter().flat_map(|(_, points, _)| points.iter());
    let x_min = all().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let x_max = all().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let y_min = all().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let y_max = all().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
    let x_bounds = if x_max - x_min < f64::EPSILON {
        (x_min - 1.0, x_max + 1.0)
    } else {
        (x_min, x_max)
    };
    let y_bounds = if y_max - y_min < f64::EPSILON {
        (y_min - 1.0, y_max + 1.0)
    } else {
        (y_min, y_max)
    };
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut builder = ChartBuilder::on(&root);
        builder.margin(10);
        if style.labels {
            builder
                .caption(title, ("sans-serif", 20).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 45)
                .set_label_area_size(LabelAreaPosition::Bottom, 40);
        }
        let mut chart =
            builder.build_cartesian_2d(x_bounds.0..x_bounds.1, y_bounds.0..y_bounds.1)?;
        if style.labels {
            chart
                .configure_mesh()
                .x_desc("time (s)")
                .light_line_style(&WHITE.mix(0.1))
                .draw()?;
        }
        for (idx, points, peaks) in &curves {
            let color = style.palette[idx % style.palette.len()];
            chart
                .draw_series(LineSeries::new(points.iter().map(|p| (p[0], p[1])), &color))?
                .label(format!("Ch {idx}"))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
            chart.draw_series(
                peaks
                    .iter()
                    .map(|p| Circle::new((p[0], p[1]), 3, RED.filled())),
            )?;
        }
        if style.labels {
            chart
                .configure_series_labels()
                .border_style(&WHITE.mix(0.2))
                .background_style(&style.background)
                .draw()?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, RythmError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| RythmError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
