//! PNG line charts for time series
//!
//! Renders with `image` + `imageproc`; there is no text on the canvas, the
//! chart is axes plus a polyline with a marker per point.

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use shared::{AppError, Result, Row};
use std::io::Cursor;

pub const CHART_WIDTH: u32 = 800;
pub const CHART_HEIGHT: u32 = 400;
const MARGIN: f32 = 40.0;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const SERIES: Rgb<u8> = Rgb([31, 119, 180]);

/// Which columns of a normalized row-set become the chart axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSpec {
    pub x_column: &'static str,
    pub y_column: &'static str,
}

pub trait ChartRenderer: Send + Sync {
    fn render(&self, rows: &[Row], x_column: &str, y_column: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, Copy)]
pub struct LineChartRenderer {
    width: u32,
    height: u32,
}

impl Default for LineChartRenderer {
    fn default() -> Self {
        Self {
            width: CHART_WIDTH,
            height: CHART_HEIGHT,
        }
    }
}

impl LineChartRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn plot_area(&self) -> (f32, f32, f32, f32) {
        let left = MARGIN;
        let top = MARGIN / 2.0;
        let right = (self.width as f32 - MARGIN / 2.0).max(left + 1.0);
        let bottom = (self.height as f32 - MARGIN).max(top + 1.0);
        (left, top, right, bottom)
    }
}

/// Numeric points in row order. When every x value is numeric (a year
/// column, say) x is proportional; otherwise points are evenly spaced.
fn collect_points(rows: &[Row], x_column: &str, y_column: &str) -> Vec<(f64, f64)> {
    let numeric_x = rows.iter().all(|row| {
        row.get(x_column)
            .and_then(|value| value.as_f64())
            .is_some()
    });

    rows.iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let y = row.get(y_column)?.as_f64()?;
            let x = if numeric_x {
                row.get(x_column)?.as_f64()?
            } else {
                index as f64
            };
            Some((x, y))
        })
        .collect()
}

fn bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() {
        return None;
    }
    if (max - min).abs() < f64::EPSILON {
        // Flat series: centre it
        Some((min - 1.0, max + 1.0))
    } else {
        Some((min, max))
    }
}

impl ChartRenderer for LineChartRenderer {
    fn render(&self, rows: &[Row], x_column: &str, y_column: &str) -> Result<Vec<u8>> {
        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let (left, top, right, bottom) = self.plot_area();

        draw_line_segment_mut(&mut img, (left, bottom), (right, bottom), AXIS);
        draw_line_segment_mut(&mut img, (left, top), (left, bottom), AXIS);

        let points = collect_points(rows, x_column, y_column);
        if let (Some((x_min, x_max)), Some((y_min, y_max))) = (
            bounds(points.iter().map(|p| p.0)),
            bounds(points.iter().map(|p| p.1)),
        ) {
            let to_canvas = |(x, y): (f64, f64)| -> (f32, f32) {
                let px = left + ((x - x_min) / (x_max - x_min)) as f32 * (right - left);
                let py = bottom - ((y - y_min) / (y_max - y_min)) as f32 * (bottom - top);
                (px, py)
            };

            let canvas: Vec<(f32, f32)> = points.iter().copied().map(to_canvas).collect();
            for segment in canvas.windows(2) {
                draw_line_segment_mut(&mut img, segment[0], segment[1], SERIES);
            }
            for (px, py) in &canvas {
                draw_filled_circle_mut(&mut img, (px.round() as i32, py.round() as i32), 2, SERIES);
            }
        }

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| AppError::internal(format!("Failed to encode chart: {}", e)))?;

        Ok(buffer.into_inner())
    }
}
