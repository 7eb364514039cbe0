//! Mapping waveform samples onto a draw area.
//!
//! Screen convention: x grows to the right from 0 to `width`, y grows
//! downwards from 0 (top) to `height` (bottom). The smallest sample lands on
//! the bottom edge and the largest on the top edge.

use crate::waveform::sample_range;

/// Size of the draw area in display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    /// Horizontal extent.
    pub width: f64,
    /// Vertical extent.
    pub height: f64,
}

impl PlotArea {
    /// Draw area of `width × height`.
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// A sample in display coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotPoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position, 0 at the top.
    pub y: f64,
}

/// Scale `samples` into `area`.
///
/// Samples are spaced uniformly from x = 0 to x = `width` (a single sample sits
/// at 0). Y uses min-max normalisation; when every sample is equal the span
/// is replaced by 1 so all points share the bottom edge.
pub fn scale_to_area(samples: &[f64], area: PlotArea) -> Vec<PlotPoint> {
    let Some((min, max)) = sample_range(samples) else {
        return Vec::new();
    };

    let span = max - min;
    let span = if span > 0.0 { span } else { 1.0 };
    let x_step = if samples.len() > 1 {
        area.width / (samples.len() - 1) as f64
    } else {
        0.0
    };

    samples
        .iter()
        .enumerate()
        .map(|(i, &sample)| PlotPoint {
            x: i as f64 * x_step,
            y: area.height - (sample - min) / span * area.height,
        })
        .collect()
}

/// Character grid for plotting in a terminal.
#[derive(Debug, Clone)]
pub struct TextCanvas {
    columns: usize,
    rows: usize,
    cells: Vec<Vec<char>>,
}

impl TextCanvas {
    /// Blank canvas. Both dimensions are at least 1.
    pub fn new(columns: usize, rows: usize) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            columns,
            rows,
            cells: vec![vec![' '; columns]; rows],
        }
    }

    /// Canvas with `samples` plotted as `*`.
    pub fn plot(samples: &[f64], columns: usize, rows: usize) -> Self {
        let mut canvas = Self::new(columns, rows);
        let area = PlotArea::new((canvas.columns - 1) as f64, (canvas.rows - 1) as f64);
        for point in scale_to_area(samples, area) {
            canvas.set(point, '*');
        }
        canvas
    }

    fn set(&mut self, point: PlotPoint, mark: char) {
        let col = (point.x.round().max(0.0) as usize).min(self.columns - 1);
        let row = (point.y.round().max(0.0) as usize).min(self.rows - 1);
        self.cells[row][col] = mark;
    }

    /// Canvas rows top to bottom, trailing blanks removed.
    pub fn lines(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|row| row.iter().collect::<String>().trim_end().to_string())
            .collect()
    }
}

impl std::fmt::Display for TextCanvas {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for line in self.lines() {
            writeln!(f, "|{}", line)?;
        }
        write!(f, "+{}", "-".repeat(self.columns))
    }
}
