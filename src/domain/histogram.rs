//! Fixed-binning 1-D / 2-D histograms.
//!
//! This is the minimal histogram the efficiency client needs from a store:
//! uniform axes, dense contents, no under/overflow bins.

use serde::{Deserialize, Serialize};

use crate::error::TnpError;

/// A uniform axis with `bins` bins over `[low, high)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: usize,
    pub low: f64,
    pub high: f64,
}

impl Axis {
    pub fn new(bins: usize, low: f64, high: f64) -> Result<Self, TnpError> {
        let axis = Self { bins, low, high };
        axis.validate()?;
        Ok(axis)
    }

    /// Axes read from files bypass [`Axis::new`] and are checked here.
    pub fn validate(&self) -> Result<(), TnpError> {
        let Self { bins, low, high } = *self;
        if bins == 0 || !(low.is_finite() && high.is_finite()) || high <= low {
            return Err(TnpError::HistogramShape(format!(
                "invalid axis: bins={bins} range=[{low}, {high}]"
            )));
        }
        Ok(())
    }

    pub fn bin_width(&self) -> f64 {
        (self.high - self.low) / self.bins as f64
    }

    pub fn bin_low(&self, i: usize) -> f64 {
        self.low + i as f64 * self.bin_width()
    }

    pub fn bin_center(&self, i: usize) -> f64 {
        self.low + (i as f64 + 0.5) * self.bin_width()
    }

    /// Index of the bin containing `x`, or `None` outside the axis.
    pub fn find_bin(&self, x: f64) -> Option<usize> {
        if self.bins == 0 || !(x >= self.low && x < self.high) {
            return None;
        }
        let i = ((x - self.low) / self.bin_width()) as usize;
        Some(i.min(self.bins - 1))
    }
}

/// Dense histogram; 2-D contents are row-major (`contents[iy * nx + ix]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    pub x: Axis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Axis>,
    pub contents: Vec<f64>,
}

impl Histogram {
    pub fn new_1d(x: Axis) -> Self {
        Self {
            x,
            y: None,
            contents: vec![0.0; x.bins],
        }
    }

    pub fn new_2d(x: Axis, y: Axis) -> Self {
        Self {
            x,
            y: Some(y),
            contents: vec![0.0; x.bins * y.bins],
        }
    }

    /// Build a 1-D histogram from explicit bin contents.
    pub fn from_contents(x: Axis, contents: Vec<f64>) -> Result<Self, TnpError> {
        if contents.len() != x.bins {
            return Err(TnpError::HistogramShape(format!(
                "expected {} bin contents, got {}",
                x.bins,
                contents.len()
            )));
        }
        Ok(Self { x, y: None, contents })
    }

    pub fn dimension(&self) -> u8 {
        if self.y.is_some() { 2 } else { 1 }
    }

    /// Number of y-slices (1 for a 1-D histogram).
    pub fn slice_count(&self) -> usize {
        self.y.map(|a| a.bins).unwrap_or(1)
    }

    pub fn fill(&mut self, x: f64) {
        self.fill_weighted(x, 1.0);
    }

    pub fn fill_weighted(&mut self, x: f64, w: f64) {
        if self.y.is_some() {
            return;
        }
        if let Some(ix) = self.x.find_bin(x) {
            self.contents[ix] += w;
        }
    }

    pub fn fill_2d(&mut self, x: f64, y: f64) {
        let Some(y_axis) = self.y else {
            return;
        };
        if let (Some(ix), Some(iy)) = (self.x.find_bin(x), y_axis.find_bin(y)) {
            self.contents[iy * self.x.bins + ix] += 1.0;
        }
    }

    pub fn entries(&self) -> f64 {
        self.contents.iter().sum()
    }

    /// Mass spectrum of y-bin `iy` (the whole histogram for 1-D).
    ///
    /// Empty when the slice lies outside the contents.
    pub fn x_slice(&self, iy: usize) -> &[f64] {
        let nx = self.x.bins;
        iy.checked_mul(nx)
            .and_then(|start| Some(start..start.checked_add(nx)?))
            .and_then(|range| self.contents.get(range))
            .unwrap_or(&[])
    }

    /// Number of bins the axes call for, `None` on overflow.
    pub fn expected_len(&self) -> Option<usize> {
        self.x.bins.checked_mul(self.slice_count())
    }

    /// Contents length matches the axes.
    pub fn is_consistent(&self) -> bool {
        self.expected_len() == Some(self.contents.len())
    }

    /// Valid axes and a contents length that matches them.
    pub fn validate(&self) -> Result<(), TnpError> {
        self.x.validate()?;
        if let Some(y) = &self.y {
            y.validate()?;
        }
        if !self.is_consistent() {
            return Err(TnpError::HistogramShape(format!(
                "{} contents for a {}x{} binning",
                self.contents.len(),
                self.x.bins,
                self.slice_count()
            )));
        }
        Ok(())
    }
}
