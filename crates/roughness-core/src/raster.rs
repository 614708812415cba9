use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, Stage};

/// Metres per degree of latitude (equirectangular approximation).
const METRES_PER_DEGREE: f64 = 111_320.0;

/// Spatial indexing shared by every raster of one analysis.
/// Row 0 is the southern edge (`min_lat`); coordinate math uses f64.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: usize,
    pub height: usize,
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl GridSpec {
    pub fn new(width: usize, height: usize, min_lon: f64, max_lon: f64, min_lat: f64, max_lat: f64) -> Self {
        Self { width, height, min_lon, max_lon, min_lat, max_lat }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }

    /// Outer lon/lat box of the grid.
    pub fn bounds(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_lon, y: self.min_lat },
            Coord { x: self.max_lon, y: self.max_lat },
        )
    }

    /// Pixel width and height in degrees.
    pub fn cell_size_deg(&self) -> (f64, f64) {
        (
            (self.max_lon - self.min_lon) / self.width as f64,
            (self.max_lat - self.min_lat) / self.height as f64,
        )
    }

    /// (lon, lat) of the pixel center.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let (dx, dy) = self.cell_size_deg();
        (
            self.min_lon + (col as f64 + 0.5) * dx,
            self.min_lat + (row as f64 + 0.5) * dy,
        )
    }

    /// Pixel containing (lon, lat), or None outside the grid.
    pub fn cell_of(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if lon < self.min_lon || lon > self.max_lon || lat < self.min_lat || lat > self.max_lat {
            return None;
        }
        let (dx, dy) = self.cell_size_deg();
        let col = (((lon - self.min_lon) / dx).floor() as usize).min(self.width.saturating_sub(1));
        let row = (((lat - self.min_lat) / dy).floor() as usize).min(self.height.saturating_sub(1));
        Some((row, col))
    }

    /// Approximate ground size of one pixel in metres (geometric mean of both axes).
    pub fn pixel_size_m(&self) -> f64 {
        let (dx, dy) = self.cell_size_deg();
        let mid_lat = ((self.min_lat + self.max_lat) * 0.5).to_radians();
        let dx_m = dx * METRES_PER_DEGREE * mid_lat.cos();
        let dy_m = dy * METRES_PER_DEGREE;
        (dx_m * dy_m).abs().sqrt()
    }

    /// Sub-grid of the pixels whose centers fall inside the lon/lat box, with
    /// the (row, col) offset of its first pixel. None if no center falls inside.
    pub fn window(&self, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Option<(GridSpec, usize, usize)> {
        let (dx, dy) = self.cell_size_deg();
        let first = |lo: f64, origin: f64, d: f64| ((lo - origin) / d - 0.5).ceil().max(0.0) as usize;
        let last = |hi: f64, origin: f64, d: f64, n: usize| {
            let v = ((hi - origin) / d - 0.5).floor();
            (v >= 0.0).then(|| (v as usize).min(n - 1))
        };
        if self.is_empty() {
            return None;
        }
        let (c0, r0) = (first(min_lon, self.min_lon, dx), first(min_lat, self.min_lat, dy));
        let c1 = last(max_lon, self.min_lon, dx, self.width)?;
        let r1 = last(max_lat, self.min_lat, dy, self.height)?;
        if c0 > c1 || r0 > r1 {
            return None;
        }
        let sub = GridSpec::new(
            c1 - c0 + 1,
            r1 - r0 + 1,
            self.min_lon + c0 as f64 * dx,
            self.min_lon + (c1 + 1) as f64 * dx,
            self.min_lat + r0 as f64 * dy,
            self.min_lat + (r1 + 1) as f64 * dy,
        );
        Some((sub, r0, c0))
    }

    /// Error unless `other` indexes pixels identically.
    pub fn ensure_same(&self, other: &GridSpec, stage: Stage) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(Error::computation(
                stage,
                format!(
                    "grid mismatch: {}x{} vs {}x{}",
                    self.width, self.height, other.width, other.height
                ),
            ))
        }
    }
}

/// A boolean per-pixel mask. Unlike [`Raster`] it has no undefined state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub grid: GridSpec,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn new(grid: GridSpec, fill: bool) -> Self {
        Self { data: vec![fill; grid.len()], grid }
    }

    /// True where `raster` is defined and `pred` holds.
    pub fn from_raster(raster: &Raster, pred: impl Fn(f32) -> bool) -> Self {
        Self {
            grid: raster.grid,
            data: raster.data.iter().map(|v| v.is_some_and(&pred)).collect(),
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> bool {
        self.data[idx]
    }

    pub fn and(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a && b)
    }

    pub fn or(&self, other: &Mask) -> Mask {
        self.combine(other, |a, b| a || b)
    }

    pub fn not(&self) -> Mask {
        Mask { grid: self.grid, data: self.data.iter().map(|v| !v).collect() }
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// `1.0` where set, `0.0` elsewhere, restricted to `within`.
    pub fn to_indicator(&self, within: &Mask) -> Raster {
        Raster {
            grid: self.grid,
            data: self
                .data
                .iter()
                .zip(&within.data)
                .map(|(&v, &w)| w.then_some(if v { 1.0 } else { 0.0 }))
                .collect(),
        }
    }

    fn combine(&self, other: &Mask, f: impl Fn(bool, bool) -> bool) -> Mask {
        debug_assert_eq!(self.data.len(), other.data.len());
        Mask {
            grid: self.grid,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        }
    }
}

/// A 2D grid of optional f32 values, row-major. `None` is a masked pixel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Raster {
    pub grid: GridSpec,
    pub data: Vec<Option<f32>>,
}

impl Raster {
    /// A raster with every pixel masked.
    pub fn masked(grid: GridSpec) -> Self {
        Self { data: vec![None; grid.len()], grid }
    }

    /// A raster with every pixel set to `fill`.
    pub fn filled(grid: GridSpec, fill: f32) -> Self {
        Self { data: vec![Some(fill); grid.len()], grid }
    }

    pub fn from_values(grid: GridSpec, values: Vec<f32>) -> Self {
        debug_assert_eq!(values.len(), grid.len());
        Self { grid, data: values.into_iter().map(Some).collect() }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.data[self.grid.index(row, col)]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: Option<f32>) {
        let idx = self.grid.index(row, col);
        self.data[idx] = val;
    }

    /// Copy of the pixels inside `window`, a sub-grid returned by
    /// [`GridSpec::window`] with its offset.
    pub fn crop(&self, window: &GridSpec, row0: usize, col0: usize) -> Raster {
        let mut data = Vec::with_capacity(window.len());
        for r in 0..window.height {
            let start = self.grid.index(row0 + r, col0);
            data.extend_from_slice(&self.data[start..start + window.width]);
        }
        Raster { grid: *window, data }
    }

    #[inline]
    pub fn is_valid(&self, idx: usize) -> bool {
        self.data[idx].is_some()
    }

    /// Apply `f` to every defined value.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Raster {
        Raster { grid: self.grid, data: self.data.iter().map(|v| v.map(&f)).collect() }
    }

    /// Combine two co-registered rasters pixel by pixel.
    pub fn zip_with(&self, other: &Raster, f: impl Fn(Option<f32>, Option<f32>) -> Option<f32>) -> Raster {
        debug_assert_eq!(self.data.len(), other.data.len());
        Raster {
            grid: self.grid,
            data: self.data.iter().zip(&other.data).map(|(&a, &b)| f(a, b)).collect(),
        }
    }

    /// Sum where missing operands count as zero. Defined where either side is.
    pub fn add_treating_missing_as_zero(&self, other: &Raster) -> Raster {
        self.zip_with(other, |a, b| match (a, b) {
            (None, None) => None,
            _ => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
        })
    }

    /// Fill masked pixels inside `footprint` with `fill`; mask everything outside it.
    pub fn unmask(&self, fill: f32, footprint: &Mask) -> Raster {
        Raster {
            grid: self.grid,
            data: self
                .data
                .iter()
                .zip(&footprint.data)
                .map(|(&v, &inside)| inside.then(|| v.unwrap_or(fill)))
                .collect(),
        }
    }

    /// Keep values only where `mask` is set.
    pub fn update_mask(&self, mask: &Mask) -> Raster {
        Raster {
            grid: self.grid,
            data: self.data.iter().zip(&mask.data).map(|(&v, &m)| if m { v } else { None }).collect(),
        }
    }

    /// Mask every pixel whose value is exactly zero.
    pub fn self_mask(&self) -> Raster {
        Raster {
            grid: self.grid,
            data: self.data.iter().map(|v| v.filter(|&x| x != 0.0)).collect(),
        }
    }

    /// Footprint of defined pixels.
    pub fn valid_mask(&self) -> Mask {
        Mask { grid: self.grid, data: self.data.iter().map(Option::is_some).collect() }
    }

    pub fn count_valid(&self) -> usize {
        self.data.iter().filter(|v| v.is_some()).count()
    }

    pub fn max(&self) -> Option<f32> {
        self.data.iter().flatten().copied().reduce(f32::max)
    }

    pub fn min(&self) -> Option<f32> {
        self.data.iter().flatten().copied().reduce(f32::min)
    }

    pub fn mean(&self) -> Option<f64> {
        let (sum, n) = self
            .data
            .iter()
            .flatten()
            .fold((0.0_f64, 0_usize), |(s, n), &v| (s + v as f64, n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}
