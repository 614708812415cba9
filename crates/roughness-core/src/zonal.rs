//! Region-level reduction of a roughness sequence.
//!
//! The mean is taken over pixel centers inside a feature, sampled on a
//! stride that approximates the requested ground scale. A feature with no
//! valid pixel yields `None` for that step; steps are never dropped,
//! so every series has exactly one value per timestep.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result, Stage};
use crate::raster::{GridSpec, Raster};
use crate::region::{Feature, FeatureCollection};
use crate::stack::RoughnessStack;

/// Sample every `stride`-th pixel so that samples are about `scale` metres apart.
pub fn sample_stride(grid: &GridSpec, scale: f64) -> usize {
    let px = grid.pixel_size_m();
    if px.is_nan() || px <= 0.0 {
        return 1;
    }
    ((scale / px).round() as usize).max(1)
}

/// Mean of the defined values of `raster` at sampled pixel centers inside
/// `feature`; None when no pixel inside the feature is defined.
///
/// Samples start at the feature's first pixel. A feature too small to catch
/// a strided sample is reduced over all of its pixels instead.
pub fn zonal_mean(raster: &Raster, feature: &Feature, scale: f64) -> Option<f64> {
    let grid = &raster.grid;
    let b = feature.shape.bounding_rect()?;
    let (window, r0, c0) = grid.window(b.min().x, b.min().y, b.max().x, b.max().y)?;
    let rows = r0..r0 + window.height;
    let cols = c0..c0 + window.width;
    let stride = sample_stride(grid, scale);

    strided_mean(raster, feature, rows.clone(), cols.clone(), stride)
        .or_else(|| (stride > 1).then(|| strided_mean(raster, feature, rows, cols, 1)).flatten())
}

fn strided_mean(
    raster: &Raster,
    feature: &Feature,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
    stride: usize,
) -> Option<f64> {
    let grid = &raster.grid;
    let (mut sum, mut n) = (0.0_f64, 0_usize);
    for r in rows.step_by(stride) {
        for c in cols.clone().step_by(stride) {
            let (lon, lat) = grid.cell_center(r, c);
            if !feature.shape.covers(lon, lat) {
                continue;
            }
            if let Some(v) = raster.data[grid.index(r, c)] {
                sum += v as f64;
                n += 1;
            }
        }
    }
    (n > 0).then(|| sum / n as f64)
}

/// Mean total roughness of one feature per timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZonalSeries {
    pub name: String,
    pub timestamps: Vec<NaiveDate>,
    pub values: Vec<Option<f64>>,
}

impl ZonalSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Reduce the total roughness of every step over every feature of `region`.
pub fn zonal_timeseries(sequence: &[RoughnessStack], region: &FeatureCollection, scale: f64) -> Result<Vec<ZonalSeries>> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(Error::configuration(Stage::Aggregation, format!("scale must be positive, got {scale}")));
    }
    if region.is_empty() {
        return Err(Error::configuration(Stage::Aggregation, "region has no features"));
    }

    let timestamps: Vec<NaiveDate> = sequence.iter().map(|s| s.date).collect();
    let totals: Vec<Raster> = sequence.iter().map(RoughnessStack::total_roughness).collect();
    let names = region.names();

    let reduce = |(feature, name): (&Feature, &String)| ZonalSeries {
        name: name.clone(),
        timestamps: timestamps.clone(),
        values: totals.iter().map(|t| zonal_mean(t, feature, scale)).collect(),
    };

    #[cfg(feature = "threading")]
    let series: Vec<ZonalSeries> = {
        use rayon::prelude::*;
        region.features.par_iter().zip(names.par_iter()).map(reduce).collect()
    };
    #[cfg(not(feature = "threading"))]
    let series: Vec<ZonalSeries> = region.features.iter().zip(names.iter()).map(reduce).collect();

    debug!(features = series.len(), steps = timestamps.len(), scale, "zonal reduction");
    Ok(series)
}
