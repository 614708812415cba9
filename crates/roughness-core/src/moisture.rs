//! Seasonal moisture classification from NDWI composites.
//!
//! A pixel "was wet" when its late-winter NDWI lies inside the wet band.
//! It stays wet when the early-summer NDWI is still inside the band, and
//! counts as moist when the summer NDWI left the band on either side.

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::config::{MoistureConfig, SeasonWindow};
use crate::error::{Error, Result, Stage};
use crate::raster::{GridSpec, Mask, Raster};
use crate::region::FeatureCollection;
use crate::source::{CloudFilter, ImagerySource, Scene};

/// Boolean (`1.0`/`0.0`) moisture rasters, masked outside the region.
#[derive(Debug, Clone, PartialEq)]
pub struct MoistureMasks {
    pub moist: Raster,
    pub wet: Raster,
}

impl MoistureMasks {
    pub const BAND_NAMES: [&'static str; 2] = ["moistMask", "wetMask"];

    pub fn band_names(&self) -> [&'static str; 2] {
        Self::BAND_NAMES
    }

    pub fn moist_mask(&self) -> Mask {
        Mask::from_raster(&self.moist, |v| v == 1.0)
    }

    pub fn wet_mask(&self) -> Mask {
        Mask::from_raster(&self.wet, |v| v == 1.0)
    }
}

/// Calendar year whose seasonal windows are composited for `start_date`:
/// the latest year whose dry window has ended on or before `start_date`.
pub fn season_year(start_date: NaiveDate, dry_season: &SeasonWindow) -> Result<i32> {
    let year = start_date.year();
    let (_, dry_end) = dry_season.in_year(year)?;
    Ok(if dry_end <= start_date { year } else { year - 1 })
}

/// Per-pixel median of `band` over `scenes`; masked where no scene has a value.
pub fn median_composite(scenes: &[&Scene], band: &str, grid: &GridSpec) -> Result<Raster> {
    let rasters = scenes
        .iter()
        .map(|s| {
            let r = s.band(band)?;
            grid.ensure_same(&r.grid, Stage::MoistureClassification)?;
            Ok(r)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = Raster::masked(*grid);
    let mut values = Vec::with_capacity(rasters.len());
    for idx in 0..grid.len() {
        values.clear();
        values.extend(rasters.iter().filter_map(|r| r.data[idx]));
        out.data[idx] = median(&mut values);
    }
    Ok(out)
}

fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) * 0.5
    } else {
        values[mid]
    })
}

/// Normalized difference water index `(green - nir) / (green + nir)`.
/// Undefined where either input is masked or the denominator is zero.
pub fn ndwi(green: &Raster, nir: &Raster) -> Raster {
    green.zip_with(nir, |g, n| {
        let (g, n) = (g?, n?);
        let sum = g + n;
        (sum != 0.0).then(|| (g - n) / sum)
    })
}

fn seasonal_ndwi(
    window: &SeasonWindow,
    year: i32,
    grid: &GridSpec,
    imagery: &dyn ImagerySource,
    cloud_filter: &dyn CloudFilter,
    config: &MoistureConfig,
) -> Result<Raster> {
    let (from, to) = window.in_year(year)?;
    let scenes = imagery
        .scenes(&grid.bounds(), from, to)
        .map_err(|e| restage(e, Stage::MoistureClassification))?;
    let total = scenes.len();
    let clear: Vec<&Scene> = scenes.iter().filter(|s| cloud_filter.accept(s)).collect();
    if clear.is_empty() {
        return Err(Error::data_unavailable(
            Stage::MoistureClassification,
            format!("no cloud-free scenes between {from} and {to} ({total} rejected)"),
        ));
    }
    debug!(%from, %to, total, clear = clear.len(), "compositing season");

    let green = median_composite(&clear, &config.green_band, grid)?;
    let nir = median_composite(&clear, &config.nir_band, grid)?;
    Ok(ndwi(&green, &nir))
}

/// Wet and moist masks for the region from the seasons preceding `start_date`.
///
/// Output rasters share `grid` and are masked outside the region geometry
/// and wherever either seasonal NDWI is undefined.
pub fn wet_moist_masks(
    start_date: NaiveDate,
    region: &FeatureCollection,
    grid: &GridSpec,
    imagery: &dyn ImagerySource,
    cloud_filter: &dyn CloudFilter,
    config: &MoistureConfig,
) -> Result<MoistureMasks> {
    let year = season_year(start_date, &config.dry_season)?;
    let wet_ndwi = seasonal_ndwi(&config.wet_season, year, grid, imagery, cloud_filter, config)?;
    let dry_ndwi = seasonal_ndwi(&config.dry_season, year, grid, imagery, cloud_filter, config)?;

    let (lo, hi) = (config.ndwi_low, config.ndwi_high);
    let in_band = |v: f32| v >= lo && v <= hi;

    let mut moist = Raster::masked(*grid);
    let mut wet = Raster::masked(*grid);
    for r in 0..grid.height {
        for c in 0..grid.width {
            let (lon, lat) = grid.cell_center(r, c);
            if !region.covers(lon, lat) {
                continue;
            }
            let idx = grid.index(r, c);
            let (Some(w), Some(d)) = (wet_ndwi.data[idx], dry_ndwi.data[idx]) else { continue };
            let was_wet = in_band(w);
            let stayed_wet = was_wet && in_band(d);
            // Drying out and over-wetting both count as leaving the wet band.
            let dried = was_wet && (d <= lo || d >= hi);
            wet.data[idx] = Some(if stayed_wet { 1.0 } else { 0.0 });
            moist.data[idx] = Some(if dried { 1.0 } else { 0.0 });
        }
    }

    let masks = MoistureMasks { moist, wet };
    info!(
        year,
        wet = masks.wet_mask().count(),
        moist = masks.moist_mask().count(),
        "classified seasonal moisture"
    );
    Ok(masks)
}

/// Re-attribute a collaborator error to the stage that called it.
pub(crate) fn restage(err: Error, stage: Stage) -> Error {
    match err {
        Error::Configuration { message, .. } => Error::Configuration { stage, message },
        Error::DataUnavailable { message, .. } => Error::DataUnavailable { stage, message },
        Error::Computation { message, .. } => Error::Computation { stage, message },
    }
}
