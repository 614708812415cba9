//! Procedural scenes for demos and tests.
//!
//! A smooth Perlin "elevation" field drives everything else: low ground is
//! water or bare and wet, high ground is willow or forest and dry. Attribute
//! layers are painted as square blocks of pixels, one rectangle feature per
//! block, labelled with the categories of the supplied configuration.

use chrono::NaiveDate;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{CategoryMap, SimulationConfig};
use crate::error::{Error, Result, Stage};
use crate::raster::{GridSpec, Raster};
use crate::region::{Feature, FeatureCollection};
use crate::source::{MemorySource, Scene};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticParams {
    pub seed: u32,
    pub width: usize,
    pub height: usize,
    /// `[min_lon, min_lat, max_lon, max_lat]`.
    pub bbox: [f64; 4],
    /// Land use is generated for this year and the one before.
    pub year: i32,
    /// Side of the square attribute blocks in pixels.
    pub block: usize,
}

impl Default for SyntheticParams {
    fn default() -> Self {
        Self {
            seed: 1,
            width: 64,
            height: 64,
            bbox: [6.000, 51.878, 6.020, 51.890],
            year: 2018,
            block: 8,
        }
    }
}

impl SyntheticParams {
    pub fn grid(&self) -> GridSpec {
        let [min_lon, min_lat, max_lon, max_lat] = self.bbox;
        GridSpec::new(self.width, self.height, min_lon, max_lon, min_lat, max_lat)
    }
}

/// Smooth field in `[0, 1]`, two noise cycles across the grid.
fn perlin_field(grid: &GridSpec, seed: u32) -> Vec<f32> {
    let perlin = Perlin::new(seed);
    let freq = 2.0 / grid.width.max(grid.height) as f64;
    let mut field = Vec::with_capacity(grid.len());
    for r in 0..grid.height {
        for c in 0..grid.width {
            let raw = perlin.get([c as f64 * freq + 0.31, r as f64 * freq + 0.17]) as f32; // ∈ (−1, 1)
            field.push(((raw + 1.0) * 0.5).clamp(0.0, 1.0));
        }
    }
    field
}

fn land_use_class(elevation: f32) -> f32 {
    match elevation {
        e if e < 0.30 => 1.0,
        e if e < 0.42 => 2.0,
        e if e < 0.55 => 3.0,
        e if e < 0.65 => 4.0,
        e if e < 0.75 => 6.0,
        _ => 5.0,
    }
}

fn label(map: &CategoryMap, code: u8) -> Result<String> {
    map.categories
        .iter()
        .find(|c| c.code == code)
        .map(|c| c.label.clone())
        .ok_or_else(|| Error::configuration(Stage::Preparation, format!("{} has no category with code {code}", map.attribute)))
}

/// Square blocks covering the grid: (row range, col range, feature rectangle).
fn blocks(grid: &GridSpec, size: usize) -> Vec<(std::ops::Range<usize>, std::ops::Range<usize>, Feature)> {
    let size = size.max(1);
    let (dx, dy) = grid.cell_size_deg();
    let mut out = Vec::new();
    for r0 in (0..grid.height).step_by(size) {
        for c0 in (0..grid.width).step_by(size) {
            let (r1, c1) = ((r0 + size).min(grid.height), (c0 + size).min(grid.width));
            let rect = Feature::rectangle(
                &format!("{r0}-{c0}"),
                grid.min_lon + c0 as f64 * dx,
                grid.min_lat + r0 as f64 * dy,
                grid.min_lon + c1 as f64 * dx,
                grid.min_lat + r1 as f64 * dy,
            );
            out.push((r0..r1, c0..c1, rect));
        }
    }
    out
}

fn block_mean(field: &[f32], grid: &GridSpec, rows: &std::ops::Range<usize>, cols: &std::ops::Range<usize>) -> f32 {
    let mut sum = 0.0;
    for r in rows.clone() {
        for c in cols.clone() {
            sum += field[grid.index(r, c)];
        }
    }
    sum / (rows.len() * cols.len()).max(1) as f32
}

/// One scene whose NDWI equals `ndwi` per pixel.
fn ndwi_scene(grid: &GridSpec, date: NaiveDate, cloud_cover: f32, ndwi: &[f32]) -> Scene {
    let nir = 0.3_f32;
    let green: Vec<f32> = ndwi
        .iter()
        .map(|&n| {
            let n = n.clamp(-0.95, 0.95);
            nir * (1.0 + n) / (1.0 - n)
        })
        .collect();
    Scene {
        date,
        cloud_cover,
        bands: BTreeMap::from([
            ("green".to_string(), Raster::from_values(*grid, green)),
            ("nir".to_string(), Raster::filled(*grid, nir)),
        ]),
    }
}

fn date(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| Error::configuration(Stage::Preparation, format!("year {year} is out of range")))
}

/// Generate a complete in-memory scene.
pub fn generate(params: &SyntheticParams, config: &SimulationConfig) -> Result<MemorySource> {
    if params.width == 0 || params.height == 0 {
        return Err(Error::configuration(Stage::Preparation, "synthetic grid must not be empty"));
    }
    let grid = params.grid();
    let elevation = perlin_field(&grid, params.seed);
    let dynamics = perlin_field(&grid, params.seed ^ 0x0001);
    let grazing = perlin_field(&grid, params.seed ^ 0x0002);
    let drying = perlin_field(&grid, params.seed ^ 0x0003);

    let mut src = MemorySource::new(grid);
    let classes = Raster::from_values(grid, elevation.iter().map(|&e| land_use_class(e)).collect());
    src.land_use.insert(params.year - 1, classes.clone());
    src.land_use.insert(params.year, classes);

    for (rows, cols, rect) in blocks(&grid, params.block) {
        let e = block_mean(&elevation, &grid, &rows, &cols);
        // Lowest blocks are permanent water, highest are rarely flooded.
        let hydro_code = (9.0 - e * 10.0).round().clamp(1.0, 9.0) as u8;
        let dyn_code = (block_mean(&dynamics, &grid, &rows, &cols) * 5.0).floor().clamp(0.0, 4.0) as u8;
        let manage_code = if hydro_code >= 8 {
            7
        } else {
            1 + (block_mean(&grazing, &grid, &rows, &cols) * 5.0).floor().clamp(0.0, 4.0) as u8
        };

        src.hydrology
            .push(rect.clone().with_property(&config.hydrology.attribute, label(&config.hydrology, hydro_code)?));
        src.mechanical_dynamics.push(
            rect.clone()
                .with_property(&config.mechanical_dynamics.attribute, label(&config.mechanical_dynamics, dyn_code)?),
        );
        src.management
            .push(rect.with_property(&config.management.attribute, label(&config.management, manage_code)?));
    }

    let wet: Vec<f32> = elevation.iter().map(|&e| 0.6 - e).collect();
    let dry: Vec<f32> = wet.iter().zip(&drying).map(|(&w, &d)| w - 0.1 - 0.4 * d).collect();
    for year in [params.year - 1, params.year] {
        src.scenes.push(ndwi_scene(&grid, date(year, 2, 14)?, 0.05, &wet));
        src.scenes.push(ndwi_scene(&grid, date(year, 3, 3)?, 0.85, &dry));
        src.scenes.push(ndwi_scene(&grid, date(year, 5, 22)?, 0.10, &dry));
        src.scenes.push(ndwi_scene(&grid, date(year, 6, 12)?, 0.02, &dry));
    }
    Ok(src)
}

/// A rectangular region over the central part of the synthetic grid.
pub fn region(params: &SyntheticParams) -> FeatureCollection {
    let [min_lon, min_lat, max_lon, max_lat] = params.bbox;
    let (w, h) = (max_lon - min_lon, max_lat - min_lat);
    FeatureCollection::new(vec![Feature::rectangle(
        "synthetic",
        min_lon + 0.1 * w,
        min_lat + 0.1 * h,
        max_lon - 0.1 * w,
        max_lat - 0.1 * h,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterize::rasterize_attribute;

    fn small() -> SyntheticParams {
        SyntheticParams { width: 24, height: 16, ..SyntheticParams::default() }
    }

    #[test]
    fn generation_is_deterministic() {
        let config = SimulationConfig::default();
        assert_eq!(generate(&small(), &config).unwrap(), generate(&small(), &config).unwrap());
    }

    #[test]
    fn field_is_in_unit_range_with_variation() {
        let g = small().grid();
        let f = perlin_field(&g, 9);
        assert_eq!(f.len(), g.len());
        assert!(f.iter().all(|v| (0.0..=1.0).contains(v)));
        let (lo, hi) = f.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        assert!(hi - lo > 0.01);
    }

    #[test]
    fn attribute_layers_cover_the_grid() {
        let config = SimulationConfig::default();
        let p = small();
        let src = generate(&p, &config).unwrap();
        let g = p.grid();
        for (features, map) in [
            (&src.hydrology, &config.hydrology),
            (&src.mechanical_dynamics, &config.mechanical_dynamics),
            (&src.management, &config.management),
        ] {
            let r = rasterize_attribute(features, map, &g, config.overlap).unwrap();
            assert_eq!(r.count_valid(), g.len(), "{}", map.attribute);
        }
        assert_eq!(src.hydrology.len(), 3 * 2);
    }

    #[test]
    fn land_use_exists_for_both_years() {
        let src = generate(&small(), &SimulationConfig::default()).unwrap();
        let classes = &src.land_use[&2018];
        assert!(src.land_use.contains_key(&2017));
        assert!(classes.data.iter().flatten().all(|&c| (1.0..=6.0).contains(&c)));
    }

    #[test]
    fn empty_grid_is_rejected() {
        let p = SyntheticParams { width: 0, ..SyntheticParams::default() };
        assert!(generate(&p, &SimulationConfig::default()).is_err());
    }
}
