//! End-to-end runs over a hand-built six-pixel scene near (6.011, 51.883).
//!
//! Pixels, west to east:
//!   0  bare,  shoreline,   weak dynamics,   wet,   intensive grazing (reed 10 %)
//!   1  grass, terrestrial, no dynamics
//!   2  water, no succession
//!   3  bare,  shoreline,   strong dynamics, moist
//!   4  bare,  terrestrial, weak dynamics,   wet,   mowing (no reed growth)
//!   5  grass, no hydrology feature (outside every zone)

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use chrono::NaiveDate;
use roughness_core::chart::Chart;
use roughness_core::raster::{GridSpec, Raster};
use roughness_core::source::Scene;
use roughness_core::stack::RoughnessBand;
use roughness_core::{
    predict_roughness, roughness_info, voorspel_timeseries, CloudCoverThreshold, Feature, FeatureCollection,
    MemorySource, SimulationConfig, Sources,
};

const MIN_LON: f64 = 6.0100;
const DLON: f64 = 0.0002;
const MIN_LAT: f64 = 51.8830;
const MAX_LAT: f64 = 51.8832;

const REGION: &str = r#"{
    "type": "FeatureCollection",
    "features": [{
        "type": "Feature",
        "properties": { "name": "uiterwaard" },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [6.0099, 51.8829], [6.0113, 51.8829], [6.0113, 51.8833],
                [6.0099, 51.8833], [6.0099, 51.8829]
            ]]
        }
    }]
}"#;

fn grid() -> GridSpec {
    GridSpec::new(6, 1, MIN_LON, MIN_LON + 6.0 * DLON, MIN_LAT, MAX_LAT)
}

fn pixel(i: usize, attribute: &str, label: &str) -> Feature {
    let lon = MIN_LON + i as f64 * DLON;
    Feature::rectangle(&format!("{attribute}-{i}"), lon, MIN_LAT, lon + DLON, MAX_LAT).with_property(attribute, label)
}

fn ndwi_scene(date: NaiveDate, cloud_cover: f32, ndwi: [f32; 6]) -> Scene {
    let nir = 0.3_f32;
    let green = ndwi.iter().map(|n| nir * (1.0 + n) / (1.0 - n)).collect();
    Scene {
        date,
        cloud_cover,
        bands: BTreeMap::from([
            ("green".to_string(), Raster::from_values(grid(), green)),
            ("nir".to_string(), Raster::filled(grid(), nir)),
        ]),
    }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn source() -> MemorySource {
    let mut src = MemorySource::new(grid());
    src.land_use.insert(2018, Raster::from_values(grid(), vec![2.0, 3.0, 1.0, 2.0, 2.0, 3.0]));

    for (i, label) in ["annually_flooded", "flood_free", "deep_water", "annually_flooded", "rarely_flooded"]
        .iter()
        .enumerate()
    {
        src.hydrology.push(pixel(i, "HYDROLOGIE", label));
    }
    for (i, label) in ["low", "none", "none", "high", "low", "none"].iter().enumerate() {
        src.mechanical_dynamics.push(pixel(i, "MECH_DYN", label));
    }
    for (i, label) in ["intensive_grazing", "unmanaged", "water", "unmanaged", "mowing", "unmanaged"]
        .iter()
        .enumerate()
    {
        src.management.push(pixel(i, "BEHEER", label));
    }

    src.scenes.push(ndwi_scene(date(2018, 2, 20), 0.05, [0.2; 6]));
    // Too cloudy; would make every pixel dry if it were used.
    src.scenes.push(ndwi_scene(date(2018, 3, 12), 0.9, [-0.8; 6]));
    src.scenes.push(ndwi_scene(date(2018, 6, 10), 0.1, [0.2, -0.5, 0.6, -0.5, 0.2, 0.2]));
    src
}

fn config() -> SimulationConfig {
    SimulationConfig { start_date: date(2018, 11, 1), num_years: 10, seed: 42, ..SimulationConfig::default() }
}

fn run() -> (FeatureCollection, roughness_core::RoughnessPrediction) {
    let src = source();
    let config = config();
    let region = FeatureCollection::from_geojson(REGION).unwrap();
    let filter = CloudCoverThreshold(config.moisture.max_cloud_cover);
    let prediction =
        predict_roughness(&region, config.start_date, config.num_years, Sources::single(&src, &filter), &config)
            .unwrap();
    (region, prediction)
}

#[test]
fn reference_region_regression() {
    let (region, prediction) = run();
    assert_eq!(prediction.len(), 11);
    assert_eq!(
        prediction.stacks[0].band_names(),
        vec![
            "waterRoughness",
            "bareRoughness",
            "grassRoughness",
            "herbaceousRoughness",
            "forestRoughness",
            "willowRoughness"
        ]
    );

    let info = roughness_info(&prediction, &region, 10.0).unwrap();
    let max = info.max().unwrap();
    assert_eq!(max.round(), 2.0);
    // Ten years of reed growth at 10 % of the ungrazed rate.
    assert_relative_eq!(max, 0.15 + 0.1 * (20.73 - 0.15), epsilon = 1e-3);
}

#[test]
fn timestamps_advance_by_whole_years() {
    let (_, prediction) = run();
    for (t, stack) in prediction.stacks.iter().enumerate() {
        assert_eq!(stack.year, t as u32);
        assert_eq!(stack.date, date(2018 + t as i32, 11, 1));
    }
}

#[test]
fn pixels_outside_every_zone_stay_masked() {
    let (_, prediction) = run();
    for stack in &prediction.stacks {
        assert_eq!(stack.defined_bands_at(5), 0);
        assert_eq!(stack.total_roughness().data[5], None);
        // Water keeps zero roughness but is still covered.
        assert_eq!(stack.total_roughness().data[2], Some(0.0));
    }
}

#[test]
fn deterministic_bare_pixels() {
    let (_, prediction) = run();
    let last = prediction.stacks.last().unwrap();
    let bare = last.band(RoughnessBand::Bare);
    // Strong dynamics never transitions; mowing grows no reed.
    assert_relative_eq!(bare.data[3].unwrap(), 0.15);
    assert_relative_eq!(bare.data[4].unwrap(), 0.15);
    for stack in &prediction.stacks {
        assert_eq!(stack.band(RoughnessBand::Forest), prediction.stacks[0].band(RoughnessBand::Forest));
        assert_eq!(stack.band(RoughnessBand::Water), prediction.stacks[0].band(RoughnessBand::Water));
    }
}

#[test]
fn year_zero_holds_class_coefficients() {
    let (_, prediction) = run();
    let first = &prediction.stacks[0];
    let classes = config().classes;
    assert_eq!(first.band(RoughnessBand::Bare).data[0], classes.coefficient(2));
    assert_eq!(first.band(RoughnessBand::Grass).data[1], classes.coefficient(3));
    for idx in [0, 1, 3, 4] {
        assert_eq!(first.defined_bands_at(idx), 1, "pixel {idx}");
    }
}

#[test]
fn series_cover_every_step() {
    let (region, prediction) = run();
    let config = config();
    let charts: Vec<Chart> = voorspel_timeseries(&prediction, &region, 10.0, &config).unwrap();
    let chart = &charts[0];
    // 2019-11-01 through 2028-11-01 lie inside the 2019-06-01 + 10 year window.
    assert_eq!(chart.x_axis.data.len(), 10);
    assert_eq!(chart.x_axis.data[0], "2019-11-01 00:00");
    assert_eq!(chart.series.len(), 1);
    assert_eq!(chart.series[0].name, "uiterwaard");
    assert_eq!(chart.series[0].data.len(), chart.x_axis.data.len());

    let full = roughness_core::zonal::zonal_timeseries(&prediction.stacks, &region, 10.0).unwrap();
    assert_eq!(full[0].len(), prediction.len());
    // Year 0 mean over the five zoned pixels.
    assert_relative_eq!(full[0].values[0].unwrap(), (0.15 + 0.39 + 0.0 + 0.15 + 0.15) / 5.0, epsilon = 1e-6);
}

#[test]
fn scene_file_round_trip_gives_same_prediction() {
    let src = source();
    let json = serde_json::to_string(&src).unwrap();
    let reloaded = MemorySource::from_json(&json).unwrap();
    let config = config();
    let region = FeatureCollection::from_geojson(REGION).unwrap();
    let filter = CloudCoverThreshold(config.moisture.max_cloud_cover);
    let a = predict_roughness(&region, config.start_date, 3, Sources::single(&reloaded, &filter), &config).unwrap();
    let (_, b) = run();
    assert_eq!(a.stacks[..], b.stacks[..4]);
}
