//! End-to-end roughness prediction for one region.
//!
//! `prepare` gathers every per-pixel input of the run, `predict_roughness`
//! runs the shoreline and terrestrial successions side by side and merges
//! them year by year, and the reporting helpers reduce the merged sequence.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chart::Chart;
use crate::config::{CategoryMap, SimulationConfig, ZoneRates};
use crate::error::{Error, Result, Stage};
use crate::merge::RegionMerger;
use crate::moisture::{restage, wet_moist_masks, MoistureMasks};
use crate::raster::{GridSpec, Mask, Raster};
use crate::rasterize::rasterize_attribute;
use crate::region::FeatureCollection;
use crate::source::{CloudFilter, ImagerySource, LandUseSource, VectorLayer, VectorSource};
use crate::stack::RoughnessStack;
use crate::succession::{SuccessionParams, SuccessionRun};
use crate::transition::{bare_grazing_variables, transition_masks, GrazingRasters, StochasticFields, TransitionMasks};
use crate::zonal::zonal_timeseries;
use crate::zones::{no_succession_roughness, Zones};

/// The data collaborators of one run.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub land_use: &'a dyn LandUseSource,
    pub vectors: &'a dyn VectorSource,
    pub imagery: &'a dyn ImagerySource,
    pub cloud_filter: &'a dyn CloudFilter,
}

impl<'a> Sources<'a> {
    /// Use one value for every data collaborator.
    pub fn single<S>(source: &'a S, cloud_filter: &'a dyn CloudFilter) -> Self
    where
        S: LandUseSource + VectorSource + ImagerySource,
    {
        Self { land_use: source, vectors: source, imagery: source, cloud_filter }
    }
}

/// Every per-pixel input of the succession, on the region's grid.
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub grid: GridSpec,
    /// Land-use classes at the start year, masked outside the region.
    pub classified: Raster,
    pub hydrology: Raster,
    pub mechanical_dynamics: Raster,
    pub management: Raster,
    pub moisture: MoistureMasks,
    pub zones: Zones,
    pub no_succession: Raster,
    pub grazing: GrazingRasters,
    pub fields: StochasticFields,
}

fn region_mask(region: &FeatureCollection, grid: &GridSpec) -> Mask {
    let mut mask = Mask::new(*grid, false);
    for r in 0..grid.height {
        for c in 0..grid.width {
            let (lon, lat) = grid.cell_center(r, c);
            mask.data[grid.index(r, c)] = region.covers(lon, lat);
        }
    }
    mask
}

/// Gather the inputs of a run starting at `start_date`.
pub fn prepare(
    region: &FeatureCollection,
    start_date: NaiveDate,
    sources: Sources<'_>,
    config: &SimulationConfig,
) -> Result<PreparedData> {
    config.validate()?;
    let bounds = region
        .bounding_rect()
        .ok_or_else(|| Error::configuration(Stage::Preparation, "region has no geometry"))?;

    let year = start_date.year();
    let classified = sources.land_use.classified(year, &bounds).map_err(|e| restage(e, Stage::Preparation))?;
    let grid = classified.grid;
    let inside = region_mask(region, &grid);
    let classified = classified.update_mask(&inside);
    if classified.count_valid() == 0 {
        return Err(Error::data_unavailable(
            Stage::Preparation,
            format!("no classified pixels of {year} inside the region"),
        ));
    }

    let layer = |layer: VectorLayer, categories: &CategoryMap| -> Result<Raster> {
        let features = sources
            .vectors
            .features(layer, &grid.bounds())
            .map_err(|e| restage(e, Stage::Rasterization))?;
        if features.is_empty() {
            warn!(?layer, "no features cover the region");
        }
        rasterize_attribute(&features, categories, &grid, config.overlap)
    };
    let hydrology = layer(VectorLayer::Hydrology, &config.hydrology)?;
    let mechanical_dynamics = layer(VectorLayer::MechanicalDynamics, &config.mechanical_dynamics)?;
    let management = layer(VectorLayer::Management, &config.management)?;

    let moisture = wet_moist_masks(start_date, region, &grid, sources.imagery, sources.cloud_filter, &config.moisture)?;

    let zones = Zones::from_hydrology(&hydrology, &config.zones);
    let no_succession = no_succession_roughness(&classified, &zones.no_succession, &config.classes);
    let grazing = bare_grazing_variables(&management, &config.grazing);
    let fields = StochasticFields::draw(&grid, config.seed);

    info!(
        width = grid.width,
        height = grid.height,
        classified = classified.count_valid(),
        shoreline = zones.shoreline.count(),
        terrestrial = zones.terrestrial.count(),
        no_succession = zones.no_succession.count(),
        "prepared region"
    );

    Ok(PreparedData {
        grid,
        classified,
        hydrology,
        mechanical_dynamics,
        management,
        moisture,
        zones,
        no_succession,
        grazing,
        fields,
    })
}

/// The merged roughness sequence of one region.
#[derive(Debug, Clone)]
pub struct RoughnessPrediction {
    pub start_date: NaiveDate,
    pub num_years: u32,
    /// `num_years + 1` stacks, year 0 first.
    pub stacks: Vec<RoughnessStack>,
}

impl RoughnessPrediction {
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    pub fn band_names(&self) -> Vec<&'static str> {
        self.stacks.first().map(RoughnessStack::band_names).unwrap_or_default()
    }
}

/// Inputs of one zone's succession run.
struct ZoneRun {
    classified: Raster,
    footprint: Mask,
    masks: TransitionMasks,
}

impl ZoneRun {
    fn new(data: &PreparedData, zone: &Mask, rates: &ZoneRates) -> Result<Self> {
        let footprint = zone.and(&data.classified.valid_mask());
        let classified = data.classified.update_mask(&footprint);
        let masks = transition_masks(&classified, &data.moisture, &data.mechanical_dynamics, &data.fields, rates)?;
        Ok(Self { classified, footprint, masks })
    }

    fn run<'a>(
        &'a self,
        grazing: &'a GrazingRasters,
        params: &'a SuccessionParams,
        start: NaiveDate,
        num_years: u32,
    ) -> Result<SuccessionRun<'a>> {
        SuccessionRun::new(&self.classified, &self.footprint, &self.masks, grazing, params, start, num_years)
    }
}

/// Predict roughness for `num_years` years after `start_date`.
pub fn predict_roughness(
    region: &FeatureCollection,
    start_date: NaiveDate,
    num_years: u32,
    sources: Sources<'_>,
    config: &SimulationConfig,
) -> Result<RoughnessPrediction> {
    let data = prepare(region, start_date, sources, config)?;
    predict_from(&data, start_date, num_years, config)
}

/// Run and merge both zone successions over prepared inputs.
pub fn predict_from(
    data: &PreparedData,
    start_date: NaiveDate,
    num_years: u32,
    config: &SimulationConfig,
) -> Result<RoughnessPrediction> {
    let params = SuccessionParams::from_config(config);
    let shoreline = ZoneRun::new(data, &data.zones.shoreline, &config.shoreline)?;
    let terrestrial = ZoneRun::new(data, &data.zones.terrestrial, &config.terrestrial)?;
    let merger = RegionMerger::new(&data.classified, &data.zones, &data.no_succession, &config.classes)?;

    let shore_run = shoreline.run(&data.grazing, &params, start_date, num_years)?;
    let terr_run = terrestrial.run(&data.grazing, &params, start_date, num_years)?;
    let stacks = shore_run
        .zip(terr_run)
        .map(|(s, t)| merger.merge(&s, &t))
        .collect::<Result<Vec<_>>>()?;

    if stacks.len() != num_years as usize + 1 {
        return Err(Error::computation(
            Stage::Accumulation,
            format!("expected {} steps, produced {}", num_years + 1, stacks.len()),
        ));
    }
    info!(%start_date, num_years, steps = stacks.len(), "predicted roughness");
    Ok(RoughnessPrediction { start_date, num_years, stacks })
}

/// Summary of one step's total roughness inside the region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepInfo {
    pub date: NaiveDate,
    pub year: u32,
    pub valid_pixels: usize,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoughnessInfo {
    pub start_date: NaiveDate,
    pub num_years: u32,
    pub band_names: Vec<String>,
    pub scale: f64,
    pub steps: Vec<StepInfo>,
}

impl RoughnessInfo {
    /// Largest total roughness over every step.
    pub fn max(&self) -> Option<f32> {
        self.steps.iter().filter_map(|s| s.max).reduce(f32::max)
    }
}

/// Per-step statistics of total roughness over the region.
pub fn roughness_info(prediction: &RoughnessPrediction, region: &FeatureCollection, scale: f64) -> Result<RoughnessInfo> {
    let Some(first) = prediction.stacks.first() else {
        return Err(Error::computation(Stage::Aggregation, "prediction has no steps"));
    };
    let inside = region_mask(region, first.grid());
    let steps = prediction
        .stacks
        .iter()
        .map(|stack| {
            let total = stack.total_roughness().update_mask(&inside);
            StepInfo {
                date: stack.date,
                year: stack.year,
                valid_pixels: total.count_valid(),
                min: total.min(),
                max: total.max(),
                mean: total.mean(),
            }
        })
        .collect();
    debug!(steps = prediction.len(), "roughness info");
    Ok(RoughnessInfo {
        start_date: prediction.start_date,
        num_years: prediction.num_years,
        band_names: prediction.band_names().into_iter().map(str::to_string).collect(),
        scale,
        steps,
    })
}

/// Chart document of the mean total roughness per region feature.
pub fn voorspel_timeseries(
    prediction: &RoughnessPrediction,
    region: &FeatureCollection,
    scale: f64,
    config: &SimulationConfig,
) -> Result<Vec<Chart>> {
    let series = zonal_timeseries(&prediction.stacks, region, scale)?;
    Ok(vec![Chart::line(&series, &config.display)?])
}

/// Predict with the configured start date and horizon, then chart the result.
pub fn voorspel(region: &FeatureCollection, scale: f64, sources: Sources<'_>, config: &SimulationConfig) -> Result<Vec<Chart>> {
    let prediction = predict_roughness(region, config.start_date, config.num_years, sources, config)?;
    voorspel_timeseries(&prediction, region, scale, config)
}
