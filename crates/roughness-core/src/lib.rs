//! Roughness succession simulator.
//!
//! Evolves a classified land-cover raster year by year under hydrological,
//! mechanical-disturbance and stochastic succession rules, and reduces the
//! resulting roughness stacks to per-region time series.

pub mod chart;
pub mod config;
pub mod error;
pub mod merge;
pub mod moisture;
pub mod predict;
pub mod raster;
pub mod rasterize;
pub mod region;
pub mod source;
pub mod stack;
pub mod succession;
pub mod synthetic;
pub mod transition;
pub mod zonal;
pub mod zones;

pub use config::SimulationConfig;
pub use error::{Error, Result, Stage};
pub use predict::{predict_roughness, roughness_info, voorspel, voorspel_timeseries, RoughnessPrediction, Sources};
pub use region::{Feature, FeatureCollection};
pub use source::{CloudCoverThreshold, MemorySource};
