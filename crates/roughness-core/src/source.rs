//! External data collaborators and an in-memory implementation of each.
//!
//! The pipeline only ever talks to these traits. `MemorySource` backs the
//! CLI (scene files) and the tests.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use geo::Rect;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, Stage};
use crate::raster::{GridSpec, Raster};
use crate::region::Feature;

/// Classified land-use rasters (class codes 1..=6) by year.
pub trait LandUseSource {
    /// The classified raster for `year`, cropped to the pixels whose centers
    /// fall inside `bounds`.
    fn classified(&self, year: i32, bounds: &Rect<f64>) -> Result<Raster>;
}

/// Vector attribute layers consumed by the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorLayer {
    Hydrology,
    MechanicalDynamics,
    Management,
}

pub trait VectorSource {
    /// Features of `layer` whose bounding box intersects `bounds`, in source order.
    fn features(&self, layer: VectorLayer, bounds: &Rect<f64>) -> Result<Vec<Feature>>;
}

/// One dated multi-band reflectance scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub date: NaiveDate,
    /// Fraction of the scene covered by cloud, 0..=1.
    pub cloud_cover: f32,
    pub bands: BTreeMap<String, Raster>,
}

impl Scene {
    /// A band by name; a missing band is a configuration error.
    pub fn band(&self, name: &str) -> Result<&Raster> {
        self.bands.get(name).ok_or_else(|| {
            Error::configuration(
                Stage::MoistureClassification,
                format!("scene of {} has no '{name}' band", self.date),
            )
        })
    }
}

/// Reflectance imagery by date range.
pub trait ImagerySource {
    /// Scenes dated within `[from, to]`, cropped like [`LandUseSource::classified`].
    fn scenes(&self, bounds: &Rect<f64>, from: NaiveDate, to: NaiveDate) -> Result<Vec<Scene>>;
}

/// Decides whether a scene is clear enough to use.
pub trait CloudFilter {
    fn accept(&self, scene: &Scene) -> bool;
}

/// Accepts scenes whose cloud fraction does not exceed the threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CloudCoverThreshold(pub f32);

impl CloudFilter for CloudCoverThreshold {
    fn accept(&self, scene: &Scene) -> bool {
        scene.cloud_cover <= self.0
    }
}

/// All data an in-process run needs, held in memory and serializable as a
/// scene file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySource {
    pub grid: GridSpec,
    pub land_use: BTreeMap<i32, Raster>,
    #[serde(default)]
    pub hydrology: Vec<Feature>,
    #[serde(default)]
    pub mechanical_dynamics: Vec<Feature>,
    #[serde(default)]
    pub management: Vec<Feature>,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl MemorySource {
    pub fn new(grid: GridSpec) -> Self {
        Self {
            grid,
            land_use: BTreeMap::new(),
            hydrology: Vec::new(),
            mechanical_dynamics: Vec::new(),
            management: Vec::new(),
            scenes: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let source: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration(Stage::Preparation, format!("invalid scene file: {e}")))?;
        source.validate()?;
        Ok(source)
    }

    /// Every raster must sit on the source grid and hold one value per pixel.
    pub fn validate(&self) -> Result<()> {
        for (year, raster) in &self.land_use {
            self.check(raster, Stage::Preparation, || format!("land use {year}"))?;
        }
        for scene in &self.scenes {
            for (name, raster) in &scene.bands {
                self.check(raster, Stage::MoistureClassification, || format!("band '{name}' of scene {}", scene.date))?;
            }
        }
        Ok(())
    }

    fn check(&self, raster: &Raster, stage: Stage, what: impl Fn() -> String) -> Result<()> {
        if raster.grid != self.grid {
            return Err(Error::configuration(
                stage,
                format!(
                    "{} is {}x{}, source grid is {}x{}",
                    what(),
                    raster.grid.width,
                    raster.grid.height,
                    self.grid.width,
                    self.grid.height
                ),
            ));
        }
        if raster.data.len() != self.grid.len() {
            return Err(Error::configuration(
                stage,
                format!("{} holds {} values for {} pixels", what(), raster.data.len(), self.grid.len()),
            ));
        }
        Ok(())
    }

    fn layer(&self, layer: VectorLayer) -> &[Feature] {
        match layer {
            VectorLayer::Hydrology => &self.hydrology,
            VectorLayer::MechanicalDynamics => &self.mechanical_dynamics,
            VectorLayer::Management => &self.management,
        }
    }

    fn window(&self, bounds: &Rect<f64>, stage: Stage) -> Result<(GridSpec, usize, usize)> {
        self.grid
            .window(bounds.min().x, bounds.min().y, bounds.max().x, bounds.max().y)
            .ok_or_else(|| Error::data_unavailable(stage, "region lies outside the source grid"))
    }
}

impl LandUseSource for MemorySource {
    fn classified(&self, year: i32, bounds: &Rect<f64>) -> Result<Raster> {
        let raster = self.land_use.get(&year).ok_or_else(|| {
            Error::data_unavailable(Stage::Preparation, format!("no classified land use for {year}"))
        })?;
        self.check(raster, Stage::Preparation, || format!("land use {year}"))?;
        let (window, r0, c0) = self.window(bounds, Stage::Preparation)?;
        Ok(raster.crop(&window, r0, c0))
    }
}

impl VectorSource for MemorySource {
    fn features(&self, layer: VectorLayer, bounds: &Rect<f64>) -> Result<Vec<Feature>> {
        Ok(self
            .layer(layer)
            .iter()
            .filter(|f| {
                f.shape.bounding_rect().is_some_and(|b| {
                    b.min().x <= bounds.max().x
                        && b.max().x >= bounds.min().x
                        && b.min().y <= bounds.max().y
                        && b.max().y >= bounds.min().y
                })
            })
            .cloned()
            .collect())
    }
}

impl ImagerySource for MemorySource {
    fn scenes(&self, bounds: &Rect<f64>, from: NaiveDate, to: NaiveDate) -> Result<Vec<Scene>> {
        let (window, r0, c0) = self.window(bounds, Stage::MoistureClassification)?;
        self.scenes
            .iter()
            .filter(|s| s.date >= from && s.date <= to)
            .map(|s| {
                let bands = s
                    .bands
                    .iter()
                    .map(|(k, r)| {
                        self.check(r, Stage::MoistureClassification, || format!("band '{k}' of scene {}", s.date))?;
                        Ok((k.clone(), r.crop(&window, r0, c0)))
                    })
                    .collect::<Result<_>>()?;
                Ok(Scene { date: s.date, cloud_cover: s.cloud_cover, bands })
            })
            .collect()
    }
}
