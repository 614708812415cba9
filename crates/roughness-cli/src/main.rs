//! `roughness`: run roughness succession predictions from files.
//!
//! Inputs are a GeoJSON region and a scene file (a serialized in-memory
//! source holding land use, attribute layers and reflectance scenes).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use roughness_core::chart::Chart;
use roughness_core::predict::RoughnessInfo;
use roughness_core::synthetic::{self, SyntheticParams};
use roughness_core::{
    predict_roughness, roughness_info, voorspel_timeseries, CloudCoverThreshold, FeatureCollection, MemorySource,
    SimulationConfig, Sources,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "roughness", about = "Roughness succession predictions for floodplain regions")]
struct Cli {
    /// Log at DEBUG level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict roughness and write the time series chart document.
    Predict {
        #[command(flatten)]
        run: RunArgs,

        /// Output JSON file (stdout if omitted).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Predict roughness and print per-step statistics.
    Info {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Write a procedural scene file (and optionally a matching region).
    Synthetic {
        /// Scene file to write.
        #[arg(short, long)]
        output: PathBuf,

        /// Region GeoJSON to write alongside the scene.
        #[arg(long)]
        region_output: Option<PathBuf>,

        #[arg(long, default_value = "1")]
        seed: u32,

        #[arg(long, default_value = "64")]
        width: usize,

        #[arg(long, default_value = "64")]
        height: usize,

        /// Bounding box: min_lon min_lat max_lon max_lat.
        #[arg(long, num_args = 4, allow_negative_numbers = true)]
        bbox: Option<Vec<f64>>,

        /// Start year of the generated land use.
        #[arg(long, default_value = "2018")]
        year: i32,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Region GeoJSON file; repeat to run several regions.
    #[arg(short, long, required = true)]
    region: Vec<PathBuf>,

    /// Scene file with land use, attribute layers and imagery.
    #[arg(short, long)]
    scene: PathBuf,

    /// Simulation config JSON; missing fields keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// First simulated date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Number of simulated years.
    #[arg(long)]
    years: Option<u32>,

    /// Zonal reduction scale in metres.
    #[arg(long)]
    scale: Option<f64>,

    /// Seed of the succession draws.
    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json(&read(path)?)
                .with_context(|| format!("parsing {}", path.display()))?,
            None => SimulationConfig::default(),
        };
        if let Some(start) = self.start {
            config.start_date = start;
        }
        if let Some(years) = self.years {
            config.num_years = years;
        }
        if let Some(scale) = self.scale {
            config.scale = scale;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn write_json<T: serde::Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "wrote output");
        }
        None => println!("{json}"),
    }
    Ok(())
}

struct Loaded {
    config: SimulationConfig,
    source: MemorySource,
    regions: Vec<(PathBuf, FeatureCollection)>,
}

fn load(run: &RunArgs) -> Result<Loaded> {
    let config = run.config()?;
    let source = MemorySource::from_json(&read(&run.scene)?)
        .with_context(|| format!("parsing scene file {}", run.scene.display()))?;
    let regions = run
        .region
        .iter()
        .map(|path| {
            let region = FeatureCollection::from_geojson(&read(path)?)
                .with_context(|| format!("parsing region {}", path.display()))?;
            Ok((path.clone(), region))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Loaded { config, source, regions })
}

/// Run every region in parallel; each result is paired with its region file.
fn for_each_region<T, F>(loaded: &Loaded, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&FeatureCollection, roughness_core::RoughnessPrediction) -> roughness_core::Result<T> + Sync,
{
    let filter = CloudCoverThreshold(loaded.config.moisture.max_cloud_cover);
    loaded
        .regions
        .par_iter()
        .map(|(path, region)| {
            let sources = Sources::single(&loaded.source, &filter);
            let config = &loaded.config;
            let prediction = predict_roughness(region, config.start_date, config.num_years, sources, config)
                .with_context(|| format!("predicting {}", path.display()))?;
            f(region, prediction).with_context(|| format!("reporting {}", path.display()))
        })
        .collect()
}

// ── main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Command::Predict { run, output } => {
            let loaded = load(&run)?;
            info!(regions = loaded.regions.len(), start = %loaded.config.start_date, years = loaded.config.num_years, "predicting");
            let charts: Vec<Vec<Chart>> = for_each_region(&loaded, |region, prediction| {
                voorspel_timeseries(&prediction, region, loaded.config.scale, &loaded.config)
            })?;
            let charts: Vec<Chart> = charts.into_iter().flatten().collect();
            write_json(&charts, output.as_deref())
        }
        Command::Info { run } => {
            let loaded = load(&run)?;
            let infos: Vec<RoughnessInfo> = for_each_region(&loaded, |region, prediction| {
                roughness_info(&prediction, region, loaded.config.scale)
            })?;
            write_json(&infos, None)
        }
        Command::Synthetic { output, region_output, seed, width, height, bbox, year } => {
            let mut params = SyntheticParams { seed, width, height, year, ..SyntheticParams::default() };
            if let Some(b) = bbox.as_deref().and_then(|b| <[f64; 4]>::try_from(b).ok()) {
                params.bbox = b;
            }
            let config = SimulationConfig::default();
            let source = synthetic::generate(&params, &config).context("generating synthetic scene")?;
            write_json(&source, Some(&output))?;
            if let Some(path) = region_output {
                let region = synthetic::region(&params);
                let geojson = serde_json::json!({ "type": "FeatureCollection", "features": region.features });
                write_json(&geojson, Some(&path))?;
            }
            Ok(())
        }
    }
}
