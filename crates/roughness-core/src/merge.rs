//! Recombine the per-zone succession runs with the static zone.

use tracing::debug;

use crate::config::ClassTable;
use crate::error::{Error, Result, Stage};
use crate::raster::{Mask, Raster};
use crate::stack::{RoughnessBand, RoughnessStack};
use crate::zones::Zones;

/// Step-by-step merger over one prepared region.
///
/// Per step and band: the two zone bands are summed with missing values as
/// zero, pixels whose fixed no-succession roughness equals the band's class
/// coefficient add that coefficient, zeros are masked, and everything is
/// masked to the classified pixels that belong to a zone.
#[derive(Debug, Clone)]
pub struct RegionMerger<'a> {
    no_succession: &'a Raster,
    classes: &'a ClassTable,
    footprint: Mask,
}

impl<'a> RegionMerger<'a> {
    pub fn new(classified: &Raster, zones: &Zones, no_succession: &'a Raster, classes: &'a ClassTable) -> Result<Self> {
        let grid = classified.grid;
        grid.ensure_same(&no_succession.grid, Stage::Merge)?;
        grid.ensure_same(&zones.shoreline.grid, Stage::Merge)?;
        Ok(Self {
            no_succession,
            classes,
            footprint: classified.valid_mask().and(&zones.any()),
        })
    }

    /// Pixels every merged stack covers.
    pub fn footprint(&self) -> &Mask {
        &self.footprint
    }

    /// Merge the shoreline and terrestrial stacks of one step.
    pub fn merge(&self, shoreline: &RoughnessStack, terrestrial: &RoughnessStack) -> Result<RoughnessStack> {
        let grid = self.footprint.grid;
        grid.ensure_same(shoreline.grid(), Stage::Merge)?;
        grid.ensure_same(terrestrial.grid(), Stage::Merge)?;
        if shoreline.date != terrestrial.date {
            return Err(Error::computation(
                Stage::Merge,
                format!("zone steps out of step: {} vs {}", shoreline.date, terrestrial.date),
            ));
        }

        let bands = RoughnessBand::ALL.map(|band| {
            let k = self.classes.k(band);
            let summed = shoreline.band(band).add_treating_missing_as_zero(terrestrial.band(band));
            let data = summed
                .data
                .iter()
                .zip(&self.no_succession.data)
                .map(|(&v, &fixed)| {
                    let extra = if fixed == Some(k) { k } else { 0.0 };
                    Some(v.unwrap_or(0.0) + extra)
                })
                .collect();
            Raster { grid, data }.self_mask().update_mask(&self.footprint)
        });

        Ok(RoughnessStack {
            date: shoreline.date,
            year: shoreline.year,
            footprint: self.footprint.clone(),
            bands,
        })
    }
}

/// Merge complete shoreline and terrestrial sequences into one sequence.
pub fn merge_roughness_regions(
    classified: &Raster,
    zones: &Zones,
    no_succession: &Raster,
    shoreline: &[RoughnessStack],
    terrestrial: &[RoughnessStack],
    classes: &ClassTable,
) -> Result<Vec<RoughnessStack>> {
    if shoreline.len() != terrestrial.len() {
        return Err(Error::computation(
            Stage::Merge,
            format!("zone sequences differ in length: {} vs {}", shoreline.len(), terrestrial.len()),
        ));
    }
    let merger = RegionMerger::new(classified, zones, no_succession, classes)?;
    let merged = shoreline
        .iter()
        .zip(terrestrial)
        .map(|(s, t)| merger.merge(s, t))
        .collect::<Result<Vec<_>>>()?;

    debug!(steps = merged.len(), pixels = merger.footprint().count(), "merged zones");
    Ok(merged)
}
