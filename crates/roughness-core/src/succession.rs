//! Year-by-year roughness succession for one zone.
//!
//! The state is a [`RoughnessStack`]. Year 0 holds each pixel's class
//! coefficient in the band of its class. Every later year is a pure function
//! of the previous stack, the fixed transition masks and the grazing rasters,
//! so a run only keeps the previous stack while it produces the next one.

use chrono::{Months, NaiveDate};
use tracing::debug;

use crate::config::{ClassTable, SimulationConfig};
use crate::error::{Error, Result, Stage};
use crate::raster::{Mask, Raster};
use crate::stack::{RoughnessBand, RoughnessStack};
use crate::transition::{GrazingRasters, TransitionMasks};

/// Willow roughness after `t` years: `max / (1 + A·Bᵗ)`.
///
/// Non-decreasing in `t` for `A ≥ 0` and `0 ≤ B ≤ 1`, bounded by `max`.
#[inline]
pub fn willow_function(a: f32, b: f32, t: u32, max: f32) -> f32 {
    max / (1.0 + a * b.powi(t as i32))
}

/// Constants of the recurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessionParams {
    pub classes: ClassTable,
    pub years_to_maturity: f32,
    pub willow_max: f32,
}

impl SuccessionParams {
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self {
            classes: config.classes.clone(),
            years_to_maturity: config.years_to_maturity,
            willow_max: config.willow_max,
        }
    }

    /// Yearly increment moving a pixel from class `from` to class `to`.
    fn yearly_step(&self, from: RoughnessBand, to: RoughnessBand) -> f32 {
        (self.classes.k(to) - self.classes.k(from)) / self.years_to_maturity
    }
}

impl Default for SuccessionParams {
    fn default() -> Self {
        Self::from_config(&SimulationConfig::default())
    }
}

/// Date of simulated year `year`.
pub fn step_date(start: NaiveDate, year: u32) -> Option<NaiveDate> {
    start.checked_add_months(Months::new(year.checked_mul(12)?))
}

/// Year-0 stack: band `class - 1` holds the class coefficient, every other
/// band is masked. Pixels outside `footprint` are masked in every band.
pub fn initial_stack(classified: &Raster, footprint: &Mask, classes: &ClassTable, date: NaiveDate) -> RoughnessStack {
    let grid = classified.grid;
    let mut bands: [Raster; 6] = std::array::from_fn(|_| Raster::masked(grid));
    for (idx, code) in classified.data.iter().enumerate() {
        if !footprint.get(idx) {
            continue;
        }
        let Some(band) = code.and_then(|c| RoughnessBand::from_class(c as u8)) else { continue };
        bands[band.index()].data[idx] = Some(classes.k(band));
    }
    RoughnessStack { date, year: 0, footprint: footprint.clone(), bands }
}

/// Iterator over the stacks of one zone, year 0 through `num_years`.
pub struct SuccessionRun<'a> {
    classified: &'a Raster,
    footprint: &'a Mask,
    masks: &'a TransitionMasks,
    grazing: &'a GrazingRasters,
    params: &'a SuccessionParams,
    start: NaiveDate,
    num_years: u32,
    next_year: u32,
    prev: Option<RoughnessStack>,
}

impl<'a> SuccessionRun<'a> {
    pub fn new(
        classified: &'a Raster,
        footprint: &'a Mask,
        masks: &'a TransitionMasks,
        grazing: &'a GrazingRasters,
        params: &'a SuccessionParams,
        start: NaiveDate,
        num_years: u32,
    ) -> Result<Self> {
        let grid = classified.grid;
        for other in [
            &footprint.grid,
            &masks.bare_to_reed.grid,
            &masks.willow_to_forest.grid,
            &grazing.reed_rate.grid,
            &grazing.willow_a.grid,
            &grazing.willow_b.grid,
        ] {
            grid.ensure_same(other, Stage::Accumulation)?;
        }
        if step_date(start, num_years).is_none() {
            return Err(Error::configuration(
                Stage::Accumulation,
                format!("{num_years} years from {start} is out of the calendar range"),
            ));
        }
        Ok(Self {
            classified,
            footprint,
            masks,
            grazing,
            params,
            start,
            num_years,
            next_year: 0,
            prev: None,
        })
    }

    /// Stack for year `t` from the stack of year `t - 1`.
    fn advance(&self, prev: &RoughnessStack, t: u32, date: NaiveDate) -> RoughnessStack {
        let grid = prev.footprint.grid;
        let p = self.params;
        let k_bare = p.classes.k(RoughnessBand::Bare);
        let reed_cap = p.classes.reed;
        let reed_step = (reed_cap - k_bare) / p.years_to_maturity;
        let grass_step = p.yearly_step(RoughnessBand::Grass, RoughnessBand::Herbaceous);
        let herb_step = p.yearly_step(RoughnessBand::Herbaceous, RoughnessBand::Willow);
        let willow_step = p.yearly_step(RoughnessBand::Willow, RoughnessBand::Forest);

        let mut bare = Raster::masked(grid);
        let mut grass = Raster::masked(grid);
        let mut herb = Raster::masked(grid);
        let mut willow = Raster::masked(grid);

        let prev_value = |band: RoughnessBand, idx: usize| prev.band(band).data[idx].unwrap_or(0.0);
        let m = self.masks;

        for idx in 0..grid.len() {
            if !self.footprint.get(idx) {
                continue;
            }

            let mut b = prev_value(RoughnessBand::Bare, idx);
            if m.bare_to_reed.get(idx) {
                let gain = self.grazing.reed_rate.data[idx].unwrap_or(0.0) * reed_step;
                b += gain.min((reed_cap - b).max(0.0));
            }
            if m.bare_to_willow.get(idx) {
                let a = self.grazing.willow_a.data[idx].unwrap_or(0.0);
                let bb = self.grazing.willow_b.data[idx].unwrap_or(0.0);
                b += willow_function(a, bb, t, p.willow_max) - willow_function(a, bb, t - 1, p.willow_max);
            }
            bare.data[idx] = Some(b);

            grass.data[idx] = Some(prev_value(RoughnessBand::Grass, idx) + if m.grass_to_herb.get(idx) { grass_step } else { 0.0 });
            herb.data[idx] = Some(prev_value(RoughnessBand::Herbaceous, idx) + if m.herb_to_willow.get(idx) { herb_step } else { 0.0 });
            willow.data[idx] =
                Some(prev_value(RoughnessBand::Willow, idx) + if m.willow_to_forest.get(idx) { willow_step } else { 0.0 });
        }

        RoughnessStack {
            date,
            year: t,
            footprint: prev.footprint.clone(),
            bands: [
                prev.band(RoughnessBand::Water).clone(),
                bare,
                grass,
                herb,
                prev.band(RoughnessBand::Forest).clone(),
                willow,
            ],
        }
    }
}

impl Iterator for SuccessionRun<'_> {
    type Item = RoughnessStack;

    fn next(&mut self) -> Option<RoughnessStack> {
        if self.next_year > self.num_years {
            return None;
        }
        let t = self.next_year;
        let date = step_date(self.start, t)?;
        let stack = match &self.prev {
            None => initial_stack(self.classified, self.footprint, &self.params.classes, date),
            Some(prev) => self.advance(prev, t, date),
        };
        self.next_year += 1;
        self.prev = Some(stack.clone());
        Some(stack)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.num_years + 1).saturating_sub(self.next_year) as usize;
        (left, Some(left))
    }
}

/// Run one zone to completion: `num_years + 1` stacks, year 0 first.
pub fn simulate_zone(
    classified: &Raster,
    footprint: &Mask,
    masks: &TransitionMasks,
    grazing: &GrazingRasters,
    params: &SuccessionParams,
    start: NaiveDate,
    num_years: u32,
) -> Result<Vec<RoughnessStack>> {
    let run = SuccessionRun::new(classified, footprint, masks, grazing, params, start, num_years)?;
    let stacks: Vec<_> = run.collect();
    debug!(pixels = footprint.count(), steps = stacks.len(), "simulated zone");
    Ok(stacks)
}
