//! Per-pixel transition rules.
//!
//! Bare ground follows hydrology and mechanical dynamics deterministically.
//! Grass, herbaceous vegetation and willow transition stochastically: each
//! pixel compares one uniform draw against the total probability over the
//! whole horizon. The draws are made once per run and reused unchanged for
//! every simulated year, so a pixel either transitions in every year of the
//! run or in none.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{GrazingTable, ZoneRates};
use crate::error::{Result, Stage};
use crate::moisture::MoistureMasks;
use crate::raster::{GridSpec, Mask, Raster};
use crate::stack::RoughnessBand;

/// Mechanical dynamics collapsed from the 0..=4 attribute codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dynamics {
    /// Codes 0 and 1.
    Weak,
    /// Code 2.
    Moderate,
    /// Codes 3 and 4.
    Strong,
}

impl Dynamics {
    pub fn from_code(code: f32) -> Self {
        if code <= 1.0 {
            Dynamics::Weak
        } else if code < 3.0 {
            Dynamics::Moderate
        } else {
            Dynamics::Strong
        }
    }
}

/// Uniform `[0, 1)` draws, one independent field per stochastic transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StochasticFields {
    pub grass_to_herb: Raster,
    pub herb_to_willow: Raster,
    pub willow_to_forest: Raster,
}

impl StochasticFields {
    pub fn draw(grid: &GridSpec, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut field = || Raster::from_values(*grid, (0..grid.len()).map(|_| rng.gen::<f32>()).collect());
        Self {
            grass_to_herb: field(),
            herb_to_willow: field(),
            willow_to_forest: field(),
        }
    }
}

/// Per-pixel growth parameters derived from the management raster.
#[derive(Debug, Clone, PartialEq)]
pub struct GrazingRasters {
    /// Fraction (0..=1) of the ungrazed reed growth rate.
    pub reed_rate: Raster,
    pub willow_a: Raster,
    pub willow_b: Raster,
}

/// Map management codes to reed and willow growth parameters.
///
/// Codes without a table entry, and pixels without a management code, grow
/// nothing: reed rate 0 and willow `A = 0` (a flat willow curve).
pub fn bare_grazing_variables(management: &Raster, table: &GrazingTable) -> GrazingRasters {
    let grid = management.grid;
    let mut reed_rate = Raster::filled(grid, 0.0);
    let mut willow_a = Raster::filled(grid, 0.0);
    let mut willow_b = Raster::filled(grid, 0.0);

    for (idx, code) in management.data.iter().enumerate() {
        let Some(class) = code.and_then(|c| table.class(c as u8)) else { continue };
        reed_rate.data[idx] = Some(class.reed_rate_pct / 100.0);
        willow_a.data[idx] = Some(class.willow_a);
        willow_b.data[idx] = Some(class.willow_b);
    }

    GrazingRasters { reed_rate, willow_a, willow_b }
}

/// Boolean transition masks for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionMasks {
    /// Bare ground under strong dynamics; never transitions.
    pub remain_bare: Mask,
    pub bare_to_reed: Mask,
    pub bare_to_willow: Mask,
    pub grass_to_herb: Mask,
    pub herb_to_willow: Mask,
    pub willow_to_forest: Mask,
}

/// Evaluate the transition rules for every pixel of `classified`.
pub fn transition_masks(
    classified: &Raster,
    moisture: &MoistureMasks,
    mechanical_dynamics: &Raster,
    fields: &StochasticFields,
    rates: &ZoneRates,
) -> Result<TransitionMasks> {
    let grid = classified.grid;
    for other in [
        &moisture.wet.grid,
        &moisture.moist.grid,
        &mechanical_dynamics.grid,
        &fields.grass_to_herb.grid,
    ] {
        grid.ensure_same(other, Stage::Accumulation)?;
    }

    let is_class = |band: RoughnessBand| {
        let code = band.class_code() as f32;
        Mask::from_raster(classified, move |v| v == code)
    };
    let dynamics = |d: Dynamics| Mask::from_raster(mechanical_dynamics, move |v| Dynamics::from_code(v) == d);
    let drawn = |field: &Raster, p: f32| Mask::from_raster(field, move |v| v <= p);

    let bare = is_class(RoughnessBand::Bare);
    let masks = TransitionMasks {
        remain_bare: bare.and(&dynamics(Dynamics::Strong)),
        bare_to_reed: bare.and(&moisture.wet_mask()).and(&dynamics(Dynamics::Weak)),
        bare_to_willow: bare.and(&moisture.moist_mask()).and(&dynamics(Dynamics::Moderate)),
        grass_to_herb: is_class(RoughnessBand::Grass).and(&drawn(&fields.grass_to_herb, rates.grass_to_herb)),
        herb_to_willow: is_class(RoughnessBand::Herbaceous).and(&drawn(&fields.herb_to_willow, rates.herb_to_willow)),
        willow_to_forest: is_class(RoughnessBand::Willow)
            .and(&drawn(&fields.willow_to_forest, rates.willow_to_forest)),
    };

    debug!(
        remain_bare = masks.remain_bare.count(),
        bare_to_reed = masks.bare_to_reed.count(),
        bare_to_willow = masks.bare_to_willow.count(),
        grass_to_herb = masks.grass_to_herb.count(),
        herb_to_willow = masks.herb_to_willow.count(),
        willow_to_forest = masks.willow_to_forest.count(),
        "transition masks"
    );
    Ok(masks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GrazingTable;

    fn grid(w: usize) -> GridSpec {
        GridSpec::new(w, 1, 0.0, w as f64, 0.0, 1.0)
    }

    fn raster(values: &[f32]) -> Raster {
        Raster::from_values(grid(values.len()), values.to_vec())
    }

    #[test]
    fn dynamics_codes_collapse() {
        let got: Vec<_> = [0.0, 1.0, 2.0, 3.0, 4.0].iter().map(|&c| Dynamics::from_code(c)).collect();
        assert_eq!(
            got,
            vec![Dynamics::Weak, Dynamics::Weak, Dynamics::Moderate, Dynamics::Strong, Dynamics::Strong]
        );
    }

    #[test]
    fn stochastic_fields_are_seeded_and_uniform() {
        let g = GridSpec::new(50, 50, 0.0, 1.0, 0.0, 1.0);
        let a = StochasticFields::draw(&g, 7);
        assert_eq!(a, StochasticFields::draw(&g, 7));
        assert_ne!(a.grass_to_herb, a.herb_to_willow);
        for f in [&a.grass_to_herb, &a.herb_to_willow, &a.willow_to_forest] {
            assert!(f.data.iter().flatten().all(|v| (0.0..1.0).contains(v)));
            let mean = f.mean().unwrap();
            assert!((mean - 0.5).abs() < 0.05, "mean {mean}");
        }
    }

    #[test]
    fn grazing_unknown_codes_grow_nothing() {
        let g = grid(3);
        let management = Raster { grid: g, data: vec![Some(1.0), Some(42.0), None] };
        let graz = bare_grazing_variables(&management, &GrazingTable::default());
        assert_eq!(graz.reed_rate.data, vec![Some(1.0), Some(0.0), Some(0.0)]);
        assert_eq!(graz.willow_a.data, vec![Some(20.0), Some(0.0), Some(0.0)]);
        assert_eq!(graz.willow_b.data[1], Some(0.0));
    }

    #[test]
    fn grazing_water_and_artificial_are_zero() {
        let management = raster(&[6.0, 7.0, 8.0]);
        let graz = bare_grazing_variables(&management, &GrazingTable::default());
        assert!(graz.reed_rate.data.iter().all(|v| *v == Some(0.0)));
        assert!(graz.willow_a.data.iter().all(|v| *v == Some(0.0)));
    }

    #[test]
    fn bare_rules_follow_moisture_and_dynamics() {
        // pixel:        0     1     2     3     4
        // class:        bare  bare  bare  bare  grass
        // wet/moist:    wet   moist moist wet   wet
        // dynamics:     weak  mod   strong mod  weak
        let classified = raster(&[2.0, 2.0, 2.0, 2.0, 3.0]);
        let moisture = MoistureMasks {
            wet: raster(&[1.0, 0.0, 0.0, 1.0, 1.0]),
            moist: raster(&[0.0, 1.0, 1.0, 0.0, 0.0]),
        };
        let mech = raster(&[1.0, 2.0, 4.0, 2.0, 0.0]);
        let fields = StochasticFields {
            grass_to_herb: raster(&[1.0; 5]),
            herb_to_willow: raster(&[1.0; 5]),
            willow_to_forest: raster(&[1.0; 5]),
        };
        let m = transition_masks(&classified, &moisture, &mech, &fields, &ZoneRates::shoreline()).unwrap();
        assert_eq!(m.bare_to_reed.data, vec![true, false, false, false, false]);
        assert_eq!(m.bare_to_willow.data, vec![false, true, false, false, false]);
        assert_eq!(m.remain_bare.data, vec![false, false, true, false, false]);
        assert_eq!(m.grass_to_herb.count(), 0);
    }

    #[test]
    fn stochastic_rules_compare_draw_with_zone_probability() {
        let classified = raster(&[3.0, 4.0, 6.0, 4.0]);
        let moisture = MoistureMasks { wet: raster(&[0.0; 4]), moist: raster(&[0.0; 4]) };
        let mech = raster(&[0.0; 4]);
        let draws = raster(&[0.05, 0.5, 0.15, 0.7]);
        let fields = StochasticFields {
            grass_to_herb: draws.clone(),
            herb_to_willow: draws.clone(),
            willow_to_forest: draws,
        };

        let shore = transition_masks(&classified, &moisture, &mech, &fields, &ZoneRates::shoreline()).unwrap();
        assert_eq!(shore.grass_to_herb.data, vec![true, false, false, false]);
        assert_eq!(shore.herb_to_willow.data, vec![false, false, false, false]);
        assert_eq!(shore.willow_to_forest.data, vec![false, false, false, false]);

        let land = transition_masks(&classified, &moisture, &mech, &fields, &ZoneRates::terrestrial()).unwrap();
        assert_eq!(land.herb_to_willow.data, vec![false, true, false, false]);
        assert_eq!(land.willow_to_forest.data, vec![false, false, true, false]);
    }

    #[test]
    fn mismatched_grids_are_rejected() {
        let classified = raster(&[2.0, 2.0]);
        let moisture = MoistureMasks { wet: raster(&[0.0; 3]), moist: raster(&[0.0; 3]) };
        let fields = StochasticFields::draw(&grid(2), 1);
        let err = transition_masks(&classified, &moisture, &raster(&[0.0; 2]), &fields, &ZoneRates::shoreline());
        assert!(err.is_err());
    }
}
