//! Hydrology-derived zone partition.

use crate::config::{ClassTable, ZoneThresholds};
use crate::raster::{Mask, Raster};
use crate::stack::RoughnessBand;

/// Three disjoint pixel sets. Pixels without a hydrology code belong to none.
#[derive(Debug, Clone, PartialEq)]
pub struct Zones {
    pub shoreline: Mask,
    pub terrestrial: Mask,
    pub no_succession: Mask,
}

impl Zones {
    /// Partition by hydrology code: terrestrial `<= terrestrial_max`,
    /// shoreline in `[shoreline_min, shoreline_max]`, no succession
    /// `>= no_succession_min`.
    pub fn from_hydrology(hydrology: &Raster, t: &ZoneThresholds) -> Self {
        let (terr_max, shore_min, shore_max, fixed_min) = (
            t.terrestrial_max as f32,
            t.shoreline_min as f32,
            t.shoreline_max as f32,
            t.no_succession_min as f32,
        );
        Self {
            shoreline: Mask::from_raster(hydrology, |v| v >= shore_min && v <= shore_max),
            terrestrial: Mask::from_raster(hydrology, |v| v <= terr_max),
            no_succession: Mask::from_raster(hydrology, |v| v >= fixed_min),
        }
    }

    /// Pixels in any zone.
    pub fn any(&self) -> Mask {
        self.shoreline.or(&self.terrestrial).or(&self.no_succession)
    }
}

/// Roughness of the classified pixels that never change, masked elsewhere.
pub fn no_succession_roughness(classified: &Raster, zone: &Mask, classes: &ClassTable) -> Raster {
    Raster {
        grid: classified.grid,
        data: classified
            .data
            .iter()
            .zip(&zone.data)
            .map(|(code, &inside)| {
                let band = RoughnessBand::from_class((*code)? as u8)?;
                inside.then(|| classes.k(band))
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;

    #[test]
    fn zones_partition_defined_codes() {
        let g = GridSpec::new(12, 1, 0.0, 12.0, 0.0, 1.0);
        let mut data: Vec<Option<f32>> = (1..=11).map(|c| Some(c as f32)).collect();
        data.push(None);
        let hydro = Raster { grid: g, data };
        let z = Zones::from_hydrology(&hydro, &ZoneThresholds::default());

        for idx in 0..12 {
            let memberships = [z.shoreline.get(idx), z.terrestrial.get(idx), z.no_succession.get(idx)]
                .iter()
                .filter(|&&m| m)
                .count();
            let expected = if hydro.data[idx].is_some() { 1 } else { 0 };
            assert_eq!(memberships, expected, "pixel {idx}");
        }
        assert_eq!(z.terrestrial.count(), 2);
        assert_eq!(z.shoreline.count(), 5);
        assert_eq!(z.no_succession.count(), 4);
        assert_eq!(z.any().count(), 11);
    }

    #[test]
    fn fixed_roughness_only_inside_zone() {
        let g = GridSpec::new(3, 1, 0.0, 3.0, 0.0, 1.0);
        let classified = Raster::from_values(g, vec![5.0, 3.0, 9.0]);
        let zone = Mask { grid: g, data: vec![true, false, true] };
        let r = no_succession_roughness(&classified, &zone, &ClassTable::default());
        assert_eq!(r.data, vec![Some(12.84), None, None]);
    }
}
