//! Named, timestamped stacks of roughness-contribution bands.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::raster::{GridSpec, Mask, Raster};

/// One roughness-contribution band per land-use class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoughnessBand {
    Water,
    Bare,
    Grass,
    Herbaceous,
    Forest,
    Willow,
}

impl RoughnessBand {
    /// Band order of every stack; `ALL[class - 1]` is the band of a class code.
    pub const ALL: [RoughnessBand; 6] = [
        RoughnessBand::Water,
        RoughnessBand::Bare,
        RoughnessBand::Grass,
        RoughnessBand::Herbaceous,
        RoughnessBand::Forest,
        RoughnessBand::Willow,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_class(class: u8) -> Option<Self> {
        (1..=6).contains(&class).then(|| Self::ALL[class as usize - 1])
    }

    pub fn class_code(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn name(self) -> &'static str {
        match self {
            RoughnessBand::Water => "waterRoughness",
            RoughnessBand::Bare => "bareRoughness",
            RoughnessBand::Grass => "grassRoughness",
            RoughnessBand::Herbaceous => "herbaceousRoughness",
            RoughnessBand::Forest => "forestRoughness",
            RoughnessBand::Willow => "willowRoughness",
        }
    }
}

/// Six co-registered roughness bands for one simulated year.
///
/// `footprint` marks the pixels the stack covers; total roughness is defined
/// exactly there, even where every band is masked.
#[derive(Debug, Clone, PartialEq)]
pub struct RoughnessStack {
    pub date: NaiveDate,
    /// Years since the start of the run.
    pub year: u32,
    pub footprint: Mask,
    pub bands: [Raster; 6],
}

impl RoughnessStack {
    pub fn grid(&self) -> &GridSpec {
        &self.footprint.grid
    }

    #[inline]
    pub fn band(&self, band: RoughnessBand) -> &Raster {
        &self.bands[band.index()]
    }

    pub fn band_names(&self) -> Vec<&'static str> {
        RoughnessBand::ALL.iter().map(|b| b.name()).collect()
    }

    /// Sum of all bands, missing values counted as zero, defined over the footprint.
    pub fn total_roughness(&self) -> Raster {
        let grid = *self.grid();
        let data = (0..grid.len())
            .map(|i| {
                self.footprint.get(i).then(|| {
                    self.bands.iter().map(|b| b.data[i].unwrap_or(0.0)).sum::<f32>()
                })
            })
            .collect();
        Raster { grid, data }
    }

    /// Number of bands defined at pixel `idx`.
    pub fn defined_bands_at(&self, idx: usize) -> usize {
        self.bands.iter().filter(|b| b.is_valid(idx)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_codes_follow_band_order() {
        for (i, b) in RoughnessBand::ALL.iter().enumerate() {
            assert_eq!(b.index(), i);
            assert_eq!(RoughnessBand::from_class(b.class_code()), Some(*b));
        }
        assert_eq!(RoughnessBand::from_class(0), None);
        assert_eq!(RoughnessBand::from_class(7), None);
    }

    #[test]
    fn total_roughness_covers_footprint_only() {
        let grid = GridSpec::new(3, 1, 0.0, 3.0, 0.0, 1.0);
        let mut bands: [Raster; 6] = std::array::from_fn(|_| Raster::masked(grid));
        bands[1].data[0] = Some(0.5);
        bands[4].data[0] = Some(1.0);
        let stack = RoughnessStack {
            date: NaiveDate::from_ymd_opt(2018, 6, 1).unwrap(),
            year: 0,
            footprint: Mask { grid, data: vec![true, true, false] },
            bands,
        };
        let total = stack.total_roughness();
        assert_eq!(total.data, vec![Some(1.5), Some(0.0), None]);
        assert_eq!(stack.defined_bands_at(0), 2);
    }
}
