//! Simulation configuration.
//!
//! All lookup tables and constants of the succession model live here and are
//! passed explicitly into each stage. Defaults reproduce the reference
//! deployment (start 2018-06-01, 10 simulated years, scale 10 m).

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result, Stage};
use crate::rasterize::OverlapRule;
use crate::stack::RoughnessBand;

// ── Roughness classes ─────────────────────────────────────────────────────────

/// Roughness coefficient per land-use class code 1..=6, plus the reed
/// coefficient used only as a transition target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassTable {
    /// Indexed by `class - 1`; order follows [`RoughnessBand::ALL`].
    pub coefficients: [f32; 6],
    pub reed: f32,
}

impl Default for ClassTable {
    fn default() -> Self {
        Self {
            coefficients: [0.0, 0.15, 0.39, 1.45, 12.84, 24.41],
            reed: 20.73,
        }
    }
}

impl ClassTable {
    /// Coefficient for a class code, None outside 1..=6.
    pub fn coefficient(&self, class: u8) -> Option<f32> {
        RoughnessBand::from_class(class).map(|b| self.coefficients[b.index()])
    }

    #[inline]
    pub fn k(&self, band: RoughnessBand) -> f32 {
        self.coefficients[band.index()]
    }

    /// Fixed roughness is matched back to its class by value, so coefficients
    /// must be finite and pairwise distinct.
    fn validate(&self) -> Result<()> {
        for (i, &k) in self.coefficients.iter().enumerate() {
            if !k.is_finite() || k < 0.0 {
                return Err(Error::configuration(
                    Stage::Preparation,
                    format!("class {} coefficient {k} must be finite and non-negative", i + 1),
                ));
            }
            if let Some(j) = self.coefficients[..i].iter().position(|&other| other == k) {
                return Err(Error::configuration(
                    Stage::Preparation,
                    format!("classes {} and {} share coefficient {k}", j + 1, i + 1),
                ));
            }
        }
        if !self.reed.is_finite() || self.reed < 0.0 {
            return Err(Error::configuration(Stage::Preparation, format!("reed coefficient {} is invalid", self.reed)));
        }
        Ok(())
    }
}

// ── Zones ─────────────────────────────────────────────────────────────────────

/// Hydrology-code thresholds that partition the region into zones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneThresholds {
    /// Codes `<= terrestrial_max` are terrestrial.
    pub terrestrial_max: u8,
    /// Codes in `[shoreline_min, shoreline_max]` are shoreline.
    pub shoreline_min: u8,
    pub shoreline_max: u8,
    /// Codes `>= no_succession_min` never change.
    pub no_succession_min: u8,
}

impl Default for ZoneThresholds {
    fn default() -> Self {
        Self { terrestrial_max: 2, shoreline_min: 3, shoreline_max: 7, no_succession_min: 8 }
    }
}

impl ZoneThresholds {
    /// Zones must be disjoint and together cover every code from 1 upwards.
    fn validate(&self) -> Result<()> {
        let contiguous = self.terrestrial_max >= 1
            && self.terrestrial_max.checked_add(1) == Some(self.shoreline_min)
            && self.shoreline_min <= self.shoreline_max
            && self.shoreline_max.checked_add(1) == Some(self.no_succession_min);
        if !contiguous {
            return Err(Error::configuration(
                Stage::Preparation,
                format!("zone thresholds {self:?} do not partition the hydrology codes"),
            ));
        }
        Ok(())
    }
}

/// Total transition probabilities over the whole horizon for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRates {
    pub grass_to_herb: f32,
    pub herb_to_willow: f32,
    pub willow_to_forest: f32,
}

impl ZoneRates {
    pub fn shoreline() -> Self {
        Self { grass_to_herb: 0.1, herb_to_willow: 0.4, willow_to_forest: 0.1 }
    }

    pub fn terrestrial() -> Self {
        Self { grass_to_herb: 0.1, herb_to_willow: 0.6, willow_to_forest: 0.2 }
    }

    fn validate(&self, zone: &str) -> Result<()> {
        for (name, p) in [
            ("grass_to_herb", self.grass_to_herb),
            ("herb_to_willow", self.herb_to_willow),
            ("willow_to_forest", self.willow_to_forest),
        ] {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::configuration(
                    Stage::Preparation,
                    format!("{zone}.{name} = {p} is not a probability"),
                ));
            }
        }
        Ok(())
    }
}

/// Rates as read from JSON; missing fields fall back to the zone's defaults.
#[derive(Deserialize)]
struct PartialRates {
    grass_to_herb: Option<f32>,
    herb_to_willow: Option<f32>,
    willow_to_forest: Option<f32>,
}

impl PartialRates {
    fn over(self, base: ZoneRates) -> ZoneRates {
        ZoneRates {
            grass_to_herb: self.grass_to_herb.unwrap_or(base.grass_to_herb),
            herb_to_willow: self.herb_to_willow.unwrap_or(base.herb_to_willow),
            willow_to_forest: self.willow_to_forest.unwrap_or(base.willow_to_forest),
        }
    }
}

fn shoreline_rates<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ZoneRates, D::Error> {
    PartialRates::deserialize(d).map(|p| p.over(ZoneRates::shoreline()))
}

fn terrestrial_rates<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<ZoneRates, D::Error> {
    PartialRates::deserialize(d).map(|p| p.over(ZoneRates::terrestrial()))
}

// ── Categorical attributes ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub label: String,
    pub code: u8,
}

/// Ordered mapping from the labels of one vector attribute to raster codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMap {
    /// Feature property holding the label, e.g. `HYDROLOGIE`.
    pub attribute: String,
    pub categories: Vec<Category>,
}

impl CategoryMap {
    pub fn new(attribute: &str, categories: &[(&str, u8)]) -> Self {
        Self {
            attribute: attribute.to_string(),
            categories: categories
                .iter()
                .map(|&(label, code)| Category { label: label.to_string(), code })
                .collect(),
        }
    }

    pub fn code_of(&self, label: &str) -> Option<u8> {
        self.categories.iter().find(|c| c.label == label).map(|c| c.code)
    }

    fn validate(&self) -> Result<()> {
        for (i, a) in self.categories.iter().enumerate() {
            if self.categories[..i].iter().any(|b| b.label == a.label) {
                return Err(Error::configuration(
                    Stage::Preparation,
                    format!("{}: duplicate category label '{}'", self.attribute, a.label),
                ));
            }
        }
        Ok(())
    }

    pub fn hydrology() -> Self {
        Self::new(
            "HYDROLOGIE",
            &[
                ("flood_free", 1),
                ("rarely_flooded", 2),
                ("periodically_flooded", 3),
                ("annually_flooded", 4),
                ("frequently_flooded", 5),
                ("bank_zone", 6),
                ("intertidal", 7),
                ("shallow_water", 8),
                ("deep_water", 9),
                ("artificial", 10),
            ],
        )
    }

    pub fn mechanical_dynamics() -> Self {
        Self::new(
            "MECH_DYN",
            &[("none", 0), ("low", 1), ("moderate", 2), ("high", 3), ("very_high", 4)],
        )
    }

    pub fn management() -> Self {
        Self::new(
            "BEHEER",
            &[
                ("unmanaged", 1),
                ("seasonal_grazing", 2),
                ("year_round_grazing", 3),
                ("intensive_grazing", 4),
                ("mowing", 5),
                ("artificial", 6),
                ("water", 7),
                ("unknown", 8),
            ],
        )
    }
}

// ── Grazing ───────────────────────────────────────────────────────────────────

/// Growth parameters attached to one management category code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrazingClass {
    pub code: u8,
    /// Reed growth rate, 0..=100 percent of the ungrazed rate.
    pub reed_rate_pct: f32,
    /// Willow growth parameter A, 0..=280.
    pub willow_a: f32,
    /// Willow growth parameter B, 0..=0.60.
    pub willow_b: f32,
}

/// Management code → grazing parameters. Codes not listed grow nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrazingTable {
    pub classes: Vec<GrazingClass>,
}

impl Default for GrazingTable {
    fn default() -> Self {
        let c = |code, reed_rate_pct, willow_a, willow_b| GrazingClass { code, reed_rate_pct, willow_a, willow_b };
        Self {
            classes: vec![
                c(1, 100.0, 20.0, 0.30),
                c(2, 60.0, 80.0, 0.45),
                c(3, 30.0, 160.0, 0.55),
                c(4, 10.0, 280.0, 0.60),
                c(5, 0.0, 280.0, 0.60),
                // artificial, water and unknown never grow.
                c(6, 0.0, 0.0, 0.0),
                c(7, 0.0, 0.0, 0.0),
                c(8, 0.0, 0.0, 0.0),
            ],
        }
    }
}

impl GrazingTable {
    pub fn class(&self, code: u8) -> Option<&GrazingClass> {
        self.classes.iter().find(|c| c.code == code)
    }

    fn validate(&self) -> Result<()> {
        for c in &self.classes {
            let ok = (0.0..=100.0).contains(&c.reed_rate_pct)
                && (0.0..=280.0).contains(&c.willow_a)
                && (0.0..=0.60).contains(&c.willow_b);
            if !ok {
                return Err(Error::configuration(
                    Stage::Preparation,
                    format!("grazing class {} has out-of-range parameters: {c:?}", c.code),
                ));
            }
        }
        Ok(())
    }
}

// ── Moisture ──────────────────────────────────────────────────────────────────

/// A recurring calendar window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonWindow {
    pub start_month: u32,
    pub start_day: u32,
    pub end_month: u32,
    pub end_day: u32,
}

impl SeasonWindow {
    /// Concrete (start, end) dates of this window in `year`.
    pub fn in_year(&self, year: i32) -> Result<(NaiveDate, NaiveDate)> {
        let start = NaiveDate::from_ymd_opt(year, self.start_month, self.start_day);
        let end = NaiveDate::from_ymd_opt(year, self.end_month, self.end_day);
        match (start, end) {
            (Some(s), Some(e)) if s <= e => Ok((s, e)),
            _ => Err(Error::configuration(
                Stage::MoistureClassification,
                format!("invalid season window {self:?} in {year}"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoistureConfig {
    pub wet_season: SeasonWindow,
    pub dry_season: SeasonWindow,
    /// Lower NDWI bound of the "wet" band.
    pub ndwi_low: f32,
    /// Upper NDWI bound of the "wet" band.
    pub ndwi_high: f32,
    /// Scenes with a larger cloud fraction are rejected by the default filter.
    pub max_cloud_cover: f32,
    pub green_band: String,
    pub nir_band: String,
}

impl Default for MoistureConfig {
    fn default() -> Self {
        Self {
            wet_season: SeasonWindow { start_month: 2, start_day: 1, end_month: 3, end_day: 31 },
            dry_season: SeasonWindow { start_month: 5, start_day: 1, end_month: 6, end_day: 30 },
            ndwi_low: -0.1,
            ndwi_high: 0.4,
            max_cloud_cover: 0.2,
            green_band: "green".to_string(),
            nir_band: "nir".to_string(),
        }
    }
}

impl MoistureConfig {
    fn validate(&self) -> Result<()> {
        self.wet_season.in_year(2001)?;
        self.dry_season.in_year(2001)?;
        if !(self.ndwi_low < self.ndwi_high) {
            return Err(Error::configuration(
                Stage::MoistureClassification,
                format!("ndwi_low {} must be below ndwi_high {}", self.ndwi_low, self.ndwi_high),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_cloud_cover) {
            return Err(Error::configuration(
                Stage::MoistureClassification,
                format!("max_cloud_cover {} is not a fraction", self.max_cloud_cover),
            ));
        }
        Ok(())
    }
}

// ── Display ───────────────────────────────────────────────────────────────────

/// Steps shown in the time series chart: `[start, start + years]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayWindow {
    pub start: NaiveDate,
    pub years: u32,
}

impl Default for DisplayWindow {
    fn default() -> Self {
        Self { start: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap_or_default(), years: 10 }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub start_date: NaiveDate,
    pub num_years: u32,
    /// Zonal reduction scale in metres per sample.
    pub scale: f64,
    /// Seed of the per-pixel succession draws.
    pub seed: u64,
    /// Years a full class-to-class transition takes; divides every rate.
    pub years_to_maturity: f32,
    /// Saturation value of the willow growth curve.
    pub willow_max: f32,
    pub classes: ClassTable,
    pub zones: ZoneThresholds,
    #[serde(deserialize_with = "shoreline_rates")]
    pub shoreline: ZoneRates,
    #[serde(deserialize_with = "terrestrial_rates")]
    pub terrestrial: ZoneRates,
    pub hydrology: CategoryMap,
    pub mechanical_dynamics: CategoryMap,
    pub management: CategoryMap,
    pub grazing: GrazingTable,
    pub overlap: OverlapRule,
    pub moisture: MoistureConfig,
    pub display: DisplayWindow,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2018, 6, 1).unwrap_or_default(),
            num_years: 10,
            scale: 10.0,
            seed: 0,
            years_to_maturity: 10.0,
            willow_max: 25.41,
            classes: ClassTable::default(),
            zones: ZoneThresholds::default(),
            shoreline: ZoneRates::shoreline(),
            terrestrial: ZoneRates::terrestrial(),
            hydrology: CategoryMap::hydrology(),
            mechanical_dynamics: CategoryMap::mechanical_dynamics(),
            management: CategoryMap::management(),
            grazing: GrazingTable::default(),
            overlap: OverlapRule::LastWins,
            moisture: MoistureConfig::default(),
            display: DisplayWindow::default(),
        }
    }
}

impl SimulationConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration(Stage::Preparation, format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("years_to_maturity", self.years_to_maturity as f64),
            ("willow_max", self.willow_max as f64),
            ("scale", self.scale),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(Error::configuration(Stage::Preparation, format!("{name} must be positive, got {v}")));
            }
        }
        self.classes.validate()?;
        self.zones.validate()?;
        self.shoreline.validate("shoreline")?;
        self.terrestrial.validate("terrestrial")?;
        self.hydrology.validate()?;
        self.mechanical_dynamics.validate()?;
        self.management.validate()?;
        self.grazing.validate()?;
        self.moisture.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn class_codes_map_to_coefficients() {
        let t = ClassTable::default();
        assert_eq!(t.coefficient(1), Some(0.0));
        assert_eq!(t.coefficient(6), Some(24.41));
        assert_eq!(t.coefficient(0), None);
        assert_eq!(t.coefficient(7), None);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = SimulationConfig::from_json(r#"{"num_years": 3, "start_date": "2018-11-01"}"#).unwrap();
        assert_eq!(c.num_years, 3);
        assert_eq!(c.start_date, NaiveDate::from_ymd_opt(2018, 11, 1).unwrap());
        assert_eq!(c.scale, 10.0);
        assert_eq!(c.terrestrial, ZoneRates::terrestrial());
    }

    #[test]
    fn out_of_range_grazing_is_rejected() {
        let mut c = SimulationConfig::default();
        c.grazing.classes[0].willow_b = 0.9;
        let err = c.validate().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn partial_zone_rates_keep_zone_defaults() {
        let c = SimulationConfig::from_json(r#"{"shoreline": {"herb_to_willow": 0.5}}"#).unwrap();
        assert_eq!(c.shoreline, ZoneRates { herb_to_willow: 0.5, ..ZoneRates::shoreline() });
        assert_eq!(c.terrestrial, ZoneRates::terrestrial());

        let c = SimulationConfig::from_json(r#"{"terrestrial": {"grass_to_herb": 0.3}}"#).unwrap();
        assert_eq!(c.terrestrial, ZoneRates { grass_to_herb: 0.3, ..ZoneRates::terrestrial() });
    }

    #[test]
    fn overlapping_zones_are_rejected() {
        let mut c = SimulationConfig::default();
        c.zones = ZoneThresholds { terrestrial_max: 4, shoreline_min: 3, shoreline_max: 7, no_succession_min: 6 };
        assert!(matches!(c.validate().unwrap_err(), Error::Configuration { stage: Stage::Preparation, .. }));

        // A gap leaves code 4 in no zone at all.
        c.zones = ZoneThresholds { terrestrial_max: 3, shoreline_min: 5, shoreline_max: 7, no_succession_min: 8 };
        assert!(c.validate().is_err());

        c.zones = ZoneThresholds { terrestrial_max: 3, shoreline_min: 4, shoreline_max: 6, no_succession_min: 7 };
        c.validate().unwrap();
    }

    #[test]
    fn nan_and_inverted_bounds_are_rejected() {
        let mut c = SimulationConfig::default();
        c.scale = f64::NAN;
        assert!(c.validate().is_err());

        let mut c = SimulationConfig::default();
        c.years_to_maturity = f32::NAN;
        assert!(c.validate().is_err());

        let mut c = SimulationConfig::default();
        c.moisture.ndwi_low = 0.5;
        assert!(matches!(c.validate().unwrap_err(), Error::Configuration { stage: Stage::MoistureClassification, .. }));
    }

    #[test]
    fn shared_class_coefficients_are_rejected() {
        let mut c = SimulationConfig::default();
        c.classes.coefficients[2] = c.classes.coefficients[1];
        assert!(c.validate().is_err());
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let mut c = SimulationConfig::default();
        c.management = CategoryMap::new("BEHEER", &[("a", 1), ("a", 2)]);
        assert!(c.validate().is_err());
    }
}
