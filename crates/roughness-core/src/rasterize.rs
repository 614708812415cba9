//! Categorical vector attributes → integer-coded rasters.
//!
//! A pixel receives the code of an areal feature whose geometry contains the
//! pixel center, or of a line feature passing through the pixel. Pixels no
//! feature touches stay masked.

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CategoryMap;
use crate::error::{Error, Result, Stage};
use crate::raster::{GridSpec, Raster};
use crate::region::{Feature, Shape};

/// How a pixel covered by several features is resolved.
///
/// Vector sources give no guaranteed feature order, so the caller chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapRule {
    /// Later features in iteration order paint over earlier ones.
    LastWins,
    /// The first feature to reach a pixel keeps it.
    FirstWins,
    HighestCode,
    LowestCode,
}

impl OverlapRule {
    fn resolve(self, current: Option<f32>, incoming: f32) -> f32 {
        match (self, current) {
            (_, None) | (OverlapRule::LastWins, Some(_)) => incoming,
            (OverlapRule::FirstWins, Some(c)) => c,
            (OverlapRule::HighestCode, Some(c)) => c.max(incoming),
            (OverlapRule::LowestCode, Some(c)) => c.min(incoming),
        }
    }
}

/// Rasterize `features` by the attribute named in `categories`.
///
/// Every feature must carry a label listed in `categories`; an unmapped or
/// missing label is a configuration error.
pub fn rasterize_attribute(
    features: &[Feature],
    categories: &CategoryMap,
    grid: &GridSpec,
    overlap: OverlapRule,
) -> Result<Raster> {
    let mut out = Raster::masked(*grid);

    for (i, feature) in features.iter().enumerate() {
        let label = feature.label(&categories.attribute).ok_or_else(|| {
            Error::configuration(
                Stage::Rasterization,
                format!("feature {i} has no '{}' attribute", categories.attribute),
            )
        })?;
        let code = categories.code_of(&label).ok_or_else(|| {
            Error::configuration(
                Stage::Rasterization,
                format!("unmapped {} category '{label}'", categories.attribute),
            )
        })? as f32;

        for idx in covered_pixels(&feature.shape, grid) {
            out.data[idx] = Some(overlap.resolve(out.data[idx], code));
        }
    }

    debug!(
        attribute = %categories.attribute,
        features = features.len(),
        painted = out.count_valid(),
        "rasterized attribute"
    );
    Ok(out)
}

/// Indices of the pixels a shape covers, each reported once, row-major.
pub fn covered_pixels(shape: &Shape, grid: &GridSpec) -> Vec<usize> {
    match shape {
        Shape::Area(_) => {
            let Some(bbox) = shape.bounding_rect() else { return Vec::new() };
            let Some((r0, r1, c0, c1)) = pixel_window(&bbox, grid) else { return Vec::new() };
            let mut out = Vec::new();
            for r in r0..=r1 {
                for c in c0..=c1 {
                    let (lon, lat) = grid.cell_center(r, c);
                    if shape.covers(lon, lat) {
                        out.push(grid.index(r, c));
                    }
                }
            }
            out
        }
        Shape::Line(lines) => {
            let mut hit = vec![false; grid.len()];
            let (dx, dy) = grid.cell_size_deg();
            let step = 0.25 * dx.min(dy);
            for ls in lines.iter() {
                for seg in ls.lines() {
                    let (a, b) = (seg.start, seg.end);
                    let len = ((b.x - a.x).powi(2) + (b.y - a.y).powi(2)).sqrt();
                    let n = ((len / step).ceil() as usize).max(1);
                    for k in 0..=n {
                        let t = k as f64 / n as f64;
                        if let Some((r, c)) = grid.cell_of(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)) {
                            hit[grid.index(r, c)] = true;
                        }
                    }
                }
            }
            hit.iter().enumerate().filter_map(|(i, &h)| h.then_some(i)).collect()
        }
    }
}

/// Inclusive (row, col) window of pixels whose centers may fall in `bbox`.
fn pixel_window(bbox: &Rect<f64>, grid: &GridSpec) -> Option<(usize, usize, usize, usize)> {
    if grid.is_empty() {
        return None;
    }
    let clamp = |c: Coord<f64>| Coord {
        x: c.x.clamp(grid.min_lon, grid.max_lon),
        y: c.y.clamp(grid.min_lat, grid.max_lat),
    };
    let (lo, hi) = (clamp(bbox.min()), clamp(bbox.max()));
    if bbox.max().x < grid.min_lon || bbox.min().x > grid.max_lon || bbox.max().y < grid.min_lat || bbox.min().y > grid.max_lat {
        return None;
    }
    let (r0, c0) = grid.cell_of(lo.x, lo.y)?;
    let (r1, c1) = grid.cell_of(hi.x, hi.y)?;
    Some((r0, r1, c0, c1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{LineString, MultiLineString};

    fn grid() -> GridSpec {
        GridSpec::new(10, 10, 0.0, 10.0, 0.0, 10.0)
    }

    fn categories() -> CategoryMap {
        CategoryMap::new("MECH_DYN", &[("low", 1), ("moderate", 2), ("high", 3)])
    }

    #[test]
    fn paints_pixel_centers_inside_polygon() {
        let f = Feature::rectangle("a", 2.0, 2.0, 5.0, 4.0).with_property("MECH_DYN", "moderate");
        let r = rasterize_attribute(&[f], &categories(), &grid(), OverlapRule::LastWins).unwrap();
        assert_eq!(r.count_valid(), 3 * 2);
        assert_eq!(r.get(2, 2), Some(2.0));
        assert_eq!(r.get(3, 4), Some(2.0));
        assert_eq!(r.get(4, 4), None);
        assert_eq!(r.get(0, 0), None);
    }

    #[test]
    fn overlap_rule_decides_shared_pixels() {
        let a = Feature::rectangle("a", 0.0, 0.0, 6.0, 6.0).with_property("MECH_DYN", "high");
        let b = Feature::rectangle("b", 4.0, 4.0, 10.0, 10.0).with_property("MECH_DYN", "low");
        let feats = [a, b];
        let at = |rule| {
            rasterize_attribute(&feats, &categories(), &grid(), rule)
                .unwrap()
                .get(5, 5)
        };
        assert_eq!(at(OverlapRule::LastWins), Some(1.0));
        assert_eq!(at(OverlapRule::FirstWins), Some(3.0));
        assert_eq!(at(OverlapRule::HighestCode), Some(3.0));
        assert_eq!(at(OverlapRule::LowestCode), Some(1.0));
    }

    #[test]
    fn unmapped_label_is_configuration_error() {
        let f = Feature::rectangle("a", 0.0, 0.0, 1.0, 1.0).with_property("MECH_DYN", "extreme");
        let err = rasterize_attribute(&[f], &categories(), &grid(), OverlapRule::LastWins).unwrap_err();
        assert_eq!(err.stage(), Stage::Rasterization);
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn missing_attribute_is_configuration_error() {
        let f = Feature::rectangle("a", 0.0, 0.0, 1.0, 1.0);
        assert!(rasterize_attribute(&[f], &categories(), &grid(), OverlapRule::LastWins).is_err());
    }

    #[test]
    fn lines_touch_every_crossed_pixel() {
        let ls = LineString::from(vec![(0.5, 0.5), (9.5, 0.5)]);
        let shape = Shape::Line(MultiLineString::new(vec![ls]));
        let px = covered_pixels(&shape, &grid());
        assert_eq!(px, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn features_outside_grid_paint_nothing() {
        let f = Feature::rectangle("a", 20.0, 20.0, 30.0, 30.0).with_property("MECH_DYN", "low");
        let r = rasterize_attribute(&[f], &categories(), &grid(), OverlapRule::LastWins).unwrap();
        assert_eq!(r.count_valid(), 0);
    }
}
