//! GeoJSON feature collections as `geo` geometries.
//!
//! Only the subset the pipeline consumes is supported: `Polygon`,
//! `MultiPolygon`, `LineString` and `MultiLineString` geometries, with
//! free-form properties.

use geo::{BoundingRect, Contains, Coord, LineString, MultiLineString, MultiPolygon, Point, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result, Stage};

/// Geometry of one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Area(MultiPolygon<f64>),
    Line(MultiLineString<f64>),
}

impl Shape {
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Shape::Area(mp) => mp.bounding_rect(),
            Shape::Line(ml) => ml.bounding_rect(),
        }
    }

    /// True if (lon, lat) lies inside an areal shape. Lines cover no area.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        match self {
            Shape::Area(mp) => mp.contains(&Point::new(lon, lat)),
            Shape::Line(_) => false,
        }
    }
}

/// A region or attribute feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFeature", into = "RawFeature")]
pub struct Feature {
    pub id: Option<String>,
    pub shape: Shape,
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(id: Option<String>, shape: Shape, properties: Map<String, Value>) -> Self {
        Self { id, shape, properties }
    }

    /// A single-ring polygon feature.
    pub fn polygon(id: &str, ring: &[(f64, f64)]) -> Self {
        let exterior = LineString::from(ring.to_vec());
        Self {
            id: Some(id.to_string()),
            shape: Shape::Area(MultiPolygon::new(vec![Polygon::new(exterior, vec![])])),
            properties: Map::new(),
        }
    }

    /// An axis-aligned rectangle feature.
    pub fn rectangle(id: &str, min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self::polygon(
            id,
            &[
                (min_lon, min_lat),
                (max_lon, min_lat),
                (max_lon, max_lat),
                (min_lon, max_lat),
                (min_lon, min_lat),
            ],
        )
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// String form of a categorical property. Numbers and booleans are
    /// matched by their JSON text; null counts as absent.
    pub fn label(&self, attribute: &str) -> Option<String> {
        match self.properties.get(attribute)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// An ordered collection of features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn from_geojson(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| invalid(format!("invalid GeoJSON: {e}")))
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| invalid(format!("invalid GeoJSON: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Bounding box of every feature together.
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.features
            .iter()
            .filter_map(|f| f.shape.bounding_rect())
            .reduce(|a, b| {
                Rect::new(
                    Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                    Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
                )
            })
    }

    /// True if any areal feature covers (lon, lat).
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.features.iter().any(|f| f.shape.covers(lon, lat))
    }

    /// Display name per feature: `id`, then `properties.id`, then
    /// `properties.name`, then the feature index.
    pub fn names(&self) -> Vec<String> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, f)| {
                f.id.clone()
                    .or_else(|| f.label("id"))
                    .or_else(|| f.label("name"))
                    .unwrap_or_else(|| i.to_string())
            })
            .collect()
    }
}

fn invalid(message: String) -> Error {
    Error::configuration(Stage::Preparation, message)
}

// ── GeoJSON wire representation ───────────────────────────────────────────────

type Position = Vec<f64>;

#[derive(Serialize, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
}

#[derive(Serialize, Deserialize)]
struct RawFeature {
    #[serde(rename = "type", default = "feature_type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
    geometry: RawGeometry,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

fn line(positions: Vec<Position>) -> std::result::Result<LineString<f64>, String> {
    positions
        .into_iter()
        .map(|p| match p.as_slice() {
            [x, y, ..] => Ok(Coord { x: *x, y: *y }),
            _ => Err(format!("position with {} ordinates", p.len())),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(LineString::new)
}

fn polygon(rings: Vec<Vec<Position>>) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.into_iter().map(line);
    let exterior = rings.next().ok_or("polygon without rings")??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

impl TryFrom<RawFeature> for Feature {
    type Error = String;

    fn try_from(raw: RawFeature) -> std::result::Result<Self, String> {
        if raw.kind != "Feature" {
            return Err(format!("expected a Feature, found '{}'", raw.kind));
        }
        let shape = match raw.geometry {
            RawGeometry::Polygon { coordinates } => Shape::Area(MultiPolygon::new(vec![polygon(coordinates)?])),
            RawGeometry::MultiPolygon { coordinates } => Shape::Area(MultiPolygon::new(
                coordinates.into_iter().map(polygon).collect::<std::result::Result<_, _>>()?,
            )),
            RawGeometry::LineString { coordinates } => Shape::Line(MultiLineString::new(vec![line(coordinates)?])),
            RawGeometry::MultiLineString { coordinates } => Shape::Line(MultiLineString::new(
                coordinates.into_iter().map(line).collect::<std::result::Result<_, _>>()?,
            )),
        };
        let id = raw.id.map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        });
        Ok(Feature { id, shape, properties: raw.properties.unwrap_or_default() })
    }
}

fn positions(ls: &LineString<f64>) -> Vec<Position> {
    ls.coords().map(|c| vec![c.x, c.y]).collect()
}

fn rings(p: &Polygon<f64>) -> Vec<Vec<Position>> {
    std::iter::once(p.exterior()).chain(p.interiors()).map(positions).collect()
}

impl From<Feature> for RawFeature {
    fn from(f: Feature) -> Self {
        let geometry = match &f.shape {
            Shape::Area(mp) if mp.0.len() == 1 => RawGeometry::Polygon { coordinates: rings(&mp.0[0]) },
            Shape::Area(mp) => RawGeometry::MultiPolygon { coordinates: mp.iter().map(rings).collect() },
            Shape::Line(ml) if ml.0.len() == 1 => RawGeometry::LineString { coordinates: positions(&ml.0[0]) },
            Shape::Line(ml) => RawGeometry::MultiLineString { coordinates: ml.iter().map(positions).collect() },
        };
        RawFeature {
            kind: feature_type(),
            id: f.id.map(Value::String),
            geometry,
            properties: Some(f.properties),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGION: &str = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[
                    [5.846, 51.984], [5.849, 51.961], [5.910, 51.960],
                    [5.916, 51.985], [5.877, 51.990], [5.846, 51.984]
                ]]
            },
            "properties": { "id": 1 }
        }]
    }"#;

    #[test]
    fn parses_polygon_collection() {
        let fc = FeatureCollection::from_geojson(REGION).unwrap();
        assert_eq!(fc.features.len(), 1);
        assert_eq!(fc.names(), vec!["1".to_string()]);
        assert!(fc.covers(5.88, 51.975));
        assert!(!fc.covers(5.80, 51.975));
        let bbox = fc.bounding_rect().unwrap();
        assert!((bbox.min().x - 5.846).abs() < 1e-12);
        assert!((bbox.max().y - 51.990).abs() < 1e-12);
    }

    #[test]
    fn string_id_wins_over_properties() {
        let json = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","id":"0","properties":{"name":"x"},
             "geometry":{"type":"LineString","coordinates":[[0,0],[1,1,5]]}}]}"#;
        let fc = FeatureCollection::from_geojson(json).unwrap();
        assert_eq!(fc.names(), vec!["0".to_string()]);
        assert!(matches!(fc.features[0].shape, Shape::Line(_)));
    }

    #[test]
    fn rejects_short_positions() {
        let json = r#"{"features":[{"type":"Feature","properties":null,
            "geometry":{"type":"LineString","coordinates":[[0],[1,1]]}}]}"#;
        let err = FeatureCollection::from_geojson(json).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn numeric_labels_match_their_text() {
        let f = Feature::rectangle("a", 0.0, 0.0, 1.0, 1.0)
            .with_property("MECH_DYN", 2)
            .with_property("BEHEER", "mowing")
            .with_property("EMPTY", Value::Null);
        assert_eq!(f.label("MECH_DYN").as_deref(), Some("2"));
        assert_eq!(f.label("BEHEER").as_deref(), Some("mowing"));
        assert_eq!(f.label("EMPTY"), None);
        assert_eq!(f.label("MISSING"), None);
    }

    #[test]
    fn serializes_back_to_geojson() {
        let f = Feature::rectangle("r", 0.0, 0.0, 2.0, 1.0).with_property("HYDROLOGIE", "bank_zone");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "Polygon");
        assert_eq!(json["id"], "r");
    }
}
