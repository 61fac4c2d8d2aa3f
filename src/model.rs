//! Normalized GeoJSON-shaped geometry model.
//!
//! Every format decoder lowers its source entities into this one model:
//! features holding a single-type geometry (`Point`, `LineString` or
//! `Polygon`). Multi-geometries from source formats are flattened into
//! multiple single-type features, never preserved as `MultiX` types.
//!
//! Coordinate ordering is GeoJSON ordering everywhere: `[x, y]`, which is
//! `[lng, lat]` once a collection is geographic. Positions may carry an
//! optional third elevation component.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single coordinate position: `[x, y]` or `[x, y, ele]`.
pub type Position = Vec<f64>;

/// Geometry of a normalized feature.
///
/// Serializes to/from the GeoJSON geometry object shape
/// (`{"type": "Point", "coordinates": [...]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    LineString { coordinates: Vec<Position> },
    Polygon { coordinates: Vec<Vec<Position>> },
}

impl Geometry {
    /// The GeoJSON `type` string of this geometry.
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::LineString { .. } => "LineString",
            Geometry::Polygon { .. } => "Polygon",
        }
    }

    /// Visit every coordinate position, depth-first.
    pub fn for_each_position<F: FnMut(&[f64])>(&self, f: &mut F) {
        match self {
            Geometry::Point { coordinates } => f(coordinates),
            Geometry::LineString { coordinates } => {
                for p in coordinates {
                    f(p);
                }
            }
            Geometry::Polygon { coordinates } => {
                for ring in coordinates {
                    for p in ring {
                        f(p);
                    }
                }
            }
        }
    }

    /// Rewrite the first two components of every position through `f`,
    /// leaving any elevation component untouched.
    pub fn map_xy<F: Fn(f64, f64) -> (f64, f64)>(self, f: &F) -> Geometry {
        fn apply<F: Fn(f64, f64) -> (f64, f64)>(mut p: Position, f: &F) -> Position {
            if p.len() >= 2 {
                let (x, y) = f(p[0], p[1]);
                p[0] = x;
                p[1] = y;
            }
            p
        }

        match self {
            Geometry::Point { coordinates } => Geometry::Point {
                coordinates: apply(coordinates, f),
            },
            Geometry::LineString { coordinates } => Geometry::LineString {
                coordinates: coordinates.into_iter().map(|p| apply(p, f)).collect(),
            },
            Geometry::Polygon { coordinates } => Geometry::Polygon {
                coordinates: coordinates
                    .into_iter()
                    .map(|ring| ring.into_iter().map(|p| apply(p, f)).collect())
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum FeatureTag {
    #[default]
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
enum FeatureCollectionTag {
    #[default]
    FeatureCollection,
}

/// A normalized feature: geometry plus free-form properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type", default)]
    tag: FeatureTag,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            tag: FeatureTag::Feature,
            properties,
            geometry,
        }
    }

    /// A feature with empty properties.
    pub fn bare(geometry: Geometry) -> Self {
        Self::new(geometry, Map::new())
    }
}

/// An ordered list of features, per the GeoJSON data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type", default)]
    tag: FeatureCollectionTag,
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            tag: FeatureCollectionTag::FeatureCollection,
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// The parser's output unit: one layer per parsed file.
///
/// Invariants: `feature_count == geojson.features.len()`; `bbox` is `None`
/// iff no feature contributed a finite coordinate pair; `geometry_types` is
/// the deduplicated set of geometry type strings actually present.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedLayer {
    pub name: String,
    pub geojson: FeatureCollection,
    /// `[min_lng, min_lat, max_lng, max_lat]`, WGS84.
    pub bbox: Option<[f64; 4]>,
    pub feature_count: usize,
    pub geometry_types: BTreeSet<String>,
}

/// Compute the bounding box of a collection from the first two components of
/// every position. Returns `None` if no finite pair was found.
pub fn compute_bbox(collection: &FeatureCollection) -> Option<[f64; 4]> {
    let mut bbox: Option<[f64; 4]> = None;
    for feature in &collection.features {
        feature.geometry.for_each_position(&mut |p| {
            if p.len() < 2 || !p[0].is_finite() || !p[1].is_finite() {
                return;
            }
            match &mut bbox {
                Some([min_x, min_y, max_x, max_y]) => {
                    *min_x = min_x.min(p[0]);
                    *min_y = min_y.min(p[1]);
                    *max_x = max_x.max(p[0]);
                    *max_y = max_y.max(p[1]);
                }
                None => bbox = Some([p[0], p[1], p[0], p[1]]),
            }
        });
    }
    bbox
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> Feature {
        Feature::bare(Geometry::Point {
            coordinates: vec![x, y],
        })
    }

    #[test]
    fn bbox_spans_all_features() {
        let collection = FeatureCollection::new(vec![point(34.8, 31.9), point(35.2, 32.1)]);
        assert_eq!(compute_bbox(&collection), Some([34.8, 31.9, 35.2, 32.1]));
    }

    #[test]
    fn bbox_of_empty_collection_is_none() {
        let collection = FeatureCollection::new(vec![]);
        assert_eq!(compute_bbox(&collection), None);
    }

    #[test]
    fn bbox_skips_non_finite_pairs() {
        let collection = FeatureCollection::new(vec![point(f64::NAN, 31.9), point(35.0, 32.0)]);
        assert_eq!(compute_bbox(&collection), Some([35.0, 32.0, 35.0, 32.0]));
    }

    #[test]
    fn bbox_ignores_elevation_component() {
        let collection = FeatureCollection::new(vec![Feature::bare(Geometry::LineString {
            coordinates: vec![vec![34.9, 31.5, 800.0], vec![35.1, 31.6, 900.0]],
        })]);
        assert_eq!(compute_bbox(&collection), Some([34.9, 31.5, 35.1, 31.6]));
    }

    #[test]
    fn feature_serializes_with_geojson_tags() {
        let feature = point(35.0, 32.0);
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "Point");
        assert_eq!(json["geometry"]["coordinates"][0], 35.0);
    }

    #[test]
    fn collection_round_trips_through_json() {
        let collection = FeatureCollection::new(vec![point(35.0, 32.0)]);
        let json = serde_json::to_string(&collection).unwrap();
        let back: FeatureCollection = serde_json::from_str(&json).unwrap();
        assert_eq!(back, collection);
    }

    #[test]
    fn map_xy_preserves_elevation() {
        let geometry = Geometry::Point {
            coordinates: vec![1.0, 2.0, 30.0],
        };
        let mapped = geometry.map_xy(&|x, y| (x * 2.0, y * 2.0));
        assert_eq!(
            mapped,
            Geometry::Point {
                coordinates: vec![2.0, 4.0, 30.0]
            }
        );
    }
}
