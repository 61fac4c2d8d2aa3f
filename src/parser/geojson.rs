//! GeoJSON decoder.
//!
//! Accepts a top-level `FeatureCollection`, a bare `Feature`, or a bare
//! `Geometry`; any other top-level shape is a format error. Multi-geometries
//! and `GeometryCollection`s are flattened into multiple single-type
//! features.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::GisError;
use crate::model::{Feature, Geometry, Position};

/// Source-side geometry, including the multi types the normalized model
/// deliberately lacks.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum RawGeometry {
    Point { coordinates: Position },
    LineString { coordinates: Vec<Position> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPoint { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<RawGeometry> },
}

fn flatten(raw: RawGeometry, out: &mut Vec<Geometry>) {
    match raw {
        RawGeometry::Point { coordinates } => out.push(Geometry::Point { coordinates }),
        RawGeometry::LineString { coordinates } => {
            out.push(Geometry::LineString { coordinates })
        }
        RawGeometry::Polygon { coordinates } => out.push(Geometry::Polygon { coordinates }),
        RawGeometry::MultiPoint { coordinates } => {
            for coordinates in coordinates {
                out.push(Geometry::Point {
                    coordinates,
                });
            }
        }
        RawGeometry::MultiLineString { coordinates } => {
            for coordinates in coordinates {
                out.push(Geometry::LineString { coordinates });
            }
        }
        RawGeometry::MultiPolygon { coordinates } => {
            for coordinates in coordinates {
                out.push(Geometry::Polygon { coordinates });
            }
        }
        RawGeometry::GeometryCollection { geometries } => {
            for child in geometries {
                flatten(child, out);
            }
        }
    }
}

fn geometry_from_value(value: Value) -> Result<Vec<Geometry>, GisError> {
    let raw: RawGeometry = serde_json::from_value(value)
        .map_err(|e| GisError::malformed("GeoJSON", format!("invalid geometry: {e}")))?;
    let mut out = Vec::new();
    flatten(raw, &mut out);
    Ok(out)
}

/// Lower one source feature into normalized features, one per flattened
/// geometry, all sharing the source properties. Features with a `null`
/// geometry are dropped.
fn lower_feature(value: Value, out: &mut Vec<Feature>) -> Result<(), GisError> {
    let mut obj = match value {
        Value::Object(obj) => obj,
        _ => {
            return Err(GisError::malformed(
                "GeoJSON",
                "feature is not a JSON object",
            ))
        }
    };

    let properties = match obj.remove("properties") {
        Some(Value::Object(props)) => props,
        _ => Map::new(),
    };

    match obj.remove("geometry") {
        Some(Value::Null) | None => {}
        Some(geometry) => {
            for geometry in geometry_from_value(geometry)? {
                out.push(Feature::new(geometry, properties.clone()));
            }
        }
    }
    Ok(())
}

/// Decode GeoJSON bytes into normalized features.
pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Feature>, GisError> {
    let value: Value = serde_json::from_slice(bytes)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GisError::malformed("GeoJSON", "missing top-level \"type\""))?;

    let mut features = Vec::new();
    match kind.as_str() {
        "FeatureCollection" => {
            let members = match value {
                Value::Object(mut obj) => match obj.remove("features") {
                    Some(Value::Array(members)) => members,
                    _ => {
                        return Err(GisError::malformed(
                            "GeoJSON",
                            "FeatureCollection without a \"features\" array",
                        ))
                    }
                },
                _ => unreachable!("\"type\" was read from an object"),
            };
            for member in members {
                lower_feature(member, &mut features)?;
            }
        }
        "Feature" => lower_feature(value, &mut features)?,
        "Point" | "LineString" | "Polygon" | "MultiPoint" | "MultiLineString" | "MultiPolygon"
        | "GeometryCollection" => {
            for geometry in geometry_from_value(value)? {
                features.push(Feature::bare(geometry));
            }
        }
        other => {
            return Err(GisError::malformed(
                "GeoJSON",
                format!("unsupported top-level type \"{other}\""),
            ))
        }
    }
    Ok(features)
}
