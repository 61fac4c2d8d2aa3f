//! DXF decoder.
//!
//! The DXF grammar itself is handled by the `dxf` crate; this module maps
//! drawing entities onto the normalized geometry model. Curved entities
//! (circle, arc, ellipse) are approximated with 36 segments; splines fall
//! back to a polyline through their control points. Non-geometric entities
//! (TEXT, MTEXT, DIMENSION, INSERT, SOLID, 3DFACE and friends) are skipped,
//! and an entity that cannot be converted is dropped rather than aborting
//! the whole file.

use std::f64::consts::TAU;
use std::io::Cursor;

use dxf::entities::{Entity, EntityType};
use dxf::Drawing;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::GisError;
use crate::model::{Feature, Geometry, Position};

const CURVE_SEGMENTS: usize = 36;

/// Decode DXF bytes into normalized features.
pub(crate) fn decode(bytes: &[u8]) -> Result<Vec<Feature>, GisError> {
    let drawing = Drawing::load(&mut Cursor::new(bytes))?;

    let mut features = Vec::new();
    let mut dropped = 0usize;
    for entity in drawing.entities() {
        match entity_geometry(entity) {
            Some((kind, geometry)) => {
                let mut properties = Map::new();
                properties.insert("entity".to_string(), Value::String(kind.to_string()));
                if !entity.common.layer.is_empty() {
                    properties.insert(
                        "layer".to_string(),
                        Value::String(entity.common.layer.clone()),
                    );
                }
                features.push(Feature::new(geometry, properties));
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("dropped {dropped} non-geometric or degenerate DXF entities");
    }
    Ok(features)
}

/// Map one entity to a geometry, or `None` when it carries no usable
/// geometry.
fn entity_geometry(entity: &Entity) -> Option<(&'static str, Geometry)> {
    match &entity.specific {
        EntityType::ModelPoint(point) => Some((
            "POINT",
            Geometry::Point {
                coordinates: vec![point.location.x, point.location.y],
            },
        )),
        EntityType::Line(line) => Some((
            "LINE",
            Geometry::LineString {
                coordinates: vec![
                    vec![line.p1.x, line.p1.y],
                    vec![line.p2.x, line.p2.y],
                ],
            },
        )),
        EntityType::LwPolyline(polyline) => {
            let vertices: Vec<Position> = polyline
                .vertices
                .iter()
                .map(|v| vec![v.x, v.y])
                .collect();
            polyline_geometry(vertices, polyline.is_closed()).map(|g| ("LWPOLYLINE", g))
        }
        EntityType::Polyline(polyline) => {
            let vertices: Vec<Position> = polyline
                .vertices()
                .map(|v| vec![v.location.x, v.location.y])
                .collect();
            polyline_geometry(vertices, polyline.is_closed()).map(|g| ("POLYLINE", g))
        }
        EntityType::Circle(circle) => {
            let mut ring: Vec<Position> = (0..CURVE_SEGMENTS)
                .map(|i| {
                    let t = TAU * i as f64 / CURVE_SEGMENTS as f64;
                    vec![
                        circle.center.x + circle.radius * t.cos(),
                        circle.center.y + circle.radius * t.sin(),
                    ]
                })
                .collect();
            close_ring(&mut ring);
            Some((
                "CIRCLE",
                Geometry::Polygon {
                    coordinates: vec![ring],
                },
            ))
        }
        EntityType::Arc(arc) => {
            let start = arc.start_angle.to_radians();
            let mut end = arc.end_angle.to_radians();
            // Normalize the sweep to be positive, wrapping through 2π.
            if end <= start {
                end += TAU;
            }
            let sweep = end - start;
            let coordinates: Vec<Position> = (0..=CURVE_SEGMENTS)
                .map(|i| {
                    let t = start + sweep * i as f64 / CURVE_SEGMENTS as f64;
                    vec![
                        arc.center.x + arc.radius * t.cos(),
                        arc.center.y + arc.radius * t.sin(),
                    ]
                })
                .collect();
            Some(("ARC", Geometry::LineString { coordinates }))
        }
        EntityType::Ellipse(ellipse) => {
            // The major axis endpoint vector carries the rotation; the minor
            // axis is its perpendicular scaled by the axis ratio.
            let (mx, my) = (ellipse.major_axis.x, ellipse.major_axis.y);
            let (nx, ny) = (-my * ellipse.minor_axis_ratio, mx * ellipse.minor_axis_ratio);
            let mut ring: Vec<Position> = (0..CURVE_SEGMENTS)
                .map(|i| {
                    let t = TAU * i as f64 / CURVE_SEGMENTS as f64;
                    vec![
                        ellipse.center.x + mx * t.cos() + nx * t.sin(),
                        ellipse.center.y + my * t.cos() + ny * t.sin(),
                    ]
                })
                .collect();
            close_ring(&mut ring);
            Some((
                "ELLIPSE",
                Geometry::Polygon {
                    coordinates: vec![ring],
                },
            ))
        }
        EntityType::Spline(spline) => {
            // Control points used directly as a polyline approximation.
            let coordinates: Vec<Position> = spline
                .control_points
                .iter()
                .map(|p| vec![p.x, p.y])
                .collect();
            if coordinates.len() < 2 {
                return None;
            }
            Some(("SPLINE", Geometry::LineString { coordinates }))
        }
        // TEXT, MTEXT, DIMENSION, INSERT, SOLID, 3DFACE and the rest carry
        // no overlay geometry.
        _ => None,
    }
}

fn polyline_geometry(vertices: Vec<Position>, closed: bool) -> Option<Geometry> {
    if closed && vertices.len() >= 3 {
        let mut ring = vertices;
        close_ring(&mut ring);
        Some(Geometry::Polygon {
            coordinates: vec![ring],
        })
    } else if vertices.len() >= 2 {
        Some(Geometry::LineString {
            coordinates: vertices,
        })
    } else {
        None
    }
}

/// Append the first vertex if the source did not already close the ring.
fn close_ring(ring: &mut Vec<Position>) {
    if let (Some(first), Some(last)) = (ring.first().cloned(), ring.last()) {
        if &first != last {
            ring.push(first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dxf::entities::{Arc, Circle, Line, LwPolyline, Text};
    use dxf::enums::AcadVersion;
    use dxf::{LwPolylineVertex, Point};

    // Saving a pre-R13 drawing silently omits LWPOLYLINE entities, so the
    // fixtures pin a version that round-trips everything.
    fn new_drawing() -> Drawing {
        let mut drawing = Drawing::new();
        drawing.header.version = AcadVersion::R2000;
        drawing
    }

    fn drawing_bytes(drawing: &Drawing) -> Vec<u8> {
        let mut buf = Vec::new();
        drawing.save(&mut buf).unwrap();
        buf
    }

    fn lw_vertex(x: f64, y: f64) -> LwPolylineVertex {
        LwPolylineVertex {
            x,
            y,
            ..Default::default()
        }
    }

    #[test]
    fn closed_lwpolyline_becomes_a_closed_polygon() {
        let mut polyline = LwPolyline::default();
        for (x, y) in [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)] {
            polyline.vertices.push(lw_vertex(x, y));
        }
        polyline.set_is_closed(true);

        let mut drawing = new_drawing();
        drawing.add_entity(Entity::new(EntityType::LwPolyline(polyline)));

        let bytes = drawing_bytes(&drawing);
        let features = decode(&bytes).unwrap();
        assert_eq!(features.len(), 1);
        let Geometry::Polygon { coordinates } = &features[0].geometry else {
            panic!("expected polygon, got {:?}", features[0].geometry);
        };
        // 4 open vertices ring-closed to 5 pairs.
        assert_eq!(coordinates[0].len(), 5);
        assert_eq!(coordinates[0].first(), coordinates[0].last());

        // Same fixture through the full pipeline.
        let layer = crate::parser::parse_gis_file("plan.dxf", &bytes).unwrap();
        assert_eq!(layer.feature_count, 1);
        assert!(layer.geometry_types.contains("Polygon"));
    }

    #[test]
    fn open_lwpolyline_stays_a_linestring() {
        let mut polyline = LwPolyline::default();
        polyline.vertices.push(lw_vertex(0.0, 0.0));
        polyline.vertices.push(lw_vertex(5.0, 5.0));

        let mut drawing = new_drawing();
        drawing.add_entity(Entity::new(EntityType::LwPolyline(polyline)));

        let features = decode(&drawing_bytes(&drawing)).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry.type_name(), "LineString");
    }

    #[test]
    fn circle_approximated_with_36_segments() {
        let circle = Circle::new(Point::new(5.0, 5.0, 0.0), 10.0);
        let mut drawing = new_drawing();
        drawing.add_entity(Entity::new(EntityType::Circle(circle)));

        let features = decode(&drawing_bytes(&drawing)).unwrap();
        let Geometry::Polygon { coordinates } = &features[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(coordinates[0].len(), CURVE_SEGMENTS + 1);
        assert_eq!(coordinates[0].first(), coordinates[0].last());
    }

    #[test]
    fn arc_sweep_wraps_through_full_turn() {
        // 350° to 10° sweeps 20° through the wrap, not -340°.
        let arc = Arc::new(Point::new(0.0, 0.0, 0.0), 1.0, 350.0, 10.0);
        let mut drawing = new_drawing();
        drawing.add_entity(Entity::new(EntityType::Arc(arc)));

        let features = decode(&drawing_bytes(&drawing)).unwrap();
        let Geometry::LineString { coordinates } = &features[0].geometry else {
            panic!("expected linestring");
        };
        assert_eq!(coordinates.len(), CURVE_SEGMENTS + 1);
        // All sampled points stay near the wrap region (x close to 1).
        for p in coordinates {
            assert!(p[0] > 0.9, "unexpected sweep point {p:?}");
        }
    }

    #[test]
    fn text_entities_are_skipped_not_errors() {
        let mut drawing = new_drawing();
        drawing.add_entity(Entity::new(EntityType::Text(Text::default())));
        drawing.add_entity(Entity::new(EntityType::Line(Line::new(
            Point::new(0.0, 0.0, 0.0),
            Point::new(1.0, 1.0, 0.0),
        ))));

        let features = decode(&drawing_bytes(&drawing)).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties["entity"], "LINE");
    }
}
