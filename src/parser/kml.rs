//! KML decoder.
//!
//! Walks `Placemark` elements with a single `quick-xml` event loop, keeping
//! the current placemark and polygon as builder state. For each placemark the
//! first of `Point`/`LineString`/`Polygon`/`MultiGeometry` (in that priority
//! order) becomes the geometry; `MultiGeometry` children are flattened into
//! one feature each, sharing the parent's properties. `name`/`description`
//! and `SimpleData` extended attributes become feature properties.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::GisError;
use crate::model::{Feature, Geometry, Position};

/// Minimum coordinate pairs for a closed ring.
const MIN_RING_LEN: usize = 4;

#[derive(Clone, Copy)]
enum RingMode {
    Outer,
    Inner,
}

#[derive(Default)]
struct PolygonBuilder {
    outer: Option<Vec<Position>>,
    inners: Vec<Vec<Position>>,
    mode: Option<RingMode>,
}

impl PolygonBuilder {
    fn add_ring(&mut self, ring: Vec<Position>) {
        if ring.len() < MIN_RING_LEN {
            debug!("dropping KML ring with {} coordinate pairs", ring.len());
            return;
        }
        match self.mode {
            Some(RingMode::Outer) => self.outer = self.outer.take().or(Some(ring)),
            Some(RingMode::Inner) => self.inners.push(ring),
            None => {}
        }
    }

    fn finish(self) -> Option<Geometry> {
        let outer = self.outer?;
        let mut coordinates = vec![outer];
        coordinates.extend(self.inners);
        Some(Geometry::Polygon { coordinates })
    }
}

#[derive(Default)]
struct PlacemarkBuilder {
    name: Option<String>,
    description: Option<String>,
    simple_data: Map<String, Value>,
    point: Option<Geometry>,
    line: Option<Geometry>,
    polygon: Option<Geometry>,
    multi: Vec<Geometry>,
    multi_depth: usize,
}

impl PlacemarkBuilder {
    fn attach(&mut self, geometry: Geometry) {
        if self.multi_depth > 0 {
            self.multi.push(geometry);
            return;
        }
        let slot = match geometry {
            Geometry::Point { .. } => &mut self.point,
            Geometry::LineString { .. } => &mut self.line,
            Geometry::Polygon { .. } => &mut self.polygon,
        };
        if slot.is_none() {
            *slot = Some(geometry);
        }
    }

    fn properties(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        if let Some(name) = &self.name {
            properties.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(description) = &self.description {
            properties.insert("description".to_string(), Value::String(description.clone()));
        }
        for (key, value) in &self.simple_data {
            properties.insert(key.clone(), value.clone());
        }
        properties
    }

    fn finish(self, features: &mut Vec<Feature>) {
        let properties = self.properties();
        // Priority order: Point, LineString, Polygon, then MultiGeometry.
        let chosen = self.point.or(self.line).or(self.polygon);
        if let Some(geometry) = chosen {
            features.push(Feature::new(geometry, properties));
        } else {
            for geometry in self.multi {
                features.push(Feature::new(geometry, properties.clone()));
            }
        }
    }
}

fn local_tag(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase()
}

/// Parse a KML `coordinates` text block: whitespace-separated
/// `lon,lat[,alt]` tuples. Altitude is dropped; overlays are 2D.
fn parse_coordinates(text: &str) -> Vec<Position> {
    text.split_whitespace()
        .filter_map(|tuple| {
            let mut parts = tuple.split(',');
            let lng: f64 = parts.next()?.trim().parse().ok()?;
            let lat: f64 = parts.next()?.trim().parse().ok()?;
            Some(vec![lng, lat])
        })
        .collect()
}

/// Route a text node to the right accumulator based on the element stack.
fn handle_text(
    text: String,
    in_coordinates: bool,
    coord_buf: &mut String,
    placemark: &mut Option<PlacemarkBuilder>,
    stack: &[String],
    pending_simple_key: &Option<String>,
) {
    if in_coordinates {
        coord_buf.push(' ');
        coord_buf.push_str(&text);
        return;
    }
    let Some(pm) = placemark else {
        return;
    };
    let parent_is_placemark = stack.len() >= 2 && stack[stack.len() - 2] == "placemark";
    match stack.last().map(String::as_str) {
        Some("simpledata") => {
            if let Some(key) = pending_simple_key {
                pm.simple_data.insert(key.clone(), Value::String(text));
            }
        }
        Some("name") if parent_is_placemark => pm.name = Some(text),
        Some("description") if parent_is_placemark => pm.description = Some(text),
        _ => {}
    }
}

/// Decode KML text into normalized features.
pub(crate) fn decode(text: &str) -> Result<Vec<Feature>, GisError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut placemark: Option<PlacemarkBuilder> = None;
    let mut polygon: Option<PolygonBuilder> = None;
    let mut pending_simple_key: Option<String> = None;
    let mut in_coordinates = false;
    let mut coord_buf = String::new();
    let mut features = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = local_tag(&start);
                match tag.as_str() {
                    "placemark" => placemark = Some(PlacemarkBuilder::default()),
                    "multigeometry" => {
                        if let Some(pm) = &mut placemark {
                            pm.multi_depth += 1;
                        }
                    }
                    "polygon" if placemark.is_some() => {
                        polygon = Some(PolygonBuilder::default())
                    }
                    "outerboundaryis" => {
                        if let Some(pb) = &mut polygon {
                            pb.mode = Some(RingMode::Outer);
                        }
                    }
                    "innerboundaryis" => {
                        if let Some(pb) = &mut polygon {
                            pb.mode = Some(RingMode::Inner);
                        }
                    }
                    "coordinates" => {
                        in_coordinates = true;
                        coord_buf.clear();
                    }
                    "simpledata" => {
                        pending_simple_key = start
                            .try_get_attribute("name")
                            .ok()
                            .flatten()
                            .and_then(|attr| attr.unescape_value().ok())
                            .map(|v| v.into_owned());
                    }
                    _ => {}
                }
                stack.push(tag);
            }
            Ok(Event::Text(text_event)) => {
                let text = match text_event.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(text_event.as_ref()).into_owned(),
                };
                handle_text(
                    text,
                    in_coordinates,
                    &mut coord_buf,
                    &mut placemark,
                    &stack,
                    &pending_simple_key,
                );
            }
            Ok(Event::CData(cdata)) => {
                let text = String::from_utf8_lossy(cdata.as_ref()).into_owned();
                handle_text(
                    text,
                    in_coordinates,
                    &mut coord_buf,
                    &mut placemark,
                    &stack,
                    &pending_simple_key,
                );
            }
            Ok(Event::End(end)) => {
                let tag = String::from_utf8_lossy(end.local_name().as_ref()).to_lowercase();
                stack.pop();
                match tag.as_str() {
                    "coordinates" => {
                        in_coordinates = false;
                        let positions = parse_coordinates(&coord_buf);
                        match stack.last().map(String::as_str) {
                            Some("point") => {
                                if let (Some(pm), Some(position)) =
                                    (&mut placemark, positions.into_iter().next())
                                {
                                    pm.attach(Geometry::Point {
                                        coordinates: position,
                                    });
                                }
                            }
                            Some("linestring") => {
                                if let Some(pm) = &mut placemark {
                                    if positions.len() >= 2 {
                                        pm.attach(Geometry::LineString {
                                            coordinates: positions,
                                        });
                                    }
                                }
                            }
                            Some("linearring") => {
                                if let Some(pb) = &mut polygon {
                                    pb.add_ring(positions);
                                }
                            }
                            _ => {}
                        }
                    }
                    "polygon" => {
                        if let (Some(pm), Some(pb)) = (&mut placemark, polygon.take()) {
                            if let Some(geometry) = pb.finish() {
                                pm.attach(geometry);
                            }
                        }
                    }
                    "multigeometry" => {
                        if let Some(pm) = &mut placemark {
                            pm.multi_depth = pm.multi_depth.saturating_sub(1);
                        }
                    }
                    "simpledata" => pending_simple_key = None,
                    "placemark" => {
                        if let Some(pm) = placemark.take() {
                            pm.finish(&mut features);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(GisError::malformed(
                    "KML",
                    format!("XML error at position {}: {e}", reader.buffer_position()),
                ))
            }
        }
    }

    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placemark_point_with_properties() {
        let kml = r#"<?xml version="1.0" encoding="UTF-8"?>
        <kml xmlns="http://www.opengis.net/kml/2.2">
          <Document>
            <Placemark>
              <name>Survey marker</name>
              <description>Benchmark 7</description>
              <ExtendedData>
                <SchemaData>
                  <SimpleData name="gush">6158</SimpleData>
                  <SimpleData name="helka">42</SimpleData>
                </SchemaData>
              </ExtendedData>
              <Point><coordinates>35.21,31.77,0</coordinates></Point>
            </Placemark>
          </Document>
        </kml>"#;

        let features = decode(kml).unwrap();
        assert_eq!(features.len(), 1);
        let feature = &features[0];
        assert_eq!(feature.properties["name"], "Survey marker");
        assert_eq!(feature.properties["description"], "Benchmark 7");
        assert_eq!(feature.properties["gush"], "6158");
        assert_eq!(feature.properties["helka"], "42");
        assert_eq!(
            feature.geometry,
            Geometry::Point {
                coordinates: vec![35.21, 31.77]
            }
        );
    }

    #[test]
    fn polygon_with_hole_keeps_both_rings() {
        let kml = r#"
        <kml><Document><Placemark>
          <Polygon>
            <outerBoundaryIs><LinearRing><coordinates>
              35.0,31.0 35.1,31.0 35.1,31.1 35.0,31.1 35.0,31.0
            </coordinates></LinearRing></outerBoundaryIs>
            <innerBoundaryIs><LinearRing><coordinates>
              35.04,31.04 35.06,31.04 35.06,31.06 35.04,31.06 35.04,31.04
            </coordinates></LinearRing></innerBoundaryIs>
          </Polygon>
        </Placemark></Document></kml>"#;

        let features = decode(kml).unwrap();
        assert_eq!(features.len(), 1);
        let Geometry::Polygon { coordinates } = &features[0].geometry else {
            panic!("expected polygon");
        };
        assert_eq!(coordinates.len(), 2, "outer ring plus one hole");
        assert_eq!(coordinates[0].len(), 5);
        assert_eq!(coordinates[1].len(), 5);
    }

    #[test]
    fn short_ring_is_rejected() {
        let kml = r#"
        <kml><Placemark>
          <Polygon>
            <outerBoundaryIs><LinearRing><coordinates>
              35.0,31.0 35.1,31.0 35.0,31.0
            </coordinates></LinearRing></outerBoundaryIs>
          </Polygon>
        </Placemark></kml>"#;

        // A 3-pair ring cannot be a closed ring, so no feature results.
        assert!(decode(kml).unwrap().is_empty());
    }

    #[test]
    fn multigeometry_is_flattened_with_shared_properties() {
        let kml = r#"
        <kml><Placemark>
          <name>split parcel</name>
          <MultiGeometry>
            <Point><coordinates>35.0,31.0</coordinates></Point>
            <LineString><coordinates>35.0,31.0 35.1,31.1</coordinates></LineString>
          </MultiGeometry>
        </Placemark></kml>"#;

        let features = decode(kml).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].geometry.type_name(), "Point");
        assert_eq!(features[1].geometry.type_name(), "LineString");
        for feature in &features {
            assert_eq!(feature.properties["name"], "split parcel");
        }
    }

    #[test]
    fn point_takes_priority_over_polygon() {
        let kml = r#"
        <kml><Placemark>
          <Polygon>
            <outerBoundaryIs><LinearRing><coordinates>
              35.0,31.0 35.1,31.0 35.1,31.1 35.0,31.1 35.0,31.0
            </coordinates></LinearRing></outerBoundaryIs>
          </Polygon>
          <Point><coordinates>35.05,31.05</coordinates></Point>
        </Placemark></kml>"#;

        let features = decode(kml).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry.type_name(), "Point");
    }

    #[test]
    fn no_placemarks_yields_no_features() {
        let kml = r#"<kml><Document><name>empty</name></Document></kml>"#;
        assert!(decode(kml).unwrap().is_empty());
    }
}
