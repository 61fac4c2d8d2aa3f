//! GPX decoder.
//!
//! Extracts three element kinds: `wpt` waypoints become Point features,
//! `trk`/`trkseg` track segments and `rte` routes become one LineString
//! feature each. Segments or routes with fewer than 2 valid points are
//! dropped. Elevation, when present and finite, is carried as a third
//! coordinate component.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::GisError;
use crate::model::{Feature, Geometry, Position};

#[derive(Default)]
struct Waypoint {
    lng: f64,
    lat: f64,
    ele: Option<f64>,
    name: Option<String>,
    description: Option<String>,
}

impl Waypoint {
    fn into_feature(self) -> Feature {
        let mut coordinates = vec![self.lng, self.lat];
        if let Some(ele) = self.ele.filter(|e| e.is_finite()) {
            coordinates.push(ele);
        }
        let mut properties = Map::new();
        if let Some(name) = self.name {
            properties.insert("name".to_string(), Value::String(name));
        }
        if let Some(description) = self.description {
            properties.insert("description".to_string(), Value::String(description));
        }
        if let Some(ele) = self.ele.filter(|e| e.is_finite()) {
            properties.insert("elevation".to_string(), ele.into());
        }
        Feature::new(Geometry::Point { coordinates }, properties)
    }
}

fn lat_lng_attrs(start: &BytesStart) -> Option<(f64, f64)> {
    let get = |key: &str| -> Option<f64> {
        start
            .try_get_attribute(key)
            .ok()
            .flatten()
            .and_then(|attr| attr.unescape_value().ok())
            .and_then(|v| v.trim().parse().ok())
    };
    Some((get("lat")?, get("lon")?))
}

fn push_segment(features: &mut Vec<Feature>, points: Vec<Position>) {
    if points.len() >= 2 {
        features.push(Feature::bare(Geometry::LineString {
            coordinates: points,
        }));
    } else {
        debug!("dropping GPX segment with {} points", points.len());
    }
}

/// Decode GPX text into normalized features.
pub(crate) fn decode(text: &str) -> Result<Vec<Feature>, GisError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut waypoint: Option<Waypoint> = None;
    // Active trkseg or rte point list.
    let mut segment: Option<Vec<Position>> = None;
    // trkpt/rtept currently being filled: (lat, lng, ele).
    let mut track_point: Option<(f64, f64, Option<f64>)> = None;
    let mut features = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase();
                match tag.as_str() {
                    "wpt" => {
                        waypoint = lat_lng_attrs(&start).map(|(lat, lng)| Waypoint {
                            lng,
                            lat,
                            ..Default::default()
                        });
                    }
                    "trkseg" | "rte" => segment = Some(Vec::new()),
                    "trkpt" | "rtept" => {
                        track_point = lat_lng_attrs(&start).map(|(lat, lng)| (lat, lng, None));
                    }
                    _ => {}
                }
                stack.push(tag);
            }
            Ok(Event::Empty(start)) => {
                let tag = String::from_utf8_lossy(start.local_name().as_ref()).to_lowercase();
                match tag.as_str() {
                    "wpt" => {
                        if let Some((lat, lng)) = lat_lng_attrs(&start) {
                            features.push(
                                Waypoint {
                                    lng,
                                    lat,
                                    ..Default::default()
                                }
                                .into_feature(),
                            );
                        }
                    }
                    "trkpt" | "rtept" => {
                        if let (Some(points), Some((lat, lng))) =
                            (&mut segment, lat_lng_attrs(&start))
                        {
                            points.push(vec![lng, lat]);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(text_event)) => {
                let text = match text_event.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => String::from_utf8_lossy(text_event.as_ref()).into_owned(),
                };
                let parent = stack
                    .len()
                    .checked_sub(2)
                    .map(|i| stack[i].as_str())
                    .unwrap_or("");
                match stack.last().map(String::as_str) {
                    Some("ele") => {
                        let ele: Option<f64> = text.trim().parse().ok();
                        if let Some((_, _, slot)) = &mut track_point {
                            *slot = ele;
                        } else if let Some(wpt) = &mut waypoint {
                            wpt.ele = ele;
                        }
                    }
                    Some("name") if parent == "wpt" => {
                        if let Some(wpt) = &mut waypoint {
                            wpt.name = Some(text);
                        }
                    }
                    Some("desc") if parent == "wpt" => {
                        if let Some(wpt) = &mut waypoint {
                            wpt.description = Some(text);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(end)) => {
                let tag = String::from_utf8_lossy(end.local_name().as_ref()).to_lowercase();
                stack.pop();
                match tag.as_str() {
                    "wpt" => {
                        if let Some(wpt) = waypoint.take() {
                            features.push(wpt.into_feature());
                        }
                    }
                    "trkpt" | "rtept" => {
                        if let (Some(points), Some((lat, lng, ele))) =
                            (&mut segment, track_point.take())
                        {
                            let mut position = vec![lng, lat];
                            if let Some(ele) = ele.filter(|e| e.is_finite()) {
                                position.push(ele);
                            }
                            points.push(position);
                        }
                    }
                    "trkseg" | "rte" => {
                        if let Some(points) = segment.take() {
                            push_segment(&mut features, points);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(GisError::malformed(
                    "GPX",
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
    fn waypoint_and_track_become_point_and_linestring() {
        let gpx = r#"<?xml version="1.0"?>
        <gpx version="1.1" creator="test">
          <wpt lat="31.77" lon="35.21">
            <ele>754.0</ele>
            <name>Old City</name>
            <desc>start point</desc>
          </wpt>
          <trk>
            <trkseg>
              <trkpt lat="31.77" lon="35.21"><ele>754.0</ele></trkpt>
              <trkpt lat="31.78" lon="35.22"><ele>760.5</ele></trkpt>
              <trkpt lat="31.79" lon="35.23"><ele>749.0</ele></trkpt>
            </trkseg>
          </trk>
        </gpx>"#;

        let features = decode(gpx).unwrap();
        assert_eq!(features.len(), 2);

        let point = &features[0];
        assert_eq!(point.geometry.type_name(), "Point");
        assert_eq!(point.properties["name"], "Old City");
        assert_eq!(point.properties["description"], "start point");
        assert_eq!(point.properties["elevation"], 754.0);
        let Geometry::Point { coordinates } = &point.geometry else {
            panic!("expected point");
        };
        assert_eq!(coordinates, &vec![35.21, 31.77, 754.0]);

        let Geometry::LineString { coordinates } = &features[1].geometry else {
            panic!("expected linestring");
        };
        assert_eq!(coordinates.len(), 3);
        assert_eq!(coordinates[1], vec![35.22, 31.78, 760.5]);
    }

    #[test]
    fn single_point_segment_is_dropped() {
        let gpx = r#"<gpx>
          <trk><trkseg>
            <trkpt lat="31.5" lon="35.0"/>
          </trkseg></trk>
          <trk><trkseg>
            <trkpt lat="31.5" lon="35.0"/>
            <trkpt lat="31.6" lon="35.1"/>
          </trkseg></trk>
        </gpx>"#;

        let features = decode(gpx).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].geometry.type_name(), "LineString");
    }

    #[test]
    fn route_points_become_one_linestring() {
        let gpx = r#"<gpx>
          <rte>
            <rtept lat="31.0" lon="34.8"/>
            <rtept lat="31.1" lon="34.9"/>
            <rtept lat="31.2" lon="35.0"/>
          </rte>
        </gpx>"#;

        let features = decode(gpx).unwrap();
        assert_eq!(features.len(), 1);
        let Geometry::LineString { coordinates } = &features[0].geometry else {
            panic!("expected linestring");
        };
        assert_eq!(coordinates.len(), 3);
        assert_eq!(coordinates[0], vec![34.8, 31.0]);
    }

    #[test]
    fn empty_gpx_yields_no_features() {
        assert!(decode("<gpx></gpx>").unwrap().is_empty());
    }
}
