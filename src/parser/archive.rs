//! Archive handling: KMZ, ZIP fallback scanning and shapefile bundles.
//!
//! A KMZ is a ZIP whose first `.kml` entry is the document. A plain ZIP is
//! first probed for a shapefile bundle (`.shp` plus optional `.dbf`, `.shx`,
//! `.prj` companions, read entirely in memory); failing that, every entry
//! with a supported GIS extension is parsed independently through the normal
//! dispatch and the resulting collections are merged into a single layer.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use serde_json::{Map, Value};
use shapefile::dbase;
use shapefile::record::polygon::GenericPolygon;
use shapefile::record::polyline::GenericPolyline;
use shapefile::{PolygonRing, Shape, ShapeReader};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::GisError;
use crate::model::{Feature, Geometry, ParsedLayer, Position};
use crate::parser::{self, kml};

/// Extract the first `.kml` entry of a KMZ archive and decode it.
pub(crate) fn decode_kmz(bytes: &[u8]) -> Result<Vec<Feature>, GisError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if !entry.name().to_ascii_lowercase().ends_with(".kml") {
            continue;
        }
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        return kml::decode(&String::from_utf8_lossy(&raw));
    }
    Err(GisError::NoKmlInKmz)
}

/// Parse a ZIP archive into a single merged layer.
pub(crate) fn parse_zip(name: &str, bytes: &[u8]) -> Result<ParsedLayer, GisError> {
    let entries = read_entries(bytes)?;
    let layer_name = strip_zip_suffix(name);

    // Shapefile bundle first; fall back to scanning on failure.
    if let Some(shp_key) = entries
        .keys()
        .find(|key| key.to_ascii_lowercase().ends_with(".shp"))
        .cloned()
    {
        match decode_shapefile(&entries, &shp_key) {
            Ok(features) if !features.is_empty() => {
                return parser::finish_layer(&layer_name, features);
            }
            Ok(_) => debug!("shapefile bundle '{shp_key}' held no usable shapes"),
            Err(e) => warn!("shapefile bundle '{shp_key}' failed: {e}"),
        }
    }

    // Fallback: parse every entry with a supported GIS extension and merge.
    let mut merged = Vec::new();
    let mut parsed_any = false;
    for (entry_name, entry_bytes) in &entries {
        if !parser::is_gis_file(entry_name) || parser::is_shapefile_component(entry_name) {
            continue;
        }
        match parser::parse_gis_file(entry_name, entry_bytes) {
            Ok(layer) => {
                merged.extend(layer.geojson.features);
                parsed_any = true;
            }
            Err(e) => warn!("skipping ZIP entry '{entry_name}': {e}"),
        }
    }
    if !parsed_any {
        return Err(GisError::NoGisInZip);
    }
    parser::finish_layer(&layer_name, merged)
}

fn read_entries(bytes: &[u8]) -> Result<HashMap<String, Vec<u8>>, GisError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = HashMap::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let mut raw = Vec::new();
        entry.read_to_end(&mut raw)?;
        entries.insert(entry.name().to_string(), raw);
    }
    Ok(entries)
}

fn strip_zip_suffix(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".zip") {
        name[..name.len() - 4].to_string()
    } else {
        name.to_string()
    }
}

/// Read a shapefile bundle out of extracted ZIP entries.
fn decode_shapefile(
    entries: &HashMap<String, Vec<u8>>,
    shp_key: &str,
) -> Result<Vec<Feature>, GisError> {
    let stem = &shp_key[..shp_key.len() - 4];
    let companion = |ext: &str| -> Option<&Vec<u8>> {
        let wanted = format!("{stem}.{ext}").to_ascii_lowercase();
        entries
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase() == wanted)
            .map(|(_, bytes)| bytes)
    };

    let shp_bytes = &entries[shp_key];
    let shape_reader = match companion("shx") {
        Some(shx) => ShapeReader::with_shx(
            Cursor::new(shp_bytes.as_slice()),
            Cursor::new(shx.as_slice()),
        )?,
        None => ShapeReader::new(Cursor::new(shp_bytes.as_slice()))?,
    };

    let mut features = Vec::new();
    match companion("dbf") {
        Some(dbf) => {
            let dbf_reader = dbase::Reader::new(Cursor::new(dbf.as_slice()))
                .map_err(shapefile::Error::DbaseError)?;
            let mut reader = shapefile::Reader::new(shape_reader, dbf_reader);
            for result in reader.iter_shapes_and_records() {
                let (shape, record) = result?;
                let properties = record_properties(record);
                for geometry in shape_geometries(shape) {
                    features.push(Feature::new(geometry, properties.clone()));
                }
            }
        }
        None => {
            let mut shape_reader = shape_reader;
            for shape in shape_reader.iter_shapes() {
                for geometry in shape_geometries(shape?) {
                    features.push(Feature::bare(geometry));
                }
            }
        }
    }
    Ok(features)
}

/// Lower DBF record fields into JSON feature properties.
fn record_properties(record: dbase::Record) -> Map<String, Value> {
    let mut properties = Map::new();
    for (name, value) in record {
        let json = match value {
            dbase::FieldValue::Character(v) => v.map(Value::String).unwrap_or(Value::Null),
            dbase::FieldValue::Numeric(v) => v.map(Value::from).unwrap_or(Value::Null),
            dbase::FieldValue::Logical(v) => v.map(Value::Bool).unwrap_or(Value::Null),
            dbase::FieldValue::Float(v) => {
                v.map(|f| Value::from(f as f64)).unwrap_or(Value::Null)
            }
            dbase::FieldValue::Integer(v) => Value::from(v),
            dbase::FieldValue::Double(v) => Value::from(v),
            other => Value::String(other.to_string()),
        };
        properties.insert(name, json);
    }
    properties
}

/// Flatten one shapefile shape into single-type geometries.
fn shape_geometries(shape: Shape) -> Vec<Geometry> {
    match shape {
        Shape::NullShape => Vec::new(),
        Shape::Point(p) => vec![point_geometry(p.x, p.y)],
        Shape::PointM(p) => vec![point_geometry(p.x, p.y)],
        Shape::PointZ(p) => vec![point_geometry(p.x, p.y)],
        Shape::Multipoint(mp) => mp
            .points()
            .iter()
            .map(|p| point_geometry(p.x, p.y))
            .collect(),
        Shape::MultipointM(mp) => mp
            .points()
            .iter()
            .map(|p| point_geometry(p.x, p.y))
            .collect(),
        Shape::MultipointZ(mp) => mp
            .points()
            .iter()
            .map(|p| point_geometry(p.x, p.y))
            .collect(),
        Shape::Polyline(pl) => polyline_geometries(&pl),
        Shape::PolylineM(pl) => polyline_geometries(&pl),
        Shape::PolylineZ(pl) => polyline_geometries(&pl),
        Shape::Polygon(pg) => polygon_geometries(&pg),
        Shape::PolygonM(pg) => polygon_geometries(&pg),
        Shape::PolygonZ(pg) => polygon_geometries(&pg),
        _ => Vec::new(),
    }
}

fn point_geometry(x: f64, y: f64) -> Geometry {
    Geometry::Point {
        coordinates: vec![x, y],
    }
}

trait XY {
    fn xy(&self) -> (f64, f64);
}

impl XY for shapefile::Point {
    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl XY for shapefile::PointM {
    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl XY for shapefile::PointZ {
    fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

fn positions<P: XY>(points: &[P]) -> Vec<Position> {
    points
        .iter()
        .map(|p| {
            let (x, y) = p.xy();
            vec![x, y]
        })
        .collect()
}

/// One LineString per polyline part (parts with fewer than 2 points are
/// dropped).
fn polyline_geometries<P: XY>(polyline: &GenericPolyline<P>) -> Vec<Geometry> {
    polyline
        .parts()
        .iter()
        .filter(|part| part.len() >= 2)
        .map(|part| Geometry::LineString {
            coordinates: positions(part),
        })
        .collect()
}

/// Group shapefile rings into polygons: each outer ring starts a polygon and
/// collects the inner rings that follow it.
fn polygon_geometries<P: XY>(polygon: &GenericPolygon<P>) -> Vec<Geometry> {
    let mut polygons: Vec<Vec<Vec<Position>>> = Vec::new();
    for ring in polygon.rings() {
        let points = positions(ring.points());
        match ring {
            PolygonRing::Outer(_) => polygons.push(vec![points]),
            PolygonRing::Inner(_) => match polygons.last_mut() {
                Some(current) => current.push(points),
                // Inner ring with no preceding outer: promote it.
                None => polygons.push(vec![points]),
            },
        }
    }
    polygons
        .into_iter()
        .map(|coordinates| Geometry::Polygon { coordinates })
        .collect()
}
