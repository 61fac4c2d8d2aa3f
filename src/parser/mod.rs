//! GIS file parsing: extension dispatch and the shared layer pipeline.
//!
//! A raw file (name + bytes) enters [`parse_gis_file`], which dispatches by
//! lowercase extension to a format decoder. Every decoder lowers its source
//! entities into the normalized feature model; the shared pipeline then
//! rejects empty results, auto-detects the CRS (reprojecting ITM meters to
//! WGS84 degrees), computes the bounding box and assembles the
//! [`ParsedLayer`].

pub mod archive;
pub mod dxf;
pub mod geojson;
pub mod gpx;
pub mod kml;

use std::collections::BTreeSet;

use tracing::info;

use crate::crs;
use crate::error::GisError;
use crate::model::{compute_bbox, Feature, FeatureCollection, ParsedLayer};

/// Supported file formats, keyed by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Dxf,
    GeoJson,
    Kml,
    Kmz,
    Gpx,
    Zip,
    /// A bare `.shp`. Recognized so the error can instruct the caller to
    /// bundle the companions as a ZIP instead of reporting "unsupported".
    Shp,
}

impl FileFormat {
    /// Map a lowercase extension to a format.
    pub fn from_extension(ext: &str) -> Option<FileFormat> {
        match ext {
            "dxf" => Some(FileFormat::Dxf),
            "geojson" | "json" => Some(FileFormat::GeoJson),
            "kml" => Some(FileFormat::Kml),
            "kmz" => Some(FileFormat::Kmz),
            "gpx" => Some(FileFormat::Gpx),
            "zip" => Some(FileFormat::Zip),
            "shp" => Some(FileFormat::Shp),
            _ => None,
        }
    }
}

/// The lowercase extension of a filename, if any.
pub fn file_ext(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether a filename carries a supported GIS extension.
pub fn is_gis_file(name: &str) -> bool {
    file_ext(name)
        .and_then(|ext| FileFormat::from_extension(&ext))
        .is_some()
}

/// Whether a filename is one of the shapefile bundle members.
pub fn is_shapefile_component(name: &str) -> bool {
    matches!(
        file_ext(name).as_deref(),
        Some("shp" | "shx" | "dbf" | "prj" | "cpg")
    )
}

/// Parse a GIS file into a normalized, WGS84 layer.
///
/// Dispatches on the lowercase file extension. Unsupported extensions fail
/// with [`GisError::UnsupportedFormat`]; a bare `.shp` fails with
/// [`GisError::ShapefileCompanions`] rather than attempting a partial parse.
pub fn parse_gis_file(name: &str, bytes: &[u8]) -> Result<ParsedLayer, GisError> {
    let ext = file_ext(name).unwrap_or_default();
    let format = FileFormat::from_extension(&ext)
        .ok_or_else(|| GisError::UnsupportedFormat(ext.clone()))?;

    match format {
        FileFormat::Dxf => finish_layer(name, dxf::decode(bytes)?),
        FileFormat::GeoJson => finish_layer(name, geojson::decode(bytes)?),
        FileFormat::Kml => finish_layer(name, kml::decode(&String::from_utf8_lossy(bytes))?),
        FileFormat::Kmz => finish_layer(name, archive::decode_kmz(bytes)?),
        FileFormat::Gpx => finish_layer(name, gpx::decode(&String::from_utf8_lossy(bytes))?),
        FileFormat::Zip => archive::parse_zip(name, bytes),
        FileFormat::Shp => Err(GisError::ShapefileCompanions),
    }
}

/// Shared tail of every parse: reject empty results, normalize the CRS,
/// compute stats and assemble the layer.
pub(crate) fn finish_layer(name: &str, features: Vec<Feature>) -> Result<ParsedLayer, GisError> {
    if features.is_empty() {
        return Err(GisError::EmptyLayer(name.to_string()));
    }

    let collection = FeatureCollection::new(features);
    let (collection, crs_kind) = crs::normalize_to_wgs84(collection);

    let bbox = compute_bbox(&collection);
    let feature_count = collection.len();
    let geometry_types: BTreeSet<String> = collection
        .features
        .iter()
        .map(|f| f.geometry.type_name().to_string())
        .collect();

    info!(
        "parsed '{}': {} features ({:?}), crs {:?}",
        name, feature_count, geometry_types, crs_kind
    );

    Ok(ParsedLayer {
        name: name.to_string(),
        geojson: collection,
        bbox,
        feature_count,
        geometry_types,
    })
}
