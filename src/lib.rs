pub mod crs;
pub mod error;
pub mod itm;
pub mod model;
pub mod parser;

pub use crs::{detect_crs, itm_to_wgs84_collection, CrsKind};
pub use error::GisError;
pub use itm::{itm_to_wgs84, wgs84_to_itm};
pub use model::{compute_bbox, Feature, FeatureCollection, Geometry, ParsedLayer};
pub use parser::{file_ext, is_gis_file, is_shapefile_component, parse_gis_file, FileFormat};
