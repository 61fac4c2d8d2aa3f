//! CRS auto-detection and batch reprojection.
//!
//! Uploaded cadastral files rarely declare their coordinate system, so the
//! pipeline classifies a parsed collection by sampling coordinate magnitudes
//! and, when the sample looks ITM-projected, rewrites the whole collection to
//! WGS84 degrees.
//!
//! Known limitation: the legacy Cassini-Soldner "Old Israeli Grid" overlaps
//! the ITM numeric envelope and is classified as ITM. It is not separately
//! supported.

use tracing::debug;

use crate::itm;
use crate::model::{Feature, FeatureCollection};

/// How many coordinate pairs are sampled for classification.
const SAMPLE_LIMIT: usize = 10;

/// Coordinate reference system classification of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsKind {
    /// Israeli Transverse Mercator, EPSG:2039 (projected meters).
    Itm,
    /// WGS84 geographic degrees, EPSG:4326.
    Wgs84,
}

/// Classify a collection as ITM-projected or WGS84-geographic.
///
/// Samples up to 10 coordinate pairs depth-first and counts votes by numeric
/// range. ITM wins only on strictly more votes; an empty collection
/// classifies as WGS84 so that no transform is applied rather than a wrong
/// one.
pub fn detect_crs(collection: &FeatureCollection) -> CrsKind {
    let mut samples: Vec<(f64, f64)> = Vec::with_capacity(SAMPLE_LIMIT);
    for feature in &collection.features {
        if samples.len() >= SAMPLE_LIMIT {
            break;
        }
        feature.geometry.for_each_position(&mut |p| {
            if samples.len() < SAMPLE_LIMIT && p.len() >= 2 {
                samples.push((p[0], p[1]));
            }
        });
    }

    let mut itm_votes = 0usize;
    let mut wgs84_votes = 0usize;
    for (x, y) in samples {
        if x > 50_000.0 && x < 400_000.0 && y > 300_000.0 && y < 900_000.0 {
            itm_votes += 1;
        } else if x > 30.0 && x < 40.0 && y > 25.0 && y < 38.0 {
            wgs84_votes += 1;
        } else if x.abs() > 1000.0 || y.abs() > 1000.0 {
            // Large magnitudes in this domain are always a projected CRS.
            itm_votes += 1;
        }
    }

    if itm_votes > wgs84_votes {
        CrsKind::Itm
    } else {
        CrsKind::Wgs84
    }
}

/// Reproject every coordinate pair of an ITM collection to WGS84 degrees.
///
/// Consumes the collection and returns a new one with `(easting, northing)`
/// replaced by `(lng, lat)`; elevation components pass through untouched.
/// This is the single point where the model's coordinate semantics change
/// from projected meters to geographic degrees. Feeding an already-geographic
/// collection through it treats degrees as meters and produces garbage, so it
/// must be applied exactly once, after an `Itm` classification.
pub fn itm_to_wgs84_collection(collection: FeatureCollection) -> FeatureCollection {
    let features = collection
        .features
        .into_iter()
        .map(|feature| {
            let geometry = feature.geometry.map_xy(&|easting, northing| {
                let (lat, lng) = itm::itm_to_wgs84(easting, northing);
                // GeoJSON ordering: x is longitude.
                (lng, lat)
            });
            Feature::new(geometry, feature.properties)
        })
        .collect();
    FeatureCollection::new(features)
}

/// Detect the CRS of a collection and reproject it to WGS84 if it is ITM.
///
/// Returns the (possibly rewritten) collection together with the detected
/// kind.
pub fn normalize_to_wgs84(collection: FeatureCollection) -> (FeatureCollection, CrsKind) {
    let kind = detect_crs(&collection);
    match kind {
        CrsKind::Itm => {
            debug!("collection detected as ITM, reprojecting to WGS84");
            (itm_to_wgs84_collection(collection), kind)
        }
        CrsKind::Wgs84 => (collection, kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Geometry;

    fn collection_of_points(pairs: &[(f64, f64)]) -> FeatureCollection {
        FeatureCollection::new(
            pairs
                .iter()
                .map(|&(x, y)| {
                    Feature::bare(Geometry::Point {
                        coordinates: vec![x, y],
                    })
                })
                .collect(),
        )
    }

    #[test]
    fn projected_meters_detect_as_itm() {
        let collection = collection_of_points(&[
            (180_000.0, 650_000.0),
            (200_000.0, 600_000.0),
            (250_000.0, 450_000.0),
        ]);
        assert_eq!(detect_crs(&collection), CrsKind::Itm);
    }

    #[test]
    fn geographic_degrees_detect_as_wgs84() {
        let collection = collection_of_points(&[(34.8, 31.2), (35.1, 31.8), (35.4, 31.5)]);
        assert_eq!(detect_crs(&collection), CrsKind::Wgs84);
    }

    #[test]
    fn empty_collection_defaults_to_wgs84() {
        let collection = FeatureCollection::new(vec![]);
        assert_eq!(detect_crs(&collection), CrsKind::Wgs84);
    }

    #[test]
    fn large_out_of_envelope_magnitudes_vote_itm() {
        // Old Israeli Grid style values fall through to the magnitude rule.
        let collection = collection_of_points(&[(1_500_000.0, 1_200_000.0)]);
        assert_eq!(detect_crs(&collection), CrsKind::Itm);
    }

    #[test]
    fn reprojection_lands_in_the_israel_envelope() {
        let collection = collection_of_points(&[(200_000.0, 650_000.0)]);
        let converted = itm_to_wgs84_collection(collection);
        let Geometry::Point { coordinates } = &converted.features[0].geometry else {
            panic!("expected point");
        };
        assert!((34.0..36.0).contains(&coordinates[0]), "lng {}", coordinates[0]);
        assert!((29.0..34.0).contains(&coordinates[1]), "lat {}", coordinates[1]);
    }

    #[test]
    fn double_conversion_does_not_reproduce_itm_values() {
        // Non-idempotent by design: a second pass treats degrees as meters.
        let original = collection_of_points(&[(200_000.0, 650_000.0)]);
        let once = itm_to_wgs84_collection(original.clone());
        let twice = itm_to_wgs84_collection(once.clone());
        assert_ne!(twice, original);
        assert_ne!(twice, once);
    }

    #[test]
    fn normalize_converts_only_itm_collections() {
        let geographic = collection_of_points(&[(34.9, 31.4)]);
        let (unchanged, kind) = normalize_to_wgs84(geographic.clone());
        assert_eq!(kind, CrsKind::Wgs84);
        assert_eq!(unchanged, geographic);

        let projected = collection_of_points(&[(190_000.0, 620_000.0)]);
        let (converted, kind) = normalize_to_wgs84(projected.clone());
        assert_eq!(kind, CrsKind::Itm);
        assert_ne!(converted, projected);
    }
}
