//! Israeli Transverse Mercator (ITM, EPSG:2039) ↔ WGS84 conversion.
//!
//! Closed-form Transverse Mercator projection using the fixed Israeli grid
//! parameters, per the TM formulas in Snyder's "Map Projections: A Working
//! Manual". The forward direction computes the meridional arc to the given
//! latitude and subtracts the arc to the grid's origin latitude before adding
//! the false northing; skipping that origin-arc term displaces results by
//! thousands of kilometers.
//!
//! Both functions are pure and are only specified for the Israel operating
//! envelope (lat 29–34, lng 34–36; easting ~100k–400k, northing ~300k–900k).
//! Behavior outside that envelope is unspecified.

/// Ellipsoid semi-major axis (meters).
pub const SEMI_MAJOR_AXIS: f64 = 6378137.0;
/// First eccentricity of the ellipsoid.
pub const ECCENTRICITY: f64 = 0.0818191908426;
/// Central meridian of the grid (degrees).
pub const CENTRAL_MERIDIAN_DEG: f64 = 35.2045169444;
/// Latitude of the grid origin (degrees), 31°44'03.817"N.
pub const ORIGIN_LATITUDE_DEG: f64 = 31.7343936111;
/// Scale factor at the central meridian.
pub const SCALE_FACTOR: f64 = 1.0000067;
/// False easting of the grid origin (meters).
pub const FALSE_EASTING: f64 = 219529.584;
/// False northing of the grid origin (meters).
pub const FALSE_NORTHING: f64 = 626907.39;

/// Meridional arc length from the equator to latitude `phi` (radians).
fn meridional_arc(phi: f64) -> f64 {
    let e2 = ECCENTRICITY * ECCENTRICITY;
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    SEMI_MAJOR_AXIS
        * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
            - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
            + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
            - (35.0 * e6 / 3072.0) * (6.0 * phi).sin())
}

/// Forward projection: WGS84 geographic degrees to ITM meters.
///
/// Returns `(easting, northing)`.
pub fn wgs84_to_itm(lat: f64, lng: f64) -> (f64, f64) {
    let e2 = ECCENTRICITY * ECCENTRICITY;
    let ep2 = e2 / (1.0 - e2);

    let phi = lat.to_radians();
    let lam = lng.to_radians();
    let lam0 = CENTRAL_MERIDIAN_DEG.to_radians();

    let sin_phi = phi.sin();
    let cos_phi = phi.cos();
    let tan_phi = phi.tan();

    let n = SEMI_MAJOR_AXIS / (1.0 - e2 * sin_phi * sin_phi).sqrt();
    let t = tan_phi * tan_phi;
    let c = ep2 * cos_phi * cos_phi;
    let a = (lam - lam0) * cos_phi;

    let m = meridional_arc(phi);
    let m0 = meridional_arc(ORIGIN_LATITUDE_DEG.to_radians());

    let a2 = a * a;
    let a3 = a2 * a;
    let a4 = a3 * a;
    let a5 = a4 * a;
    let a6 = a5 * a;

    let easting = FALSE_EASTING
        + SCALE_FACTOR
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);

    let northing = FALSE_NORTHING
        + SCALE_FACTOR
            * (m - m0
                + n * tan_phi
                    * (a2 / 2.0
                        + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                        + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

    (easting, northing)
}

/// Inverse projection: ITM meters to WGS84 geographic degrees.
///
/// Returns `(lat, lng)`. Uses the footpoint latitude derived from the
/// meridional arc, refined via the `N1, T1, C1, R1, D` series terms.
pub fn itm_to_wgs84(easting: f64, northing: f64) -> (f64, f64) {
    let e2 = ECCENTRICITY * ECCENTRICITY;
    let ep2 = e2 / (1.0 - e2);
    let e4 = e2 * e2;
    let e6 = e4 * e2;

    let lam0 = CENTRAL_MERIDIAN_DEG.to_radians();
    let m0 = meridional_arc(ORIGIN_LATITUDE_DEG.to_radians());

    let m = m0 + (northing - FALSE_NORTHING) / SCALE_FACTOR;
    let mu = m / (SEMI_MAJOR_AXIS * (1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - e2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    // Footpoint latitude.
    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let c1 = ep2 * cos_phi1 * cos_phi1;
    let t1 = tan_phi1 * tan_phi1;
    let den = 1.0 - e2 * sin_phi1 * sin_phi1;
    let n1 = SEMI_MAJOR_AXIS / den.sqrt();
    let r1 = SEMI_MAJOR_AXIS * (1.0 - e2) / (den * den.sqrt());
    let d = (easting - FALSE_EASTING) / (n1 * SCALE_FACTOR);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let phi = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lam = lam0
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d5
                / 120.0)
            / cos_phi1;

    (phi.to_degrees(), lam.to_degrees())
}
