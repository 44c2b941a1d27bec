//! Pure-Rust WGS84 ⇄ UTM reprojection (Snyder 1987, USGS formulas).
//!
//! Covers EPSG 326xx (UTM North) and 327xx (UTM South), the systems
//! Landsat Collection 2 is distributed in. AOIs and training points arrive
//! in WGS84 and are projected onto the imagery grid; exported polygons go
//! back to WGS84.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use geo::{Coord, MapCoords};
use ndarray::Array2;

// ── WGS84 ellipsoid constants ────────────────────────────────────────────

const A: f64 = 6_378_137.0; // semi-major axis (m)
const F: f64 = 1.0 / 298.257_223_563; // flattening
const E2: f64 = 2.0 * F - F * F; // eccentricity squared
const E_PRIME2: f64 = E2 / (1.0 - E2); // second eccentricity squared
const K0: f64 = 0.9996; // UTM scale factor
const FALSE_EASTING: f64 = 500_000.0;
const FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// One supported coordinate system.
#[derive(Debug, Clone, Copy, PartialEq)]
enum System {
    Geographic,
    Utm { zone: u32, north: bool },
}

impl System {
    fn of(crs: &CRS) -> Result<Self> {
        if crs.is_wgs84() {
            return Ok(System::Geographic);
        }
        crs.utm_zone()
            .map(|(zone, north)| System::Utm { zone, north })
            .ok_or_else(|| Error::UnsupportedCrs(crs.identifier()))
    }
}

/// A resolved transformation between two supported CRSs.
#[derive(Debug, Clone, Copy)]
pub struct Transformer {
    from: System,
    to: System,
}

impl Transformer {
    /// Build a transformer; fails for anything other than WGS84 / UTM.
    pub fn new(from: &CRS, to: &CRS) -> Result<Self> {
        Ok(Self {
            from: System::of(from)?,
            to: System::of(to)?,
        })
    }

    /// Whether the transformation is a no-op
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Transform one `(x, y)` pair.
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        if self.is_identity() {
            return (x, y);
        }
        let (lon, lat) = match self.from {
            System::Geographic => (x, y),
            System::Utm { zone, north } => utm_to_wgs84(x, y, zone, north),
        };
        match self.to {
            System::Geographic => (lon, lat),
            System::Utm { zone, north } => wgs84_to_utm(lon, lat, zone, north),
        }
    }

    /// Transform every coordinate of a geometry.
    pub fn transform_geometry<G>(&self, geom: &G) -> G::Output
    where
        G: MapCoords<f64, f64>,
    {
        geom.map_coords(|c: Coord<f64>| {
            let (x, y) = self.transform(c.x, c.y);
            Coord { x, y }
        })
    }
}

/// Convert WGS84 (longitude, latitude) in degrees to UTM (easting, northing)
/// in metres for the given zone and hemisphere.
pub fn wgs84_to_utm(lon_deg: f64, lat_deg: f64, zone: u32, north: bool) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let lon0 = central_meridian(zone).to_radians();

    let sin_lat = lat.sin();
    let cos_lat = lat.cos();
    let tan_lat = lat.tan();

    let n = A / (1.0 - E2 * sin_lat * sin_lat).sqrt();
    let t = tan_lat * tan_lat;
    let c = E_PRIME2 * cos_lat * cos_lat;
    let a_coeff = cos_lat * (lon - lon0);

    let m = meridional_arc(lat);

    let a2 = a_coeff * a_coeff;
    let a4 = a2 * a2;
    let a6 = a4 * a2;

    // Snyder eq. 8-9
    let easting = K0
        * n
        * (a_coeff
            + (1.0 - t + c) * a2 * a_coeff / 6.0
            + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * E_PRIME2) * a4 * a_coeff / 120.0)
        + FALSE_EASTING;

    // Snyder eq. 8-10
    let northing = K0
        * (m + n
            * tan_lat
            * (a2 / 2.0
                + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * E_PRIME2) * a6 / 720.0));

    let northing = if north {
        northing
    } else {
        northing + FALSE_NORTHING_SOUTH
    };

    (easting, northing)
}

/// Convert UTM (easting, northing) in metres to WGS84 (longitude, latitude)
/// in degrees. Snyder eqs. 8-12 to 8-25 (footpoint latitude series).
pub fn utm_to_wgs84(easting: f64, northing: f64, zone: u32, north: bool) -> (f64, f64) {
    let x = easting - FALSE_EASTING;
    let y = if north {
        northing
    } else {
        northing - FALSE_NORTHING_SOUTH
    };

    let e4 = E2 * E2;
    let e6 = e4 * E2;
    let m = y / K0;
    let mu = m / (A * (1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0));

    let sqrt_1_e2 = (1.0 - E2).sqrt();
    let e1 = (1.0 - sqrt_1_e2) / (1.0 + sqrt_1_e2);
    let e1_2 = e1 * e1;
    let e1_3 = e1_2 * e1;
    let e1_4 = e1_3 * e1;

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1_3 / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1_2 / 16.0 - 55.0 * e1_4 / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1_3 / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1_4 / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let denom = 1.0 - E2 * sin_phi1 * sin_phi1;
    let n1 = A / denom.sqrt();
    let t1 = tan_phi1 * tan_phi1;
    let c1 = E_PRIME2 * cos_phi1 * cos_phi1;
    let r1 = A * (1.0 - E2) / denom.powf(1.5);
    let d = x / (n1 * K0);

    let d2 = d * d;
    let d3 = d2 * d;
    let d4 = d3 * d;
    let d5 = d4 * d;
    let d6 = d5 * d;

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d2 / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * E_PRIME2) * d4 / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1
                    - 252.0 * E_PRIME2
                    - 3.0 * c1 * c1)
                    * d6
                    / 720.0);

    let lon = central_meridian(zone).to_radians()
        + (d - (1.0 + 2.0 * t1 + c1) * d3 / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * E_PRIME2 + 24.0 * t1 * t1)
                * d5
                / 120.0)
            / cos_phi1;

    (lon.to_degrees(), lat.to_degrees())
}

/// Nearest-neighbour warp of `src` onto a target grid in `target_crs`.
///
/// Each target cell centre is projected into the source CRS and takes the
/// source cell beneath it. Cells off the source, or on source no-data, get
/// `fill`. A source without a CRS is assumed to already be in `target_crs`.
pub fn warp_nearest<T: RasterElement>(
    src: &Raster<T>,
    target_crs: &CRS,
    transform: GeoTransform,
    rows: usize,
    cols: usize,
    fill: T,
) -> Result<Raster<T>> {
    let same = src.crs().map_or(true, |c| c.is_equivalent(target_crs));
    if same {
        let mut out = src.resample_nearest(transform, rows, cols, fill);
        out.set_crs(Some(target_crs.clone()));
        return Ok(out);
    }

    let source_crs = src.crs().cloned().unwrap_or_else(|| target_crs.clone());
    let to_source = Transformer::new(target_crs, &source_crs)?;
    let (src_rows, src_cols) = src.shape();
    let src_transform = *src.transform();
    let data = src.data();

    let warped = Array2::from_shape_fn((rows, cols), |(row, col)| {
        let (x, y) = transform.pixel_to_geo(col, row);
        let (sx, sy) = to_source.transform(x, y);
        match src_transform.cell_at(sx, sy, src_rows, src_cols) {
            Some((r, c)) => {
                let v = data[(r, c)];
                if src.is_nodata(v) {
                    fill
                } else {
                    v
                }
            }
            None => fill,
        }
    });

    let mut out = Raster::from_array(warped);
    out.set_transform(transform);
    out.set_crs(Some(target_crs.clone()));
    out.set_nodata(src.nodata().map(|_| fill));
    Ok(out)
}

/// UTM zone whose central meridian is nearest to `lon_deg`.
pub fn utm_zone_for(lon_deg: f64, lat_deg: f64) -> CRS {
    let zone = (((lon_deg + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u32 + 1;
    CRS::utm(zone, lat_deg >= 0.0)
}

fn central_meridian(zone: u32) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Meridional arc from equator to latitude `lat` (radians).
/// Snyder eq. 3-21.
fn meridional_arc(lat: f64) -> f64 {
    let e4 = E2 * E2;
    let e6 = e4 * E2;

    A * ((1.0 - E2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * lat
        - (3.0 * E2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * lat).sin()
        + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * lat).sin()
        - (35.0 * e6 / 3072.0) * (6.0 * lat).sin())
}
