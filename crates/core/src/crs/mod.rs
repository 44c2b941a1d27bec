//! Coordinate Reference System handling
//!
//! Landsat Collection 2 scenes come in WGS84 / UTM (EPSG 326xx north,
//! 327xx south); vector inputs are GeoJSON in WGS84 (EPSG 4326). Those are
//! the only systems lcmap projects between.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// EPSG code if known
    epsg: Option<u32>,
    /// WKT representation, when read from a file
    wkt: Option<String>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            epsg: Some(code),
            wkt: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            epsg: None,
            wkt: Some(wkt.into()),
        }
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// WGS84 / UTM zone CRS
    pub fn utm(zone: u32, north: bool) -> Self {
        Self::from_epsg(if north { 32600 + zone } else { 32700 + zone })
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Whether this is geographic WGS84
    pub fn is_wgs84(&self) -> bool {
        self.epsg == Some(4326)
    }

    /// UTM zone info: `Some((zone, is_north))`.
    ///
    /// - EPSG 326xx → zone xx, North hemisphere
    /// - EPSG 327xx → zone xx, South hemisphere
    pub fn utm_zone(&self) -> Option<(u32, bool)> {
        match self.epsg? {
            code @ 32601..=32660 => Some((code - 32600, true)),
            code @ 32701..=32760 => Some((code - 32700, false)),
            _ => None,
        }
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }
        false
    }

    /// ESRI-flavoured WKT, as expected in a shapefile `.prj` sidecar.
    ///
    /// Only available for WGS84 and WGS84 / UTM; other systems fall back
    /// to their stored WKT, if any.
    pub fn esri_wkt(&self) -> Option<String> {
        const GEOGCS: &str = "GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\",\
            SPHEROID[\"WGS_1984\",6378137.0,298.257223563]],\
            PRIMEM[\"Greenwich\",0.0],UNIT[\"Degree\",0.0174532925199433]]";

        if self.is_wgs84() {
            return Some(GEOGCS.to_string());
        }
        if let Some((zone, north)) = self.utm_zone() {
            let central_meridian = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
            return Some(format!(
                "PROJCS[\"WGS_1984_UTM_Zone_{zone}{hemi}\",{GEOGCS},\
                 PROJECTION[\"Transverse_Mercator\"],\
                 PARAMETER[\"False_Easting\",500000.0],\
                 PARAMETER[\"False_Northing\",{fnorth:.1}],\
                 PARAMETER[\"Central_Meridian\",{central_meridian:.1}],\
                 PARAMETER[\"Scale_Factor\",0.9996],\
                 PARAMETER[\"Latitude_Of_Origin\",0.0],\
                 UNIT[\"Meter\",1.0]]",
                hemi = if north { "N" } else { "S" },
                fnorth = if north { 0.0 } else { 10_000_000.0 },
            ));
        }
        self.wkt.clone()
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            return format!("WKT:{}", &wkt[..wkt.len().min(50)]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
        assert!(crs.is_equivalent(&CRS::wgs84()));
    }

    #[test]
    fn utm_zone_parsing() {
        assert_eq!(CRS::from_epsg(32630).utm_zone(), Some((30, true)));
        assert_eq!(CRS::from_epsg(32721).utm_zone(), Some((21, false)));
        assert_eq!(CRS::from_epsg(32600).utm_zone(), None);
        assert_eq!(CRS::from_epsg(32661).utm_zone(), None);
        assert_eq!(CRS::wgs84().utm_zone(), None);
        assert_eq!(CRS::utm(48, true).epsg(), Some(32648));
    }

    #[test]
    fn esri_wkt_for_prj() {
        let wkt = CRS::wgs84().esri_wkt().unwrap();
        assert!(wkt.starts_with("GEOGCS[\"GCS_WGS_1984\""));

        let utm = CRS::utm(48, true).esri_wkt().unwrap();
        assert!(utm.starts_with("PROJCS[\"WGS_1984_UTM_Zone_48N\""));
        assert!(utm.contains("PARAMETER[\"Central_Meridian\",105.0]"));

        assert!(CRS::from_epsg(3857).esri_wkt().is_none());
    }
}
