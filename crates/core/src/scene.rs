//! Landsat scenes: one acquisition, several co-registered bands.
//!
//! Band names follow the USGS Collection 2 Level-2 product naming
//! (`SR_B1`..`SR_B7` surface reflectance, `ST_B10` surface temperature,
//! `QA_PIXEL` / `QA_RADSAT` bitmasks).

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Surface reflectance bands of the OLI-2 sensor
pub const OPTICAL_BANDS: [&str; 7] = ["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"];
/// Surface temperature band of the TIRS-2 sensor
pub const THERMAL_BANDS: [&str; 1] = ["ST_B10"];
/// Pixel quality bitmask band
pub const QA_PIXEL: &str = "QA_PIXEL";
/// Radiometric saturation bitmask band
pub const QA_RADSAT: &str = "QA_RADSAT";

/// Whether a band name is a surface-reflectance band
pub fn is_optical(name: &str) -> bool {
    name.starts_with("SR_B")
}

/// Whether a band name is a surface-temperature band
pub fn is_thermal(name: &str) -> bool {
    name.starts_with("ST_B")
}

/// A calendar date (proleptic Gregorian), ordered chronologically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AcquisitionDate(NaiveDate);

impl AcquisitionDate {
    /// Create a validated date
    pub fn new(year: i32, month: u32, day: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| Error::InvalidDate(format!("{year:04}-{month:02}-{day:02}")))
    }

    /// January 1st of `year`, clamped to the representable range
    pub fn start_of_year(year: i32) -> Self {
        let date = NaiveDate::from_ymd_opt(year, 1, 1)
            .unwrap_or(if year < 0 { NaiveDate::MIN } else { NaiveDate::MAX });
        Self(date)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    /// The day before (e.g. the last day of an end-exclusive range)
    pub fn previous_day(&self) -> Self {
        self.0.pred_opt().map_or(*self, Self)
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// Parse the acquisition date out of a Landsat product id, e.g.
    /// `LC09_L2SP_125050_20220115_20220117_02_T1` → 2022-01-15.
    pub fn from_product_id(id: &str) -> Result<Self> {
        id.split('_')
            .nth(3)
            .ok_or_else(|| Error::InvalidDate(id.to_string()))?
            .parse()
    }
}

impl FromStr for AcquisitionDate {
    type Err = Error;

    /// Accepts `YYYY-MM-DD`, `YYYYMMDD`, or an RFC 3339 timestamp (the
    /// time part is ignored).
    fn from_str(s: &str) -> Result<Self> {
        let date = s.split('T').next().unwrap_or(s).trim();
        let format = if date.contains('-') { "%Y-%m-%d" } else { "%Y%m%d" };
        NaiveDate::parse_from_str(date, format)
            .map(Self)
            .map_err(|e| Error::InvalidDate(format!("{s}: {e}")))
    }
}

impl TryFrom<String> for AcquisitionDate {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<AcquisitionDate> for String {
    fn from(d: AcquisitionDate) -> Self {
        d.to_string()
    }
}

impl fmt::Display for AcquisitionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Radiometric state of a scene's float bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SceneUnits {
    /// Raw Collection 2 integers as delivered
    DigitalNumber,
    /// Scaled to surface reflectance (optical) and Kelvin (thermal)
    Reflectance,
}

/// A named float band
#[derive(Debug, Clone)]
pub struct Band {
    pub name: String,
    pub data: Raster<f64>,
}

/// One Landsat acquisition: co-registered float bands plus QA bitmasks.
#[derive(Debug, Clone)]
pub struct Scene {
    id: String,
    date: AcquisitionDate,
    bands: Vec<Band>,
    qa_pixel: Option<Raster<u16>>,
    qa_radsat: Option<Raster<u16>>,
    units: SceneUnits,
}

impl Scene {
    /// Create an empty scene in `DigitalNumber` units
    pub fn new(id: impl Into<String>, date: AcquisitionDate) -> Self {
        Self {
            id: id.into(),
            date,
            bands: Vec::new(),
            qa_pixel: None,
            qa_radsat: None,
            units: SceneUnits::DigitalNumber,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn date(&self) -> AcquisitionDate {
        self.date
    }

    pub fn units(&self) -> SceneUnits {
        self.units
    }

    pub fn set_units(&mut self, units: SceneUnits) {
        self.units = units;
    }

    /// Add (or replace) a float band. Every band must share the grid of
    /// the bands already present.
    pub fn add_band(&mut self, name: impl Into<String>, data: Raster<f64>) -> Result<()> {
        self.check_grid(data.shape())?;
        let name = name.into();
        match self.bands.iter_mut().find(|b| b.name == name) {
            Some(band) => band.data = data,
            None => self.bands.push(Band { name, data }),
        }
        Ok(())
    }

    /// Builder form of [`Scene::add_band`]
    pub fn with_band(mut self, name: impl Into<String>, data: Raster<f64>) -> Result<Self> {
        self.add_band(name, data)?;
        Ok(self)
    }

    pub fn set_qa_pixel(&mut self, qa: Raster<u16>) -> Result<()> {
        self.check_grid(qa.shape())?;
        self.qa_pixel = Some(qa);
        Ok(())
    }

    pub fn set_qa_radsat(&mut self, qa: Raster<u16>) -> Result<()> {
        self.check_grid(qa.shape())?;
        self.qa_radsat = Some(qa);
        Ok(())
    }

    pub fn qa_pixel(&self) -> Option<&Raster<u16>> {
        self.qa_pixel.as_ref()
    }

    pub fn qa_radsat(&self) -> Option<&Raster<u16>> {
        self.qa_radsat.as_ref()
    }

    /// Borrow a band by name
    pub fn band(&self, name: &str) -> Result<&Raster<f64>> {
        self.bands
            .iter()
            .find(|b| b.name == name)
            .map(|b| &b.data)
            .ok_or_else(|| self.missing(name))
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    pub fn bands_mut(&mut self) -> &mut [Band] {
        &mut self.bands
    }

    /// Band names in insertion order
    pub fn band_names(&self) -> Vec<&str> {
        self.bands.iter().map(|b| b.name.as_str()).collect()
    }

    /// Keep only the named bands, in the given order (QA bands are kept).
    pub fn select(&self, names: &[impl AsRef<str>]) -> Result<Scene> {
        let bands = names
            .iter()
            .map(|n| {
                let name = n.as_ref();
                self.band(name).map(|data| Band {
                    name: name.to_string(),
                    data: data.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Scene {
            id: self.id.clone(),
            date: self.date,
            bands,
            qa_pixel: self.qa_pixel.clone(),
            qa_radsat: self.qa_radsat.clone(),
            units: self.units,
        })
    }

    /// Grid shape (rows, cols), taken from the first band or QA band
    pub fn shape(&self) -> Option<(usize, usize)> {
        self.bands
            .first()
            .map(|b| b.data.shape())
            .or_else(|| self.qa_pixel.as_ref().map(|q| q.shape()))
    }

    /// Grid transform of the scene
    pub fn transform(&self) -> Option<&GeoTransform> {
        self.bands.first().map(|b| b.data.transform())
    }

    /// CRS of the scene
    pub fn crs(&self) -> Option<&CRS> {
        self.bands.first().and_then(|b| b.data.crs())
    }

    /// Write the band vector of one pixel into `out` (cleared first).
    ///
    /// Returns false when any band is NaN at that pixel.
    pub fn pixel_values(&self, row: usize, col: usize, out: &mut Vec<f64>) -> bool {
        out.clear();
        for band in &self.bands {
            match band.data.get(row, col) {
                Ok(v) if v.is_finite() => out.push(v),
                _ => return false,
            }
        }
        true
    }

    fn check_grid(&self, shape: (usize, usize)) -> Result<()> {
        match self.shape() {
            Some((er, ec)) if (er, ec) != shape => Err(Error::SizeMismatch {
                er,
                ec,
                ar: shape.0,
                ac: shape.1,
            }),
            _ => Ok(()),
        }
    }

    fn missing(&self, band: &str) -> Error {
        Error::MissingBand {
            scene: self.id.clone(),
            band: band.to_string(),
        }
    }
}

/// An image collection: scenes of one catalog collection.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    id: String,
    scenes: Vec<Scene>,
}

impl Collection {
    pub fn new(id: impl Into<String>, scenes: Vec<Scene>) -> Self {
        Self {
            id: id.into(),
            scenes,
        }
    }

    /// Catalog identifier, e.g. `LANDSAT/LC09/C02/T1_L2`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn push(&mut self, scene: Scene) {
        self.scenes.push(scene);
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Same collection id, scenes kept by `keep`
    pub fn filter(self, keep: impl Fn(&Scene) -> bool) -> Self {
        Self {
            id: self.id,
            scenes: self.scenes.into_iter().filter(|s| keep(s)).collect(),
        }
    }
}
