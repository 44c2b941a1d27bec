//! # lcmap core
//!
//! Core types and I/O for the lcmap land-cover workflow.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced raster grid
//! - `GeoTransform`: affine pixel ⇄ map transformation
//! - `CRS` and WGS84 ⇄ UTM projection
//! - `Scene`: one multi-band Landsat acquisition with its QA bitmasks
//! - `Feature` / `FeatureCollection`: vector features with attributes
//! - I/O: GeoTIFF rasters, GeoJSON features, ESRI shapefiles

pub mod crs;
pub mod error;
pub mod io;
pub mod projection;
pub mod raster;
pub mod scene;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use scene::{AcquisitionDate, Collection, Scene, SceneUnits};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::scene::{AcquisitionDate, Collection, Scene, SceneUnits};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
}
