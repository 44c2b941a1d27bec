//! I/O for rasters (GeoTIFF), features (GeoJSON) and exports (shapefile)

pub mod geojson;
mod native;
pub mod shapefile;

pub use native::{
    read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer,
    GeoTiffOptions,
};
