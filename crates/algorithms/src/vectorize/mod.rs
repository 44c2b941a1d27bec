//! Raster to vector conversion
//!
//! Connected regions of equal class become polygon features traced along
//! pixel edges.

mod polygonize;

pub use polygonize::{filter_label, raster_to_polygons, VectorizeParams};
