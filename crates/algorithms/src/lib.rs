//! # lcmap algorithms
//!
//! The processing steps of the land-cover workflow.
//!
//! ## Modules
//!
//! - **preprocess**: QA masking and reflectance rescaling
//! - **composite**: date filter, per-pixel median, AOI clipping
//! - **sampling**: band vectors at labeled points, random split
//! - **classification**: Random Forest training and per-pixel classification
//! - **accuracy**: confusion matrix, accuracy, kappa, per-class metrics
//! - **vectorize**: classified raster → polygon features

pub mod accuracy;
pub mod classification;
pub mod composite;
pub(crate) mod maybe_rayon;
pub mod preprocess;
pub mod sampling;
pub mod vectorize;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::accuracy::{classify_samples, AccuracyReport, ConfusionMatrix};
    pub use crate::classification::{classify, RandomForest, RandomForestParams};
    pub use crate::composite::{
        build_composite, calendar_year, clip_raster, clip_scene, filter_date, median_composite,
        DateRange,
    };
    pub use crate::preprocess::{mask_scene, mask_scene_with, MaskParams};
    pub use crate::sampling::{add_random_column, sample_regions, split, Sample, SampleSet};
    pub use crate::vectorize::{filter_label, raster_to_polygons, VectorizeParams};
    pub use lcmap_core::prelude::*;
}
