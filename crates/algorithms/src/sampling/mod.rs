//! Training data extraction
//!
//! - Regions: band vectors at labeled points (`sample_regions`)
//! - Random column + threshold split into training / validation sets

mod regions;
mod split;

pub use regions::{sample_regions, Sample, SampleSet};
pub use split::{add_random_column, split, DEFAULT_SPLIT};
