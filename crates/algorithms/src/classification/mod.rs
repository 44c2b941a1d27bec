//! Supervised classification
//!
//! - **Random Forest**: bagged CART trees with Gini splits, majority vote
//! - **classify**: apply a trained forest to every pixel of a composite

mod classify;
mod random_forest;
mod tree;

pub use classify::classify;
pub use random_forest::{RandomForest, RandomForestParams};

pub(crate) use random_forest::column_indices;
