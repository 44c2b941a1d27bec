//! Accuracy assessment
//!
//! Error (confusion) matrix of reference vs predicted labels, with overall
//! accuracy, Cohen's kappa, per-class consumer's / producer's accuracy
//! and F1 score.

mod confusion;

pub use confusion::{classify_samples, AccuracyReport, ClassAccuracy, ConfusionMatrix};
