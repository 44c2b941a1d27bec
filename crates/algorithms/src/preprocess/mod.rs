//! Scene preprocessing
//!
//! - QA masking: cloud, cirrus, shadow, fill and saturated pixels → NaN
//! - Rescaling of Collection 2 Level-2 integers to reflectance / Kelvin

mod mask;

pub use mask::{
    clear_mask, mask_scene, mask_scene_with, MaskParams, OPTICAL_OFFSET, OPTICAL_SCALE,
    QA_MASK_BITS, THERMAL_OFFSET, THERMAL_SCALE,
};
