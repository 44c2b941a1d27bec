//! QA bitmask masking and radiometric rescaling of Landsat scenes.
//!
//! `QA_PIXEL` bit layout (Collection 2):
//! - bit 0: fill
//! - bit 1: dilated cloud
//! - bit 2: cirrus
//! - bit 3: cloud
//! - bit 4: cloud shadow
//!
//! `QA_RADSAT` carries one saturation bit per band; any set bit masks
//! the pixel.

use ndarray::Array2;
use crate::maybe_rayon::*;
use lcmap_core::raster::Raster;
use lcmap_core::scene::{is_optical, is_thermal, Scene, SceneUnits, QA_PIXEL, QA_RADSAT};
use lcmap_core::{Error, Result};
use tracing::debug;

/// `QA_PIXEL` bits 0–4
pub const QA_MASK_BITS: u16 = 0b11111;

/// Surface reflectance: `dn * scale + offset`
pub const OPTICAL_SCALE: f64 = 0.0000275;
pub const OPTICAL_OFFSET: f64 = -0.2;

/// Surface temperature in Kelvin: `dn * scale + offset`
pub const THERMAL_SCALE: f64 = 0.00341802;
pub const THERMAL_OFFSET: f64 = 149.0;

/// Parameters for scene masking
#[derive(Debug, Clone)]
pub struct MaskParams {
    /// `QA_PIXEL` bits that mark a pixel unusable
    pub qa_bits: u16,
    /// Mask pixels with any saturated band (`QA_RADSAT != 0`)
    pub mask_saturated: bool,
    /// Convert digital numbers to reflectance / Kelvin
    pub rescale: bool,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            qa_bits: QA_MASK_BITS,
            mask_saturated: true,
            rescale: true,
        }
    }
}

/// Mask clouds, shadows, fill and saturation, then rescale to reflectance.
///
/// Uses the default [`MaskParams`]. See [`mask_scene_with`].
pub fn mask_scene(scene: &Scene) -> Result<Scene> {
    mask_scene_with(scene, &MaskParams::default())
}

/// Mask a scene using its QA bands.
///
/// Masked pixels become NaN in every float band. Bands are rescaled only
/// while the scene is still in [`SceneUnits::DigitalNumber`], so applying
/// the mask twice gives the same result as applying it once.
pub fn mask_scene_with(scene: &Scene, params: &MaskParams) -> Result<Scene> {
    let clear = clear_mask(scene, params)?;
    let rescale = params.rescale && scene.units() == SceneUnits::DigitalNumber;

    let mut out = scene.clone();
    for band in out.bands_mut() {
        let scaling = if !rescale {
            None
        } else if is_optical(&band.name) {
            Some((OPTICAL_SCALE, OPTICAL_OFFSET))
        } else if is_thermal(&band.name) {
            Some((THERMAL_SCALE, THERMAL_OFFSET))
        } else {
            None
        };
        band.data = apply_mask(&band.data, &clear, scaling)?;
    }
    if rescale {
        out.set_units(SceneUnits::Reflectance);
    }

    let masked = clear.data().iter().filter(|&&c| c == 0).count();
    debug!(
        scene = scene.id(),
        masked,
        total = clear.len(),
        "QA mask applied"
    );
    Ok(out)
}

/// Per-pixel usability mask: 1 = clear, 0 = masked.
pub fn clear_mask(scene: &Scene, params: &MaskParams) -> Result<Raster<u8>> {
    let missing = |band: &str| Error::MissingBand {
        scene: scene.id().to_string(),
        band: band.to_string(),
    };
    let qa = scene.qa_pixel().ok_or_else(|| missing(QA_PIXEL))?;
    let radsat = if params.mask_saturated {
        Some(scene.qa_radsat().ok_or_else(|| missing(QA_RADSAT))?)
    } else {
        None
    };

    let (rows, cols) = qa.shape();
    let bits = params.qa_bits;

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                let q = unsafe { qa.get_unchecked(row, col) };
                let saturated = radsat
                    .map(|r| unsafe { r.get_unchecked(row, col) } != 0)
                    .unwrap_or(false);
                if q & bits == 0 && !saturated {
                    *out = 1;
                }
            }
            row_data
        })
        .collect();

    let mut output = qa.with_same_meta::<u8>(rows, cols);
    output.set_nodata(None);
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

fn apply_mask(
    band: &Raster<f64>,
    clear: &Raster<u8>,
    scaling: Option<(f64, f64)>,
) -> Result<Raster<f64>> {
    let (rows, cols) = band.shape();
    if clear.shape() != (rows, cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: clear.rows(),
            ac: clear.cols(),
        });
    }

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                if unsafe { clear.get_unchecked(row, col) } == 0 {
                    continue;
                }
                let v = unsafe { band.get_unchecked(row, col) };
                if band.is_nodata(v) {
                    continue;
                }
                *out = match scaling {
                    Some((scale, offset)) => v * scale + offset,
                    None => v,
                };
            }
            row_data
        })
        .collect();

    let mut output = band.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use lcmap_core::{AcquisitionDate, GeoTransform};

    fn raster<T: lcmap_core::RasterElement>(values: &[T]) -> Raster<T> {
        let mut r = Raster::from_vec(values.to_vec(), 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        r
    }

    /// 2x2 scene: (0,0) clear, (0,1) cloud, (1,0) shadow, (1,1) saturated
    fn scene() -> Scene {
        let date = AcquisitionDate::new(2022, 6, 1).unwrap();
        let mut s = Scene::new("LC09_TEST", date)
            .with_band("SR_B4", raster(&[10000.0, 20000.0, 30000.0, 40000.0]))
            .unwrap()
            .with_band("ST_B10", raster(&[44000.0, 44000.0, 44000.0, 44000.0]))
            .unwrap();
        s.set_qa_pixel(raster(&[21824u16, 22280, 23888, 21824])).unwrap();
        s.set_qa_radsat(raster(&[0u16, 0, 0, 0b100])).unwrap();
        s
    }

    #[test]
    fn masks_cloud_shadow_and_saturation() {
        let masked = mask_scene(&scene()).unwrap();
        let red = masked.band("SR_B4").unwrap();
        assert_relative_eq!(red.get(0, 0).unwrap(), 10000.0 * 0.0000275 - 0.2, epsilon = 1e-12);
        assert!(red.get(0, 1).unwrap().is_nan());
        assert!(red.get(1, 0).unwrap().is_nan());
        assert!(red.get(1, 1).unwrap().is_nan());

        let thermal = masked.band("ST_B10").unwrap();
        assert_relative_eq!(thermal.get(0, 0).unwrap(), 44000.0 * 0.00341802 + 149.0, epsilon = 1e-9);
        assert_eq!(masked.units(), SceneUnits::Reflectance);
    }

    #[test]
    fn masking_is_idempotent() {
        let once = mask_scene(&scene()).unwrap();
        let twice = mask_scene(&once).unwrap();
        for (a, b) in once.bands().iter().zip(twice.bands()) {
            for (x, y) in a.data.data().iter().zip(b.data.data().iter()) {
                assert!((x.is_nan() && y.is_nan()) || x == y);
            }
        }
        assert_eq!(twice.units(), SceneUnits::Reflectance);
    }

    #[test]
    fn fill_bit_masks() {
        let mut s = scene();
        s.set_qa_pixel(raster(&[1u16, 21824, 21824, 21824])).unwrap();
        s.set_qa_radsat(raster(&[0u16; 4])).unwrap();
        let clear = clear_mask(&s, &MaskParams::default()).unwrap();
        assert_eq!(clear.data().iter().copied().collect::<Vec<_>>(), vec![0, 1, 1, 1]);
    }

    #[test]
    fn saturation_can_be_ignored() {
        let params = MaskParams {
            mask_saturated: false,
            ..Default::default()
        };
        let masked = mask_scene_with(&scene(), &params).unwrap();
        assert!(masked.band("SR_B4").unwrap().get(1, 1).unwrap().is_finite());
    }

    #[test]
    fn missing_qa_is_an_error() {
        let date = AcquisitionDate::new(2022, 6, 1).unwrap();
        let s = Scene::new("x", date).with_band("SR_B4", raster(&[1.0; 4])).unwrap();
        assert!(matches!(mask_scene(&s), Err(Error::MissingBand { .. })));
    }
}
