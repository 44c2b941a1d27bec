//! Per-pixel median across co-registered scenes.

use ndarray::Array2;
use crate::maybe_rayon::*;
use lcmap_core::raster::Raster;
use lcmap_core::scene::{Scene, SceneUnits};
use lcmap_core::{Error, Result};

/// Median composite of scenes that share one grid.
///
/// For each band of the first scene and each pixel, takes the median of
/// the finite values across all scenes (mean of the two middle values for
/// an even count). Pixels with no finite value are NaN. QA bands are not
/// carried into the composite.
pub fn median_composite(scenes: &[Scene]) -> Result<Scene> {
    let first = scenes
        .first()
        .ok_or_else(|| Error::Empty("median of an empty collection".into()))?;
    let (rows, cols) = first
        .shape()
        .ok_or_else(|| Error::Empty(format!("scene '{}' has no bands", first.id())))?;
    let transform = first.transform().copied().unwrap_or_default();

    for scene in &scenes[1..] {
        let shape = scene.shape().unwrap_or((0, 0));
        if shape != (rows, cols) {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: shape.0,
                ac: shape.1,
            });
        }
        if !scene.transform().is_some_and(|t| t.same_grid(&transform)) {
            return Err(Error::Algorithm(format!(
                "scene '{}' is not on the grid of '{}'; resample first",
                scene.id(),
                first.id()
            )));
        }
    }

    let date = scenes.iter().map(|s| s.date()).min().unwrap_or(first.date());
    let mut composite = Scene::new("median", date);
    let all_reflectance = scenes.iter().all(|s| s.units() == SceneUnits::Reflectance);
    composite.set_units(if all_reflectance {
        SceneUnits::Reflectance
    } else {
        SceneUnits::DigitalNumber
    });

    for band in first.bands() {
        let layers = scenes
            .iter()
            .map(|s| s.band(&band.name))
            .collect::<Result<Vec<_>>>()?;
        composite.add_band(band.name.clone(), median_of(&layers, &band.data)?)?;
    }

    Ok(composite)
}

fn median_of(layers: &[&Raster<f64>], template: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = template.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut values = Vec::with_capacity(layers.len());
            let mut row_data = vec![f64::NAN; cols];
            for (col, out) in row_data.iter_mut().enumerate() {
                values.clear();
                values.extend(
                    layers
                        .iter()
                        .map(|l| unsafe { l.get_unchecked(row, col) })
                        .filter(|v| v.is_finite()),
                );
                *out = median(&mut values);
            }
            row_data
        })
        .collect();

    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}

/// Median of finite values; NaN when empty. Reorders `values`.
pub(crate) fn median(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lcmap_core::{AcquisitionDate, GeoTransform};

    fn scene(day: u32, values: [f64; 4]) -> Scene {
        let mut r = Raster::from_vec(values.to_vec(), 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        let mut s = Scene::new(format!("s{day}"), AcquisitionDate::new(2022, 1, day).unwrap())
            .with_band("SR_B4", r)
            .unwrap();
        s.set_units(SceneUnits::Reflectance);
        s
    }

    #[test]
    fn median_values() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn composite_ignores_masked_pixels() {
        let nan = f64::NAN;
        let scenes = vec![
            scene(1, [0.1, nan, nan, 0.4]),
            scene(2, [0.3, 0.2, nan, 0.8]),
            scene(3, [0.2, 0.6, nan, nan]),
        ];
        let c = median_composite(&scenes).unwrap();
        let b = c.band("SR_B4").unwrap();
        assert_eq!(b.get(0, 0).unwrap(), 0.2);
        assert!((b.get(0, 1).unwrap() - 0.4).abs() < 1e-12);
        assert!(b.get(1, 0).unwrap().is_nan());
        assert!((b.get(1, 1).unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(c.date(), AcquisitionDate::new(2022, 1, 1).unwrap());
        assert_eq!(c.units(), SceneUnits::Reflectance);
    }

    #[test]
    fn grid_mismatch_is_rejected() {
        let a = scene(1, [0.1; 4]);
        let mut r = Raster::from_vec(vec![0.1; 4], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(30.0, 60.0, 30.0, -30.0));
        let b = Scene::new("shifted", AcquisitionDate::new(2022, 1, 2).unwrap())
            .with_band("SR_B4", r)
            .unwrap();
        assert!(median_composite(&[a, b]).is_err());
        assert!(median_composite(&[]).is_err());
    }

    #[test]
    fn missing_band_is_rejected() {
        let a = scene(1, [0.1; 4]);
        let mut r = Raster::from_vec(vec![0.1; 4], 2, 2).unwrap();
        r.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        let b = Scene::new("other", AcquisitionDate::new(2022, 1, 2).unwrap())
            .with_band("SR_B5", r)
            .unwrap();
        assert!(matches!(median_composite(&[a, b]), Err(Error::MissingBand { .. })));
    }
}
