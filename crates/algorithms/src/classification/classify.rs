//! Per-pixel Random Forest classification of a composite.

use super::RandomForest;
use crate::composite::clip_raster;
use crate::maybe_rayon::*;
use geo::MultiPolygon;
use lcmap_core::raster::Raster;
use lcmap_core::{Error, Result, Scene};
use ndarray::Array2;
use tracing::info;

/// Classify every pixel of `composite` with `forest`.
///
/// The forest's feature bands are looked up by name. Pixels with any NaN
/// band stay NaN. When `aoi` is given (in the composite CRS) the result is
/// clipped to it; it need not be the AOI the composite was built on.
pub fn classify(
    composite: &Scene,
    forest: &RandomForest,
    aoi: Option<&MultiPolygon<f64>>,
) -> Result<Raster<f64>> {
    let layers = forest
        .feature_names()
        .iter()
        .map(|name| composite.band(name))
        .collect::<Result<Vec<_>>>()?;
    let template = *layers
        .first()
        .ok_or_else(|| Error::Algorithm("forest has no features".into()))?;
    let (rows, cols) = template.shape();
    let n_classes = forest.classes().len();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut pixel = vec![0.0; layers.len()];
            let mut votes = vec![0usize; n_classes];
            let mut row_data = vec![f64::NAN; cols];
            'pixels: for (col, out) in row_data.iter_mut().enumerate() {
                for (v, layer) in pixel.iter_mut().zip(&layers) {
                    *v = unsafe { layer.get_unchecked(row, col) };
                    if !v.is_finite() {
                        continue 'pixels;
                    }
                }
                *out = forest.vote(&pixel, &mut votes) as f64;
            }
            row_data
        })
        .collect();

    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    let output = match aoi {
        Some(aoi) => clip_raster(&output, aoi)?,
        None => output,
    };
    info!(
        classified = output.statistics().valid_count,
        rows,
        cols,
        "classification done"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::RandomForestParams;
    use crate::sampling::{Sample, SampleSet};
    use geo::{polygon, Coord};
    use lcmap_core::{AcquisitionDate, GeoTransform};

    fn forest() -> RandomForest {
        let samples = (0..40)
            .map(|i| Sample {
                values: vec![if i % 2 == 0 { 0.1 } else { 0.5 } + (i as f64) * 1e-3],
                label: (i % 2) as i64,
                random: None,
                point: Coord { x: 0.0, y: 0.0 },
            })
            .collect();
        let set = SampleSet {
            feature_names: vec!["SR_B5".into()],
            samples,
        };
        RandomForest::train(&set, &["SR_B5"], RandomForestParams::default()).unwrap()
    }

    fn composite() -> Scene {
        let mut r = Raster::from_vec(vec![0.1, 0.5, f64::NAN, 0.12, 0.48, 0.5], 2, 3).unwrap();
        r.set_transform(GeoTransform::new(0.0, 60.0, 30.0, -30.0));
        Scene::new("median", AcquisitionDate::new(2022, 1, 1).unwrap())
            .with_band("SR_B5", r)
            .unwrap()
    }

    #[test]
    fn classifies_pixels() {
        let out = classify(&composite(), &forest(), None).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert_eq!(out.get(0, 1).unwrap(), 1.0);
        assert!(out.get(0, 2).unwrap().is_nan());
        assert_eq!(out.get(1, 0).unwrap(), 0.0);
        assert_eq!(out.get(1, 1).unwrap(), 1.0);
        assert_eq!(out.transform(), composite().transform().unwrap());
    }

    #[test]
    fn clips_to_classification_aoi() {
        let aoi = MultiPolygon(vec![polygon![
            (x: 0.0, y: 30.0), (x: 90.0, y: 30.0), (x: 90.0, y: 60.0), (x: 0.0, y: 60.0),
        ]]);
        let out = classify(&composite(), &forest(), Some(&aoi)).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 0.0);
        assert!(out.get(1, 0).unwrap().is_nan());
        assert!(out.get(1, 1).unwrap().is_nan());
    }

    #[test]
    fn missing_band_is_an_error() {
        let c = Scene::new("empty", AcquisitionDate::new(2022, 1, 1).unwrap());
        assert!(classify(&c, &forest(), None).is_err());
    }
}
