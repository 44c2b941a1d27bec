//! Sampling a composite at labeled points.

use geo::{Coord, Geometry};
use lcmap_core::{Error, FeatureCollection, Result, Scene};
use std::collections::BTreeMap;
use tracing::debug;

/// One labeled band vector
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Band values, in the order of [`SampleSet::feature_names`]
    pub values: Vec<f64>,
    /// Integer class label
    pub label: i64,
    /// Uniform [0, 1) number, set by [`add_random_column`](super::add_random_column)
    pub random: Option<f64>,
    /// Sampled location, in the composite CRS
    pub point: Coord<f64>,
}

/// Samples sharing one band layout
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub feature_names: Vec<String>,
    pub samples: Vec<Sample>,
}

impl SampleSet {
    pub fn new(feature_names: Vec<String>) -> Self {
        Self {
            feature_names,
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn labels(&self) -> Vec<i64> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Number of samples per class label
    pub fn class_counts(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.samples {
            *counts.entry(s.label).or_insert(0) += 1;
        }
        counts
    }
}

/// Extract the band vector of `composite` at every point of `points`.
///
/// `points` must be in the composite CRS and carry an integer
/// `label_property`. Values are averaged over the pixels whose centres
/// fall in the `scale x scale` square around the point (the pixel under
/// the point when `scale` is below the cell size). Pixels with any NaN
/// band are skipped; points outside the raster or without a valid pixel
/// are dropped.
pub fn sample_regions(
    composite: &Scene,
    points: &FeatureCollection,
    label_property: &str,
    scale: f64,
) -> Result<SampleSet> {
    if !(scale > 0.0) {
        return Err(Error::InvalidParameter {
            name: "scale",
            value: scale.to_string(),
            reason: "must be positive".into(),
        });
    }
    let (rows, cols) = composite
        .shape()
        .ok_or_else(|| Error::Empty(format!("composite '{}' has no bands", composite.id())))?;
    let transform = composite.transform().copied().unwrap_or_default();
    let cell = transform.cell_size();

    let mut set = SampleSet::new(composite.band_names().iter().map(|n| n.to_string()).collect());
    let mut dropped = 0usize;
    let mut pixel = Vec::with_capacity(set.feature_names.len());
    let mut sum = vec![0.0; set.feature_names.len()];

    for (i, feature) in points.iter().enumerate() {
        let coords: Vec<Coord<f64>> = match &feature.geometry {
            Some(Geometry::Point(p)) => vec![p.0],
            Some(Geometry::MultiPoint(mp)) => mp.0.iter().map(|p| p.0).collect(),
            _ => continue,
        };
        let label = feature.label(label_property).ok_or_else(|| Error::InvalidParameter {
            name: "label_property",
            value: label_property.to_string(),
            reason: format!("feature #{i} has no integer '{label_property}'"),
        })?;

        for c in coords {
            let Some((row, col)) = transform.cell_at(c.x, c.y, rows, cols) else {
                dropped += 1;
                continue;
            };

            // pixel window whose centres lie in the footprint; edges resolve
            // with the same floor rule as `cell_at`
            let half = scale / cell / 2.0;
            let (pc, pr) = transform.geo_to_pixel(c.x, c.y);
            let window = |p: f64, n: usize, fallback: usize| {
                let a = ((p - half - 0.5).floor() + 1.0).max(0.0) as usize;
                let b = (((p + half - 0.5).floor() + 1.0).max(0.0) as usize).min(n);
                if a < b && scale >= cell {
                    (a, b)
                } else {
                    (fallback, fallback + 1)
                }
            };
            let (ra, rb) = window(pr, rows, row);
            let (ca, cb) = window(pc, cols, col);

            sum.iter_mut().for_each(|s| *s = 0.0);
            let mut n = 0usize;
            for r in ra..rb {
                for cc in ca..cb {
                    if composite.pixel_values(r, cc, &mut pixel) {
                        sum.iter_mut().zip(&pixel).for_each(|(s, v)| *s += v);
                        n += 1;
                    }
                }
            }
            if n == 0 {
                dropped += 1;
                continue;
            }

            set.samples.push(Sample {
                values: sum.iter().map(|s| s / n as f64).collect(),
                label,
                random: None,
                point: c,
            });
        }
    }

    debug!(kept = set.len(), dropped, scale, "sampled regions");
    Ok(set)
}
