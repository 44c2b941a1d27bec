//! Cloud-free compositing
//!
//! - Date filter: scenes inside a half-open date range
//! - Median: per-pixel median of the masked scenes
//! - Clip: pixels outside the AOI → NaN

mod clip;
mod filter;
mod median;

pub use clip::{aoi_mask, clip_raster, clip_scene};
pub use filter::{calendar_year, filter_date, DateRange};
pub use median::median_composite;

use crate::preprocess::{mask_scene_with, MaskParams};
use geo::MultiPolygon;
use lcmap_core::{Collection, Error, Result, Scene};
use tracing::info;

/// Filter → mask → median → clip.
///
/// All scenes must already share one grid, and `aoi` must be in its CRS.
/// Fails when no scene falls inside `range`.
pub fn build_composite(
    collection: Collection,
    range: DateRange,
    aoi: &MultiPolygon<f64>,
    mask: &MaskParams,
) -> Result<Scene> {
    let id = collection.id().to_string();
    let total = collection.len();
    let filtered = filter_date(collection, range);
    if filtered.is_empty() {
        return Err(Error::Empty(format!(
            "no scene of {id} in {range} ({total} scenes before filtering)"
        )));
    }
    info!(collection = %id, %range, scenes = filtered.len(), "building median composite");

    let masked = filtered
        .scenes()
        .iter()
        .map(|s| mask_scene_with(s, mask))
        .collect::<Result<Vec<_>>>()?;

    let composite = median_composite(&masked)?;
    clip_scene(&composite, aoi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use lcmap_core::{AcquisitionDate, GeoTransform, Raster};

    fn scene(date: &str, dn: f64, qa: u16) -> Scene {
        let t = GeoTransform::new(0.0, 60.0, 30.0, -30.0);
        let mut band = Raster::filled(2, 2, dn);
        band.set_transform(t);
        let mut qa_pixel = Raster::filled(2, 2, qa);
        qa_pixel.set_transform(t);
        let mut radsat = Raster::filled(2, 2, 0u16);
        radsat.set_transform(t);

        let date: AcquisitionDate = date.parse().unwrap();
        let mut s = Scene::new(date.to_string(), date).with_band("SR_B5", band).unwrap();
        s.set_qa_pixel(qa_pixel).unwrap();
        s.set_qa_radsat(radsat).unwrap();
        s
    }

    fn left_half() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![(x: 0.0, y: 0.0), (x: 30.0, y: 0.0), (x: 30.0, y: 60.0), (x: 0.0, y: 60.0)]])
    }

    #[test]
    fn full_pipeline() {
        let collection = Collection::new(
            "LANDSAT/LC09/C02/T1_L2",
            vec![
                scene("2022-02-01", 20000.0, 21824),
                scene("2022-03-01", 22000.0, 21824),
                scene("2022-04-01", 60000.0, 22280), // cloudy
                scene("2023-01-05", 10000.0, 21824), // next year
            ],
        );
        let c = build_composite(collection, calendar_year(2022), &left_half(), &MaskParams::default())
            .unwrap();
        let nir = c.band("SR_B5").unwrap();
        let expected = 21000.0 * 0.0000275 - 0.2;
        assert!((nir.get(0, 0).unwrap() - expected).abs() < 1e-12);
        assert!(nir.get(0, 1).unwrap().is_nan());
    }

    #[test]
    fn empty_range_is_an_error() {
        let collection = Collection::new("c", vec![scene("2021-02-01", 1.0, 21824)]);
        let err = build_composite(collection, calendar_year(2022), &left_half(), &MaskParams::default());
        assert!(matches!(err, Err(Error::Empty(_))));
    }
}
