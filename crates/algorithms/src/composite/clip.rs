//! Clipping rasters and scenes to an area of interest.
//!
//! The AOI is rasterized by scanline: a pixel belongs to the AOI when its
//! centre is inside, under the nonzero winding rule, so overlapping parts
//! of a multipolygon stay inside and holes stay outside.

use geo::orient::{Direction, Orient};
use geo::MultiPolygon;
use ndarray::Array2;
use crate::maybe_rayon::*;
use lcmap_core::raster::{GeoTransform, Raster};
use lcmap_core::scene::Scene;
use lcmap_core::{Error, Result};

/// AOI membership of each pixel centre: 1 inside, 0 outside.
///
/// `aoi` must be in the CRS of `transform`, which must be north-up.
pub fn aoi_mask(
    aoi: &MultiPolygon<f64>,
    transform: &GeoTransform,
    rows: usize,
    cols: usize,
) -> Result<Raster<u8>> {
    if transform.row_rotation != 0.0 || transform.col_rotation != 0.0 {
        return Err(Error::Algorithm("AOI rasterization needs a north-up grid".into()));
    }

    // (x0, y0, x1, y1) with exterior rings counter-clockwise
    let edges: Vec<(f64, f64, f64, f64)> = aoi
        .orient(Direction::Default)
        .0
        .iter()
        .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
        .flat_map(|ring| ring.lines())
        .map(|l| (l.start.x, l.start.y, l.end.x, l.end.y))
        .filter(|e| e.1 != e.3)
        .collect();

    let ox = transform.origin_x;
    let w = transform.pixel_width;

    let data: Vec<u8> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![0u8; cols];
            let (_, y) = transform.pixel_to_geo(0, row);

            let mut crossings: Vec<(f64, i32)> = edges
                .iter()
                .filter_map(|&(x0, y0, x1, y1)| {
                    let winding = if y0 <= y && y < y1 {
                        1
                    } else if y1 <= y && y < y0 {
                        -1
                    } else {
                        return None;
                    };
                    Some((x0 + (y - y0) * (x1 - x0) / (y1 - y0), winding))
                })
                .collect();
            crossings.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

            let mut winding = 0;
            for pair in crossings.windows(2) {
                winding += pair[0].1;
                if winding == 0 {
                    continue;
                }
                // columns whose centre lies in [x_in, x_out)
                let c0 = ((pair[0].0 - ox) / w - 0.5).ceil().max(0.0) as usize;
                let c1 = (((pair[1].0 - ox) / w - 0.5).ceil().max(0.0) as usize).min(cols);
                for out in row_data.iter_mut().take(c1).skip(c0) {
                    *out = 1;
                }
            }
            row_data
        })
        .collect();

    let mut mask = Raster::from_vec(data, rows, cols)?;
    mask.set_transform(*transform);
    Ok(mask)
}

/// Set pixels outside `aoi` to NaN.
pub fn clip_raster(raster: &Raster<f64>, aoi: &MultiPolygon<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let mask = aoi_mask(aoi, raster.transform(), rows, cols)?;
    apply_aoi(raster, &mask)
}

/// Clip every float band of a scene to `aoi`.
pub fn clip_scene(scene: &Scene, aoi: &MultiPolygon<f64>) -> Result<Scene> {
    let (Some((rows, cols)), Some(transform)) = (scene.shape(), scene.transform()) else {
        return Ok(scene.clone());
    };
    let mask = aoi_mask(aoi, transform, rows, cols)?;

    let mut out = scene.clone();
    for band in out.bands_mut() {
        band.data = apply_aoi(&band.data, &mask)?;
    }
    Ok(out)
}

fn apply_aoi(raster: &Raster<f64>, mask: &Raster<u8>) -> Result<Raster<f64>> {
    let (rows, cols) = raster.shape();
    let data: Vec<f64> = raster
        .data()
        .iter()
        .zip(mask.data().iter())
        .map(|(&v, &inside)| if inside == 1 { v } else { f64::NAN })
        .collect();

    let mut output = raster.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;
    Ok(output)
}
