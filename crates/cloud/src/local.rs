//! Landsat scenes from a local directory of USGS Level-2 GeoTIFFs.
//!
//! Files keep the USGS naming `<PRODUCT_ID>_<BAND>.TIF`, e.g.
//! `LC09_L2SP_127045_20220304_20230427_02_T1_SR_B4.TIF`. Scenes may sit in
//! one flat directory or one sub-directory each (as extracted from the
//! USGS tarballs); the acquisition date comes from the product id.

use lcmap_core::io::read_geotiff;
use lcmap_core::{AcquisitionDate, Collection, Raster, Scene};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;
use crate::landsat::{TargetGrid, ASSET_BANDS, COLLECTION_ID};

/// One product found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalScene {
    pub product_id: String,
    pub date: AcquisitionDate,
    /// Band name → file
    pub files: BTreeMap<String, PathBuf>,
}

impl LocalScene {
    /// Whether the product is Landsat 9 (`LC09_...`).
    pub fn is_landsat9(&self) -> bool {
        self.product_id.starts_with("LC09")
    }
}

/// Split `<PRODUCT_ID>_<BAND>` into product id and band name.
fn split_band(stem: &str) -> Option<(&str, &'static str)> {
    let upper = stem.to_ascii_uppercase();
    ASSET_BANDS.iter().find_map(|(_, band)| {
        upper
            .ends_with(&format!("_{band}"))
            .then(|| (&stem[..stem.len() - band.len() - 1], *band))
    })
}

fn is_tiff(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"))
}

/// Find Level-2 products under `root` (the directory itself and its
/// immediate sub-directories), sorted by date then id.
pub fn scan_directory(root: &Path) -> Result<Vec<LocalScene>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            for inner in std::fs::read_dir(&path)? {
                paths.push(inner?.path());
            }
        } else {
            paths.push(path);
        }
    }

    let mut products: BTreeMap<String, LocalScene> = BTreeMap::new();
    for path in paths.into_iter().filter(|p| is_tiff(p)) {
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((product_id, band)) = split_band(stem) else {
            continue;
        };
        let Ok(date) = AcquisitionDate::from_product_id(product_id) else {
            debug!(file = %path.display(), "no acquisition date in file name");
            continue;
        };
        products
            .entry(product_id.to_string())
            .or_insert_with(|| LocalScene {
                product_id: product_id.to_string(),
                date,
                files: BTreeMap::new(),
            })
            .files
            .insert(band.to_string(), path);
    }

    let mut scenes: Vec<LocalScene> = products.into_values().collect();
    scenes.sort_by(|a, b| (a.date, &a.product_id).cmp(&(b.date, &b.product_id)));
    Ok(scenes)
}

/// Read `bands` (plus QA) of one product and warp them onto `grid`.
pub fn load_scene(scene: &LocalScene, grid: &TargetGrid, bands: &[String]) -> Result<Scene> {
    let mut wanted: Vec<&str> = bands.iter().map(String::as_str).collect();
    wanted.extend([lcmap_core::scene::QA_PIXEL, lcmap_core::scene::QA_RADSAT]);
    wanted.dedup();

    let mut assets = Vec::with_capacity(wanted.len());
    for band in wanted {
        let path = scene
            .files
            .get(band)
            .ok_or_else(|| lcmap_core::Error::MissingBand {
                scene: scene.product_id.clone(),
                band: band.to_string(),
            })?;
        let raster: Raster<u16> = read_geotiff(path)?;
        assets.push((band.to_string(), raster));
    }
    grid.assemble_scene(&scene.product_id, scene.date, assets)
}

/// Load every Landsat 9 product under `root` onto `grid`.
pub fn load_directory(root: &Path, grid: &TargetGrid, bands: &[String]) -> Result<Collection> {
    let found = scan_directory(root)?;
    let mut collection = Collection::new(COLLECTION_ID, Vec::new());
    for product in found.iter().filter(|s| s.is_landsat9()) {
        debug!(product = %product.product_id, "loading");
        collection.push(load_scene(product, grid, bands)?);
    }
    info!(
        scenes = collection.len(),
        skipped = found.len() - collection.len(),
        dir = %root.display(),
        "local scenes loaded"
    );
    Ok(collection)
}
