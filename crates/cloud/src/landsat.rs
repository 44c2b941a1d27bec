//! Landsat 9 Collection 2 Level-2 scenes from a STAC catalog.
//!
//! Items of `landsat-c2-l2` carry one Cloud Optimized GeoTIFF per band,
//! keyed by common name (`red`, `nir08`, `qa_pixel`, ...). Each asset is
//! downloaded whole, decoded, and warped onto a [`TargetGrid`] shared by
//! every scene of the run so the median composite can stack them.

use futures::stream::{self, StreamExt};
use geo::{BoundingRect, Centroid, MultiPolygon};
use lcmap_core::io::read_geotiff_from_buffer;
use lcmap_core::projection::{utm_zone_for, warp_nearest, Transformer};
use lcmap_core::scene::{QA_PIXEL, QA_RADSAT};
use lcmap_core::{AcquisitionDate, Collection, GeoTransform, Raster, Scene, CRS};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{CloudError, Result};
use crate::stac_client::StacClient;
use crate::stac_models::{StacItem, StacSearchParams};

/// STAC collection of Landsat Collection 2 Level-2 products.
pub const STAC_COLLECTION: &str = "landsat-c2-l2";
/// `platform` value of Landsat 9 items.
pub const PLATFORM: &str = "landsat-9";
/// Catalog identifier reported for collections built here.
pub const COLLECTION_ID: &str = "LANDSAT/LC09/C02/T1_L2";
/// Landsat pixel size (m).
pub const CELL_SIZE: f64 = 30.0;
/// Landsat grids put pixel edges at multiples of 30 m offset by 15 m.
pub const GRID_OFFSET: f64 = 15.0;

/// STAC asset key → band name.
pub const ASSET_BANDS: [(&str, &str); 10] = [
    ("coastal", "SR_B1"),
    ("blue", "SR_B2"),
    ("green", "SR_B3"),
    ("red", "SR_B4"),
    ("nir08", "SR_B5"),
    ("swir16", "SR_B6"),
    ("swir22", "SR_B7"),
    ("lwir11", "ST_B10"),
    ("qa_pixel", QA_PIXEL),
    ("qa_radsat", QA_RADSAT),
];

/// STAC asset key for a band name (`"SR_B4"` → `"red"`).
pub fn asset_key(band: &str) -> Option<&'static str> {
    ASSET_BANDS
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(band))
        .map(|(key, _)| *key)
}

/// QA_PIXEL value given to cells outside a scene footprint (fill bit).
const QA_FILL: u16 = 1;

/// Common grid every scene of a run is warped onto.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetGrid {
    pub crs: CRS,
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
}

impl TargetGrid {
    /// Grid covering a WGS84 AOI.
    ///
    /// Uses `crs` when given, otherwise the UTM zone of the AOI centroid.
    /// The AOI bounding box is projected and snapped outward to the
    /// Landsat 30 m grid.
    pub fn covering(aoi_wgs84: &MultiPolygon<f64>, crs: Option<CRS>) -> Result<Self> {
        let centroid = aoi_wgs84
            .centroid()
            .ok_or_else(|| lcmap_core::Error::Empty("AOI has no area".into()))?;
        let crs = crs.unwrap_or_else(|| utm_zone_for(centroid.x(), centroid.y()));

        let projected = Transformer::new(&CRS::wgs84(), &crs)?.transform_geometry(aoi_wgs84);
        let rect = projected
            .bounding_rect()
            .ok_or_else(|| lcmap_core::Error::Empty("AOI has no extent".into()))?;
        let (transform, rows, cols) = GeoTransform::covering(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
            CELL_SIZE,
            GRID_OFFSET,
        );
        Ok(Self {
            crs,
            transform,
            rows,
            cols,
        })
    }

    /// WGS84 `[west, south, east, north]` enclosing the grid, for catalog
    /// searches. Edges are sampled so the curvature of projected lines is
    /// covered.
    pub fn bbox_wgs84(&self) -> Result<[f64; 4]> {
        let to_wgs84 = Transformer::new(&self.crs, &CRS::wgs84())?;
        let (min_x, min_y, max_x, max_y) = self.transform.bounds(self.cols, self.rows);
        const STEPS: usize = 8;

        let mut bbox = [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
        for i in 0..=STEPS {
            let t = i as f64 / STEPS as f64;
            let x = min_x + t * (max_x - min_x);
            let y = min_y + t * (max_y - min_y);
            for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
                let (lon, lat) = to_wgs84.transform(px, py);
                bbox[0] = bbox[0].min(lon);
                bbox[1] = bbox[1].min(lat);
                bbox[2] = bbox[2].max(lon);
                bbox[3] = bbox[3].max(lat);
            }
        }
        Ok(bbox)
    }

    /// Warp a raster onto this grid; cells it does not cover get `fill`.
    pub fn warp(&self, raster: &Raster<u16>, fill: u16) -> Result<Raster<u16>> {
        Ok(warp_nearest(
            raster,
            &self.crs,
            self.transform,
            self.rows,
            self.cols,
            fill,
        )?)
    }

    /// Build a scene from decoded assets `(band name, raster)`.
    ///
    /// Float bands are warped with fill 0 and QA_PIXEL with the fill bit
    /// set, so cells outside the footprint are masked like USGS fill.
    pub fn assemble_scene(
        &self,
        id: &str,
        date: AcquisitionDate,
        assets: Vec<(String, Raster<u16>)>,
    ) -> Result<Scene> {
        let mut scene = Scene::new(id, date);
        for (name, raster) in assets {
            let warped = self.warp(&raster, fill_for(&name))?;
            insert_band(&mut scene, name, warped)?;
        }
        Ok(scene)
    }
}

fn fill_for(band: &str) -> u16 {
    if band == QA_PIXEL {
        QA_FILL
    } else {
        0
    }
}

/// Put a raster already on the scene grid into its slot.
fn insert_band(scene: &mut Scene, name: String, raster: Raster<u16>) -> Result<()> {
    match name.as_str() {
        QA_PIXEL => scene.set_qa_pixel(raster)?,
        QA_RADSAT => scene.set_qa_radsat(raster)?,
        _ => scene.add_band(name, raster.map(f64::from))?,
    }
    Ok(())
}

/// Landsat 9 search restricted to a grid and a date interval.
#[derive(Debug, Clone)]
pub struct LandsatQuery {
    /// First day (inclusive).
    pub start: AcquisitionDate,
    /// Last day (exclusive), matching the composite date filter.
    pub end: AcquisitionDate,
    /// Drop items whose scene cloud cover exceeds this percentage.
    pub max_cloud_cover: Option<f64>,
}

impl LandsatQuery {
    /// The whole calendar year `year`.
    pub fn year(year: i32) -> Self {
        Self {
            start: AcquisitionDate::start_of_year(year),
            end: AcquisitionDate::start_of_year(year + 1),
            max_cloud_cover: None,
        }
    }

    /// STAC search body for this query over `grid`.
    pub fn search_params(&self, grid: &TargetGrid) -> Result<StacSearchParams> {
        let [west, south, east, north] = grid.bbox_wgs84()?;
        let last_day = self.end.previous_day();
        let mut params = StacSearchParams::new()
            .bbox(west, south, east, north)
            .date_range(self.start, last_day)
            .collections(&[STAC_COLLECTION])
            .platform(PLATFORM)
            .limit(100);
        if let Some(cc) = self.max_cloud_cover {
            params = params.max_cloud_cover(cc);
        }
        Ok(params)
    }

    /// Client-side check of what the catalog was asked to filter, for
    /// catalogs that ignore the query extension.
    pub fn accepts(&self, item: &StacItem) -> bool {
        let platform_ok = item
            .properties
            .platform
            .as_deref()
            .map_or(true, |p| p.eq_ignore_ascii_case(PLATFORM));
        let cloud_ok = match (self.max_cloud_cover, item.cloud_cover()) {
            (Some(max), Some(cc)) => cc <= max,
            _ => true,
        };
        let date_ok = item
            .acquisition_date()
            .map(|d| self.start <= d && d < self.end)
            .unwrap_or(false);
        platform_ok && cloud_ok && date_ok
    }
}

/// Search the catalog for Landsat 9 items over `grid`, oldest first.
pub async fn search_scenes(
    client: &StacClient,
    grid: &TargetGrid,
    query: &LandsatQuery,
) -> Result<Vec<StacItem>> {
    let params = query.search_params(grid)?;
    let mut items: Vec<StacItem> = client
        .search_all(&params)
        .await?
        .into_iter()
        .filter(|item| query.accepts(item))
        .collect();
    items.sort_by(|a, b| {
        (a.properties.datetime.as_deref(), a.id.as_str())
            .cmp(&(b.properties.datetime.as_deref(), b.id.as_str()))
    });
    info!(items = items.len(), start = %query.start, end = %query.end, "Landsat 9 items found");
    Ok(items)
}

/// Assets to fetch for `bands`: each requested band plus both QA bands.
fn assets_for(bands: &[String]) -> Result<Vec<(&'static str, String)>> {
    let mut wanted: Vec<(&'static str, String)> = Vec::with_capacity(bands.len() + 2);
    for band in bands.iter().map(String::as_str).chain([QA_PIXEL, QA_RADSAT]) {
        let key = asset_key(band).ok_or_else(|| lcmap_core::Error::InvalidParameter {
            name: "bands",
            value: band.to_string(),
            reason: "not a Landsat 9 Collection 2 Level-2 band".into(),
        })?;
        if !wanted.iter().any(|(k, _)| *k == key) {
            let name = ASSET_BANDS
                .iter()
                .find(|(k, _)| *k == key)
                .map_or(band, |(_, n)| *n);
            wanted.push((key, name.to_string()));
        }
    }
    Ok(wanted)
}

/// Download the assets of one item and assemble them on `grid`.
pub async fn fetch_scene(
    client: &StacClient,
    item: &StacItem,
    grid: &Arc<TargetGrid>,
    bands: &[String],
) -> Result<Scene> {
    let date = item.acquisition_date()?;
    let mut scene = Scene::new(&item.id, date);
    for (key, name) in assets_for(bands)? {
        let href = &item.require_asset(key)?.href;
        let bytes = client.download_asset(href).await?;
        debug!(item = %item.id, asset = key, bytes = bytes.len(), "asset downloaded");

        // Decode and warp off the async threads.
        let grid = Arc::clone(grid);
        let fill = fill_for(&name);
        let raster = tokio::task::spawn_blocking(move || -> Result<Raster<u16>> {
            let raster = read_geotiff_from_buffer::<u16>(&bytes)?;
            grid.warp(&raster, fill)
        })
        .await
        .map_err(|e| CloudError::Network(format!("decode task failed: {e}")))??;
        insert_band(&mut scene, name, raster)?;
    }
    Ok(scene)
}

/// Fetch every item as a scene, `concurrency` items at a time.
///
/// Items that fail to download are skipped with a warning; the run fails
/// only when nothing could be fetched.
pub async fn fetch_collection(
    client: &StacClient,
    items: &[StacItem],
    grid: &TargetGrid,
    bands: &[String],
    concurrency: usize,
) -> Result<Collection> {
    let grid = Arc::new(grid.clone());
    let results: Vec<(usize, Result<Scene>)> = stream::iter(items.iter().enumerate())
        .map(|(i, item)| {
            let grid = Arc::clone(&grid);
            async move { (i, fetch_scene(client, item, &grid, bands).await) }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut scenes: Vec<(usize, Scene)> = Vec::with_capacity(results.len());
    let mut last_err = None;
    for (i, res) in results {
        match res {
            Ok(scene) => scenes.push((i, scene)),
            Err(e) => {
                warn!(item = %items[i].id, error = %e, "skipping scene");
                last_err = Some(e);
            }
        }
    }
    if scenes.is_empty() {
        if let Some(e) = last_err {
            return Err(e);
        }
    }
    scenes.sort_by_key(|(i, _)| *i);
    info!(scenes = scenes.len(), "scenes assembled");
    Ok(Collection::new(
        COLLECTION_ID,
        scenes.into_iter().map(|(_, s)| s).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stac_models::tests::FIXTURE;
    use crate::stac_models::StacItemCollection;
    use geo::polygon;

    fn aoi() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 105.80, y: 21.00),
            (x: 105.82, y: 21.00),
            (x: 105.82, y: 21.02),
            (x: 105.80, y: 21.02),
            (x: 105.80, y: 21.00),
        ]])
    }

    #[test]
    fn asset_mapping() {
        assert_eq!(asset_key("SR_B4"), Some("red"));
        assert_eq!(asset_key("st_b10"), Some("lwir11"));
        assert_eq!(asset_key("QA_PIXEL"), Some("qa_pixel"));
        assert_eq!(asset_key("SR_B8"), None);
    }

    #[test]
    fn assets_always_include_qa() {
        let wanted = assets_for(&["SR_B4".into(), "SR_B5".into()]).unwrap();
        let keys: Vec<_> = wanted.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["red", "nir08", "qa_pixel", "qa_radsat"]);
        assert!(assets_for(&["B4".into()]).is_err());
    }

    #[test]
    fn grid_snaps_to_landsat_pixels() {
        let grid = TargetGrid::covering(&aoi(), None).unwrap();
        assert_eq!(grid.crs.epsg(), Some(32648));
        assert_eq!(grid.transform.pixel_width, CELL_SIZE);
        assert_eq!((grid.transform.origin_x - GRID_OFFSET) % CELL_SIZE, 0.0);
        assert_eq!((grid.transform.origin_y - GRID_OFFSET) % CELL_SIZE, 0.0);
        // ~2.1 km x 2.2 km
        assert!((65..=80).contains(&grid.cols), "cols = {}", grid.cols);
        assert!((70..=80).contains(&grid.rows), "rows = {}", grid.rows);

        let [w, s, e, n] = grid.bbox_wgs84().unwrap();
        assert!(w <= 105.80 && e >= 105.82 && s <= 21.00 && n >= 21.02);
    }

    #[test]
    fn assemble_marks_outside_as_fill() {
        let grid = TargetGrid {
            crs: CRS::utm(48, true),
            transform: GeoTransform::new(15.0, 135.0, 30.0, -30.0),
            rows: 4,
            cols: 4,
        };
        // Source covers only the top-left 2x2 block of the grid
        let mut red: Raster<u16> = Raster::filled(2, 2, 8000);
        red.set_transform(GeoTransform::new(15.0, 135.0, 30.0, -30.0));
        red.set_crs(Some(CRS::utm(48, true)));
        let qa = red.map(|_| 21824u16);

        let date = AcquisitionDate::new(2022, 3, 4).unwrap();
        let scene = grid
            .assemble_scene("s", date, vec![("SR_B4".into(), red), (QA_PIXEL.into(), qa)])
            .unwrap();
        assert_eq!(scene.shape(), Some((4, 4)));
        assert_eq!(scene.band("SR_B4").unwrap().get(0, 0).unwrap(), 8000.0);
        assert_eq!(scene.band("SR_B4").unwrap().get(3, 3).unwrap(), 0.0);
        assert_eq!(scene.qa_pixel().unwrap().get(1, 1).unwrap(), 21824);
        assert_eq!(scene.qa_pixel().unwrap().get(3, 3).unwrap(), QA_FILL);
    }

    #[test]
    fn query_params_and_acceptance() {
        let grid = TargetGrid::covering(&aoi(), None).unwrap();
        let mut query = LandsatQuery::year(2022);
        query.max_cloud_cover = Some(10.0);
        let params = query.search_params(&grid).unwrap();
        assert_eq!(
            params.datetime.as_deref(),
            Some("2022-01-01T00:00:00Z/2022-12-31T23:59:59Z")
        );
        assert_eq!(params.collections.as_deref(), Some(&[STAC_COLLECTION.to_string()][..]));

        let item = serde_json::from_str::<StacItemCollection>(FIXTURE)
            .unwrap()
            .features
            .remove(0);
        // 12.5 % cloud cover
        assert!(!query.accepts(&item));
        query.max_cloud_cover = None;
        assert!(query.accepts(&item));
        assert!(!LandsatQuery::year(2023).accepts(&item));
    }
}
