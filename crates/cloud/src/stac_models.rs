//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Serde models for STAC Item Search (POST /search) requests and responses:
//! bbox, datetime, collection and property (`query` extension) filters,
//! pagination via `links`, and asset access.

use crate::error::{CloudError, Result};
use lcmap_core::AcquisitionDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search` (STAC API – Item Search).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StacSearchParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    /// Property filters (query extension), e.g.
    /// `{"platform": {"in": ["landsat-9"]}, "eo:cloud_cover": {"lt": 40}}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,

    /// Pagination token (next page).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl StacSearchParams {
    /// Create empty search params.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set datetime or datetime range (e.g. `"2022-01-01/2022-12-31"`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Closed date interval covering whole days from `start` through `end`.
    pub fn date_range(self, start: AcquisitionDate, end: AcquisitionDate) -> Self {
        self.datetime(&format!("{start}T00:00:00Z/{end}T23:59:59Z"))
    }

    /// Set collection filter.
    pub fn collections(mut self, cols: &[&str]) -> Self {
        self.collections = Some(cols.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Add a query-extension condition `property: {op: value}`.
    pub fn query(mut self, property: &str, op: &str, value: Value) -> Self {
        let query = self.query.get_or_insert_with(Map::new);
        let entry = query
            .entry(property.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(ops) = entry {
            ops.insert(op.to_string(), value);
        }
        self
    }

    /// Restrict to items acquired by `platform` (e.g. `"landsat-9"`).
    pub fn platform(self, platform: &str) -> Self {
        self.query("platform", "in", json!([platform]))
    }

    /// Restrict to items whose scene cloud cover is at most `percent`.
    pub fn max_cloud_cover(self, percent: f64) -> Self {
        self.query("eo:cloud_cover", "lte", json!(percent))
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }

    /// Set pagination token.
    pub fn token(mut self, tok: &str) -> Self {
        self.token = Some(tok.to_string());
        self
    }
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// A STAC Item Collection (GeoJSON FeatureCollection).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemCollection {
    #[serde(rename = "type")]
    pub type_: String,

    pub features: Vec<StacItem>,

    #[serde(default)]
    pub links: Vec<StacLink>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Older catalogs report counts in `context` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StacItemCollection {
    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }

    /// Whether there is a next page.
    pub fn has_next(&self) -> bool {
        self.next_link().is_some()
    }

    /// Number of items in this page.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total matches reported by the catalog, from either convention.
    pub fn matched(&self) -> Option<u64> {
        self.number_matched.or_else(|| {
            self.context
                .as_ref()
                .and_then(|c| c.get("matched"))
                .and_then(Value::as_u64)
        })
    }
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItem {
    #[serde(rename = "type")]
    pub type_: String,

    /// Unique item identifier.
    pub id: String,

    /// Footprint geometry, kept as raw GeoJSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Value>,

    /// Bounding box `[west, south, east, north]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    pub properties: StacItemProperties,

    pub assets: HashMap<String, StacAsset>,

    /// Collection this item belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItem {
    /// Get an asset by key.
    pub fn asset(&self, key: &str) -> Option<&StacAsset> {
        self.assets.get(key)
    }

    /// Like [`StacItem::asset`], failing with [`CloudError::MissingAsset`].
    pub fn require_asset(&self, key: &str) -> Result<&StacAsset> {
        self.asset(key).ok_or_else(|| CloudError::MissingAsset {
            item: self.id.clone(),
            asset: key.to_string(),
        })
    }

    /// EPSG code from the projection extension: `proj:epsg` (v1) or
    /// `proj:code` such as `"EPSG:32648"` (v2).
    pub fn epsg(&self) -> Option<u32> {
        let extra = &self.properties.extra;
        extra
            .get("proj:epsg")
            .and_then(Value::as_u64)
            .map(|v| v as u32)
            .or_else(|| {
                extra
                    .get("proj:code")
                    .and_then(Value::as_str)
                    .and_then(|s| s.strip_prefix("EPSG:"))
                    .and_then(|s| s.parse().ok())
            })
    }

    /// Acquisition date from `datetime` (or `start_datetime`).
    pub fn acquisition_date(&self) -> Result<AcquisitionDate> {
        let props = &self.properties;
        let dt = props
            .datetime
            .as_deref()
            .or_else(|| props.extra.get("start_datetime").and_then(Value::as_str))
            .ok_or_else(|| CloudError::Stac(format!("item '{}' has no datetime", self.id)))?;
        Ok(dt.parse::<AcquisitionDate>()?)
    }

    /// Scene cloud cover in percent, if reported.
    pub fn cloud_cover(&self) -> Option<f64> {
        self.properties.eo_cloud_cover
    }
}

/// STAC Item properties.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacItemProperties {
    /// ISO 8601 datetime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    /// Cloud cover percentage (EO extension).
    #[serde(rename = "eo:cloud_cover", skip_serializing_if = "Option::is_none")]
    pub eo_cloud_cover: Option<f64>,

    /// Platform name (e.g., "landsat-9").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// GSD (ground sample distance).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gsd: Option<f64>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A single STAC Asset (file reference).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacAsset {
    /// URL to the asset file.
    pub href: String,

    /// Media type (e.g., `"image/tiff; application=geotiff; profile=cloud-optimized"`).
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Roles: `["data"]`, `["thumbnail"]`, `["cloud"]`, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// All other asset fields.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

/// A STAC Link (used for pagination and related resources).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StacLink {
    /// Relationship: `"self"`, `"root"`, `"next"`, `"prev"`, etc.
    pub rel: String,

    /// Target URL.
    pub href: String,

    /// HTTP method for the link (default GET, but `"next"` often uses POST).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST-based pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Merge mode: if true, merge body with previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    /// Media type of the linked resource.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const FIXTURE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "LC09_L2SP_127045_20220304_02_T1",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[[105.2, 20.1], [107.3, 20.1], [107.3, 22.0], [105.2, 22.0], [105.2, 20.1]]]
      },
      "bbox": [105.2, 20.1, 107.3, 22.0],
      "properties": {
        "datetime": "2022-03-04T03:25:41.123456Z",
        "eo:cloud_cover": 12.5,
        "platform": "landsat-9",
        "gsd": 30.0,
        "proj:epsg": 32648,
        "landsat:wrs_path": "127",
        "landsat:wrs_row": "045"
      },
      "assets": {
        "red": {
          "href": "https://landsateuwest.blob.core.windows.net/landsat-c2/level-2/LC09_SR_B4.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Red Band",
          "roles": ["data", "reflectance"]
        },
        "qa_pixel": {
          "href": "https://landsateuwest.blob.core.windows.net/landsat-c2/level-2/LC09_QA_PIXEL.TIF",
          "type": "image/tiff; application=geotiff; profile=cloud-optimized",
          "title": "Pixel Quality Assessment Band",
          "roles": ["cloud", "cloud-shadow", "snow-ice", "water-mask"]
        },
        "thumbnail": {
          "href": "https://example.com/thumb.png",
          "type": "image/png",
          "roles": ["thumbnail"]
        }
      },
      "collection": "landsat-c2-l2",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search",
      "method": "POST",
      "body": {"token": "next:LC09_L2SP_127045_20220304_02_T1"},
      "merge": true
    },
    {
      "rel": "self",
      "href": "https://planetarycomputer.microsoft.com/api/stac/v1/search"
    }
  ],
  "numberMatched": 23,
  "numberReturned": 1
}"#;

    fn fixture() -> StacItemCollection {
        serde_json::from_str(FIXTURE).unwrap()
    }

    #[test]
    fn parse_item_collection() {
        let col = fixture();
        assert_eq!(col.type_, "FeatureCollection");
        assert_eq!(col.len(), 1);
        assert_eq!(col.matched(), Some(23));
        assert_eq!(col.number_returned, Some(1));
    }

    #[test]
    fn item_metadata() {
        let item = &fixture().features[0];
        assert_eq!(item.collection.as_deref(), Some("landsat-c2-l2"));
        assert_eq!(item.properties.platform.as_deref(), Some("landsat-9"));
        assert_eq!(item.epsg(), Some(32648));
        assert_eq!(item.cloud_cover(), Some(12.5));
        assert_eq!(item.acquisition_date().unwrap().to_string(), "2022-03-04");
        assert!(item.properties.extra.contains_key("landsat:wrs_path"));
    }

    #[test]
    fn asset_lookup() {
        let item = &fixture().features[0];
        assert!(item.require_asset("red").unwrap().href.ends_with("SR_B4.TIF"));
        assert!(item.asset("nir08").is_none());
        match item.require_asset("nir08") {
            Err(CloudError::MissingAsset { asset, .. }) => assert_eq!(asset, "nir08"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn epsg_from_proj_code() {
        let mut item = fixture().features.remove(0);
        item.properties.extra.remove("proj:epsg");
        item.properties
            .extra
            .insert("proj:code".into(), json!("EPSG:32748"));
        assert_eq!(item.epsg(), Some(32748));
    }

    #[test]
    fn matched_from_context() {
        let mut col = fixture();
        col.number_matched = None;
        col.context = Some(json!({"returned": 1, "matched": 7}));
        assert_eq!(col.matched(), Some(7));
    }

    #[test]
    fn pagination_links() {
        let col = fixture();
        assert!(col.has_next());
        let next = col.next_link().unwrap();
        assert_eq!(next.method.as_deref(), Some("POST"));
        assert_eq!(next.merge, Some(true));
    }

    #[test]
    fn builder_serializes_query_extension() {
        let params = StacSearchParams::new()
            .bbox(105.7, 20.9, 105.9, 21.1)
            .date_range(
                AcquisitionDate::new(2022, 1, 1).unwrap(),
                AcquisitionDate::new(2022, 12, 31).unwrap(),
            )
            .collections(&["landsat-c2-l2"])
            .platform("landsat-9")
            .max_cloud_cover(40.0)
            .limit(50);

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["bbox"], json!([105.7, 20.9, 105.9, 21.1]));
        assert_eq!(json["datetime"], "2022-01-01T00:00:00Z/2022-12-31T23:59:59Z");
        assert_eq!(json["collections"], json!(["landsat-c2-l2"]));
        assert_eq!(json["query"]["platform"]["in"], json!(["landsat-9"]));
        assert_eq!(json["query"]["eo:cloud_cover"]["lte"], json!(40.0));
        assert_eq!(json["limit"], 50);
        assert!(json.get("token").is_none());
    }

    #[test]
    fn empty_params_has_no_fields() {
        let json = serde_json::to_value(StacSearchParams::new()).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }
}
