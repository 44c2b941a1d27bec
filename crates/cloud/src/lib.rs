//! # lcmap cloud
//!
//! Remote data access for the lcmap workflow.
//!
//! - STAC Item Search (Planetary Computer, Earth Search, custom APIs) with
//!   pagination, retry and Planetary Computer SAS signing
//! - Landsat 9 Collection 2 Level-2 scenes assembled on a common grid,
//!   from the catalog or from a local USGS download directory
//! - Shapefile export to a local folder or a Google Cloud Storage bucket
//!
//! ## Features
//!
//! - `native` (default): blocking API via a Tokio `block_on` runtime

pub mod auth;
pub mod error;
pub mod http;
pub mod landsat;
pub mod local;
pub mod stac_client;
pub mod stac_models;
pub mod storage;

pub mod sync_api;

pub use auth::{BearerAuth, CloudAuth, NoAuth};
pub use error::{CloudError, Result};
pub use http::HttpClient;
pub use landsat::{LandsatQuery, TargetGrid};
pub use stac_client::{StacCatalog, StacClient, StacClientOptions};
pub use stac_models::{StacItem, StacItemCollection, StacSearchParams};
pub use storage::ExportDestination;

/// Blocking API re-exported as `blocking` module (native only).
#[cfg(feature = "native")]
pub mod blocking {
    pub use crate::sync_api::*;
}
