//! Blocking (synchronous) API for native platforms.
//!
//! Wraps the async STAC client, scene fetching and export upload with a
//! Tokio runtime so callers don't need to manage their own async runtime.

#[cfg(feature = "native")]
mod inner {
    use lcmap_core::{Collection, FeatureCollection, CRS};

    use crate::auth::CloudAuth;
    use crate::error::{CloudError, Result};
    use crate::http::HttpClient;
    use crate::landsat::{self, LandsatQuery, TargetGrid};
    use crate::stac_client::{StacCatalog, StacClient, StacClientOptions};
    use crate::stac_models::{StacItem, StacItemCollection, StacSearchParams};
    use crate::storage::ExportDestination;

    fn runtime() -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CloudError::Network(e.to_string()))
    }

    /// Blocking wrapper around [`StacClient`].
    ///
    /// Uses an internal single-threaded Tokio runtime; decoding runs on the
    /// runtime's blocking pool.
    pub struct StacClientBlocking {
        rt: tokio::runtime::Runtime,
        inner: StacClient,
    }

    impl StacClientBlocking {
        /// Create a new blocking STAC client.
        pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
            let rt = runtime()?;
            let inner = StacClient::new(catalog, options)?;
            Ok(Self { rt, inner })
        }

        pub fn catalog(&self) -> &StacCatalog {
            self.inner.catalog()
        }

        /// Execute a single search request (blocking).
        pub fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
            self.rt.block_on(self.inner.search(params))
        }

        /// Search with automatic pagination (blocking).
        pub fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
            self.rt.block_on(self.inner.search_all(params))
        }

        /// Landsat 9 items over `grid` matching `query` (blocking).
        pub fn search_scenes(&self, grid: &TargetGrid, query: &LandsatQuery) -> Result<Vec<StacItem>> {
            self.rt
                .block_on(landsat::search_scenes(&self.inner, grid, query))
        }

        /// Download and assemble `items` on `grid` (blocking).
        pub fn fetch_collection(
            &self,
            items: &[StacItem],
            grid: &TargetGrid,
            bands: &[String],
            concurrency: usize,
        ) -> Result<Collection> {
            self.rt.block_on(landsat::fetch_collection(
                &self.inner,
                items,
                grid,
                bands,
                concurrency,
            ))
        }

        /// Sign an asset href for Planetary Computer (blocking).
        pub fn sign_asset_href(&self, href: &str) -> Result<String> {
            self.rt.block_on(self.inner.sign_asset_href(href))
        }
    }

    /// One-shot: export features as a shapefile to `destination` (blocking).
    pub fn export_shapefile(
        destination: &ExportDestination,
        description: &str,
        features: &FeatureCollection,
        crs: &CRS,
        http: &HttpClient,
        auth: &dyn CloudAuth,
    ) -> Result<Vec<String>> {
        runtime()?.block_on(destination.export_shapefile(description, features, crs, http, auth))
    }
}

#[cfg(feature = "native")]
pub use inner::*;
