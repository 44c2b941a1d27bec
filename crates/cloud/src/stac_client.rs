//! Async STAC client for searching spatio-temporal asset catalogs.
//!
//! Supports Planetary Computer and Earth Search out of the box, plus
//! arbitrary STAC API endpoints via [`StacCatalog::Custom`].

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::auth::NoAuth;
use crate::error::{CloudError, Result};
use crate::http::HttpClient;
use crate::stac_models::{StacItem, StacItemCollection, StacLink, StacSearchParams};

const PC_SIGN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/sign";

// ---------------------------------------------------------------------------
// Catalog enum
// ---------------------------------------------------------------------------

/// Well-known STAC catalogs plus custom endpoints.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StacCatalog {
    /// Microsoft Planetary Computer STAC API.
    #[default]
    PlanetaryComputer,
    /// AWS Earth Search (Element 84).
    EarthSearch,
    /// Any STAC API endpoint (root URL, e.g. `"https://my-stac.example.com/api/v1"`).
    Custom(String),
}

impl StacCatalog {
    /// Return the full POST `/search` URL for this catalog.
    pub fn search_url(&self) -> String {
        match self {
            Self::PlanetaryComputer => {
                "https://planetarycomputer.microsoft.com/api/stac/v1/search".to_string()
            }
            Self::EarthSearch => "https://earth-search.aws.element84.com/v1/search".to_string(),
            Self::Custom(base) => {
                let base = base.trim_end_matches('/');
                if base.ends_with("/search") {
                    base.to_string()
                } else {
                    format!("{}/search", base)
                }
            }
        }
    }

    /// Parse a shorthand string into a catalog.
    ///
    /// Recognized shorthands: `"pc"`, `"planetary-computer"`, `"es"`,
    /// `"earth-search"`. Anything else is treated as a custom URL.
    pub fn from_str_or_url(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pc" | "planetary-computer" | "planetarycomputer" => Self::PlanetaryComputer,
            "es" | "earth-search" | "earthsearch" => Self::EarthSearch,
            _ => Self::Custom(s.to_string()),
        }
    }

    /// Whether asset hrefs need a SAS token before download.
    pub fn needs_signing(&self) -> bool {
        matches!(self, Self::PlanetaryComputer)
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 120 s; full Landsat bands are large).
    pub request_timeout: Duration,
    /// Maximum retries on transient failures (default 3).
    pub max_retries: u32,
    /// Maximum total items to fetch across pages (default 100).
    pub max_items: usize,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_retries: 3,
            max_items: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Async client for STAC Item Search and asset download.
pub struct StacClient {
    catalog: StacCatalog,
    http: HttpClient,
    options: StacClientOptions,
}

impl StacClient {
    /// Create a new STAC client.
    pub fn new(catalog: StacCatalog, options: StacClientOptions) -> Result<Self> {
        let http = HttpClient::new(options.request_timeout, options.max_retries)?;
        Ok(Self {
            catalog,
            http,
            options,
        })
    }

    /// The catalog this client is configured for.
    pub fn catalog(&self) -> &StacCatalog {
        &self.catalog
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    // ── Search ──────────────────────────────────────────────────────

    /// Execute a single search request and return one page of results.
    pub async fn search(&self, params: &StacSearchParams) -> Result<StacItemCollection> {
        let url = self.catalog.search_url();
        self.post_search(&url, params).await
    }

    /// Search with automatic pagination, collecting up to `max_items` items.
    pub async fn search_all(&self, params: &StacSearchParams) -> Result<Vec<StacItem>> {
        let mut all_items: Vec<StacItem> = Vec::new();
        let max = self.options.max_items;

        let mut page = self.search(params).await?;
        if let Some(matched) = page.matched() {
            info!(matched, catalog = ?self.catalog, "STAC search");
        }

        loop {
            let next = page.next_link().cloned();
            all_items.append(&mut page.features);

            if all_items.len() >= max {
                break;
            }

            match next {
                Some(link) => {
                    page = self.follow_next(&link, params).await?;
                    if page.is_empty() {
                        break;
                    }
                }
                None => break,
            }
        }

        all_items.truncate(max);
        debug!(items = all_items.len(), "STAC search complete");
        Ok(all_items)
    }

    // ── Assets ──────────────────────────────────────────────────────

    /// Sign an asset href for Planetary Computer via the `/sign` endpoint.
    ///
    /// For other catalogs this is a no-op and returns the href unchanged.
    pub async fn sign_asset_href(&self, href: &str) -> Result<String> {
        if !self.catalog.needs_signing() {
            return Ok(href.to_string());
        }
        let url = format!("{PC_SIGN_URL}?href={href}");
        let body = self
            .http
            .get_json(&url, &NoAuth)
            .await
            .map_err(|e| CloudError::Auth(format!("Planetary Computer signing failed: {e}")))?;

        body.get("href")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CloudError::Auth("sign response missing 'href' field".into()))
    }

    /// Sign (when needed) and download an asset.
    pub async fn download_asset(&self, href: &str) -> Result<Vec<u8>> {
        let signed = self.sign_asset_href(href).await?;
        self.http.get_bytes(&signed, &NoAuth).await
    }

    // ── Private helpers ─────────────────────────────────────────────

    async fn post_search(&self, url: &str, params: &StacSearchParams) -> Result<StacItemCollection> {
        let body = self.http.post_json(url, params, &NoAuth).await?;
        serde_json::from_str(&body).map_err(|e| CloudError::Stac(format!("search response: {e}")))
    }

    /// Follow a pagination link. Handles both POST (body/merge) and GET links.
    async fn follow_next(
        &self,
        link: &StacLink,
        original_params: &StacSearchParams,
    ) -> Result<StacItemCollection> {
        match next_page_params(link, original_params)? {
            Some(params) => self.post_search(&link.href, &params).await,
            None => {
                let body = self.http.get_json(&link.href, &NoAuth).await?;
                serde_json::from_value(body)
                    .map_err(|e| CloudError::Stac(format!("pagination response: {e}")))
            }
        }
    }
}

/// Request body for a POST `next` link, or `None` for GET pagination.
///
/// With `merge: true` the link body is overlaid onto the original request.
fn next_page_params(
    link: &StacLink,
    original: &StacSearchParams,
) -> Result<Option<StacSearchParams>> {
    let method = link.method.as_deref().unwrap_or("GET").to_uppercase();
    if method != "POST" {
        return Ok(None);
    }

    let to_value = |p: &StacSearchParams| {
        serde_json::to_value(p).map_err(|e| CloudError::Stac(format!("serializing params: {e}")))
    };

    let body = match (&link.body, link.merge.unwrap_or(false)) {
        (Some(link_body), true) => {
            let mut base = to_value(original)?;
            if let (Some(base_obj), Some(link_obj)) = (base.as_object_mut(), link_body.as_object()) {
                for (k, v) in link_obj {
                    base_obj.insert(k.clone(), v.clone());
                }
            }
            base
        }
        (Some(link_body), false) => link_body.clone(),
        (None, _) => to_value(original)?,
    };

    serde_json::from_value(body)
        .map(Some)
        .map_err(|e| CloudError::Stac(format!("parsing next-page params: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
