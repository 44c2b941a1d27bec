//! HTTP client wrapper with authentication and retry logic.

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP client for downloading assets and uploading export files.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    request_timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(request_timeout: Duration, max_retries: u32) -> Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            max_retries,
            request_timeout,
        })
    }

    /// Download a whole file.
    pub async fn get_bytes(&self, url: &str, auth: &dyn CloudAuth) -> Result<Vec<u8>> {
        let resp = self
            .execute_with_retry(url, || self.request(Method::GET, url, auth))
            .await?;
        let bytes = resp.bytes().await?;
        debug!(url = %redact(url), bytes = bytes.len(), "downloaded");
        Ok(bytes.to_vec())
    }

    /// GET a JSON document.
    pub async fn get_json(&self, url: &str, auth: &dyn CloudAuth) -> Result<serde_json::Value> {
        let resp = self
            .execute_with_retry(url, || self.request(Method::GET, url, auth))
            .await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| CloudError::Stac(format!("{url}: {e}")))
    }

    /// Send `body` with `method` (POST or PUT) and return the response text.
    pub async fn send_bytes(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        content_type: &str,
        auth: &dyn CloudAuth,
    ) -> Result<String> {
        let resp = self
            .execute_with_retry(url, || {
                self.request(method.clone(), url, auth).map(|req| {
                    req.header("Content-Type", content_type)
                        .body(body.to_vec())
                })
            })
            .await?;
        Ok(resp.text().await?)
    }

    /// POST a JSON body and return the response text.
    pub async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        auth: &dyn CloudAuth,
    ) -> Result<String> {
        let resp = self
            .execute_with_retry(url, || {
                self.request(Method::POST, url, auth).map(|req| req.json(body))
            })
            .await?;
        Ok(resp.text().await?)
    }

    fn request(&self, method: Method, url: &str, auth: &dyn CloudAuth) -> Result<RequestBuilder> {
        let mut auth_headers = Vec::new();
        auth.sign_request(url, method.as_str(), &mut auth_headers)?;

        let mut req = self.client.request(method, url);
        for (key, value) in &auth_headers {
            req = req.header(key.as_str(), value.as_str());
        }
        Ok(req)
    }

    /// Execute a request with exponential backoff (500 ms, 1 s, 2 s, ...).
    ///
    /// Timeouts, connection failures, 429 and 5xx are retried; other
    /// statuses fail immediately.
    async fn execute_with_retry<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder>,
    {
        let mut attempt = 0;
        loop {
            match self.execute_once(url, build()?).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                    warn!(url = %redact(url), attempt, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute_once(&self, url: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CloudError::Status {
            status: status.as_u16(),
            url: redact(url).to_string(),
            body: body.chars().take(500).collect(),
        })
    }

    /// Getter for the timeout duration.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Strip the query string (SAS tokens, signatures) from a URL for logging.
pub(crate) fn redact(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_query() {
        assert_eq!(
            redact("https://acct.blob.core.windows.net/c/B4.TIF?sv=2021&sig=abc"),
            "https://acct.blob.core.windows.net/c/B4.TIF"
        );
        assert_eq!(redact("https://example.com/a.tif"), "https://example.com/a.tif");
    }

    #[test]
    fn client_builds() {
        let client = HttpClient::new(Duration::from_secs(5), 2).unwrap();
        assert_eq!(client.request_timeout(), Duration::from_secs(5));
    }
}
