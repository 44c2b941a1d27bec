//! OAuth 2.0 bearer tokens, as used by the Google Cloud Storage JSON API.

use crate::auth::CloudAuth;
use crate::error::{CloudError, Result};

/// Environment variables consulted by [`BearerAuth::from_env`], in order.
pub const TOKEN_ENV_VARS: [&str; 2] = ["LCMAP_ACCESS_TOKEN", "GOOGLE_OAUTH_ACCESS_TOKEN"];

/// Static bearer token (e.g. the output of `gcloud auth print-access-token`).
#[derive(Clone)]
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(CloudError::Auth("empty access token".into()));
        }
        Ok(Self { token })
    }

    /// Read the token from the first non-empty variable of [`TOKEN_ENV_VARS`].
    pub fn from_env() -> Result<Self> {
        TOKEN_ENV_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|v| !v.trim().is_empty())
            .map(Self::new)
            .unwrap_or_else(|| {
                Err(CloudError::Auth(format!(
                    "no access token; set one of {}",
                    TOKEN_ENV_VARS.join(", ")
                )))
            })
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth").field("token", &"***").finish()
    }
}

impl CloudAuth for BearerAuth {
    fn sign_request(
        &self,
        _url: &str,
        _method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()> {
        headers.push(("Authorization".into(), format!("Bearer {}", self.token)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_authorization_header() {
        let auth = BearerAuth::new(" ya29.token\n").unwrap();
        let mut headers = Vec::new();
        auth.sign_request("https://storage.googleapis.com", "POST", &mut headers)
            .unwrap();
        assert_eq!(
            headers,
            vec![("Authorization".to_string(), "Bearer ya29.token".to_string())]
        );
    }

    #[test]
    fn empty_token_rejected_and_hidden_in_debug() {
        assert!(BearerAuth::new("  ").is_err());
        let auth = BearerAuth::new("secret").unwrap();
        assert!(!format!("{auth:?}").contains("secret"));
    }
}
