//! Request signing for catalogs and storage providers.

mod bearer;
mod none;

pub use bearer::BearerAuth;
pub use none::NoAuth;

use crate::error::Result;

/// Trait for signing HTTP requests to cloud storage providers.
///
/// Implementations add authentication headers to outgoing requests before
/// they are sent.
pub trait CloudAuth: Send + Sync {
    /// Add authentication headers for a `method` request to `url`.
    fn sign_request(
        &self,
        url: &str,
        method: &str,
        headers: &mut Vec<(String, String)>,
    ) -> Result<()>;
}
