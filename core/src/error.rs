/*
    setlist-catalog | Authenticated catalog search for building DJ setlists.
    Copyright (C) 2025  Israel Alberto Roldan Vega

    This program is free software: you can redistribute it and/or modify
    it under the terms of the GNU Affero General Public License as published
    by the Free Software Foundation, either version 3 of the License, or
    (at your option) any later version.

    This program is distributed in the hope that it will be useful,
    but WITHOUT ANY WARRANTY; without even the implied warranty of
    MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
    GNU Affero General Public License for more details.

    You should have received a copy of the GNU Affero General Public License
    along with this program.  If not, see <https://www.gnu.org/licenses/>.
*/

use std::sync::Arc;
use thiserror::Error;

/// Everything that can go wrong while acquiring credentials or searching the catalog.
///
/// The error is `Clone` so a single failed token exchange can be handed to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CatalogError {
    #[error("Invalid request configuration: {0}")]
    InvalidRequest(String),
    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Invalid client: {0}")]
    InvalidClient(String),
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error("Server error occurred (HTTP {status})")]
    Server { status: u16 },
    #[error("Token error (HTTP {status}): {body}")]
    TokenRequest { status: u16, body: String },
    #[error("Failed to decode response: {0}")]
    Decoding(#[source] Arc<serde_json::Error>),
    #[error("Authorization was cancelled")]
    AuthorizationCancelled,
    #[error("Authorization failed: {0}")]
    Authorization(String),
}

impl CatalogError {
    /// Whether repeating the same call later may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::Network(_)
                | CatalogError::Unauthorized
                | CatalogError::RateLimited
                | CatalogError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        CatalogError::Network(Arc::new(err))
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Decoding(Arc::new(err))
    }
}

impl From<url::ParseError> for CatalogError {
    fn from(err: url::ParseError) -> Self {
        CatalogError::InvalidRequest(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CatalogError::RateLimited.is_retryable());
        assert!(CatalogError::Unauthorized.is_retryable());
        assert!(CatalogError::Server { status: 503 }.is_retryable());
        assert!(!CatalogError::InvalidClient("bad".into()).is_retryable());
        assert!(!CatalogError::AuthorizationCancelled.is_retryable());
        assert!(!CatalogError::InvalidRequest("bad".into()).is_retryable());
    }

    #[test]
    fn test_decoding_error_keeps_cause() {
        let cause = serde_json::from_str::<Vec<u32>>("{").unwrap_err();
        let err = CatalogError::from(cause);
        assert!(matches!(err, CatalogError::Decoding(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().starts_with("Failed to decode response"));
    }

    #[test]
    fn test_token_error_carries_body() {
        let err = CatalogError::TokenRequest {
            status: 400,
            body: "{\"error\":\"unsupported_grant_type\"}".into(),
        };
        assert!(err.to_string().contains("unsupported_grant_type"));
        assert!(err.to_string().contains("400"));
    }
}
