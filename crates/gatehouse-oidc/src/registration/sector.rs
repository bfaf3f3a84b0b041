//! Remote document fetching for registration.
//!
//! Registration needs two kinds of outbound fetches: sector identifier
//! documents (a JSON array of redirect URIs) and client/software JWKS
//! documents. Both go through [`RemoteDocumentFetcher`] so tests can stub
//! the network, and the HTTP implementation carries a bounded timeout:
//! a slow or unreachable host is a hard validation failure, never a hang.

use std::time::Duration;

use async_trait::async_trait;

use gatehouse_jose::Jwks;

use crate::AuthResult;
use crate::error::AuthError;

/// Fetches JSON documents referenced by registration metadata.
#[async_trait]
pub trait RemoteDocumentFetcher: Send + Sync {
    /// Fetches and parses a JSON document.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, timeout, non-success status,
    /// or a non-JSON body.
    async fn fetch_json(&self, uri: &str) -> AuthResult<serde_json::Value>;
}

/// Fetches the sector identifier document at `uri` and validates its shape:
/// a JSON array of URI strings.
///
/// # Errors
///
/// Returns a registration error naming `sector_identifier_uri` when the
/// document is unreachable or malformed.
pub async fn fetch_sector_document(
    fetcher: &dyn RemoteDocumentFetcher,
    uri: &str,
) -> AuthResult<Vec<String>> {
    let value = fetcher.fetch_json(uri).await.map_err(|e| {
        AuthError::registration(
            "sector_identifier_uri",
            format!("document could not be fetched: {e}"),
        )
    })?;
    let entries = value.as_array().ok_or_else(|| {
        AuthError::registration("sector_identifier_uri", "document is not a JSON array")
    })?;
    entries
        .iter()
        .map(|entry| {
            entry.as_str().map(str::to_string).ok_or_else(|| {
                AuthError::registration(
                    "sector_identifier_uri",
                    "document entries must be strings",
                )
            })
        })
        .collect()
}

/// Fetches and parses a JWKS document.
///
/// # Errors
///
/// Returns an error when the document is unreachable or not a JWKS.
pub async fn fetch_jwks(fetcher: &dyn RemoteDocumentFetcher, uri: &str) -> AuthResult<Jwks> {
    let value = fetcher.fetch_json(uri).await?;
    serde_json::from_value(value)
        .map_err(|_| AuthError::invalid_request(format!("document at {uri} is not a JWKS")))
}

/// HTTP implementation with a bounded request timeout.
pub struct HttpDocumentFetcher {
    http: reqwest::Client,
}

impl HttpDocumentFetcher {
    /// Creates a fetcher whose requests abort after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RemoteDocumentFetcher for HttpDocumentFetcher {
    async fn fetch_json(&self, uri: &str) -> AuthResult<serde_json::Value> {
        let response = self
            .http
            .get(uri)
            .send()
            .await
            .map_err(|e| AuthError::invalid_request(format!("fetch of {uri} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(AuthError::invalid_request(format!(
                "fetch of {uri} returned status {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::invalid_request(format!("body of {uri} is not JSON: {e}")))
    }
}

// =============================================================================
// Tests
// =============================================================================

/// Serves canned documents for tests; unknown URIs fail like a dead host.
#[cfg(test)]
pub(crate) struct StubFetcher {
    documents: std::collections::HashMap<String, serde_json::Value>,
}

#[cfg(test)]
impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self {
            documents: std::collections::HashMap::new(),
        }
    }

    pub(crate) fn with_document(mut self, uri: &str, document: serde_json::Value) -> Self {
        self.documents.insert(uri.to_string(), document);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl RemoteDocumentFetcher for StubFetcher {
    async fn fetch_json(&self, uri: &str) -> AuthResult<serde_json::Value> {
        self.documents
            .get(uri)
            .cloned()
            .ok_or_else(|| AuthError::invalid_request(format!("fetch of {uri} failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sector_document_parsed() {
        let fetcher = StubFetcher::new().with_document(
            "https://sector.example.com/uris.json",
            serde_json::json!(["https://a.example.com/cb", "https://b.example.com/cb"]),
        );
        let uris = fetch_sector_document(&fetcher, "https://sector.example.com/uris.json")
            .await
            .unwrap();
        assert_eq!(uris.len(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_sector_document_fails() {
        let fetcher = StubFetcher::new();
        let err = fetch_sector_document(&fetcher, "https://gone.example.com/uris.json")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::Registration {
                parameter: "sector_identifier_uri",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_array_sector_document_fails() {
        let fetcher = StubFetcher::new().with_document(
            "https://sector.example.com/uris.json",
            serde_json::json!({"uris": []}),
        );
        assert!(
            fetch_sector_document(&fetcher, "https://sector.example.com/uris.json")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_jwks_fetch() {
        let pair =
            gatehouse_jose::SigningKeyPair::generate_rsa(gatehouse_jose::SignatureAlgorithm::RS256)
                .unwrap();
        let mut jwks = Jwks::new();
        jwks.add_key(pair.to_jwk());

        let fetcher = StubFetcher::new().with_document(
            "https://client.example.com/jwks.json",
            serde_json::to_value(&jwks).unwrap(),
        );
        let fetched = fetch_jwks(&fetcher, "https://client.example.com/jwks.json")
            .await
            .unwrap();
        assert_eq!(fetched.keys.len(), 1);
    }
}
