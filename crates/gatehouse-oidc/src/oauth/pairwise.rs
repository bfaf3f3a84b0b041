//! Pairwise subject identifier resolution.
//!
//! Public clients all see the same subject for a user. Pairwise clients see
//! a per-sector subject derived from HMAC-SHA256 keyed with a server-wide
//! secret salt, so two clients sharing a sector identifier receive the same
//! subject and clients in distinct sectors can never correlate users.

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::AuthResult;
use crate::config::{PairwiseConfig, PairwiseIdType};
use crate::error::AuthError;
use crate::storage::PairwiseStorage;
use crate::types::{Client, SubjectType};

type HmacSha256 = Hmac<Sha256>;

/// Derives subject identifiers for issued tokens and userinfo responses.
pub struct PairwiseSubjectResolver {
    config: PairwiseConfig,
    storage: Arc<dyn PairwiseStorage>,
}

impl PairwiseSubjectResolver {
    /// Creates a new resolver.
    #[must_use]
    pub fn new(config: PairwiseConfig, storage: Arc<dyn PairwiseStorage>) -> Self {
        Self { config, storage }
    }

    /// Resolves the subject identifier for a user towards a client.
    ///
    /// # Errors
    ///
    /// Returns an error if a pairwise client has no resolvable sector.
    pub async fn resolve(&self, user_id: &str, client: &Client) -> AuthResult<String> {
        match client.subject_type {
            SubjectType::Public => Ok(user_id.to_string()),
            SubjectType::Pairwise => {
                let sector = Self::sector_for(client)?;
                match self.config.id_type {
                    PairwiseIdType::Algorithmic => Ok(self.derive(&sector, user_id)),
                    PairwiseIdType::Persistent => {
                        if let Some(existing) = self.storage.find(&sector, user_id).await? {
                            return Ok(existing);
                        }
                        let subject = self.derive(&sector, user_id);
                        self.storage.save(&sector, user_id, &subject).await?;
                        Ok(subject)
                    }
                }
            }
        }
    }

    /// The sector a pairwise client belongs to: the host of its explicit
    /// sector identifier URI, or the single shared host of its redirect set.
    ///
    /// # Errors
    ///
    /// Returns an error when neither yields exactly one host.
    pub fn sector_for(client: &Client) -> AuthResult<String> {
        if let Some(ref uri) = client.sector_identifier_uri {
            let url = Url::parse(uri).map_err(|_| {
                AuthError::invalid_client("sector_identifier_uri is not a valid URL")
            })?;
            return url
                .host_str()
                .map(str::to_string)
                .ok_or_else(|| AuthError::invalid_client("sector_identifier_uri has no host"));
        }

        let hosts = client.redirect_hosts();
        if hosts.len() == 1 {
            Ok(hosts.into_iter().next().unwrap_or_default())
        } else {
            Err(AuthError::invalid_client(
                "pairwise client has no unambiguous sector",
            ))
        }
    }

    /// Keyed derivation: HMAC-SHA256(salt, sector || 0x00 || user),
    /// base64url-encoded. Stable for identical inputs, not invertible.
    fn derive(&self, sector: &str, user_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.config.salt.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(sector.as_bytes());
        mac.update(&[0]);
        mac.update(user_id.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

// =============================================================================
// Tests
// =============================================================================
