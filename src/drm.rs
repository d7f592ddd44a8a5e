//! DRM classification and key resolution
//!
//! Two pieces live here. [`classify`] is the pure boundary that routes each
//! locator to the plain or encrypted path. [`KeyResolver`] drives the
//! ordered round-trips that turn an encrypted locator into a usable
//! decryption key, or into a definitive "skip this item".

use crate::api::PlatformApi;
use crate::error::{Error, ItemError};
use crate::types::{ContentKind, KeyStrategy};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Path marker of the platform's DRM CDN. Any locator containing it is an
/// encrypted streaming manifest; everything else is a direct media URL.
pub const DRM_CDN_MARKER: &str = "cdn3.onlyfans.com/dash/files";

/// Query string appended to every license path
const LICENSE_QUERY: &str = "?type=widevine";

/// Result of classifying a locator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Direct media URL, dispatched as-is
    Plain,
    /// Encrypted streaming manifest, routed through key resolution
    Encrypted,
}

/// Classify a locator as plain or encrypted.
///
/// Pure and infallible: an unparseable-but-marker-containing locator is
/// still routed to the key resolver, which owns the parse-failure handling.
pub fn classify(locator: &str) -> Classification {
    if locator.contains(DRM_CDN_MARKER) {
        Classification::Encrypted
    } else {
        Classification::Plain
    }
}

/// The six fields packed into an encrypted locator string.
///
/// The comma-delimited encoding is a legacy wire format; it is parsed
/// exactly once here and raw strings never travel past this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedLocator {
    /// URL of the streaming manifest
    pub manifest_url: String,
    /// Signed-URL policy token
    pub policy: String,
    /// Signed-URL signature token
    pub signature: String,
    /// Signed-URL key-pair-id token
    pub kvp: String,
    /// Platform-side media id (distinct from the descriptor's `media_id`
    /// only in type; the platform serializes it as a string)
    pub platform_media_id: String,
    /// Platform-side content id (post or message id)
    pub platform_content_id: String,
}

impl EncryptedLocator {
    /// Parse the six comma-separated fields of an encrypted locator.
    ///
    /// Fewer than six fields is a malformed locator: a recoverable per-item
    /// fault that the category runner logs and skips.
    pub fn parse(locator: &str, media_id: i64) -> Result<Self, ItemError> {
        let fields: Vec<&str> = locator.split(',').collect();
        if fields.len() < 6 {
            return Err(ItemError::MalformedLocator {
                media_id,
                fields: fields.len(),
            });
        }
        Ok(Self {
            manifest_url: fields[0].to_string(),
            policy: fields[1].to_string(),
            signature: fields[2].to_string(),
            kvp: fields[3].to_string(),
            platform_media_id: fields[4].to_string(),
            platform_content_id: fields[5].to_string(),
        })
    }

    /// The media-on-content license path, substituting `post` / `message`
    /// per the content kind
    pub fn license_path(&self, kind: ContentKind) -> String {
        format!(
            "/api2/v2/users/media/{}/drm/{}/{}",
            self.platform_media_id,
            kind.path_segment(),
            self.platform_content_id
        )
    }

    /// The absolute license URL handed to the key-resolution backends
    pub fn license_url(&self, kind: ContentKind) -> String {
        format!("https://onlyfans.com{}{}", self.license_path(kind), LICENSE_QUERY)
    }
}

/// Everything the store needs to produce the decrypted media file
#[derive(Debug, Clone)]
pub struct ResolvedKey {
    /// The parsed locator the key belongs to, carried forward so raw
    /// locator strings never need re-parsing downstream
    pub locator: EncryptedLocator,
    /// Protection header extracted from the manifest
    pub pssh: String,
    /// Manifest freshness timestamp, for on-disk comparison by the store
    pub manifest_last_modified: DateTime<Utc>,
    /// Signed header bundle for the license request
    pub license_headers: HashMap<String, String>,
    /// The resolved decryption key (opaque to the orchestrator)
    pub decryption_key: String,
    /// Which backend produced the key
    pub resolution_path: KeyStrategy,
}

/// Drives the ordered key-resolution round-trips for encrypted items.
///
/// The backend strategy is injected once at construction (decided at
/// bootstrap from the presence of local key material) and is never
/// re-evaluated per item.
pub struct KeyResolver {
    api: Arc<dyn PlatformApi>,
    strategy: KeyStrategy,
}

impl KeyResolver {
    /// Create a resolver bound to one backend strategy for the whole run
    pub fn new(api: Arc<dyn PlatformApi>, strategy: KeyStrategy) -> Self {
        Self { api, strategy }
    }

    /// The process-wide strategy this resolver was constructed with
    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Resolve the decryption key for one encrypted locator.
    ///
    /// Returns `Ok(None)` when the manifest yields no protection header:
    /// the item is not decryptable under current credentials, an expected
    /// outcome the caller skips without counting as new or already-present.
    /// All other failures are recoverable per-item errors.
    pub async fn resolve(
        &self,
        locator: &str,
        media_id: i64,
        kind: ContentKind,
    ) -> Result<Option<ResolvedKey>, ItemError> {
        let encrypted = EncryptedLocator::parse(locator, media_id)?;

        let pssh = self
            .api
            .fetch_pssh(&encrypted)
            .await
            .map_err(|e| item_error(media_id, e))?;
        let Some(pssh) = pssh else {
            tracing::debug!(media_id, "no protection header, item not decryptable");
            return Ok(None);
        };

        let manifest_last_modified = self
            .api
            .fetch_manifest_last_modified(&encrypted)
            .await
            .map_err(|e| item_error(media_id, e))?;

        let license_headers = self
            .api
            .fetch_license_headers(&encrypted.license_path(kind), LICENSE_QUERY)
            .await
            .map_err(|e| item_error(media_id, e))?;

        let license_url = encrypted.license_url(kind);
        let decryption_key = match self.strategy {
            KeyStrategy::LocalKeyMaterial => {
                self.api
                    .resolve_key_local(&license_headers, &license_url, &pssh)
                    .await
            }
            KeyStrategy::RemoteKeyService => {
                self.api
                    .resolve_key_remote(&license_headers, &license_url, &pssh)
                    .await
            }
        }
        .map_err(|e| item_error(media_id, e))?;

        Ok(Some(ResolvedKey {
            locator: encrypted,
            pssh,
            manifest_last_modified,
            license_headers,
            decryption_key,
            resolution_path: self.strategy,
        }))
    }
}

/// Map an infrastructure error from the API client into the recoverable
/// per-item taxonomy
fn item_error(media_id: i64, error: Error) -> ItemError {
    match error {
        Error::Network(source) => ItemError::Network { media_id, source },
        other => ItemError::Resolution {
            media_id,
            reason: other.to_string(),
        },
    }
}
