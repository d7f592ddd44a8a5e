//! Platform API access
//!
//! [`PlatformApi`] is the seam between the orchestrator and the platform:
//! every network round-trip the core performs goes through this trait, which
//! keeps the category runner and key resolver testable against scripted
//! fakes. [`OnlyFansClient`] is the reqwest-backed production implementation.

mod client;
mod signing;

pub use client::OnlyFansClient;
pub use signing::SigningRules;

use crate::drm::EncryptedLocator;
use crate::error::Result;
use crate::types::{Category, ContentDescriptor, ScopedUser, UserInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One creator's slice of the purchased tab: the paid posts and paid
/// messages bought from them, pre-grouped by the platform
#[derive(Debug, Clone)]
pub struct PurchasedGroup {
    /// The creator the purchases belong to
    pub user: ScopedUser,
    /// Purchased post media
    pub paid_posts: Vec<ContentDescriptor>,
    /// Purchased message media
    pub paid_messages: Vec<ContentDescriptor>,
}

/// Process-wide registry of content ids already classified as paid.
///
/// Read by multiple category fetchers so an item discovered via two API
/// surfaces (e.g. a paid post that also appears on the free timeline) is
/// classified once. Append-only for the duration of a run; a mutex guards
/// it so a future concurrent runner needs no redesign.
#[derive(Debug, Default)]
pub struct PaidPostRegistry {
    ids: std::sync::Mutex<std::collections::HashSet<i64>>,
}

impl PaidPostRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a content id as paid. Returns false if it was already present.
    pub fn insert(&self, content_id: i64) -> bool {
        match self.ids.lock() {
            Ok(mut ids) => ids.insert(content_id),
            Err(poisoned) => poisoned.into_inner().insert(content_id),
        }
    }

    /// Whether the content id is already classified as paid
    pub fn contains(&self, content_id: i64) -> bool {
        match self.ids.lock() {
            Ok(ids) => ids.contains(&content_id),
            Err(poisoned) => poisoned.into_inner().contains(&content_id),
        }
    }

    /// Number of ids recorded so far
    pub fn len(&self) -> usize {
        match self.ids.lock() {
            Ok(ids) => ids.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether no ids have been recorded
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Authenticated access to the platform API.
///
/// The orchestrator core drives these calls but owns none of their wire
/// formats; implementations translate platform responses into the crate's
/// descriptor model.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// The merged subscriber set (active subscriptions, plus expired ones
    /// when `include_expired` is set)
    async fn fetch_subscriptions(
        &self,
        include_expired: bool,
        include_restricted: bool,
    ) -> Result<Vec<ScopedUser>>;

    /// Creator-defined lists on the account, name → list id
    async fn fetch_lists(&self) -> Result<HashMap<String, i64>>;

    /// Usernames on one list
    async fn fetch_list_members(&self, list_id: i64) -> Result<Vec<String>>;

    /// Account info for one creator
    async fn fetch_user_info(&self, username: &str) -> Result<UserInfo>;

    /// Media descriptors for one (user, category) pair.
    ///
    /// Paid-post fetches append the post ids they see to `paid_post_ids`;
    /// free-post fetches consult the registry to avoid double-classifying
    /// an item discovered via both surfaces.
    async fn fetch_descriptors(
        &self,
        category: Category,
        user: &ScopedUser,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<ContentDescriptor>>;

    /// Media descriptors for a single post addressed by id
    async fn fetch_single_post(&self, post_id: i64) -> Result<Vec<ContentDescriptor>>;

    /// The whole purchased tab, grouped per creator
    async fn fetch_purchased_tab(
        &self,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<PurchasedGroup>>;

    /// The protection header of an encrypted manifest.
    ///
    /// `Ok(None)` means the manifest is not decryptable under the current
    /// credentials, an expected outcome rather than a fault.
    async fn fetch_pssh(&self, locator: &EncryptedLocator) -> Result<Option<String>>;

    /// Last-Modified timestamp of an encrypted manifest, used by the store
    /// for on-disk freshness comparison
    async fn fetch_manifest_last_modified(
        &self,
        locator: &EncryptedLocator,
    ) -> Result<DateTime<Utc>>;

    /// The signed header bundle scoped to one media-on-content license path
    async fn fetch_license_headers(
        &self,
        path: &str,
        query: &str,
    ) -> Result<HashMap<String, String>>;

    /// Resolve a decryption key through the local key-material service
    async fn resolve_key_local(
        &self,
        headers: &HashMap<String, String>,
        license_url: &str,
        pssh: &str,
    ) -> Result<String>;

    /// Resolve a decryption key through the remote key service
    async fn resolve_key_remote(
        &self,
        headers: &HashMap<String, String>,
        license_url: &str,
        pssh: &str,
    ) -> Result<String>;
}
