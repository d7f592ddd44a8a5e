//! Media storage
//!
//! [`MediaStore`] is the dispatch seam of the category runner: it receives
//! classified items (plain locators or resolved DRM bundles) and owns
//! everything below that line, including the already-downloaded answer.
//! [`DiskStore`] is the production implementation.

mod disk;

pub use disk::DiskStore;

use crate::error::{ItemError, Result};
use crate::types::ContentContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// What the store did with one dispatched item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    /// True when new bytes were written; false when the item was already
    /// present and nothing was transferred
    pub is_new: bool,
    /// Bytes written for this item (0 when already present), used to scale
    /// byte-sized progress scopes
    pub bytes: u64,
}

impl StoreOutcome {
    /// Outcome for an item that was already on disk
    pub fn already_present() -> Self {
        Self {
            is_new: false,
            bytes: 0,
        }
    }

    /// Outcome for freshly written bytes
    pub fn new_bytes(bytes: u64) -> Self {
        Self {
            is_new: true,
            bytes,
        }
    }
}

/// Everything the store needs to produce one decrypted media file
#[derive(Debug, Clone)]
pub struct DrmBundle {
    /// URL of the streaming manifest
    pub manifest_url: String,
    /// Signed-URL policy token
    pub policy: String,
    /// Signed-URL signature token
    pub signature: String,
    /// Signed-URL key-pair-id token
    pub kvp: String,
    /// The resolved decryption key, opaque to the store beyond handing it
    /// to the media toolchain
    pub decryption_key: String,
    /// Manifest freshness timestamp; a newer manifest than the recorded one
    /// means the platform re-encoded the media and it is downloaded again
    pub last_modified: DateTime<Utc>,
}

/// One item handed to the store for dispatch
#[derive(Debug, Clone)]
pub struct StoreRequest<'a> {
    /// Stable media identity, the dedup key
    pub media_id: i64,
    /// The category the item belongs to (dedup is keyed per category)
    pub category: crate::types::Category,
    /// Creator folder the file lands under
    pub folder: &'a Path,
    /// Filename template; empty selects the store's default naming
    pub filename_format: &'a str,
    /// Templating context carried from the descriptor
    pub context: &'a ContentContext,
}

/// Byte transfer and on-disk dedup.
///
/// Per-item failures surface as [`ItemError`] so the category runner can
/// log, count, and continue; only the byte estimate is run-level fallible.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Download a plain (directly addressable) media object
    async fn store_plain(
        &self,
        request: StoreRequest<'_>,
        url: &str,
    ) -> std::result::Result<StoreOutcome, ItemError>;

    /// Produce the decrypted media file for a resolved DRM item
    async fn store_drm(
        &self,
        request: StoreRequest<'_>,
        bundle: &DrmBundle,
    ) -> std::result::Result<StoreOutcome, ItemError>;

    /// Best-effort aggregate byte size of the given plain locators, used to
    /// scale progress scopes by bytes instead of item count
    async fn estimate_total_bytes(&self, urls: &[String]) -> u64;

    /// Download a profile asset (avatar or header image) into the creator
    /// folder, skipping it when the same file is already present
    async fn store_profile_asset(&self, folder: &Path, name: &str, url: &str) -> Result<()>;
}

/// Render a filename from a template and the item's context.
///
/// Supported placeholders: `{id}`, `{username}`, `{text}`, `{date}`. An
/// empty template falls back to the media id. The extension always comes
/// from the source URL, never from the template.
pub(crate) fn render_filename(
    template: &str,
    media_id: i64,
    context: &ContentContext,
    extension: &str,
) -> String {
    let stem = if template.is_empty() {
        media_id.to_string()
    } else {
        template
            .replace("{id}", &media_id.to_string())
            .replace("{username}", context.author.as_deref().unwrap_or("unknown"))
            .replace("{text}", &sanitize(context.text.as_deref().unwrap_or("")))
            .replace(
                "{date}",
                &context
                    .created_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
            )
    };
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

/// Strip path-hostile characters from templated text and cap its length so
/// rendered names stay within filesystem limits
pub(crate) fn sanitize(text: &str) -> String {
    const MAX_LEN: usize = 100;
    let cleaned: String = text
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect();
    let trimmed = cleaned.trim();
    trimmed.chars().take(MAX_LEN).collect()
}
