//! Generic category runner
//!
//! One runner processes every content category: fetch the descriptors,
//! classify each locator, resolve keys for encrypted items, dispatch to the
//! store, and tally the outcomes. Per-item faults are logged and counted,
//! never propagated; the loop always reaches the end of the category.

use crate::api::{PaidPostRegistry, PlatformApi};
use crate::config::FilenameFormats;
use crate::drm::{Classification, KeyResolver, classify};
use crate::error::{ItemError, Result};
use crate::progress::ProgressSink;
use crate::store::{DrmBundle, MediaStore, StoreOutcome, StoreRequest};
use crate::types::{Category, CategoryTally, ContentDescriptor, ScopedUser};
use std::path::Path;
use std::sync::Arc;

/// Runs one (category, user) pair end to end
pub struct CategoryRunner {
    api: Arc<dyn PlatformApi>,
    store: Arc<dyn MediaStore>,
    resolver: KeyResolver,
    progress: Arc<dyn ProgressSink>,
    formats: FilenameFormats,
    show_scrape_size: bool,
}

impl CategoryRunner {
    /// Wire a runner over its collaborators
    pub fn new(
        api: Arc<dyn PlatformApi>,
        store: Arc<dyn MediaStore>,
        resolver: KeyResolver,
        progress: Arc<dyn ProgressSink>,
        formats: FilenameFormats,
        show_scrape_size: bool,
    ) -> Self {
        Self {
            api,
            store,
            resolver,
            progress,
            formats,
            show_scrape_size,
        }
    }

    /// Fetch and process one category for one creator.
    ///
    /// A fetch failure aborts only this category; the caller logs it and
    /// moves on to the next one.
    pub async fn run(
        &self,
        category: Category,
        user: &ScopedUser,
        folder: &Path,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<CategoryTally> {
        let descriptors = self
            .api
            .fetch_descriptors(category, user, paid_post_ids)
            .await?;
        Ok(self.run_descriptors(category, descriptors, folder).await)
    }

    /// Process an already-fetched descriptor set.
    ///
    /// Used directly for single-post and purchased-tab scopes, where the
    /// descriptors arrive outside the per-category fetch path.
    pub async fn run_descriptors(
        &self,
        category: Category,
        descriptors: Vec<ContentDescriptor>,
        folder: &Path,
    ) -> CategoryTally {
        if descriptors.is_empty() {
            tracing::debug!(category = %category, "no items found");
            return CategoryTally::empty();
        }

        let mut tally = CategoryTally {
            found: descriptors.len() as u64,
            ..CategoryTally::empty()
        };
        let filename_format = self.formats.for_category(category);

        // Byte scaling costs one HEAD per plain item, so it is opt-in
        let mut by_bytes = false;
        let mut max = descriptors.len() as u64;
        if self.show_scrape_size {
            let plain_urls: Vec<String> = descriptors
                .iter()
                .filter(|d| classify(&d.locator) == Classification::Plain)
                .map(|d| d.locator.clone())
                .collect();
            let total = self.store.estimate_total_bytes(&plain_urls).await;
            if total > 0 {
                by_bytes = true;
                max = total;
            }
        }

        let scope = self.progress.open_scope(category.label(), max);
        for descriptor in &descriptors {
            match self.process(category, descriptor, folder, filename_format).await {
                Ok(Some(outcome)) => {
                    if outcome.is_new {
                        tally.newly_downloaded += 1;
                    } else {
                        tally.already_downloaded += 1;
                    }
                    if by_bytes {
                        // The estimate covers plain items only, so encrypted
                        // items must not push the bar past its max
                        if classify(&descriptor.locator) == Classification::Plain {
                            self.progress.advance(scope, outcome.bytes);
                        }
                    } else {
                        self.progress.advance(scope, 1);
                    }
                }
                Ok(None) => {
                    tally.skipped += 1;
                    if !by_bytes {
                        self.progress.advance(scope, 1);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        category = %category,
                        media_id = e.media_id(),
                        error = %e,
                        "item failed, skipping"
                    );
                    tally.skipped += 1;
                    if !by_bytes {
                        self.progress.advance(scope, 1);
                    }
                }
            }
        }
        self.progress.close_scope(scope);

        tracing::info!("{}", tally.summary(category.label()));
        tally
    }

    /// Classify, resolve, and dispatch one item. `Ok(None)` is the expected
    /// skip for undecryptable manifests.
    async fn process(
        &self,
        category: Category,
        descriptor: &ContentDescriptor,
        folder: &Path,
        filename_format: &str,
    ) -> std::result::Result<Option<StoreOutcome>, ItemError> {
        let request = StoreRequest {
            media_id: descriptor.media_id,
            category,
            folder,
            filename_format,
            context: &descriptor.context,
        };
        match classify(&descriptor.locator) {
            Classification::Plain => {
                let outcome = self.store.store_plain(request, &descriptor.locator).await?;
                Ok(Some(outcome))
            }
            Classification::Encrypted => {
                let Some(resolved) = self
                    .resolver
                    .resolve(&descriptor.locator, descriptor.media_id, category.content_kind())
                    .await?
                else {
                    return Ok(None);
                };
                let bundle = DrmBundle {
                    manifest_url: resolved.locator.manifest_url.clone(),
                    policy: resolved.locator.policy.clone(),
                    signature: resolved.locator.signature.clone(),
                    kvp: resolved.locator.kvp.clone(),
                    decryption_key: resolved.decryption_key.clone(),
                    last_modified: resolved.manifest_last_modified,
                };
                let outcome = self.store.store_drm(request, &bundle).await?;
                Ok(Some(outcome))
            }
        }
    }
}
