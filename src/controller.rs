//! Run controller
//!
//! Owns the outer session loop: scope selection, the per-user pass over
//! every enabled category, and the special single-post and purchased-tab
//! pipelines. Fault containment is layered here: one bad category never
//! aborts a user, one bad user never aborts the pass.

use crate::api::{PaidPostRegistry, PlatformApi};
use crate::config::Config;
use crate::db::Persistence;
use crate::drm::KeyResolver;
use crate::error::Result;
use crate::progress::ProgressSink;
use crate::runner::CategoryRunner;
use crate::scope::{Prompter, ScopeSelector, Selection};
use crate::store::MediaStore;
use crate::types::{Category, CategoryTally, KeyStrategy, RunScope, ScopeMode, ScopedUser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Drives whole passes over a resolved scope
pub struct RunController {
    api: Arc<dyn PlatformApi>,
    store: Arc<dyn MediaStore>,
    persistence: Arc<dyn Persistence>,
    progress: Arc<dyn ProgressSink>,
    selector: ScopeSelector,
    key_strategy: KeyStrategy,
    config: Config,
    config_path: Option<PathBuf>,
    paid_post_ids: PaidPostRegistry,
}

impl RunController {
    /// Wire a controller over its collaborators.
    ///
    /// `config_path` is where edited configuration is written back; `None`
    /// keeps edits in memory only.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api: Arc<dyn PlatformApi>,
        store: Arc<dyn MediaStore>,
        persistence: Arc<dyn Persistence>,
        progress: Arc<dyn ProgressSink>,
        prompter: Arc<dyn Prompter>,
        key_strategy: KeyStrategy,
        config: Config,
        config_path: Option<PathBuf>,
    ) -> Self {
        let selector = ScopeSelector::new(api.clone(), prompter);
        Self {
            api,
            store,
            persistence,
            progress,
            selector,
            key_strategy,
            config,
            config_path,
            paid_post_ids: PaidPostRegistry::new(),
        }
    }

    /// Run the session: one silent pass when `interactive` is false,
    /// otherwise the menu loop until the user exits.
    pub async fn run_session(&mut self, interactive: bool) -> Result<()> {
        let subscribers = self
            .api
            .fetch_subscriptions(
                self.config.include_expired_subscriptions,
                self.config.include_restricted_subscriptions,
            )
            .await?;
        tracing::info!(count = subscribers.len(), "subscriptions fetched");

        if !interactive {
            let scope = self
                .selector
                .resolve_non_interactive(&self.config, &subscribers)
                .await?;
            return self.run_pass(scope).await;
        }

        loop {
            match self.selector.select(&self.config, &subscribers).await? {
                Selection::Exit => return Ok(()),
                Selection::ConfigEdited(edited) => {
                    if let Some(path) = &self.config_path {
                        edited.save(path)?;
                    }
                    self.config = edited;
                    tracing::info!("configuration updated");
                }
                Selection::Scope(scope) => self.run_pass(scope).await?,
            }
        }
    }

    /// Run one pass over a resolved scope
    async fn run_pass(&self, scope: RunScope) -> Result<()> {
        let start = Instant::now();
        let runner = self.runner();

        match scope.mode {
            ScopeMode::SinglePost(post_id) => {
                self.run_single_post(&runner, &scope, post_id).await?;
            }
            ScopeMode::PurchasedTab => {
                self.run_purchased_tab(&runner).await?;
            }
            _ => {
                for user in &scope.users {
                    if let Err(e) = self.run_user(&runner, user).await {
                        tracing::error!(
                            user = %user.username,
                            error = %e,
                            "creator failed, continuing with the next one"
                        );
                    }
                }
            }
        }

        tracing::info!(
            minutes = start.elapsed().as_secs() / 60,
            "pass completed"
        );
        Ok(())
    }

    async fn run_single_post(
        &self,
        runner: &CategoryRunner,
        scope: &RunScope,
        post_id: i64,
    ) -> Result<()> {
        let Some(user) = scope.users.first() else {
            return Ok(());
        };
        let folder = self.config.folder_for(&user.username);
        self.persistence.ensure_category_tables(&folder).await?;
        self.persistence.record_user(&folder, user).await?;

        let descriptors = self.api.fetch_single_post(post_id).await?;
        let tally = runner
            .run_descriptors(Category::SinglePost, descriptors, &folder)
            .await;
        if tally.found == 0 {
            tracing::warn!(post_id, "post has no downloadable media");
        } else if tally.newly_downloaded > 0 {
            tracing::info!(post_id, "post downloaded");
        } else {
            tracing::info!(post_id, "post already downloaded");
        }
        Ok(())
    }

    async fn run_purchased_tab(&self, runner: &CategoryRunner) -> Result<()> {
        let groups = self.api.fetch_purchased_tab(&self.paid_post_ids).await?;
        if groups.is_empty() {
            tracing::info!("no purchased content found");
            return Ok(());
        }
        for group in groups {
            let folder = self.config.folder_for(&group.user.username);
            self.persistence.ensure_category_tables(&folder).await?;
            self.persistence.record_user(&folder, &group.user).await?;

            let posts = runner
                .run_descriptors(Category::PaidPost, group.paid_posts, &folder)
                .await;
            let messages = runner
                .run_descriptors(Category::PaidMessage, group.paid_messages, &folder)
                .await;
            self.log_breakdown(
                &group.user.username,
                &[
                    (Category::PaidPost, posts),
                    (Category::PaidMessage, messages),
                ],
            );
        }
        Ok(())
    }

    /// The full per-user category pass
    async fn run_user(&self, runner: &CategoryRunner, user: &ScopedUser) -> Result<()> {
        tracing::info!(user = %user.username, "processing creator");
        let folder = self.config.folder_for(&user.username);
        self.persistence.ensure_category_tables(&folder).await?;
        self.persistence.record_user(&folder, user).await?;

        if self.config.download_avatar_header_photo {
            self.download_profile_assets(user, &folder).await;
        }

        let mut tallies = Vec::new();
        for category in Category::ALL {
            if !self.config.categories.enabled(category) {
                continue;
            }
            match runner
                .run(category, user, &folder, &self.paid_post_ids)
                .await
            {
                Ok(tally) => tallies.push((category, tally)),
                Err(e) => {
                    tracing::error!(
                        user = %user.username,
                        category = %category,
                        error = %e,
                        "category failed, continuing with the next one"
                    );
                }
            }
        }
        self.log_breakdown(&user.username, &tallies);
        Ok(())
    }

    async fn download_profile_assets(&self, user: &ScopedUser, folder: &std::path::Path) {
        let info = match self.api.fetch_user_info(&user.username).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(user = %user.username, error = %e, "user info fetch failed");
                return;
            }
        };
        for (name, url) in [("avatar", info.avatar), ("header", info.header)] {
            let Some(url) = url else { continue };
            if let Err(e) = self.store.store_profile_asset(folder, name, &url).await {
                tracing::warn!(user = %user.username, asset = name, error = %e, "profile asset failed");
            }
        }
    }

    fn log_breakdown(&self, username: &str, tallies: &[(Category, CategoryTally)]) {
        let mut total = CategoryTally::empty();
        for (_, tally) in tallies {
            total.found += tally.found;
            total.already_downloaded += tally.already_downloaded;
            total.newly_downloaded += tally.newly_downloaded;
            total.skipped += tally.skipped;
        }
        tracing::info!(
            user = username,
            found = total.found,
            already = total.already_downloaded,
            new = total.newly_downloaded,
            skipped = total.skipped,
            "creator completed"
        );
    }

    /// Build a category runner reflecting the current configuration
    fn runner(&self) -> CategoryRunner {
        CategoryRunner::new(
            self.api.clone(),
            self.store.clone(),
            KeyResolver::new(self.api.clone(), self.key_strategy),
            self.progress.clone(),
            self.config.formats.clone(),
            self.config.show_scrape_size,
        )
    }
}
