//! Scripted collaborator doubles shared by the unit tests

#![allow(clippy::unwrap_used)]

use crate::api::{PaidPostRegistry, PlatformApi, PurchasedGroup};
use crate::drm::EncryptedLocator;
use crate::error::{Error, ItemError, Result};
use crate::progress::{ProgressSink, ScopeId};
use crate::scope::{MenuChoice, Prompter};
use crate::store::{DrmBundle, MediaStore, StoreOutcome, StoreRequest};
use crate::types::{Category, ContentDescriptor, ScopedUser, UserInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Scripted [`PlatformApi`] recording every round-trip in call order
#[derive(Default)]
pub struct MockApi {
    subscriptions: Mutex<Vec<ScopedUser>>,
    lists: Mutex<HashMap<String, i64>>,
    list_members: Mutex<HashMap<i64, Vec<String>>>,
    user_infos: Mutex<HashMap<String, UserInfo>>,
    descriptors: Mutex<HashMap<(Category, i64), Vec<ContentDescriptor>>>,
    fetch_failures: Mutex<HashSet<(Category, i64)>>,
    single_posts: Mutex<HashMap<i64, Vec<ContentDescriptor>>>,
    purchased: Mutex<Vec<PurchasedGroup>>,
    pssh_overrides: Mutex<HashMap<String, Option<String>>>,
    key_failure: Mutex<Option<String>>,
    calls: Mutex<Vec<String>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every round-trip so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Override the protection header for one platform media id; `None`
    /// scripts an undecryptable manifest
    pub fn set_pssh(&self, platform_media_id: &str, pssh: Option<&str>) {
        self.pssh_overrides
            .lock()
            .unwrap()
            .insert(platform_media_id.to_string(), pssh.map(str::to_string));
    }

    /// Make every key-resolution call fail with the given reason
    pub fn fail_key_resolution(&self, reason: &str) {
        *self.key_failure.lock().unwrap() = Some(reason.to_string());
    }

    pub fn set_subscriptions(&self, users: Vec<ScopedUser>) {
        *self.subscriptions.lock().unwrap() = users;
    }

    pub fn set_lists(&self, lists: HashMap<String, i64>) {
        *self.lists.lock().unwrap() = lists;
    }

    pub fn set_list_members(&self, list_id: i64, members: Vec<String>) {
        self.list_members.lock().unwrap().insert(list_id, members);
    }

    pub fn set_user_info(&self, username: &str, info: UserInfo) {
        self.user_infos
            .lock()
            .unwrap()
            .insert(username.to_string(), info);
    }

    pub fn set_descriptors(
        &self,
        category: Category,
        platform_id: i64,
        descriptors: Vec<ContentDescriptor>,
    ) {
        self.descriptors
            .lock()
            .unwrap()
            .insert((category, platform_id), descriptors);
    }

    /// Script a fetch failure for one (category, user) pair
    pub fn fail_fetch(&self, category: Category, platform_id: i64) {
        self.fetch_failures
            .lock()
            .unwrap()
            .insert((category, platform_id));
    }

    pub fn set_single_post(&self, post_id: i64, descriptors: Vec<ContentDescriptor>) {
        self.single_posts
            .lock()
            .unwrap()
            .insert(post_id, descriptors);
    }

    pub fn set_purchased(&self, groups: Vec<PurchasedGroup>) {
        *self.purchased.lock().unwrap() = groups;
    }
}

#[async_trait]
impl PlatformApi for MockApi {
    async fn fetch_subscriptions(
        &self,
        _include_expired: bool,
        _include_restricted: bool,
    ) -> Result<Vec<ScopedUser>> {
        self.record("subscriptions".to_string());
        Ok(self.subscriptions.lock().unwrap().clone())
    }

    async fn fetch_lists(&self) -> Result<HashMap<String, i64>> {
        self.record("lists".to_string());
        Ok(self.lists.lock().unwrap().clone())
    }

    async fn fetch_list_members(&self, list_id: i64) -> Result<Vec<String>> {
        self.record(format!("list_members:{list_id}"));
        Ok(self
            .list_members
            .lock()
            .unwrap()
            .get(&list_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_user_info(&self, username: &str) -> Result<UserInfo> {
        self.record(format!("user_info:{username}"));
        Ok(self
            .user_infos
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_descriptors(
        &self,
        category: Category,
        user: &ScopedUser,
        _paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<ContentDescriptor>> {
        self.record(format!("fetch:{}:{}", category.label(), user.platform_id));
        if self
            .fetch_failures
            .lock()
            .unwrap()
            .contains(&(category, user.platform_id))
        {
            return Err(Error::Other(format!(
                "scripted fetch failure for {category}"
            )));
        }
        Ok(self
            .descriptors
            .lock()
            .unwrap()
            .get(&(category, user.platform_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_single_post(&self, post_id: i64) -> Result<Vec<ContentDescriptor>> {
        self.record(format!("single_post:{post_id}"));
        Ok(self
            .single_posts
            .lock()
            .unwrap()
            .get(&post_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_purchased_tab(
        &self,
        _paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<PurchasedGroup>> {
        self.record("purchased_tab".to_string());
        Ok(self.purchased.lock().unwrap().clone())
    }

    async fn fetch_pssh(&self, locator: &EncryptedLocator) -> Result<Option<String>> {
        self.record(format!("pssh:{}", locator.platform_media_id));
        if let Some(scripted) = self
            .pssh_overrides
            .lock()
            .unwrap()
            .get(&locator.platform_media_id)
        {
            return Ok(scripted.clone());
        }
        Ok(Some(format!("PSSH-{}", locator.platform_media_id)))
    }

    async fn fetch_manifest_last_modified(
        &self,
        locator: &EncryptedLocator,
    ) -> Result<DateTime<Utc>> {
        self.record(format!("last_modified:{}", locator.platform_media_id));
        Ok(DateTime::from_timestamp(1_700_000_000, 0).unwrap())
    }

    async fn fetch_license_headers(
        &self,
        path: &str,
        _query: &str,
    ) -> Result<HashMap<String, String>> {
        self.record(format!("license_headers:{path}"));
        Ok(HashMap::from([("sign".to_string(), "scripted".to_string())]))
    }

    async fn resolve_key_local(
        &self,
        _headers: &HashMap<String, String>,
        license_url: &str,
        _pssh: &str,
    ) -> Result<String> {
        self.record(format!("key_local:{license_url}"));
        if let Some(reason) = self.key_failure.lock().unwrap().clone() {
            return Err(Error::Other(reason));
        }
        Ok("local-key".to_string())
    }

    async fn resolve_key_remote(
        &self,
        _headers: &HashMap<String, String>,
        license_url: &str,
        _pssh: &str,
    ) -> Result<String> {
        self.record(format!("key_remote:{license_url}"));
        if let Some(reason) = self.key_failure.lock().unwrap().clone() {
            return Err(Error::Other(reason));
        }
        Ok("remote-key".to_string())
    }
}

/// Recording [`MediaStore`] with a seedable dedup set
#[derive(Default)]
pub struct RecordingStore {
    existing: Mutex<HashSet<i64>>,
    failures: Mutex<HashSet<i64>>,
    dispatches: Mutex<Vec<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-mark a media id as already downloaded
    pub fn seed_existing(&self, media_id: i64) {
        self.existing.lock().unwrap().insert(media_id);
    }

    /// Script a store failure for one media id
    pub fn fail_media(&self, media_id: i64) {
        self.failures.lock().unwrap().insert(media_id);
    }

    /// Every dispatch so far, in order
    pub fn dispatches(&self) -> Vec<String> {
        self.dispatches.lock().unwrap().clone()
    }

    fn dispatch(&self, media_id: i64, call: String) -> std::result::Result<StoreOutcome, ItemError> {
        if self.failures.lock().unwrap().contains(&media_id) {
            return Err(ItemError::Store {
                media_id,
                reason: "scripted store failure".to_string(),
            });
        }
        self.dispatches.lock().unwrap().push(call);
        let mut existing = self.existing.lock().unwrap();
        if existing.contains(&media_id) {
            Ok(StoreOutcome::already_present())
        } else {
            existing.insert(media_id);
            Ok(StoreOutcome::new_bytes(10))
        }
    }
}

#[async_trait]
impl MediaStore for RecordingStore {
    async fn store_plain(
        &self,
        request: StoreRequest<'_>,
        url: &str,
    ) -> std::result::Result<StoreOutcome, ItemError> {
        self.dispatch(request.media_id, format!("plain:{}:{}", request.media_id, url))
    }

    async fn store_drm(
        &self,
        request: StoreRequest<'_>,
        bundle: &DrmBundle,
    ) -> std::result::Result<StoreOutcome, ItemError> {
        self.dispatch(
            request.media_id,
            format!("drm:{}:{}", request.media_id, bundle.decryption_key),
        )
    }

    async fn estimate_total_bytes(&self, urls: &[String]) -> u64 {
        urls.len() as u64 * 10
    }

    async fn store_profile_asset(&self, _folder: &Path, name: &str, url: &str) -> Result<()> {
        self.dispatches
            .lock()
            .unwrap()
            .push(format!("profile:{name}:{url}"));
        Ok(())
    }
}

/// Recording [`ProgressSink`]
#[derive(Default)]
pub struct RecordingProgress {
    next_id: AtomicU64,
    events: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn open_scope(&self, label: &str, max: u64) -> ScopeId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.events
            .lock()
            .unwrap()
            .push(format!("open:{label}:{max}"));
        ScopeId(id)
    }

    fn advance(&self, scope: ScopeId, delta: u64) {
        self.events
            .lock()
            .unwrap()
            .push(format!("advance:{}:{delta}", scope.0));
    }

    fn close_scope(&self, scope: ScopeId) {
        self.events.lock().unwrap().push(format!("close:{}", scope.0));
    }
}

/// Prompter replaying a scripted sequence of answers
#[derive(Default)]
pub struct ScriptedPrompter {
    choices: Mutex<std::collections::VecDeque<MenuChoice>>,
    urls: Mutex<std::collections::VecDeque<String>>,
    list_picks: Mutex<std::collections::VecDeque<Vec<String>>>,
    user_picks: Mutex<std::collections::VecDeque<Vec<String>>>,
}

impl ScriptedPrompter {
    pub fn with_choices(choices: &[MenuChoice]) -> Self {
        Self {
            choices: Mutex::new(choices.iter().copied().collect()),
            ..Default::default()
        }
    }

    pub fn push_url(&self, url: &str) {
        self.urls.lock().unwrap().push_back(url.to_string());
    }

    pub fn push_list_pick(&self, names: &[&str]) {
        self.list_picks
            .lock()
            .unwrap()
            .push_back(names.iter().map(|s| s.to_string()).collect());
    }

    pub fn push_user_pick(&self, usernames: &[&str]) {
        self.user_picks
            .lock()
            .unwrap()
            .push_back(usernames.iter().map(|s| s.to_string()).collect());
    }
}

impl Prompter for ScriptedPrompter {
    /// Exhausted scripts exit, so a runaway selection loop ends the test
    fn main_menu(&self) -> MenuChoice {
        self.choices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(MenuChoice::Exit)
    }

    fn pick_lists(&self, _names: &[String]) -> Vec<String> {
        self.list_picks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }

    fn pick_users(&self, _usernames: &[String]) -> Vec<String> {
        self.user_picks
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default()
    }

    fn post_url(&self) -> String {
        self.urls.lock().unwrap().pop_front().unwrap_or_default()
    }

    /// Scripted edit: flips `show_scrape_size` so tests can observe that
    /// the edited config came back
    fn edit_config(&self, config: &crate::config::Config) -> crate::config::Config {
        let mut edited = config.clone();
        edited.show_scrape_size = !edited.show_scrape_size;
        edited
    }
}

/// Descriptor helper for tests
pub fn descriptor(media_id: i64, locator: &str, category: Category) -> ContentDescriptor {
    ContentDescriptor {
        media_id,
        locator: locator.to_string(),
        category,
        context: crate::types::ContentContext::empty(),
    }
}

/// ScopedUser helper for tests
pub fn scoped_user(username: &str, platform_id: i64) -> ScopedUser {
    ScopedUser {
        username: username.to_string(),
        platform_id,
    }
}
