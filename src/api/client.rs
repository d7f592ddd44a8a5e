//! reqwest-backed implementation of [`PlatformApi`]
//!
//! Owns the wire formats: JSON list payloads are translated into
//! [`ContentDescriptor`]s here, and DRM-protected media is re-encoded into
//! the six-field locator string the classifier recognizes. Nothing past this
//! boundary sees raw platform JSON.

use super::{PaidPostRegistry, PlatformApi, PurchasedGroup, SigningRules};
use crate::config::Auth;
use crate::drm::EncryptedLocator;
use crate::error::{Error, Result};
use crate::types::{Category, ContentContext, ContentDescriptor, ScopedUser, UserInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Page size used for all list endpoints
const PAGE_LIMIT: usize = 50;

/// Default remote key-resolution service
const DEFAULT_REMOTE_KEY_SERVICE: &str = "https://cdrm-project.com/api/decrypt";

/// Default local key-material service (the companion daemon that consumes
/// the key files probed at bootstrap)
const DEFAULT_LOCAL_KEY_SERVICE: &str = "http://127.0.0.1:8918/keys";

/// Authenticated platform client
pub struct OnlyFansClient {
    http: reqwest::Client,
    auth: Auth,
    rules: SigningRules,
    api_base: String,
    remote_key_service: String,
    local_key_service: String,
    pssh_pattern: Regex,
}

impl OnlyFansClient {
    /// Create a client for the given credentials and signing rules
    pub fn new(auth: Auth, rules: SigningRules) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            auth,
            rules,
            api_base: "https://onlyfans.com".to_string(),
            remote_key_service: DEFAULT_REMOTE_KEY_SERVICE.to_string(),
            local_key_service: DEFAULT_LOCAL_KEY_SERVICE.to_string(),
            // Manifest XML carries the protection header in a cenc:pssh element
            pssh_pattern: Regex::new(r"<cenc:pssh[^>]*>([^<]+)</cenc:pssh>")
                .map_err(|e| Error::Other(format!("invalid pssh pattern: {e}")))?,
        })
    }

    /// Override the API origin (tests point this at a local mock server)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    /// Override the remote key-resolution endpoint
    pub fn with_remote_key_service(mut self, url: impl Into<String>) -> Self {
        self.remote_key_service = url.into();
        self
    }

    /// Override the local key-material endpoint
    pub fn with_local_key_service(mut self, url: impl Into<String>) -> Self {
        self.local_key_service = url.into();
        self
    }

    /// Verify the session by fetching the account's own profile.
    ///
    /// A failure here is fatal: nothing else will work with a dead session.
    pub async fn verify_login(&self) -> Result<UserInfo> {
        let me: UserInfo = serde_json::from_value(self.get_json("/api2/v2/users/me", "").await?)?;
        if me.id.is_none() {
            return Err(Error::Auth(
                "session rejected, check the values in auth.json".to_string(),
            ));
        }
        tracing::debug!(
            username = me.username.as_deref().unwrap_or("?"),
            "logged in successfully"
        );
        Ok(me)
    }

    async fn get_json(&self, path: &str, query: &str) -> Result<Value> {
        let url = format!("{}{}{}", self.api_base, path, query);
        let mut request = self.http.get(&url);
        for (name, value) in self.rules.signed_headers(&self.auth, path, query) {
            request = request.header(name, value);
        }
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Walk a paged list endpoint until the platform reports no more pages
    async fn get_paged_list(&self, path: &str, extra_query: &str) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut offset = 0usize;
        loop {
            let query = format!("?limit={PAGE_LIMIT}&offset={offset}{extra_query}");
            let page = self.get_json(path, &query).await?;
            let list = page
                .get("list")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let has_more = page
                .get("hasMore")
                .and_then(Value::as_bool)
                .unwrap_or(list.len() >= PAGE_LIMIT);
            let count = list.len();
            items.extend(list);
            if !has_more || count == 0 {
                break;
            }
            offset += count;
        }
        Ok(items)
    }

    /// Manifest requests authenticate with the signed-URL cookie triple
    /// rather than the API signing headers
    fn manifest_request(&self, locator: &EncryptedLocator) -> reqwest::RequestBuilder {
        let cookie = format!(
            "CloudFront-Policy={}; CloudFront-Signature={}; CloudFront-Key-Pair-Id={}; {}",
            locator.policy, locator.signature, locator.kvp, self.auth.cookie
        );
        self.http
            .get(&locator.manifest_url)
            .header("Cookie", cookie)
            .header("User-Agent", &self.auth.user_agent)
    }

    async fn resolve_key_via(
        &self,
        service_url: &str,
        headers: &HashMap<String, String>,
        license_url: &str,
        pssh: &str,
    ) -> Result<String> {
        let payload = serde_json::json!({
            "pssh": pssh,
            "license_url": license_url,
            "headers": headers,
        });
        let response = self
            .http
            .post(service_url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;
        body.get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Other(format!("key service at {service_url} returned no key")))
    }

    /// Translate one post/message JSON object into descriptors, one per
    /// viewable media entry
    fn descriptors_from_entry(&self, entry: &Value, category: Category) -> Vec<ContentDescriptor> {
        let Some(content_id) = entry.get("id").and_then(Value::as_i64) else {
            return Vec::new();
        };
        let context = Self::context_from_entry(entry);
        let media = entry
            .get("media")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        media
            .iter()
            .filter(|m| m.get("canView").and_then(Value::as_bool).unwrap_or(false))
            .filter_map(|m| {
                let media_id = m.get("id").and_then(Value::as_i64)?;
                let locator = Self::locator_from_media(m, media_id, content_id)?;
                Some(ContentDescriptor {
                    media_id,
                    locator,
                    category,
                    context: context.clone(),
                })
            })
            .collect()
    }

    /// Either the direct source URL, or the six-field encrypted encoding
    /// assembled from the DRM manifest block
    fn locator_from_media(media: &Value, media_id: i64, content_id: i64) -> Option<String> {
        if let Some(source) = media
            .pointer("/source/source")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            return Some(source.to_string());
        }

        let manifest = media.pointer("/files/drm/manifest/dash").and_then(Value::as_str)?;
        let signature = media.pointer("/files/drm/signature/dash")?;
        let policy = signature.get("CloudFront-Policy").and_then(Value::as_str)?;
        let sig = signature.get("CloudFront-Signature").and_then(Value::as_str)?;
        let kvp = signature.get("CloudFront-Key-Pair-Id").and_then(Value::as_str)?;
        Some(format!(
            "{manifest},{policy},{sig},{kvp},{media_id},{content_id}"
        ))
    }

    fn context_from_entry(entry: &Value) -> ContentContext {
        let author = entry
            .pointer("/author/username")
            .or_else(|| entry.pointer("/fromUser/username"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let text = entry
            .get("text")
            .or_else(|| entry.get("rawText"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let created_at = entry
            .get("postedAt")
            .or_else(|| entry.get("createdAt"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        ContentContext {
            author,
            text,
            created_at,
        }
    }

    /// Purchased-tab entries for one response type ("post" / "message"),
    /// filtered to one creator when `user` is given
    async fn fetch_purchases(
        &self,
        response_type: &str,
        user: Option<&ScopedUser>,
        category: Category,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<ContentDescriptor>> {
        let entries = self.get_paged_list("/api2/v2/posts/paid", "").await?;
        let mut descriptors = Vec::new();
        for entry in &entries {
            let is_type = entry
                .get("responseType")
                .and_then(Value::as_str)
                .map(|t| t == response_type)
                .unwrap_or(false);
            if !is_type {
                continue;
            }
            if let Some(user) = user {
                let from = entry.pointer("/fromUser/username").and_then(Value::as_str);
                if from != Some(user.username.as_str()) {
                    continue;
                }
            }
            if response_type == "post" {
                if let Some(id) = entry.get("id").and_then(Value::as_i64) {
                    paid_post_ids.insert(id);
                }
            }
            descriptors.extend(self.descriptors_from_entry(entry, category));
        }
        Ok(descriptors)
    }
}

#[async_trait]
impl PlatformApi for OnlyFansClient {
    async fn fetch_subscriptions(
        &self,
        include_expired: bool,
        include_restricted: bool,
    ) -> Result<Vec<ScopedUser>> {
        let mut kinds = vec!["active"];
        if include_expired {
            kinds.push("expired");
        }

        let mut seen = std::collections::HashSet::new();
        let mut users = Vec::new();
        for kind in kinds {
            let entries = self
                .get_paged_list("/api2/v2/subscriptions/subscribes", &format!("&type={kind}"))
                .await?;
            for entry in &entries {
                let restricted = entry
                    .get("isRestricted")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if restricted && !include_restricted {
                    continue;
                }
                let (Some(username), Some(id)) = (
                    entry.get("username").and_then(Value::as_str),
                    entry.get("id").and_then(Value::as_i64),
                ) else {
                    continue;
                };
                if seen.insert(username.to_string()) {
                    users.push(ScopedUser {
                        username: username.to_string(),
                        platform_id: id,
                    });
                }
            }
        }
        Ok(users)
    }

    async fn fetch_lists(&self) -> Result<HashMap<String, i64>> {
        let entries = self.get_paged_list("/api2/v2/lists", "").await?;
        Ok(entries
            .iter()
            .filter_map(|e| {
                let name = e.get("name").and_then(Value::as_str)?;
                let id = e.get("id").and_then(Value::as_i64)?;
                Some((name.to_string(), id))
            })
            .collect())
    }

    async fn fetch_list_members(&self, list_id: i64) -> Result<Vec<String>> {
        let entries = self
            .get_paged_list(&format!("/api2/v2/lists/{list_id}/users"), "")
            .await?;
        Ok(entries
            .iter()
            .filter_map(|e| e.get("username").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    async fn fetch_user_info(&self, username: &str) -> Result<UserInfo> {
        let value = self.get_json(&format!("/api2/v2/users/{username}"), "").await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fetch_descriptors(
        &self,
        category: Category,
        user: &ScopedUser,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<ContentDescriptor>> {
        let id = user.platform_id;
        let entries = match category {
            Category::Post => self.get_paged_list(&format!("/api2/v2/users/{id}/posts"), "").await?,
            Category::Archived => {
                self.get_paged_list(&format!("/api2/v2/users/{id}/posts/archived"), "")
                    .await?
            }
            Category::Stream => {
                self.get_paged_list(&format!("/api2/v2/users/{id}/posts/streams"), "")
                    .await?
            }
            Category::Story => self.get_paged_list(&format!("/api2/v2/users/{id}/stories"), "").await?,
            Category::Highlight => {
                self.get_paged_list(&format!("/api2/v2/users/{id}/stories/highlights"), "")
                    .await?
            }
            Category::Message => {
                self.get_paged_list(&format!("/api2/v2/chats/{id}/messages"), "")
                    .await?
            }
            Category::PaidPost => {
                return self
                    .fetch_purchases("post", Some(user), Category::PaidPost, paid_post_ids)
                    .await;
            }
            Category::PaidMessage => {
                return self
                    .fetch_purchases("message", Some(user), Category::PaidMessage, paid_post_ids)
                    .await;
            }
            Category::SinglePost => {
                return Err(Error::Other(
                    "single posts are fetched by post id, not by category".to_string(),
                ));
            }
        };

        let mut descriptors = Vec::new();
        for entry in &entries {
            // A paid post already walked via the purchased surface keeps its
            // paid classification when it resurfaces on the free timeline.
            if category == Category::Post {
                if let Some(id) = entry.get("id").and_then(Value::as_i64) {
                    if paid_post_ids.contains(id) {
                        continue;
                    }
                }
            }
            descriptors.extend(self.descriptors_from_entry(entry, category));
        }
        Ok(descriptors)
    }

    async fn fetch_single_post(&self, post_id: i64) -> Result<Vec<ContentDescriptor>> {
        let entry = self
            .get_json(&format!("/api2/v2/posts/{post_id}"), "?skip_users=all")
            .await?;
        Ok(self.descriptors_from_entry(&entry, Category::SinglePost))
    }

    async fn fetch_purchased_tab(
        &self,
        paid_post_ids: &PaidPostRegistry,
    ) -> Result<Vec<PurchasedGroup>> {
        let entries = self.get_paged_list("/api2/v2/posts/paid", "").await?;
        let mut groups: Vec<PurchasedGroup> = Vec::new();
        for entry in &entries {
            let (Some(username), Some(user_id)) = (
                entry.pointer("/fromUser/username").and_then(Value::as_str),
                entry.pointer("/fromUser/id").and_then(Value::as_i64),
            ) else {
                continue;
            };
            let response_type = entry
                .get("responseType")
                .and_then(Value::as_str)
                .unwrap_or("post");
            let category = if response_type == "message" {
                Category::PaidMessage
            } else {
                if let Some(id) = entry.get("id").and_then(Value::as_i64) {
                    paid_post_ids.insert(id);
                }
                Category::PaidPost
            };
            let descriptors = self.descriptors_from_entry(entry, category);

            let idx = match groups.iter().position(|g| g.user.username == username) {
                Some(idx) => idx,
                None => {
                    groups.push(PurchasedGroup {
                        user: ScopedUser {
                            username: username.to_string(),
                            platform_id: user_id,
                        },
                        paid_posts: Vec::new(),
                        paid_messages: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            match category {
                Category::PaidMessage => groups[idx].paid_messages.extend(descriptors),
                _ => groups[idx].paid_posts.extend(descriptors),
            }
        }
        Ok(groups)
    }

    async fn fetch_pssh(&self, locator: &EncryptedLocator) -> Result<Option<String>> {
        let response = self.manifest_request(locator).send().await?;
        if !response.status().is_success() {
            // Denied manifest = not decryptable under current credentials,
            // an expected outcome rather than a fault
            tracing::debug!(
                status = %response.status(),
                manifest = %locator.manifest_url,
                "manifest not accessible, item not decryptable"
            );
            return Ok(None);
        }
        let body = response.text().await?;
        Ok(self
            .pssh_pattern
            .captures(&body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string()))
    }

    async fn fetch_manifest_last_modified(
        &self,
        locator: &EncryptedLocator,
    ) -> Result<DateTime<Utc>> {
        let response = self
            .manifest_request(locator)
            .send()
            .await?
            .error_for_status()?;
        let header = response
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Other("manifest response had no Last-Modified".to_string()))?;
        let parsed = DateTime::parse_from_rfc2822(header)
            .map_err(|e| Error::Other(format!("unparsable Last-Modified '{header}': {e}")))?;
        Ok(parsed.with_timezone(&Utc))
    }

    async fn fetch_license_headers(
        &self,
        path: &str,
        query: &str,
    ) -> Result<HashMap<String, String>> {
        Ok(self.rules.signed_headers(&self.auth, path, query))
    }

    async fn resolve_key_local(
        &self,
        headers: &HashMap<String, String>,
        license_url: &str,
        pssh: &str,
    ) -> Result<String> {
        self.resolve_key_via(&self.local_key_service, headers, license_url, pssh)
            .await
    }

    async fn resolve_key_remote(
        &self,
        headers: &HashMap<String, String>,
        license_url: &str,
        pssh: &str,
    ) -> Result<String> {
        self.resolve_key_via(&self.remote_key_service, headers, license_url, pssh)
            .await
    }
}
