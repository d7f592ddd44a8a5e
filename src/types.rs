//! Core types shared across the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One content category walked by a run.
///
/// Each category maps to a distinct platform API surface but is processed by
/// the same generic category runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Free timeline posts
    Post,
    /// Purchased posts
    PaidPost,
    /// Direct-message attachments
    Message,
    /// Purchased direct-message attachments
    PaidMessage,
    /// Archived posts
    Archived,
    /// Live-stream recordings
    Stream,
    /// Stories
    Story,
    /// Story highlights
    Highlight,
    /// A single post addressed by URL
    SinglePost,
}

impl Category {
    /// Human-readable label used in log lines and progress scopes
    pub fn label(&self) -> &'static str {
        match self {
            Self::Post => "Posts",
            Self::PaidPost => "Paid Posts",
            Self::Message => "Messages",
            Self::PaidMessage => "Paid Messages",
            Self::Archived => "Archived Posts",
            Self::Stream => "Streams",
            Self::Story => "Stories",
            Self::Highlight => "Highlights",
            Self::SinglePost => "Single Post",
        }
    }

    /// Which license-path template the key resolver substitutes for items
    /// of this category
    pub fn content_kind(&self) -> ContentKind {
        match self {
            Self::Message | Self::PaidMessage => ContentKind::Message,
            _ => ContentKind::Post,
        }
    }

    /// Every category the full per-user pass can run, in pass order
    pub const ALL: [Category; 8] = [
        Category::PaidPost,
        Category::Post,
        Category::Archived,
        Category::Stream,
        Category::Story,
        Category::Highlight,
        Category::Message,
        Category::PaidMessage,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Selects the `post` / `message` substitution in license-request paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// Media attached to a post (free, paid, archived, stream, story)
    Post,
    /// Media attached to a direct message (free or paid)
    Message,
}

impl ContentKind {
    /// The path segment substituted into the license URL template
    pub fn path_segment(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Message => "message",
        }
    }
}

/// One downloadable media unit.
///
/// `media_id` is the sole dedup key and is stable across runs; the `locator`
/// may legitimately change between runs (signed URLs expire) without the
/// item being treated as new.
#[derive(Debug, Clone)]
pub struct ContentDescriptor {
    /// Stable media identity, unique within a category+user scope
    pub media_id: i64,
    /// Direct media URL, or the six-field encrypted-manifest encoding
    pub locator: String,
    /// The category this descriptor was fetched from
    pub category: Category,
    /// Author/sender identity and originating text, used only for filename
    /// templating; opaque to the orchestrator and passed through unchanged
    pub context: ContentContext,
}

/// Filename-templating context attached to a descriptor.
///
/// The orchestrator never inspects these fields; they travel to the media
/// store, which substitutes them into the configured filename format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentContext {
    /// Creator or sender username
    pub author: Option<String>,
    /// Originating post/message text
    pub text: Option<String>,
    /// Originating post/message date
    pub created_at: Option<DateTime<Utc>>,
}

impl ContentContext {
    /// A context with no metadata; the store falls back to default naming
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Which of the two key-resolution backends serves this process.
///
/// Selected exactly once at bootstrap from the presence of local key
/// material, then injected into the key resolver and never re-probed per item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStrategy {
    /// Local key-material files were found at startup; use the local
    /// resolution primitive
    LocalKeyMaterial,
    /// No usable local key material; use the remote key-resolution service
    RemoteKeyService,
}

/// Per-category counters for one run.
///
/// Created at category start, read by the run controller for the
/// end-of-user summary, then discarded. When no item was skipped,
/// `already_downloaded + newly_downloaded == found`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryTally {
    /// Descriptors the fetch produced
    pub found: u64,
    /// Items the store reported as already present on disk
    pub already_downloaded: u64,
    /// Items for which new bytes were written
    pub newly_downloaded: u64,
    /// Items excluded from both counts: undecryptable manifests, malformed
    /// locators, missing context, per-item faults
    pub skipped: u64,
}

impl CategoryTally {
    /// A tally for an empty category
    pub fn empty() -> Self {
        Self::default()
    }

    /// Total items accounted for so far
    pub fn accounted(&self) -> u64 {
        self.already_downloaded + self.newly_downloaded + self.skipped
    }

    /// The per-category summary line shown after the category completes
    pub fn summary(&self, label: &str) -> String {
        format!(
            "{label} Already Downloaded: {} New: {}",
            self.already_downloaded, self.newly_downloaded
        )
    }
}

/// A creator resolved into a run scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedUser {
    /// Creator username (folder key)
    pub username: String,
    /// Platform-side numeric user id
    pub platform_id: i64,
}

/// How the current pass's scope was selected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeMode {
    /// Every subscribed creator
    AllUsers,
    /// Creators on one or more named lists
    ListSubset,
    /// A hand-picked subset of creators
    CustomSubset,
    /// One post addressed by URL; categories are bypassed entirely
    SinglePost(i64),
    /// The purchased tab; runs the fixed paid-post + paid-message pipeline
    PurchasedTab,
}

/// The resolved set of creators plus the mode that selected them.
///
/// Built once per pass by the scope selector and immutable for the duration
/// of that pass.
#[derive(Debug, Clone)]
pub struct RunScope {
    /// Selection mode for this pass
    pub mode: ScopeMode,
    /// The creators the pass will process (empty for purchased-tab scope,
    /// where the creator set is derived from the tab itself)
    pub users: Vec<ScopedUser>,
}

impl RunScope {
    /// Scope over every known subscriber
    pub fn all(users: Vec<ScopedUser>) -> Self {
        Self {
            mode: ScopeMode::AllUsers,
            users,
        }
    }
}

/// Platform-side account info for a creator
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfo {
    /// Numeric platform id
    pub id: Option<i64>,
    /// Username
    pub username: Option<String>,
    /// Display name
    pub name: Option<String>,
    /// Avatar image URL
    pub avatar: Option<String>,
    /// Header/banner image URL
    pub header: Option<String>,
}
