//! Configuration and credential types for of-mirror
//!
//! Both files are JSON on disk (`auth.json`, `config.json`), matching the
//! legacy layout users already have. Missing fields fall back to serde
//! defaults so old config files keep loading after upgrades.

use crate::error::{Error, Result};
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Platform credentials loaded from `auth.json`.
///
/// Field names are SCREAMING_CASE on disk for compatibility with the legacy
/// file format.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Auth {
    /// Numeric platform user id of the account
    #[serde(rename = "USER_ID")]
    pub user_id: String,

    /// Browser user agent the session cookie was issued for
    #[serde(rename = "USER_AGENT")]
    pub user_agent: String,

    /// Browser device token
    #[serde(rename = "X_BC", default)]
    pub x_bc: String,

    /// Session cookie
    #[serde(rename = "COOKIE")]
    pub cookie: String,

    /// Legacy ffmpeg path (config.json takes precedence; kept for backward
    /// compatibility with old auth files)
    #[serde(rename = "FFMPEG_PATH", default)]
    pub ffmpeg_path: Option<PathBuf>,
}

impl Auth {
    /// Load credentials from a JSON file.
    ///
    /// A missing or invalid file is a fatal bootstrap fault.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config {
                message: format!("{} does not exist", path.display()),
                key: None,
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let auth: Auth = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("{} is invalid: {e}", path.display()),
            key: None,
        })?;
        tracing::debug!(path = %path.display(), "auth file located successfully");
        Ok(auth)
    }
}

/// Which content categories a full per-user pass downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CategoryToggles {
    /// Download free timeline posts (default: true)
    #[serde(default = "default_true")]
    pub download_posts: bool,

    /// Download purchased posts (default: true)
    #[serde(default = "default_true")]
    pub download_paid_posts: bool,

    /// Download archived posts (default: true)
    #[serde(default = "default_true")]
    pub download_archived: bool,

    /// Download live-stream recordings (default: true)
    #[serde(default = "default_true")]
    pub download_streams: bool,

    /// Download stories (default: true)
    #[serde(default = "default_true")]
    pub download_stories: bool,

    /// Download story highlights (default: true)
    #[serde(default = "default_true")]
    pub download_highlights: bool,

    /// Download direct-message attachments (default: true)
    #[serde(default = "default_true")]
    pub download_messages: bool,

    /// Download purchased direct-message attachments (default: true)
    #[serde(default = "default_true")]
    pub download_paid_messages: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            download_posts: true,
            download_paid_posts: true,
            download_archived: true,
            download_streams: true,
            download_stories: true,
            download_highlights: true,
            download_messages: true,
            download_paid_messages: true,
        }
    }
}

impl CategoryToggles {
    /// Whether the given category is enabled for the full per-user pass.
    ///
    /// `SinglePost` is never toggled; it is reached only through its own
    /// scope mode, which bypasses these flags entirely.
    pub fn enabled(&self, category: Category) -> bool {
        match category {
            Category::Post => self.download_posts,
            Category::PaidPost => self.download_paid_posts,
            Category::Archived => self.download_archived,
            Category::Stream => self.download_streams,
            Category::Story => self.download_stories,
            Category::Highlight => self.download_highlights,
            Category::Message => self.download_messages,
            Category::PaidMessage => self.download_paid_messages,
            Category::SinglePost => false,
        }
    }
}

/// Per-category filename templates.
///
/// An empty template means "use the store's default naming". Stories and
/// highlights always use default naming, as the platform attaches no usable
/// text context to them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FilenameFormats {
    /// Template for posts, archived posts, streams, and single posts
    #[serde(default)]
    pub post_filename_format: String,

    /// Template for purchased posts
    #[serde(default)]
    pub paid_post_filename_format: String,

    /// Template for message attachments
    #[serde(default)]
    pub message_filename_format: String,

    /// Template for purchased message attachments
    #[serde(default)]
    pub paid_message_filename_format: String,
}

impl FilenameFormats {
    /// The template applied to items of the given category
    pub fn for_category(&self, category: Category) -> &str {
        match category {
            Category::Post | Category::Archived | Category::Stream | Category::SinglePost => {
                &self.post_filename_format
            }
            Category::PaidPost => &self.paid_post_filename_format,
            Category::Message => &self.message_filename_format,
            Category::PaidMessage => &self.paid_message_filename_format,
            Category::Story | Category::Highlight => "",
        }
    }
}

/// Main configuration, loaded from `config.json`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Root download directory. When unset, creators are mirrored under
    /// `__user_data__/sites/OnlyFans/<username>`
    #[serde(default)]
    pub download_path: Option<PathBuf>,

    /// Path to the ffmpeg executable (auto-detected from PATH if unset)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Category enable flags for the full per-user pass
    #[serde(flatten)]
    pub categories: CategoryToggles,

    /// Per-category filename templates
    #[serde(flatten)]
    pub formats: FilenameFormats,

    /// Download each creator's avatar and header images (default: true)
    #[serde(default = "default_true")]
    pub download_avatar_header_photo: bool,

    /// Also walk expired subscriptions (default: false)
    #[serde(default)]
    pub include_expired_subscriptions: bool,

    /// Include restricted subscriptions in the subscriber set (default: false)
    #[serde(default)]
    pub include_restricted_subscriptions: bool,

    /// Pre-compute the aggregate byte size of each category so progress bars
    /// scale by bytes instead of item count (default: false; costs one HEAD
    /// request per item)
    #[serde(default)]
    pub show_scrape_size: bool,

    /// Run exactly one pass with no menus, scoped by the settings below
    #[serde(default)]
    pub non_interactive_mode: bool,

    /// In non-interactive mode, run the purchased-tab pipeline instead of
    /// the per-user category pass
    #[serde(default)]
    pub non_interactive_mode_purchased_tab: bool,

    /// In non-interactive mode, restrict the pass to this named list
    /// (empty = whole subscriber set)
    #[serde(default)]
    pub non_interactive_mode_list_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            download_path: None,
            ffmpeg_path: None,
            categories: CategoryToggles::default(),
            formats: FilenameFormats::default(),
            download_avatar_header_photo: true,
            include_expired_subscriptions: false,
            include_restricted_subscriptions: false,
            show_scrape_size: false,
            non_interactive_mode: false,
            non_interactive_mode_purchased_tab: false,
            non_interactive_mode_list_name: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing or invalid file is a fatal bootstrap fault.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config {
                message: format!("{} does not exist", path.display()),
                key: None,
            });
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("{} is invalid: {e}", path.display()),
            key: None,
        })?;
        tracing::debug!(path = %path.display(), "config file located successfully");
        Ok(config)
    }

    /// Write configuration back to disk (used by the edit-configuration menu)
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// The on-disk folder for one creator
    pub fn folder_for(&self, username: &str) -> PathBuf {
        match &self.download_path {
            Some(root) => root.join(username),
            None => PathBuf::from("__user_data__/sites/OnlyFans").join(username),
        }
    }
}

fn default_true() -> bool {
    true
}
