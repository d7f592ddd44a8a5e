//! Error types for of-mirror
//!
//! The taxonomy follows the propagation policy of the orchestrator:
//! - [`Error`]: fatal bootstrap/run-level faults (bad credentials, missing
//!   config, missing external tools) plus infrastructure failures
//! - [`ItemError`]: recoverable per-item faults; one bad item must never
//!   abort a category, so these are caught and logged at the item loop
//! - [`ScopeError`]: recoverable scope-resolution faults (invalid post URL,
//!   unknown list name) that re-prompt or skip rather than terminate

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for of-mirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for of-mirror
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "download_path")
        key: Option<String>,
    },

    /// Authentication against the platform failed
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Running on an operating system the media toolchain does not support
    #[error("unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    /// A required external tool could not be located on disk or in PATH
    #[error("required tool not found: {tool}")]
    MissingTool {
        /// The tool that could not be located (e.g., "ffmpeg")
        tool: String,
        /// The path that was checked, if one was configured
        path: Option<PathBuf>,
    },

    /// SQLx database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Scope-resolution fault (recoverable: re-prompt or skip the scope)
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    /// Per-item fault that escaped the item loop (should not normally happen;
    /// the category runner catches these)
    #[error("item error: {0}")]
    Item(#[from] ItemError),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Recoverable per-item faults
///
/// Every variant here is caught at the item level by the category runner,
/// logged, and counted as a skip; the category loop continues.
#[derive(Debug, Error)]
pub enum ItemError {
    /// An encrypted locator did not pack the six required comma-separated
    /// fields (manifest URL, policy, signature, kvp, media id, content id)
    #[error("malformed encrypted locator for media {media_id}: expected 6 fields, got {fields}")]
    MalformedLocator {
        /// The media id whose locator failed to parse
        media_id: i64,
        /// How many comma-separated fields were actually present
        fields: usize,
    },

    /// The media context (originating post/message) for an item could not be
    /// matched. Logged and counted as a skip rather than dropped silently.
    #[error("no associated content metadata for media {media_id}")]
    MissingContext {
        /// The media id with no matching context record
        media_id: i64,
    },

    /// A network round-trip inside fetch/resolve/dispatch failed
    #[error("network failure for media {media_id}: {source}")]
    Network {
        /// The media id being processed when the failure occurred
        media_id: i64,
        /// The underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The store primitive failed to produce the file
    #[error("store failure for media {media_id}: {reason}")]
    Store {
        /// The media id that failed to store
        media_id: i64,
        /// What went wrong in the download/decrypt primitive
        reason: String,
    },

    /// A non-transport failure inside the key-resolution round-trips
    #[error("key resolution failed for media {media_id}: {reason}")]
    Resolution {
        /// The media id whose key could not be resolved
        media_id: i64,
        /// What went wrong (bad license response, malformed manifest, ...)
        reason: String,
    },
}

impl ItemError {
    /// The media id this fault belongs to, for structured logging
    pub fn media_id(&self) -> i64 {
        match self {
            Self::MalformedLocator { media_id, .. }
            | Self::MissingContext { media_id }
            | Self::Network { media_id, .. }
            | Self::Store { media_id, .. }
            | Self::Resolution { media_id, .. } => *media_id,
        }
    }
}

/// Recoverable scope-resolution faults
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A configured or selected list name does not exist on the account
    #[error("unknown list: {0}")]
    UnknownList(String),

    /// A user-supplied single-post URL did not match
    /// `https://onlyfans.com/<post-id>/<creator>`
    #[error("invalid post URL: {0}")]
    InvalidPostUrl(String),

    /// The single-post creator is not in the resolved subscriber set
    #[error("unknown creator: {0}")]
    UnknownCreator(String),

    /// The user chose to exit from the selection menu
    #[error("selection cancelled")]
    Cancelled,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_media_id_extraction() {
        let err = ItemError::MalformedLocator {
            media_id: 42,
            fields: 3,
        };
        assert_eq!(err.media_id(), 42);

        let err = ItemError::MissingContext { media_id: 7 };
        assert_eq!(err.media_id(), 7);
    }

    #[test]
    fn test_error_display_includes_context() {
        let err = Error::MissingTool {
            tool: "ffmpeg".to_string(),
            path: None,
        };
        assert!(err.to_string().contains("ffmpeg"));

        let err = ItemError::MalformedLocator {
            media_id: 900,
            fields: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains("900"), "message should carry the media id");
        assert!(msg.contains("4"), "message should carry the field count");
    }

    #[test]
    fn test_scope_error_converts_to_error() {
        let err: Error = ScopeError::UnknownList("friends".to_string()).into();
        assert!(matches!(err, Error::Scope(ScopeError::UnknownList(_))));
    }
}
