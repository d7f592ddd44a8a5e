//! # of-mirror
//!
//! Personal content-mirroring library for a subscription platform: it
//! enumerates the creators an account subscribes to, walks their content
//! categories (posts, paid posts, messages, archived, streams, stories,
//! highlights), and downloads every referenced media object exactly once.
//! Encrypted streaming items go through a multi-step key resolution before
//! the media file is produced.
//!
//! ## Design Philosophy
//!
//! - **One generic runner** - Every category flows through the same
//!   fetch / classify / resolve / dispatch / tally pipeline
//! - **Traits at the seams** - Platform API, media store, persistence,
//!   progress, and prompting are all injectable, so the orchestration core
//!   is testable without a network, a disk, or a terminal
//! - **Per-item fault containment** - One bad item never aborts a category,
//!   one bad category never aborts a creator, one bad creator never aborts
//!   the run
//!
//! ## Quick Start
//!
//! ```no_run
//! use of_mirror::{
//!     Config, DbCache, DiskStore, KeyStrategy, OnlyFansClient, RunController, SigningRules,
//! };
//! use of_mirror::config::Auth;
//! use of_mirror::progress::NoOpProgress;
//! use of_mirror::ui::TerminalPrompter;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let auth = Auth::load("auth.json".as_ref())?;
//!     let config = Config::load("config.json".as_ref())?;
//!
//!     let client = Arc::new(OnlyFansClient::new(auth.clone(), SigningRules::default())?);
//!     client.verify_login().await?;
//!
//!     let db = Arc::new(DbCache::new());
//!     let store = Arc::new(DiskStore::new(
//!         reqwest::Client::new(),
//!         db.clone(),
//!         "ffmpeg".into(),
//!         auth.user_agent.clone(),
//!     ));
//!
//!     let mut controller = RunController::new(
//!         client,
//!         store,
//!         db,
//!         Arc::new(NoOpProgress::new()),
//!         Arc::new(TerminalPrompter::new()),
//!         KeyStrategy::RemoteKeyService,
//!         config,
//!         None,
//!     );
//!     controller.run_session(false).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Platform API client and access trait
pub mod api;
/// One-time process bootstrap checks
pub mod bootstrap;
/// Configuration and credential types
pub mod config;
/// Run controller and session loop
pub mod controller;
/// Per-creator persistence layer
pub mod db;
/// DRM classification and key resolution
pub mod drm;
/// Error types
pub mod error;
/// Progress reporting seam
pub mod progress;
/// Generic category runner
pub mod runner;
/// Run-scope selection
pub mod scope;
/// Media storage
pub mod store;
/// Core types
pub mod types;
/// Terminal front end
pub mod ui;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use api::{OnlyFansClient, PaidPostRegistry, PlatformApi, PurchasedGroup, SigningRules};
pub use config::{Auth, CategoryToggles, Config, FilenameFormats};
pub use controller::RunController;
pub use db::{Database, DbCache, Persistence};
pub use drm::{Classification, EncryptedLocator, KeyResolver, ResolvedKey, classify};
pub use error::{Error, ItemError, Result, ScopeError};
pub use progress::{NoOpProgress, ProgressSink, ScopeId};
pub use runner::CategoryRunner;
pub use scope::{MenuChoice, Prompter, ScopeSelector, Selection, parse_post_url};
pub use store::{DiskStore, DrmBundle, MediaStore, StoreOutcome, StoreRequest};
pub use types::{
    Category, CategoryTally, ContentContext, ContentDescriptor, ContentKind, KeyStrategy,
    RunScope, ScopeMode, ScopedUser, UserInfo,
};
