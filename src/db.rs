//! Per-creator persistence layer
//!
//! Each creator folder carries a `user_data.db` SQLite file with two tables:
//! `profiles` tracks the username ↔ platform-id pairing (so creator renames
//! are detected across runs), and `medias` records every downloaded media
//! id per category, the sole source of "already downloaded" answers.

use crate::error::{Error, Result};
use crate::types::{Category, ScopedUser};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Database file name inside each creator folder
const DB_FILE: &str = "user_data.db";

/// Narrow persistence contract consumed by the run controller.
///
/// The controller only ever needs to prepare a folder's tables and record
/// the creator identity; dedup queries belong to the media store.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Create the folder and its category tables if absent
    async fn ensure_category_tables(&self, folder: &Path) -> Result<()>;

    /// Record the username ↔ platform-id pairing, detecting renames
    async fn record_user(&self, folder: &Path, user: &ScopedUser) -> Result<()>;
}

/// Open handle to one creator folder's database
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database for one creator folder
    pub async fn open(folder: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(folder).await?;
        let options = SqliteConnectOptions::new()
            .filename(folder.join(DB_FILE))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;
        let db = Self { pool };
        db.ensure_tables().await?;
        Ok(db)
    }

    async fn ensure_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS profiles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL UNIQUE,
                username TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS medias (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                media_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                filename TEXT,
                manifest_last_modified INTEGER,
                downloaded_at INTEGER NOT NULL,
                UNIQUE(media_id, category)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record the creator identity; an existing row with a different
    /// username means the creator renamed since the last run
    pub async fn record_user(&self, user: &ScopedUser) -> Result<()> {
        let existing = sqlx::query("SELECT username FROM profiles WHERE user_id = ?")
            .bind(user.platform_id)
            .fetch_optional(&self.pool)
            .await?;

        match existing {
            Some(row) => {
                let known: String = row.try_get("username")?;
                if known != user.username {
                    tracing::info!(
                        platform_id = user.platform_id,
                        old = %known,
                        new = %user.username,
                        "creator renamed since last run"
                    );
                    sqlx::query("UPDATE profiles SET username = ? WHERE user_id = ?")
                        .bind(&user.username)
                        .bind(user.platform_id)
                        .execute(&self.pool)
                        .await?;
                }
            }
            None => {
                sqlx::query("INSERT INTO profiles (user_id, username) VALUES (?, ?)")
                    .bind(user.platform_id)
                    .bind(&user.username)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Whether a media id was already downloaded in this category
    pub async fn is_downloaded(&self, media_id: i64, category: Category) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM medias WHERE media_id = ? AND category = ?")
            .bind(media_id)
            .bind(category.label())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// The recorded manifest timestamp of a downloaded DRM item, if any
    pub async fn manifest_last_modified(
        &self,
        media_id: i64,
        category: Category,
    ) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT manifest_last_modified FROM medias WHERE media_id = ? AND category = ?",
        )
        .bind(media_id)
        .bind(category.label())
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let ts: Option<i64> = row.try_get("manifest_last_modified")?;
        Ok(ts.and_then(|t| DateTime::from_timestamp(t, 0)))
    }

    /// Record a completed download (idempotent per media id + category)
    pub async fn record_download(
        &self,
        media_id: i64,
        category: Category,
        filename: &str,
        manifest_last_modified: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO medias
                (media_id, category, filename, manifest_last_modified, downloaded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(media_id)
        .bind(category.label())
        .bind(filename)
        .bind(manifest_last_modified.map(|t| t.timestamp()))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Registry of open per-folder databases, shared between the controller
/// (identity/table setup) and the disk store (dedup queries) so both see
/// one pool per folder
#[derive(Default)]
pub struct DbCache {
    open: tokio::sync::Mutex<HashMap<PathBuf, Database>>,
}

impl DbCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// The database for a folder, opening it on first use
    pub async fn database_for(&self, folder: &Path) -> Result<Database> {
        let mut open = self.open.lock().await;
        if let Some(db) = open.get(folder) {
            return Ok(db.clone());
        }
        let db = Database::open(folder).await?;
        open.insert(folder.to_path_buf(), db.clone());
        Ok(db)
    }
}

#[async_trait]
impl Persistence for DbCache {
    async fn ensure_category_tables(&self, folder: &Path) -> Result<()> {
        // Opening the database creates the tables
        self.database_for(folder).await.map(|_| ())
    }

    async fn record_user(&self, folder: &Path, user: &ScopedUser) -> Result<()> {
        self.database_for(folder).await?.record_user(user).await
    }
}

/// In-memory persistence for tests and dry runs
#[derive(Default)]
pub struct MemoryPersistence {
    /// Folders prepared so far
    pub prepared: std::sync::Mutex<Vec<PathBuf>>,
    /// Users recorded so far
    pub users: std::sync::Mutex<Vec<ScopedUser>>,
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn ensure_category_tables(&self, folder: &Path) -> Result<()> {
        if let Ok(mut prepared) = self.prepared.lock() {
            prepared.push(folder.to_path_buf());
        }
        Ok(())
    }

    async fn record_user(&self, _folder: &Path, user: &ScopedUser) -> Result<()> {
        if let Ok(mut users) = self.users.lock() {
            users.push(user.clone());
        }
        Ok(())
    }
}
