//! Disk-backed media store
//!
//! Plain items are streamed straight to the creator folder; DRM items are
//! delegated to ffmpeg, which fetches the manifest with the signed-URL
//! cookies and remuxes with the resolved decryption key. Dedup answers come
//! from the per-folder database, keyed by media id and category.

use super::{DrmBundle, MediaStore, StoreOutcome, StoreRequest, render_filename};
use crate::db::DbCache;
use crate::error::{Error, ItemError, Result};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Production media store writing into per-creator folders
pub struct DiskStore {
    http: reqwest::Client,
    db: Arc<DbCache>,
    ffmpeg: PathBuf,
    user_agent: String,
}

impl DiskStore {
    /// Create a store sharing the given HTTP client and database cache
    pub fn new(
        http: reqwest::Client,
        db: Arc<DbCache>,
        ffmpeg: PathBuf,
        user_agent: String,
    ) -> Self {
        Self {
            http,
            db,
            ffmpeg,
            user_agent,
        }
    }

    /// Stream an HTTP body to `dest`, writing through a `.part` file so a
    /// torn download never looks complete on disk
    async fn stream_to_file(&self, url: &str, dest: &Path, media_id: i64) -> Result<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let response = self.http.get(url).send().await?.error_for_status()?;

        let part = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&part).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&part, dest).await?;

        tracing::debug!(media_id, bytes = written, path = %dest.display(), "media written");
        Ok(written)
    }
}

#[async_trait::async_trait]
impl MediaStore for DiskStore {
    async fn store_plain(
        &self,
        request: StoreRequest<'_>,
        url: &str,
    ) -> std::result::Result<StoreOutcome, ItemError> {
        if url.is_empty() {
            return Err(ItemError::MissingContext {
                media_id: request.media_id,
            });
        }
        let db = self
            .db
            .database_for(request.folder)
            .await
            .map_err(|e| store_err(request.media_id, e))?;
        if db
            .is_downloaded(request.media_id, request.category)
            .await
            .map_err(|e| store_err(request.media_id, e))?
        {
            return Ok(StoreOutcome::already_present());
        }

        let filename = render_filename(
            request.filename_format,
            request.media_id,
            request.context,
            &extension_of(url),
        );
        let dest = request
            .folder
            .join(request.category.label())
            .join(&filename);
        let written = self
            .stream_to_file(url, &dest, request.media_id)
            .await
            .map_err(|e| item_err(request.media_id, e))?;

        db.record_download(request.media_id, request.category, &filename, None)
            .await
            .map_err(|e| store_err(request.media_id, e))?;
        Ok(StoreOutcome::new_bytes(written))
    }

    async fn store_drm(
        &self,
        request: StoreRequest<'_>,
        bundle: &DrmBundle,
    ) -> std::result::Result<StoreOutcome, ItemError> {
        let db = self
            .db
            .database_for(request.folder)
            .await
            .map_err(|e| store_err(request.media_id, e))?;
        if db
            .is_downloaded(request.media_id, request.category)
            .await
            .map_err(|e| store_err(request.media_id, e))?
        {
            let recorded = db
                .manifest_last_modified(request.media_id, request.category)
                .await
                .map_err(|e| store_err(request.media_id, e))?;
            // A newer manifest means the platform re-encoded the media
            match recorded {
                Some(ts) if ts >= bundle.last_modified => {
                    return Ok(StoreOutcome::already_present());
                }
                None => return Ok(StoreOutcome::already_present()),
                Some(_) => {
                    tracing::info!(
                        media_id = request.media_id,
                        "manifest newer than recorded download, refreshing"
                    );
                }
            }
        }

        let filename = render_filename(
            request.filename_format,
            request.media_id,
            request.context,
            "mp4",
        );
        let dest = request
            .folder
            .join(request.category.label())
            .join(&filename);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| store_err(request.media_id, e))?;
        }

        let headers = format!(
            "Cookie: CloudFront-Policy={}; CloudFront-Signature={}; CloudFront-Key-Pair-Id={}\r\nUser-Agent: {}\r\n",
            bundle.policy, bundle.signature, bundle.kvp, self.user_agent
        );
        // Keys arrive as kid:key pairs; ffmpeg wants the key half only
        let key = bundle
            .decryption_key
            .rsplit(':')
            .next()
            .unwrap_or(&bundle.decryption_key);

        let output = tokio::process::Command::new(&self.ffmpeg)
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg("-headers")
            .arg(&headers)
            .arg("-cenc_decryption_key")
            .arg(key)
            .arg("-i")
            .arg(&bundle.manifest_url)
            .arg("-codec")
            .arg("copy")
            .arg(&dest)
            .output()
            .await
            .map_err(|e| store_err(request.media_id, e))?;
        if !output.status.success() {
            return Err(ItemError::Store {
                media_id: request.media_id,
                reason: format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let written = tokio::fs::metadata(&dest)
            .await
            .map(|m| m.len())
            .map_err(|e| store_err(request.media_id, e))?;
        db.record_download(
            request.media_id,
            request.category,
            &filename,
            Some(bundle.last_modified),
        )
        .await
        .map_err(|e| store_err(request.media_id, e))?;
        tracing::debug!(media_id = request.media_id, bytes = written, "drm media written");
        Ok(StoreOutcome::new_bytes(written))
    }

    async fn estimate_total_bytes(&self, urls: &[String]) -> u64 {
        let mut total = 0;
        for url in urls {
            match self.http.head(url).send().await {
                // content_length() would report the empty HEAD body, so read
                // the advertised size from the header instead
                Ok(response) => {
                    total += response
                        .headers()
                        .get(reqwest::header::CONTENT_LENGTH)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                }
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "size probe failed, skipping");
                }
            }
        }
        total
    }

    async fn store_profile_asset(&self, folder: &Path, name: &str, url: &str) -> Result<()> {
        let dest = folder
            .join("Profile")
            .join(format!("{name}.{}", extension_of(url)));
        if tokio::fs::try_exists(&dest).await? {
            return Ok(());
        }
        self.stream_to_file(url, &dest, 0).await?;
        Ok(())
    }
}

/// Extension of the URL's final path segment, ignoring the query string
fn extension_of(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split('?').next().unwrap_or(url).to_string(),
    };
    match path.rsplit('/').next().and_then(|seg| seg.rsplit_once('.')) {
        Some((_, ext)) if !ext.is_empty() => ext.to_string(),
        _ => String::new(),
    }
}

fn store_err(media_id: i64, e: impl std::fmt::Display) -> ItemError {
    ItemError::Store {
        media_id,
        reason: e.to_string(),
    }
}

/// Split transport failures from the rest so the item taxonomy stays honest
fn item_err(media_id: i64, e: Error) -> ItemError {
    match e {
        Error::Network(source) => ItemError::Network { media_id, source },
        other => store_err(media_id, other),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Category, ContentContext};
    use chrono::{DateTime, Utc};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_with(db: Arc<DbCache>) -> DiskStore {
        DiskStore::new(
            reqwest::Client::new(),
            db,
            PathBuf::from("ffmpeg"),
            "test-agent".to_string(),
        )
    }

    fn request<'a>(media_id: i64, folder: &'a Path, context: &'a ContentContext) -> StoreRequest<'a> {
        StoreRequest {
            media_id,
            category: Category::Post,
            folder,
            filename_format: "",
            context,
        }
    }

    #[test]
    fn test_extension_ignores_query_string() {
        assert_eq!(extension_of("https://cdn/a/55.jpg?Expires=1"), "jpg");
        assert_eq!(extension_of("https://cdn/a/video.mp4"), "mp4");
        assert_eq!(extension_of("https://cdn/a/noext"), "");
    }

    #[tokio::test]
    async fn test_store_plain_streams_and_dedups() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/media/55.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(Arc::new(DbCache::new()));
        let context = ContentContext::empty();
        let url = format!("{}/media/55.jpg", server.uri());

        let outcome = store
            .store_plain(request(55, dir.path(), &context), &url)
            .await
            .unwrap();
        assert!(outcome.is_new);
        assert_eq!(outcome.bytes, 5);
        let on_disk = tokio::fs::read(dir.path().join("Posts").join("55.jpg"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"hello");

        let outcome = store
            .store_plain(request(55, dir.path(), &context), &url)
            .await
            .unwrap();
        assert!(!outcome.is_new, "second dispatch must hit the dedup record");
        assert_eq!(outcome.bytes, 0);
    }

    #[tokio::test]
    async fn test_store_plain_empty_locator_is_missing_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(Arc::new(DbCache::new()));
        let context = ContentContext::empty();

        let err = store
            .store_plain(request(9, dir.path(), &context), "")
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::MissingContext { media_id: 9 }));
    }

    #[tokio::test]
    async fn test_store_plain_http_failure_is_item_fault() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(Arc::new(DbCache::new()));
        let context = ContentContext::empty();
        let url = format!("{}/gone.jpg", server.uri());

        let err = store
            .store_plain(request(7, dir.path(), &context), &url)
            .await
            .unwrap_err();
        assert!(matches!(err, ItemError::Network { media_id: 7, .. }));
    }

    #[tokio::test]
    async fn test_estimate_sums_content_lengths() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/b.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 23]))
            .mount(&server)
            .await;

        let store = store_with(Arc::new(DbCache::new()));
        let total = store
            .estimate_total_bytes(&[
                format!("{}/a.jpg", server.uri()),
                format!("{}/b.jpg", server.uri()),
            ])
            .await;
        assert_eq!(total, 123);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_store_drm_shells_out_and_records_freshness() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // Stand-in toolchain binary that writes its last argument
        let fake_ffmpeg = dir.path().join("fake-ffmpeg");
        std::fs::write(&fake_ffmpeg, "#!/bin/sh\nfor last; do :; done\nprintf decrypted > \"$last\"\n").unwrap();
        std::fs::set_permissions(&fake_ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let db = Arc::new(DbCache::new());
        let store = DiskStore::new(
            reqwest::Client::new(),
            db.clone(),
            fake_ffmpeg,
            "test-agent".to_string(),
        );
        let context = ContentContext::empty();
        let folder = dir.path().join("alice");
        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let bundle = DrmBundle {
            manifest_url: "https://cdn3.onlyfans.com/dash/files/m.mpd".to_string(),
            policy: "POL".to_string(),
            signature: "SIG".to_string(),
            kvp: "KVP".to_string(),
            decryption_key: "kid:feedface".to_string(),
            last_modified: ts,
        };

        let outcome = store
            .store_drm(request(55, &folder, &context), &bundle)
            .await
            .unwrap();
        assert!(outcome.is_new);
        let on_disk = tokio::fs::read(folder.join("Posts").join("55.mp4"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"decrypted");

        // Same manifest timestamp: already present
        let outcome = store
            .store_drm(request(55, &folder, &context), &bundle)
            .await
            .unwrap();
        assert!(!outcome.is_new);

        // Newer manifest: refresh
        let newer = DrmBundle {
            last_modified: ts + chrono::Duration::hours(1),
            ..bundle.clone()
        };
        let outcome = store
            .store_drm(request(55, &folder, &context), &newer)
            .await
            .unwrap();
        assert!(outcome.is_new, "newer manifest must trigger a refresh");
    }

    #[tokio::test]
    async fn test_profile_asset_skips_existing_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/avatar.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pix".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let store = store_with(Arc::new(DbCache::new()));
        let url = format!("{}/avatar.jpg", server.uri());

        store
            .store_profile_asset(dir.path(), "avatar", &url)
            .await
            .unwrap();
        store
            .store_profile_asset(dir.path(), "avatar", &url)
            .await
            .unwrap();
        let on_disk = tokio::fs::read(dir.path().join("Profile").join("avatar.jpg"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"pix");
    }
}
