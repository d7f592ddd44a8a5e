//! Process bootstrap checks
//!
//! Everything here runs once before any category: OS compatibility, ffmpeg
//! discovery, and the key-material probe that fixes the key-resolution
//! strategy for the whole process. Failures here are fatal; nothing has
//! been downloaded yet.

use crate::config::{Auth, Config};
use crate::error::{Error, Result};
use crate::types::KeyStrategy;
use std::path::{Path, PathBuf};

/// Device key material probed relative to the working directory
const CLIENT_ID_BLOB: &str = "cdm/devices/chrome_1610/device_client_id_blob";
const PRIVATE_KEY: &str = "cdm/devices/chrome_1610/device_private_key";

/// Refuse to start on platforms the media toolchain does not run on
pub fn check_os_compatibility() -> Result<()> {
    if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
        Ok(())
    } else {
        Err(Error::UnsupportedPlatform(std::env::consts::OS.to_string()))
    }
}

/// Locate the ffmpeg executable.
///
/// Precedence: configured path, then the legacy auth.json path, then a PATH
/// probe. Absence is fatal since DRM items cannot be produced without it.
pub fn locate_ffmpeg(config: &Config, auth: &Auth) -> Result<PathBuf> {
    for candidate in [&config.ffmpeg_path, &auth.ffmpeg_path].into_iter().flatten() {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "ffmpeg located successfully");
            return Ok(candidate.clone());
        }
        tracing::warn!(path = %candidate.display(), "configured ffmpeg path does not exist");
    }
    which::which("ffmpeg").map_err(|_| Error::MissingTool {
        tool: "ffmpeg".to_string(),
        path: config.ffmpeg_path.clone(),
    })
}

/// Decide the process-wide key-resolution strategy from the presence of
/// device key material under `base`. Probed exactly once per process.
pub fn detect_key_strategy(base: &Path) -> KeyStrategy {
    let blob = base.join(CLIENT_ID_BLOB);
    let key = base.join(PRIVATE_KEY);
    if blob.is_file() && key.is_file() {
        tracing::info!("device key material found, resolving keys locally");
        KeyStrategy::LocalKeyMaterial
    } else {
        tracing::info!("no device key material, resolving keys through the remote service");
        KeyStrategy::RemoteKeyService
    }
}
