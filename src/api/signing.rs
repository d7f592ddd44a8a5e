//! Request signing for the platform API
//!
//! Every API request carries a `sign` header derived from the request path,
//! a millisecond timestamp, and the session identity. The exact recipe is
//! dictated by a rules document the platform rotates; the rules are loaded
//! from `rules.json` next to the binary when present, with built-in
//! defaults otherwise.

use crate::config::Auth;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

/// Signing recipe parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SigningRules {
    /// Application token sent alongside every request
    pub app_token: String,
    /// Static salt mixed into the signed payload
    pub static_param: String,
    /// Hash prefix in the assembled `sign` header
    pub prefix: String,
    /// Hash suffix in the assembled `sign` header
    pub suffix: String,
    /// Digest byte positions summed into the checksum
    pub checksum_indexes: Vec<usize>,
    /// Constant added to the checksum sum
    pub checksum_constant: i64,
}

impl Default for SigningRules {
    fn default() -> Self {
        Self {
            app_token: "33d57ade8c02dbc5a333db99ff9ae26a".to_string(),
            static_param: "Wd0KXincikkhbcjSFYLHBnNWJfAdyJkP".to_string(),
            prefix: "29080".to_string(),
            suffix: "66e1".to_string(),
            checksum_indexes: vec![
                0, 1, 2, 3, 5, 7, 11, 13, 17, 19, 23, 27, 29, 30, 31, 33, 35, 37,
            ],
            checksum_constant: 493,
        }
    }
}

impl SigningRules {
    /// Load rules from a JSON file, falling back to the built-in recipe
    /// when the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no signing rules file, using built-in recipe");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let rules: SigningRules = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("{} is invalid: {e}", path.display()),
            key: None,
        })?;
        tracing::debug!(path = %path.display(), "signing rules located successfully");
        Ok(rules)
    }

    /// Build the signed header bundle for one request path+query.
    ///
    /// This is the `fetchLicenseHeaders` collaborator contract: the same
    /// bundle signs ordinary API calls and license requests.
    pub fn signed_headers(&self, auth: &Auth, path: &str, query: &str) -> HashMap<String, String> {
        let time_ms = chrono::Utc::now().timestamp_millis();
        self.signed_headers_at(auth, path, query, time_ms)
    }

    // Timestamp-injectable form so tests are deterministic.
    pub(crate) fn signed_headers_at(
        &self,
        auth: &Auth,
        path: &str,
        query: &str,
        time_ms: i64,
    ) -> HashMap<String, String> {
        let url_part = format!("{path}{query}");
        let payload = format!(
            "{}\n{}\n{}\n{}",
            self.static_param, time_ms, url_part, auth.user_id
        );
        let digest = Sha256::digest(payload.as_bytes());
        let hex = format!("{digest:x}");

        let checksum: i64 = self
            .checksum_indexes
            .iter()
            .filter_map(|&i| hex.as_bytes().get(i))
            .map(|&b| b as i64)
            .sum::<i64>()
            + self.checksum_constant;

        let sign = format!(
            "{}:{}:{:x}:{}",
            self.prefix,
            hex,
            checksum.unsigned_abs(),
            self.suffix
        );

        HashMap::from([
            ("accept".to_string(), "application/json, text/plain, */*".to_string()),
            ("app-token".to_string(), self.app_token.clone()),
            ("cookie".to_string(), auth.cookie.clone()),
            ("user-agent".to_string(), auth.user_agent.clone()),
            ("x-bc".to_string(), auth.x_bc.clone()),
            ("user-id".to_string(), auth.user_id.clone()),
            ("sign".to_string(), sign),
            ("time".to_string(), time_ms.to_string()),
        ])
    }
}
