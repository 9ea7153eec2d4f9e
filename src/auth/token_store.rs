//! Persisted credential record and its on-disk store
//!
//! Tokens are stored as a single JSON file whose shape matches
//! [`TokenRecord`] exactly. Saves replace the file atomically (write to a
//! sibling temp file, then rename) so a crash mid-write can never corrupt
//! a previously stored token, and the file is restricted to owner
//! read/write where the platform supports it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeywardenError, Result};

/// Default buffer applied when deciding whether a token needs a refresh.
pub const DEFAULT_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// The persisted credential.
///
/// Field names map one-to-one onto the JSON object written to disk.
/// `expires_at` is an absolute timestamp in milliseconds since the Unix
/// epoch, computed from the provider's `expires_in` at issue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Opaque bearer value presented on API requests
    pub access_token: String,

    /// Long-lived credential used to renew the access token. Empty in
    /// static-token mode, which has no refresh capability.
    #[serde(default)]
    pub refresh_token: String,

    /// Absolute expiry, milliseconds since epoch
    pub expires_at: u64,

    /// Token type, expected to be `"Bearer"`
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Granted scope string
    #[serde(default)]
    pub scope: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenRecord {
    /// Returns `true` when the token is expired, or will expire within
    /// `buffer` of `now_ms`.
    ///
    /// Pure over the record and the supplied clock reading; the caller
    /// injects the current time so expiry logic is testable without
    /// sleeping.
    pub fn is_expired(&self, now_ms: u64, buffer: Duration) -> bool {
        let buffer_ms = buffer.as_millis() as u64;
        now_ms.saturating_add(buffer_ms) >= self.expires_at
    }
}

/// File-backed store for a single [`TokenRecord`].
///
/// The store is a stateless read/write collaborator over the on-disk copy;
/// in-memory ownership of the record belongs to the token manager.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store over the given file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted record.
    ///
    /// A missing file, an unreadable file, or a parse failure all yield
    /// `None`: the caller treats every one of those as "not authenticated"
    /// rather than a fatal condition.
    pub fn load(&self) -> Option<TokenRecord> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read token file {}: {}", self.path.display(), e);
                }
                return None;
            }
        };

        match serde_json::from_str(&contents) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(
                    "Token file {} is malformed, treating as absent: {}",
                    self.path.display(),
                    e
                );
                None
            }
        }
    }

    /// Persist the record, replacing any previous one.
    ///
    /// Writes the JSON to a sibling temp file and renames it over the
    /// target, so readers never observe a half-written file. Owner-only
    /// permissions are applied on Unix; a permission failure is logged
    /// and non-fatal.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardenError::Persistence`] if the directory cannot be
    /// created or the write/rename fails.
    pub fn save(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                KeywardenError::Persistence(format!(
                    "Failed to create token directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(record)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).map_err(|e| {
            KeywardenError::Persistence(format!(
                "Failed to write token file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        self.restrict_permissions(&tmp_path);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            KeywardenError::Persistence(format!(
                "Failed to replace token file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!("Token saved to {}", self.path.display());
        Ok(())
    }

    /// Delete the persisted record.
    ///
    /// Idempotent; an absent file is not an error.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KeywardenError::Persistence(format!(
                "Failed to delete token file {}: {}",
                self.path.display(),
                e
            ))
            .into()),
        }
    }

    #[cfg(unix)]
    fn restrict_permissions(&self, path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            tracing::warn!(
                "Failed to restrict permissions on {}: {}",
                path.display(),
                e
            );
        }
    }

    #[cfg(not(unix))]
    fn restrict_permissions(&self, _path: &Path) {}
}
