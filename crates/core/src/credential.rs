//! Bearer credential value and its on-disk store.
//!
//! The credential is an opaque token: it is attached to requests and saved
//! to disk, never parsed.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::CredentialError;

/// An opaque bearer token. `Debug` does not reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, for the `Authorization` header and the store.
    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// What the store persists between CLI invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    token: String,
    #[serde(default)]
    username: Option<String>,
    saved_at: DateTime<Utc>,
}

/// A credential loaded back from disk.
#[derive(Debug, Clone)]
pub struct SavedCredential {
    pub credential: Credential,
    pub username: Option<String>,
    pub saved_at: DateTime<Utc>,
}

/// JSON file holding the last successful login.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/csvreconcile/credential.json`.
    pub fn default_path() -> Result<PathBuf, CredentialError> {
        dirs::config_dir()
            .map(|d| d.join("csvreconcile").join("credential.json"))
            .ok_or(CredentialError::NoConfigDir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the saved credential, if any.
    pub fn load(&self) -> Result<Option<SavedCredential>, CredentialError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no saved credential");
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)?;
        let stored: StoredCredential =
            serde_json::from_str(&contents).map_err(|e| CredentialError::Corrupt {
                path: self.path.display().to_string(),
                detail: e.to_string(),
            })?;
        debug!(path = %self.path.display(), "loaded saved credential");
        Ok(Some(SavedCredential {
            credential: Credential::new(stored.token),
            username: stored.username,
            saved_at: stored.saved_at,
        }))
    }

    /// Persist `credential`, replacing any previous one.
    pub fn save(&self, credential: &Credential, username: Option<&str>) -> Result<(), CredentialError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredCredential {
            token: credential.token().to_string(),
            username: username.map(str::to_string),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|e| CredentialError::Corrupt {
            path: self.path.display().to_string(),
            detail: e.to_string(),
        })?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(path = %self.path.display(), "credential saved");
        Ok(())
    }

    /// Remove the saved credential. Missing files are not an error.
    pub fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "credential cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to clear credential");
                Err(e.into())
            }
        }
    }
}
