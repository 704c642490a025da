//! Durable storage for the single bearer token.
//!
//! Every backend swallows storage failures: a store that cannot be read
//! behaves as empty, and a failed write is logged and otherwise ignored.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Keychain service name
const SERVICE_NAME: &str = "botly";

/// The one key this subsystem persists.
pub const TOKEN_KEY: &str = "access_token";

/// Token file name in the data directory
const TOKEN_FILE: &str = "credentials.json";

/// Opaque bearer token issued by `/auth/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Key-value port holding at most one credential.
pub trait CredentialStore: Send + Sync {
    fn get(&self) -> Option<Credential>;

    /// Replaces whatever was stored before.
    fn set(&self, credential: &Credential);

    /// Idempotent.
    fn clear(&self);
}

// ============================================================================
// File backend
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: Credential,
    stored_at: DateTime<Utc>,
}

/// JSON file in the user's data directory, replaced atomically on write.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store at `<data_dir>/credentials.json`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(TOKEN_FILE),
        }
    }

    /// Store at a specific path (useful for testing).
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, credential: &Credential) -> std::io::Result<()> {
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;
        let stored = StoredToken {
            access_token: credential.clone(),
            stored_at: Utc::now(),
        };

        // Sibling temp file is created owner-only (0600 on Unix) before any
        // token bytes are written, then renamed over the target
        let mut tmp = NamedTempFile::new_in(parent)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), &stored)?;
        tmp.as_file_mut().flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Option<Credential> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(error = %e, path = ?self.path, "Failed to read credential file");
                return None;
            }
        };
        match serde_json::from_str::<StoredToken>(&contents) {
            Ok(stored) if !stored.access_token.as_str().is_empty() => Some(stored.access_token),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, path = ?self.path, "Failed to parse credential file");
                None
            }
        }
    }

    fn set(&self, credential: &Credential) {
        match self.write(credential) {
            Ok(()) => debug!(path = ?self.path, "Credential stored"),
            Err(e) => warn!(error = %e, path = ?self.path, "Failed to store credential"),
        }
    }

    fn clear(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "Credential removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(error = %e, path = ?self.path, "Failed to remove credential file"),
        }
    }
}

// ============================================================================
// Keychain backend
// ============================================================================

/// OS keychain entry (`botly` / `access_token`).
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Use a different service name, e.g. one per backend deployment.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Option<Entry> {
        match Entry::new(&self.service, TOKEN_KEY) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Failed to create keyring entry");
                None
            }
        }
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn get(&self) -> Option<Credential> {
        match self.entry()?.get_password() {
            Ok(token) if !token.is_empty() => Some(Credential::new(token)),
            Ok(_) | Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read credential from keychain");
                None
            }
        }
    }

    fn set(&self, credential: &Credential) {
        let Some(entry) = self.entry() else { return };
        if let Err(e) = entry.set_password(credential.as_str()) {
            warn!(error = %e, "Failed to store credential in keychain");
        }
    }

    fn clear(&self) {
        let Some(entry) = self.entry() else { return };
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => warn!(error = %e, "Failed to delete credential from keychain"),
        }
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<Credential> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }

    fn set(&self, credential: &Credential) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(credential.clone());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}
