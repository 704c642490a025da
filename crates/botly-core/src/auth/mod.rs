//! Authentication: credential storage and the session state machine.
//!
//! This module provides:
//! - `CredentialStore`: the single-token persistence port and its file,
//!   keychain and in-memory backends
//! - `SessionManager`: login, registration, logout, startup validation and
//!   periodic re-validation, published through a watch channel
//! - `SessionError`: the error taxonomy callers act on
//!
//! Only a 401/403 from the backend destroys the stored token. Timeouts,
//! transport errors and 5xx responses leave it in place for a later retry.

pub mod credentials;
pub mod error;
pub mod session;
pub mod validation;

pub use credentials::{
    Credential, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    MemoryCredentialStore,
};
pub use error::SessionError;
pub use session::{SessionManager, SessionOptions, SessionState, SessionTicket};
