//! Botly core library.
//!
//! Session and authentication management for the Botly chatbot backend,
//! plus the HTTP gateway every resource call goes through.
//!
//! - [`auth::SessionManager`] owns the session state and is the only thing
//!   that writes the stored token
//! - [`api::ApiGateway`] attaches the token and reports failures as
//!   [`api::ApiError`]
//! - [`config::Config`] picks the backend URL, timeouts and token store

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiError, ApiGateway, GatewayOptions};
pub use auth::{
    CredentialStore, SessionError, SessionManager, SessionOptions, SessionState,
};
pub use config::{Config, CredentialBackend};
pub use models::{Chatbot, Identity};
