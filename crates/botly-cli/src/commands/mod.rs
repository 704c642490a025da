//! CLI command implementations.

mod auth;
mod chatbots;

pub use auth::{login, logout, register, set_api_key, status, watch};
pub use chatbots::{
    chatbots_ask, chatbots_create, chatbots_delete, chatbots_list, chatbots_show,
    chatbots_train, chatbots_update,
};

use std::io::{self, Write};

use anyhow::{Context, Result};
use botly_core::{Config, Identity, SessionError, SessionManager};
use tracing::debug;

use crate::output::OutputFormat;

/// Shared state for every command.
pub struct Ctx {
    pub config: Config,
    pub format: OutputFormat,
}

impl Ctx {
    pub fn new(config: Config, format: OutputFormat) -> Self {
        Self { config, format }
    }

    /// Build a session manager over the configured token store.
    pub fn session(&self) -> Result<SessionManager> {
        let store = self.config.credential_store()?;
        SessionManager::new(self.config.session_options(), store)
            .context("Failed to create HTTP client")
    }
}

/// Validate the stored token and return the signed-in session.
pub async fn require_session(ctx: &Ctx) -> Result<(SessionManager, Identity)> {
    let session = ctx.session()?;
    if !session.has_stored_credential() {
        anyhow::bail!("Not logged in. Run 'botly login' first");
    }

    match session.restore().await {
        Ok(identity) => {
            debug!(user_id = identity.id, "Session restored");
            Ok((session, identity))
        }
        Err(e) if e.requires_login() => {
            anyhow::bail!("Your session has expired. Run 'botly login' again")
        }
        Err(e) => Err(describe(e)),
    }
}

/// Attach a hint for failures worth retrying.
pub fn describe(err: SessionError) -> anyhow::Error {
    if err.is_retryable() {
        anyhow::Error::new(err).context("Could not reach Botly, please try again")
    } else {
        anyhow::Error::new(err)
    }
}

/// Read one line from stdin after printing `prompt`.
pub fn prompt_line(prompt: &str, default: Option<&str>) -> Result<String> {
    match default {
        Some(d) => print!("{} [{}]: ", prompt, d),
        None => print!("{}: ", prompt),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    Ok(match (input.is_empty(), default) {
        (true, Some(d)) => d.to_string(),
        _ => input.to_string(),
    })
}

/// Ask user for confirmation.
pub fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    io::stdout().flush().ok();

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }

    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}
