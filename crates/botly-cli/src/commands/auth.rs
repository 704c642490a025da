//! Authentication commands.

use anyhow::Result;
use botly_core::{Identity, SessionState};
use tracing::{info, warn};

use super::{describe, prompt_line, require_session, Ctx};
use crate::output::{self, print_row};

fn print_identity(identity: &Identity) {
    print_row("User ID", &identity.id.to_string());
    print_row("Email", &identity.email);
    print_row("API key", if identity.has_api_key { "configured" } else { "not set" });
    print_row("Active", if identity.is_active { "yes" } else { "no" });
    print_row("Member since", &output::format_timestamp(identity.created_at));
}

/// Login with email and password.
pub async fn login(ctx: &mut Ctx, email: Option<String>) -> Result<()> {
    let session = ctx.session()?;

    if session.has_stored_credential() {
        if let Ok(identity) = session.restore().await {
            output::print_success(&format!("Already logged in as {}", identity.email), ctx.format);
            return Ok(());
        }
    }

    let email = match email {
        Some(e) => e,
        None => prompt_line("Email", ctx.config.last_email.as_deref())?,
    };
    if email.is_empty() {
        anyhow::bail!("Email is required");
    }

    // Read password without echo
    let password = rpassword::prompt_password("Password: ")?;

    if !ctx.format.is_json() {
        println!("Logging in...");
    }
    let identity = session.login(&email, &password).await.map_err(describe)?;

    ctx.config.last_email = Some(identity.email.clone());
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to remember email");
    }

    info!(user_id = identity.id, "Logged in");
    output::print_success(&format!("Logged in as {}", identity.display_name()), ctx.format);
    Ok(())
}

/// Create an account and sign in.
pub async fn register(ctx: &mut Ctx, email: Option<String>, api_key: Option<String>) -> Result<()> {
    let session = ctx.session()?;

    let email = match email {
        Some(e) => e,
        None => prompt_line("Email", None)?,
    };
    let password = rpassword::prompt_password("Password: ")?;
    let confirmation = rpassword::prompt_password("Confirm password: ")?;
    if password != confirmation {
        anyhow::bail!("Passwords do not match");
    }
    let api_key = match api_key {
        Some(k) => k,
        None => rpassword::prompt_password("OpenAI API key: ")?,
    };

    let identity = session
        .register(&email, &password, api_key.trim())
        .await
        .map_err(describe)?;

    ctx.config.last_email = Some(identity.email.clone());
    if let Err(e) = ctx.config.save() {
        warn!(error = %e, "Failed to remember email");
    }

    output::print_success(&format!("Account created, logged in as {}", identity.email), ctx.format);
    Ok(())
}

/// Logout and clear the stored token.
pub async fn logout(ctx: &Ctx) -> Result<()> {
    let session = ctx.session()?;
    let had_token = session.has_stored_credential();
    session.logout();

    let message = if had_token {
        "Logged out successfully"
    } else {
        "Not logged in"
    };
    output::print_success(message, ctx.format);
    Ok(())
}

/// Check authentication status.
pub async fn status(ctx: &Ctx) -> Result<()> {
    let session = ctx.session()?;
    let result = if session.has_stored_credential() {
        Some(session.restore().await)
    } else {
        None
    };

    if ctx.format.is_json() {
        let json = match &result {
            Some(Ok(identity)) => serde_json::json!({
                "logged_in": true,
                "api_url": ctx.config.api_base_url,
                "user": identity,
            }),
            Some(Err(e)) => serde_json::json!({
                "logged_in": false,
                "api_url": ctx.config.api_base_url,
                "token_kept": session.has_stored_credential(),
                "error": e.to_string(),
            }),
            None => serde_json::json!({
                "logged_in": false,
                "api_url": ctx.config.api_base_url,
            }),
        };
        return output::print_json(&json);
    }

    println!("Server:   {}", ctx.config.api_base_url);
    match result {
        Some(Ok(identity)) => {
            println!("Auth:     logged in");
            print_identity(&identity);
        }
        Some(Err(e)) if e.is_retryable() => {
            println!("Auth:     unknown ({})", e);
            println!("          Stored token kept; run 'botly status' to retry");
        }
        Some(Err(e)) => println!("Auth:     not logged in ({})", e),
        None => println!("Auth:     not logged in"),
    }
    Ok(())
}

/// Replace the OpenAI key on the account.
pub async fn set_api_key(ctx: &Ctx, api_key: Option<String>) -> Result<()> {
    let (session, _) = require_session(ctx).await?;

    let api_key = match api_key {
        Some(k) => k,
        None => rpassword::prompt_password("New OpenAI API key: ")?,
    };
    let identity = session.update_secret(api_key.trim()).await.map_err(describe)?;

    if ctx.format.is_json() {
        return output::print_json(&identity);
    }
    output::print_success("API key updated", ctx.format);
    print_identity(&identity);
    Ok(())
}

/// Stay signed in and report session changes until Ctrl-C.
pub async fn watch(ctx: &Ctx) -> Result<()> {
    let (session, identity) = require_session(ctx).await?;
    println!("Watching session for {} (Ctrl-C to stop)", identity.email);

    let mut rx = session.subscribe();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = rx.borrow_and_update().clone();
                match state {
                    SessionState::Authenticated(identity) => {
                        println!("Session still valid for {}", identity.display_name());
                    }
                    SessionState::Unauthenticated => {
                        println!("Session ended. Run 'botly login' to sign in again");
                        break;
                    }
                    other => println!("Session {}", other.label()),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}
