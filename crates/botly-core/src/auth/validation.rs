//! Input checks run before any request leaves the process.

use super::SessionError;

/// Shortest password the registration form accepts.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// OpenAI secret keys all start with this.
pub const API_KEY_PREFIX: &str = "sk-";

fn require_email(email: &str) -> Result<(), SessionError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(SessionError::ValidationFailed("Email is required".to_string()));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(SessionError::ValidationFailed(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

pub fn validate_api_key(api_key: &str) -> Result<(), SessionError> {
    if api_key.trim().is_empty() {
        return Err(SessionError::ValidationFailed("OpenAI API key is required".to_string()));
    }
    if !api_key.starts_with(API_KEY_PREFIX) {
        return Err(SessionError::ValidationFailed(format!(
            "Please enter a valid OpenAI API key (starts with {})",
            API_KEY_PREFIX
        )));
    }
    Ok(())
}

pub fn validate_login(email: &str, password: &str) -> Result<(), SessionError> {
    require_email(email)?;
    if password.is_empty() {
        return Err(SessionError::ValidationFailed("Password is required".to_string()));
    }
    Ok(())
}

pub fn validate_registration(email: &str, password: &str, api_key: &str) -> Result<(), SessionError> {
    require_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(SessionError::ValidationFailed(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LENGTH
        )));
    }
    validate_api_key(api_key)
}
