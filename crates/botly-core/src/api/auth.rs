//! `/auth/*` endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ApiError, ApiGateway, FormFields};
use crate::auth::Credential;
use crate::models::{timestamp, Identity, LegacyUserCreated};

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    openai_api_key: &'a str,
}

#[derive(Serialize)]
struct UpdateUserRequest<'a> {
    openai_api_key: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: Credential,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Internal API response type - use `Identity` for domain code
#[derive(Debug, Deserialize)]
struct UserResponse {
    id: i64,
    email: String,
    #[serde(default)]
    openai_api_key: Option<String>,
    #[serde(default = "default_active")]
    is_active: bool,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        Identity {
            id: user.id,
            email: user.email,
            has_api_key: user
                .openai_api_key
                .as_deref()
                .is_some_and(|key| !key.trim().is_empty()),
            is_active: user.is_active,
            created_at: user.created_at,
        }
    }
}

impl ApiGateway {
    /// `POST /auth/login`. The caller decides where the token goes.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let token: TokenResponse = self
            .post_json("/auth/login", &LoginRequest { email, password })
            .await?;
        if !token.token_type.eq_ignore_ascii_case("bearer") {
            warn!(token_type = %token.token_type, "Unexpected token type, using it as a bearer token");
        }
        if token.access_token.as_str().is_empty() {
            return Err(ApiError::InvalidResponse("Login returned an empty token".to_string()));
        }
        Ok(token)
    }

    /// `POST /auth/register`. Needs no credential.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        openai_api_key: &str,
    ) -> Result<Identity, ApiError> {
        let user: UserResponse = self
            .post_json(
                "/auth/register",
                &RegisterRequest {
                    email,
                    password,
                    openai_api_key,
                },
            )
            .await?;
        Ok(user.into())
    }

    /// Form-encoded `POST /register` that predates password accounts.
    pub async fn register_legacy(
        &self,
        email: &str,
        openai_api_key: &str,
    ) -> Result<LegacyUserCreated, ApiError> {
        let fields = FormFields::new()
            .text("email", email)
            .text("openai_api_key", openai_api_key);
        self.post_multipart("/register", fields).await
    }

    /// `GET /auth/me`: the identity behind the stored credential.
    pub async fn current_user(&self) -> Result<Identity, ApiError> {
        let user: UserResponse = self.get("/auth/me").await?;
        Ok(user.into())
    }

    /// `PUT /auth/me`
    pub async fn update_current_user(&self, openai_api_key: &str) -> Result<Identity, ApiError> {
        let user: UserResponse = self
            .put_json("/auth/me", &UpdateUserRequest { openai_api_key })
            .await?;
        Ok(user.into())
    }
}
