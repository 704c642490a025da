use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The authenticated user as reported by `GET /auth/me`.
///
/// Never built from the credential alone. The OpenAI key itself is not kept,
/// only whether one is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Identity {
    pub id: i64,
    pub email: String,
    pub has_api_key: bool,
    pub is_active: bool,
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identity {
    /// Short label for status lines.
    pub fn display_name(&self) -> String {
        if self.has_api_key {
            self.email.clone()
        } else {
            format!("{} (no API key)", self.email)
        }
    }
}

/// Reply of the form-encoded `POST /register` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyUserCreated {
    pub message: String,
    pub user_id: i64,
}
