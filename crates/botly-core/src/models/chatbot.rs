//! Chatbot records and the payloads used to create, update, train and query them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Chatbot {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructions: Option<String>,
    pub user_id: i64,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub has_data: bool,
    #[serde(default)]
    pub data_source: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default, alias = "createdAt", deserialize_with = "timestamp::deserialize_optional")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_trained: Option<DateTime<Utc>>,
}

impl Chatbot {
    /// "file: handbook.pdf", "website: https://..." or "no data"
    pub fn source_display(&self) -> String {
        match (&self.data_type, &self.data_source) {
            (Some(kind), Some(source)) => format!("{}: {}", kind, source),
            (None, Some(source)) => source.clone(),
            _ if self.has_data => "trained".to_string(),
            _ => "no data".to_string(),
        }
    }
}

/// Body of `POST /chatbots`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewChatbot {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Partial body of `PUT /chatbots/{id}`; unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatbotUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl ChatbotUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.instructions.is_none()
            && self.is_public.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct AnalyticsRecord {
    pub question: String,
    pub answer: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_optional")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Reply of the form-encoded `POST /create_chatbot` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyChatbotCreated {
    pub chatbot_id: i64,
    pub message: String,
}

/// A document to train a chatbot on.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Training input for `POST /upload`. Either part may be absent.
#[derive(Debug, Clone, Default)]
pub struct TrainingData {
    pub file: Option<UploadFile>,
    pub website: Option<String>,
}

impl TrainingData {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.website.as_deref().map_or(true, str::is_empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chatbot_response() {
        let json = r#"{"id": 7, "name": "Support", "description": null, "instructions": "Be brief", "user_id": 3, "is_public": false, "has_data": true, "data_source": "handbook.pdf", "data_type": "file", "created_at": "2024-05-01T12:30:00.123456", "updated_at": "2024-05-02T08:00:00", "last_trained": null}"#;

        let bot: Chatbot = serde_json::from_str(json).expect("Failed to parse chatbot JSON");
        assert_eq!(bot.id, 7);
        assert_eq!(bot.instructions.as_deref(), Some("Be brief"));
        assert!(bot.created_at.is_some());
        assert!(bot.updated_at.is_some());
        assert!(bot.last_trained.is_none());
        assert_eq!(bot.source_display(), "file: handbook.pdf");
    }

    #[test]
    fn test_parse_chatbot_with_camel_case_created_at() {
        let json = r#"{"id": 1, "name": "Bot", "user_id": 2, "createdAt": "2024-01-01T00:00:00Z"}"#;
        let bot: Chatbot = serde_json::from_str(json).expect("Failed to parse chatbot JSON");
        assert!(bot.created_at.is_some());
        assert!(!bot.has_data);
        assert_eq!(bot.source_display(), "no data");
    }

    #[test]
    fn test_update_skips_unset_fields() {
        let update = ChatbotUpdate {
            instructions: Some("Answer in French".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&update).expect("serialize update");
        assert_eq!(value, serde_json::json!({"instructions": "Answer in French"}));
        assert!(!update.is_empty());
        assert!(ChatbotUpdate::default().is_empty());
    }

    #[test]
    fn test_training_data_empty() {
        assert!(TrainingData::default().is_empty());
        assert!(TrainingData { file: None, website: Some(String::new()) }.is_empty());
        assert!(!TrainingData { file: None, website: Some("https://example.com".into()) }.is_empty());
    }
}
