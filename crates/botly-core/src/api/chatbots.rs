//! Chatbot resource endpoints: CRUD, training upload, query and analytics.

use super::{ApiError, ApiGateway, FormFields};
use crate::models::{
    AnalyticsRecord, Chatbot, ChatbotUpdate, LegacyChatbotCreated, MessageResponse, NewChatbot,
    QueryAnswer, TrainingData,
};

impl ApiGateway {
    pub async fn list_chatbots(&self) -> Result<Vec<Chatbot>, ApiError> {
        self.get("/chatbots").await
    }

    pub async fn get_chatbot(&self, chatbot_id: i64) -> Result<Chatbot, ApiError> {
        self.get(&format!("/chatbot/{}", chatbot_id)).await
    }

    pub async fn create_chatbot(&self, chatbot: &NewChatbot) -> Result<Chatbot, ApiError> {
        self.post_json("/chatbots", chatbot).await
    }

    pub async fn update_chatbot(
        &self,
        chatbot_id: i64,
        update: &ChatbotUpdate,
    ) -> Result<Chatbot, ApiError> {
        self.put_json(&format!("/chatbots/{}", chatbot_id), update)
            .await
    }

    pub async fn delete_chatbot(&self, chatbot_id: i64) -> Result<MessageResponse, ApiError> {
        self.delete(&format!("/chatbot/{}", chatbot_id)).await
    }

    /// `POST /upload`: replaces the chatbot's training data.
    pub async fn upload_training_data(
        &self,
        user_id: i64,
        chatbot_id: i64,
        data: TrainingData,
    ) -> Result<MessageResponse, ApiError> {
        let website = data.website.filter(|w| !w.is_empty());
        let fields = FormFields::new()
            .text("user_id", user_id)
            .text("chatbot_id", chatbot_id)
            .file("file", data.file)
            .optional_text("website", website);
        self.post_multipart("/upload", fields).await
    }

    pub async fn query_chatbot(
        &self,
        user_id: i64,
        chatbot_id: i64,
        question: &str,
    ) -> Result<QueryAnswer, ApiError> {
        let fields = FormFields::new()
            .text("user_id", user_id)
            .text("chatbot_id", chatbot_id)
            .text("question", question);
        self.post_multipart("/query", fields).await
    }

    /// Question/answer history, newest first.
    pub async fn get_analytics(
        &self,
        user_id: i64,
        chatbot_id: i64,
    ) -> Result<Vec<AnalyticsRecord>, ApiError> {
        self.get_with_query(
            "/analytics",
            &[
                ("user_id", user_id.to_string()),
                ("chatbot_id", chatbot_id.to_string()),
            ],
        )
        .await
    }

    // ===== Legacy form-encoded endpoints =====

    pub async fn create_chatbot_legacy(
        &self,
        user_id: i64,
        chatbot_name: &str,
    ) -> Result<LegacyChatbotCreated, ApiError> {
        let fields = FormFields::new()
            .text("user_id", user_id)
            .text("chatbot_name", chatbot_name);
        self.post_multipart("/create_chatbot", fields).await
    }

    pub async fn list_chatbots_legacy(&self, user_id: i64) -> Result<Vec<Chatbot>, ApiError> {
        self.get(&format!("/chatbots/{}", user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mockito::Matcher;
    use serde_json::json;

    use crate::api::gateway::tests::test_options;
    use crate::api::ApiGateway;
    use crate::auth::{Credential, MemoryCredentialStore};
    use crate::models::{NewChatbot, TrainingData, UploadFile};

    fn gateway(url: &str) -> ApiGateway {
        let store = MemoryCredentialStore::with_credential(Credential::new("tok"));
        ApiGateway::new(test_options(url), Arc::new(store)).expect("gateway")
    }

    #[tokio::test]
    async fn test_create_chatbot_sends_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chatbots")
            .match_body(Matcher::Json(json!({"name": "Support", "instructions": "Be brief"})))
            .with_status(200)
            .with_body(r#"{"id": 9, "name": "Support", "user_id": 3, "instructions": "Be brief"}"#)
            .create_async()
            .await;

        let created = gateway(&server.url())
            .create_chatbot(&NewChatbot {
                name: "Support".to_string(),
                description: None,
                instructions: Some("Be brief".to_string()),
            })
            .await
            .expect("create");
        assert_eq!(created.id, 9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_with_file_only() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/upload")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="faq.txt""#.to_string()),
                Matcher::Regex("Opening hours: 9-5".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"message": "Data uploaded and embedded"}"#)
            .create_async()
            .await;

        let data = TrainingData {
            file: Some(UploadFile {
                file_name: "faq.txt".to_string(),
                mime_type: "text/plain".to_string(),
                bytes: b"Opening hours: 9-5".to_vec(),
            }),
            website: Some(String::new()),
        };
        let reply = gateway(&server.url())
            .upload_training_data(3, 7, data)
            .await
            .expect("upload");
        assert_eq!(reply.message, "Data uploaded and embedded");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_analytics_parses_records() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/analytics")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "3".into()),
                Matcher::UrlEncoded("chatbot_id".into(), "7".into()),
            ]))
            .with_status(200)
            .with_body(r#"[{"question": "Hi?", "answer": "Hello", "timestamp": "2024-05-01T12:30:00.123456"}]"#)
            .create_async()
            .await;

        let records = gateway(&server.url())
            .get_analytics(3, 7)
            .await
            .expect("analytics");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].answer, "Hello");
        assert!(records[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn test_legacy_create_uses_form_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/create_chatbot")
            .match_body(Matcher::Regex(r#"name="chatbot_name""#.to_string()))
            .with_status(200)
            .with_body(r#"{"chatbot_id": 12, "message": "Chatbot created"}"#)
            .create_async()
            .await;

        let created = gateway(&server.url())
            .create_chatbot_legacy(3, "Legacy")
            .await
            .expect("create legacy");
        assert_eq!(created.chatbot_id, 12);
        mock.assert_async().await;
    }
}
