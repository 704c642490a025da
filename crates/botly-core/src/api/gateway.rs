//! The single path for outbound HTTP calls to the Botly backend.
//!
//! `ApiGateway` reads the bearer token from the credential store on every
//! request, encodes JSON or multipart bodies, and turns every non-2xx
//! response into an `ApiError`. It never writes to the store.

use std::sync::Arc;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::CredentialStore;
use crate::models::UploadFile;

// ============================================================================
// Constants
// ============================================================================

/// Backend used when nothing is configured (FastAPI dev server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Ceiling for a single rate-limit backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub max_rate_limit_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            max_rate_limit_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File(UploadFile),
}

/// Fields of a multipart form. Absent optional values are never added, so
/// the server sees them as missing rather than empty.
#[derive(Debug, Clone, Default)]
pub struct FormFields {
    fields: Vec<(String, FormValue)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: impl ToString) -> Self {
        self.fields
            .push((name.to_string(), FormValue::Text(value.to_string())));
        self
    }

    pub fn optional_text<T: ToString>(self, name: &str, value: Option<T>) -> Self {
        match value {
            Some(v) => self.text(name, v),
            None => self,
        }
    }

    pub fn file(mut self, name: &str, file: Option<UploadFile>) -> Self {
        if let Some(file) = file {
            self.fields.push((name.to_string(), FormValue::File(file)));
        }
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// reqwest forms are consumed on send, so one is built per attempt.
    fn to_form(&self) -> Form {
        self.fields
            .iter()
            .fold(Form::new(), |form, (name, value)| match value {
                FormValue::Text(text) => form.text(name.clone(), text.clone()),
                FormValue::File(file) => {
                    let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
                    let part = match part.mime_str(&file.mime_type) {
                        Ok(part) => part,
                        Err(e) => {
                            warn!(error = %e, mime = %file.mime_type, "Invalid mime type, sending as octet-stream");
                            Part::bytes(file.bytes.clone()).file_name(file.file_name.clone())
                        }
                    };
                    form.part(name.clone(), part)
                }
            })
    }
}

#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Multipart(FormFields),
}

impl RequestBody {
    pub fn json<B: Serialize>(body: &B) -> Result<Self, ApiError> {
        serde_json::to_value(body)
            .map(RequestBody::Json)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode JSON body: {}", e)))
    }
}

// ============================================================================
// Gateway
// ============================================================================

/// HTTP gateway to the Botly backend.
/// Clone is cheap - reqwest::Client and the store are both reference counted.
#[derive(Clone)]
pub struct ApiGateway {
    client: Client,
    base_url: String,
    store: Arc<dyn CredentialStore>,
    max_rate_limit_retries: u32,
    initial_backoff: Duration,
}

impl ApiGateway {
    pub fn new(options: GatewayOptions, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            store,
            max_rate_limit_retries: options.max_rate_limit_retries,
            initial_backoff: options.initial_backoff,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Send one request and return the parsed JSON body.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
    ) -> Result<Value, ApiError> {
        self.request_with_query(method, endpoint, &[], body).await
    }

    pub async fn request_with_query(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: RequestBody,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let mut builder = self.client.request(method.clone(), &url);
            if !query.is_empty() {
                builder = builder.query(query);
            }
            if let Some(token) = self.store.get() {
                builder = builder.bearer_auth(token.as_str());
            }
            builder = match &body {
                RequestBody::Empty => builder,
                RequestBody::Json(value) => builder.json(value),
                RequestBody::Multipart(fields) => builder.multipart(fields.to_form()),
            };

            debug!(%method, endpoint, "Sending request");
            let response = builder.send().await.map_err(|e| {
                debug!(%method, endpoint, error = %e, "Request failed before a response");
                ApiError::from_transport(e)
            })?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Self::parse_json(response).await,
                None => {
                    retries += 1;
                    if retries > self.max_rate_limit_retries {
                        return Err(ApiError::RateLimited);
                    }
                    warn!(endpoint, retry = retries, backoff_ms = backoff.as_millis() as u64, "Rate limited, backing off");
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                }
            }
        }
    }

    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should
    /// retry), or the typed error for any other status.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, ApiError> {
        let status = response.status();
        if status.is_success() {
            Ok(Some(response))
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), "Request rejected");
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await.map_err(ApiError::from_transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: RequestBody,
    ) -> Result<T, ApiError> {
        let value = self.request_with_query(method, endpoint, query, body).await?;
        serde_json::from_value(value).map_err(|e| {
            ApiError::InvalidResponse(format!("Unexpected response from {}: {}", endpoint, e))
        })
    }

    // ===== Typed helpers =====

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_json(Method::GET, endpoint, &[], RequestBody::Empty)
            .await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        self.request_json(Method::GET, endpoint, query, RequestBody::Empty)
            .await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(Method::POST, endpoint, &[], RequestBody::json(body)?)
            .await
    }

    pub async fn put_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.request_json(Method::PUT, endpoint, &[], RequestBody::json(body)?)
            .await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        fields: FormFields,
    ) -> Result<T, ApiError> {
        self.request_json(Method::POST, endpoint, &[], RequestBody::Multipart(fields))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request_json(Method::DELETE, endpoint, &[], RequestBody::Empty)
            .await
    }
}

/// Double the delay, capped at `MAX_BACKOFF`.
fn next_backoff(current: Duration) -> Duration {
    current.saturating_mul(2).min(MAX_BACKOFF)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{Credential, MemoryCredentialStore};
    use mockito::Matcher;
    use serde_json::json;

    pub(crate) fn test_options(base_url: &str) -> GatewayOptions {
        GatewayOptions {
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(5),
            max_rate_limit_retries: 2,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn gateway_with_token(base_url: &str, token: Option<&str>) -> ApiGateway {
        let store = match token {
            Some(t) => MemoryCredentialStore::with_credential(Credential::new(t)),
            None => MemoryCredentialStore::new(),
        };
        ApiGateway::new(test_options(base_url), Arc::new(store)).expect("gateway")
    }

    /// A server that accepts connections and never answers.
    pub(crate) async fn silent_server() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        assert_eq!(next_backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(next_backoff(Duration::from_secs(40)), MAX_BACKOFF);

        // Many retries from a large start never overflow
        let mut backoff = Duration::from_secs(u64::MAX / 2);
        for _ in 0..100 {
            backoff = next_backoff(backoff);
        }
        assert_eq!(backoff, MAX_BACKOFF);
    }

    #[test]
    fn test_form_fields_omit_absent_values() {
        let fields = FormFields::new()
            .text("user_id", 3)
            .text("chatbot_id", 7)
            .optional_text("website", None::<String>)
            .file("file", None);
        let names: Vec<&str> = fields.names().collect();
        assert_eq!(names, vec!["user_id", "chatbot_id"]);

        let fields = fields.optional_text("website", Some("https://example.com"));
        assert_eq!(fields.names().count(), 3);
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/auth/me")
            .match_header("authorization", "Bearer tok-123")
            .with_status(200)
            .with_body(r#"{"id": 1}"#)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok-123"));
        let value = gateway
            .request(Method::GET, "/auth/me", RequestBody::Empty)
            .await
            .expect("request");
        assert_eq!(value, json!({"id": 1}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthenticated_request_has_no_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/auth/register")
            .match_header("authorization", Matcher::Missing)
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({"email": "a@b.com"})))
            .with_status(201)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), None);
        let value: Value = gateway
            .post_json("auth/register", &json!({"email": "a@b.com"}))
            .await
            .expect("request");
        assert_eq!(value["ok"], json!(true));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_multipart_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/query")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data; boundary=".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="chatbot_id""#.to_string()),
                Matcher::Regex(r#"name="question""#.to_string()),
                Matcher::Regex("What are your hours".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"answer": "9 to 5"}"#)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let fields = FormFields::new()
            .text("chatbot_id", 7)
            .text("question", "What are your hours?");
        let value: Value = gateway.post_multipart("/query", fields).await.expect("query");
        assert_eq!(value["answer"], "9 to 5");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_parameters() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/analytics")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "3".into()),
                Matcher::UrlEncoded("chatbot_id".into(), "7".into()),
            ]))
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let records: Vec<Value> = gateway
            .get_with_query(
                "/analytics",
                &[("user_id", "3".to_string()), ("chatbot_id", "7".to_string())],
            )
            .await
            .expect("analytics");
        assert!(records.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_typed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chatbot/99")
            .with_status(404)
            .with_body(r#"{"detail": "Chatbot not found"}"#)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let err = gateway
            .request(Method::GET, "/chatbot/99", RequestBody::Empty)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.message(), "Chatbot not found");
    }

    #[tokio::test]
    async fn test_empty_success_body_is_null() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/chatbot/1")
            .with_status(204)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let value = gateway
            .request(Method::DELETE, "/chatbot/1", RequestBody::Empty)
            .await
            .expect("delete");
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chatbots")
            .with_status(200)
            .with_body("<html>proxy error</html>")
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let err = gateway
            .request(Method::GET, "/chatbots", RequestBody::Empty)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::InvalidResponse(_)));
        assert!(!err.is_definitive_rejection());
    }

    #[tokio::test]
    async fn test_rate_limit_retries_then_gives_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/chatbots")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("tok"));
        let err = gateway
            .request(Method::GET, "/chatbots", RequestBody::Empty)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::RateLimited));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_timeout_is_ambiguous() {
        let url = silent_server().await;
        let options = GatewayOptions {
            timeout: Duration::from_millis(200),
            ..test_options(&url)
        };
        let gateway = ApiGateway::new(options, Arc::new(MemoryCredentialStore::new()))
            .expect("gateway");

        let err = gateway
            .request(Method::GET, "/auth/me", RequestBody::Empty)
            .await
            .expect_err("should time out");
        assert!(matches!(err, ApiError::Timeout));
        assert!(err.is_ambiguous());
    }

    #[tokio::test]
    async fn test_connection_refused_is_ambiguous() {
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("local addr")
        };
        let gateway = gateway_with_token(&format!("http://{}", addr), Some("tok"));

        let err = gateway
            .request(Method::GET, "/auth/me", RequestBody::Empty)
            .await
            .expect_err("should fail");
        assert!(matches!(err, ApiError::Network(_)));
        assert!(err.is_ambiguous());
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_independent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/chatbot/7")
            .match_header("authorization", "Bearer shared")
            .with_status(200)
            .with_body(r#"{"id": 7}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/analytics")
            .match_header("authorization", "Bearer shared")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("database is down")
            .create_async()
            .await;

        let gateway = gateway_with_token(&server.url(), Some("shared"));
        let query = [("chatbot_id", "7".to_string())];
        let (detail, analytics) = tokio::join!(
            gateway.get::<Value>("/chatbot/7"),
            gateway.get_with_query::<Value>("/analytics", &query),
        );

        assert_eq!(detail.expect("detail succeeds")["id"], 7);
        let err = analytics.expect_err("analytics fails");
        assert!(matches!(err, ApiError::ServerError { status: 500, .. }));
    }
}
