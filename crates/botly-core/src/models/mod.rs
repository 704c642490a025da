//! Data models exchanged with the Botly backend.
//!
//! - `Identity`: the authenticated principal, trusted only after `/auth/me`
//! - `Chatbot`, `NewChatbot`, `ChatbotUpdate`: chatbot records and payloads
//! - `AnalyticsRecord`, `QueryAnswer`: question/answer history and replies
//! - `TrainingData`, `UploadFile`: inputs for the multipart `/upload` call

pub mod chatbot;
pub mod identity;
pub mod timestamp;

pub use chatbot::{
    AnalyticsRecord, Chatbot, ChatbotUpdate, LegacyChatbotCreated, MessageResponse, NewChatbot,
    QueryAnswer, TrainingData, UploadFile,
};
pub use identity::{Identity, LegacyUserCreated};
