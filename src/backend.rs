//! Chat backend collaborator
//!
//! The REST service that persists conversations and messages and renders
//! generated code to video. The orchestrator treats every failure here as
//! a single generic error: the caller decides how it shows up in state.

mod http;

pub use http::HttpChatBackend;

use crate::registry::Chat;
use crate::store::Message;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("Backend returned status {status} for {operation}")]
    Status { operation: &'static str, status: u16 },

    #[error("Backend request failed for {operation}: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    #[error("Backend sent an unusable response for {operation}: {message}")]
    InvalidResponse {
        operation: &'static str,
        message: String,
    },
}

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Chat>, BackendError>;

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError>;

    async fn create_conversation(&self, chat: &Chat) -> Result<(), BackendError>;

    /// Acknowledge a freshly submitted message
    async fn send_message(&self, conversation_id: &str, message: &Message)
        -> Result<(), BackendError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError>;

    /// Render `code` for `message_id`; returns the video locator
    async fn render_video(&self, message_id: &str, code: &str) -> Result<String, BackendError>;
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for std::sync::Arc<T> {
    async fn list_conversations(&self) -> Result<Vec<Chat>, BackendError> {
        (**self).list_conversations().await
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        (**self).list_messages(conversation_id).await
    }

    async fn create_conversation(&self, chat: &Chat) -> Result<(), BackendError> {
        (**self).create_conversation(chat).await
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), BackendError> {
        (**self).send_message(conversation_id, message).await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        (**self).delete_conversation(conversation_id).await
    }

    async fn render_video(&self, message_id: &str, code: &str) -> Result<String, BackendError> {
        (**self).render_video(message_id, code).await
    }
}
