//! Mock collaborators for testing
//!
//! These mocks let the studio run end to end without a backend.

use crate::backend::{BackendError, ChatBackend};
use crate::registry::Chat;
use crate::store::Message;
use crate::transport::{ByteStream, CodeStreamSource, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

type ChunkSender = mpsc::UnboundedSender<Result<Bytes, TransportError>>;
type ChunkReceiver = mpsc::UnboundedReceiver<Result<Bytes, TransportError>>;

/// One `data:` line of the code stream
pub fn record(kind: &str, data: &str, message_id: &str) -> String {
    let record = serde_json::json!({ "type": kind, "data": data, "message_id": message_id });
    format!("data: {record}\n")
}

// ============================================================================
// Mock Stream Source
// ============================================================================

/// Stream source whose bytes are pushed by the test, one channel per
/// message id. Either side may create the channel first.
#[derive(Default)]
pub struct MockStreamSource {
    senders: Mutex<HashMap<String, ChunkSender>>,
    receivers: Mutex<HashMap<String, ChunkReceiver>>,
    failures: Mutex<HashMap<String, TransportError>>,
    /// Message ids `open` was called with
    pub opened: Mutex<Vec<String>>,
}

impl MockStreamSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_channel(&self, message_id: &str) -> ChunkSender {
        let mut senders = self.senders.lock().unwrap();
        if let Some(tx) = senders.get(message_id) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::unbounded_channel();
        senders.insert(message_id.to_string(), tx.clone());
        self.receivers
            .lock()
            .unwrap()
            .insert(message_id.to_string(), rx);
        tx
    }

    /// Push raw bytes into the stream for `message_id`
    pub fn send(&self, message_id: &str, bytes: impl Into<Bytes>) {
        let _ = self.ensure_channel(message_id).send(Ok(bytes.into()));
    }

    /// Push one well-formed record
    pub fn send_event(&self, message_id: &str, kind: &str, data: &str) {
        self.send(message_id, record(kind, data, message_id));
    }

    /// Fail the body mid-stream
    pub fn send_error(&self, message_id: &str, error: TransportError) {
        let _ = self.ensure_channel(message_id).send(Err(error));
    }

    /// End the stream for `message_id`
    pub fn close(&self, message_id: &str) {
        self.senders.lock().unwrap().remove(message_id);
    }

    /// Make `open` fail for `message_id`
    pub fn fail_open(&self, message_id: &str, error: TransportError) {
        self.failures
            .lock()
            .unwrap()
            .insert(message_id.to_string(), error);
    }

    pub fn opened_ids(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodeStreamSource for MockStreamSource {
    async fn open(&self, message_id: &str) -> Result<ByteStream, TransportError> {
        self.opened.lock().unwrap().push(message_id.to_string());
        if let Some(error) = self.failures.lock().unwrap().get(message_id) {
            return Err(error.clone());
        }
        if !self.receivers.lock().unwrap().contains_key(message_id) {
            self.ensure_channel(message_id);
        }
        let rx = self
            .receivers
            .lock()
            .unwrap()
            .remove(message_id)
            .ok_or_else(|| TransportError::network("stream already opened"))?;
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

// ============================================================================
// Mock Chat Backend
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    ListConversations,
    ListMessages(String),
    CreateConversation(String),
    SendMessage { conversation_id: String, message_id: String },
    DeleteConversation(String),
    RenderVideo { message_id: String, code: String },
}

/// In-memory backend with switchable failures
#[derive(Default)]
pub struct MockChatBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    chats: Mutex<Vec<Chat>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    pub fail_send: AtomicBool,
    pub fail_render: AtomicBool,
    /// When set, renders wait for `release_render` before answering
    pub hold_render: AtomicBool,
    render_release: Notify,
    /// Notified when a render request arrives
    pub render_started: Arc<Notify>,
    /// When set, message listings wait for `release_messages`
    pub hold_messages: AtomicBool,
    messages_release: Notify,
    /// Notified when a held message listing arrives
    pub messages_started: Arc<Notify>,
}

impl MockChatBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a remote conversation for `refresh`
    pub fn add_remote(&self, chat: Chat, messages: Vec<Message>) {
        self.messages
            .lock()
            .unwrap()
            .insert(chat.id.clone(), messages);
        self.chats.lock().unwrap().push(chat);
    }

    pub fn release_render(&self) {
        self.render_release.notify_one();
    }

    pub fn release_messages(&self) {
        self.messages_release.notify_one();
    }

    pub fn recorded_calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn list_conversations(&self) -> Result<Vec<Chat>, BackendError> {
        self.record(BackendCall::ListConversations);
        Ok(self.chats.lock().unwrap().clone())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, BackendError> {
        self.record(BackendCall::ListMessages(conversation_id.to_string()));
        if self.hold_messages.load(Ordering::SeqCst) {
            self.messages_started.notify_one();
            self.messages_release.notified().await;
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_conversation(&self, chat: &Chat) -> Result<(), BackendError> {
        self.record(BackendCall::CreateConversation(chat.id.clone()));
        Ok(())
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), BackendError> {
        self.record(BackendCall::SendMessage {
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
        });
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(BackendError::Status {
                operation: "send message",
                status: 500,
            });
        }
        Ok(())
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), BackendError> {
        self.record(BackendCall::DeleteConversation(conversation_id.to_string()));
        Ok(())
    }

    async fn render_video(&self, message_id: &str, code: &str) -> Result<String, BackendError> {
        self.record(BackendCall::RenderVideo {
            message_id: message_id.to_string(),
            code: code.to_string(),
        });
        self.render_started.notify_one();
        if self.hold_render.load(Ordering::SeqCst) {
            self.render_release.notified().await;
        }
        if self.fail_render.load(Ordering::SeqCst) {
            return Err(BackendError::Request {
                operation: "render video",
                message: "renderer crashed".to_string(),
            });
        }
        Ok(format!("/media/{message_id}.mp4"))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` until it holds; panics after two seconds
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "condition not reached in time");
}

/// Give spawned tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
