//! Ordered message store for one conversation
//!
//! Messages keep insertion order. Updates are point updates by id and are
//! always applied to the stored value, so two writers touching different
//! fields of the same message never lose each other's changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// `video_url` value while a render is in progress
pub const VIDEO_RENDERING: &str = "rendering";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Message already exists: {0}")]
    DuplicateMessage(String),
}

/// One conversational turn: the prompt and everything generated for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, alias = "content")]
    pub prompt: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default)]
    pub is_streaming: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Message {
    /// A fresh turn for `prompt`, streaming from the start
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt: prompt.into(),
            code: String::new(),
            video_url: None,
            is_streaming: true,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.video_url.as_deref() == Some(VIDEO_RENDERING)
    }
}

/// Partial update for a [`Message`]. `None` leaves a field untouched; for
/// clearable fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePatch {
    pub code: Option<String>,
    pub video_url: Option<Option<String>>,
    pub is_streaming: Option<bool>,
    pub error: Option<Option<String>>,
}

impl MessagePatch {
    /// Patch that appends `chunk` to the current code
    pub fn append_code(current: &Message, chunk: &str) -> Self {
        let mut code = String::with_capacity(current.code.len() + chunk.len());
        code.push_str(&current.code);
        code.push_str(chunk);
        Self {
            code: Some(code),
            ..Self::default()
        }
    }

    pub fn streaming(mut self, is_streaming: bool) -> Self {
        self.is_streaming = Some(is_streaming);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn video_url(mut self, url: Option<String>) -> Self {
        self.video_url = Some(url);
        self
    }

    fn apply(self, message: &mut Message) {
        if let Some(code) = self.code {
            message.code = code;
        }
        if let Some(video_url) = self.video_url {
            message.video_url = video_url;
        }
        if let Some(is_streaming) = self.is_streaming {
            message.is_streaming = is_streaming;
        }
        if let Some(error) = self.error {
            message.error = error;
        }
        // An errored message is never still streaming
        if message.error.is_some() {
            message.is_streaming = false;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<Message>,
    index: HashMap<String, usize>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message at the end. Ids must be unique.
    pub fn append(&mut self, message: Message) -> Result<(), StoreError> {
        if self.index.contains_key(&message.id) {
            return Err(StoreError::DuplicateMessage(message.id));
        }
        self.index.insert(message.id.clone(), self.messages.len());
        self.messages.push(message);
        Ok(())
    }

    /// Apply a static patch. Returns the updated message, `None` if absent.
    pub fn update(&mut self, id: &str, patch: MessagePatch) -> Option<&Message> {
        self.update_with(id, |_| patch)
    }

    /// Apply a patch computed from the message's current stored value
    pub fn update_with(
        &mut self,
        id: &str,
        patch: impl FnOnce(&Message) -> MessagePatch,
    ) -> Option<&Message> {
        let position = *self.index.get(id)?;
        let message = &mut self.messages[position];
        patch(message).apply(message);
        Some(&*message)
    }

    /// Drop a message (rollback of an unacknowledged insert)
    pub fn remove(&mut self, id: &str) -> Option<Message> {
        let position = self.index.remove(id)?;
        let removed = self.messages.remove(position);
        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.index.get(id).map(|position| &self.messages[*position])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn all(&self) -> &[Message] {
        &self.messages
    }
}
