//! Conversation registry
//!
//! Owns every conversation: its chat metadata, its ordered messages and its
//! AI state machine. Lookups are always by explicit conversation id; the
//! "current" pointer is only a view selector.

use crate::state_machine::AiStateMachine;
use crate::store::MessageStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const TITLE_MAX_CHARS: usize = 50;
const UNTITLED: &str = "New Chat";

/// Conversation metadata as shared with the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn from_prompt(prompt: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: derive_title(prompt),
            created_at: Utc::now(),
        }
    }
}

/// Title for a conversation started by `prompt`
pub fn derive_title(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return UNTITLED.to_string();
    }
    let mut chars = prompt.chars();
    let mut title: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
    if chars.next().is_some() {
        title.push_str("...");
    }
    title
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub chat: Chat,
    pub messages: MessageStore,
    pub ai: AiStateMachine,
}

impl Conversation {
    pub fn new(chat: Chat) -> Self {
        let ai = AiStateMachine::new(chat.id.clone());
        Self {
            chat,
            messages: MessageStore::new(),
            ai,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: HashMap<String, Conversation>,
    /// Newest first
    order: Vec<String>,
    current: Option<String>,
    /// Ids deleted locally; never registered again
    removed: HashSet<String>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a conversation at the front of the listing. An existing
    /// entry with the same id is replaced in place.
    pub fn insert(&mut self, conversation: Conversation) {
        let id = conversation.chat.id.clone();
        if self.conversations.insert(id.clone(), conversation).is_none() {
            self.order.insert(0, id);
        }
    }

    /// Register a conversation at the back of the listing. Ids that were
    /// removed earlier are refused.
    pub fn push_back(&mut self, conversation: Conversation) -> bool {
        let id = conversation.chat.id.clone();
        if self.was_removed(&id) {
            return false;
        }
        if self.conversations.insert(id.clone(), conversation).is_none() {
            self.order.push(id);
        }
        true
    }

    pub fn was_removed(&self, id: &str) -> bool {
        self.removed.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conversations.contains_key(id)
    }

    /// Remove a conversation; clears the current pointer if it pointed here
    pub fn remove(&mut self, id: &str) -> Option<Conversation> {
        let removed = self.conversations.remove(id)?;
        self.removed.insert(id.to_string());
        self.order.retain(|existing| existing != id);
        if self.current.as_deref() == Some(id) {
            self.current = None;
        }
        Some(removed)
    }

    /// Point the view at `id`. Returns false for unknown ids.
    pub fn select(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.current = Some(id.to_string());
        true
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current(&self) -> Option<&Conversation> {
        self.current.as_deref().and_then(|id| self.get(id))
    }

    pub fn rename(&mut self, id: &str, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        match self.get_mut(id) {
            Some(conversation) => {
                conversation.chat.title = title.to_string();
                true
            }
            None => false,
        }
    }

    /// Chats in listing order
    pub fn chats(&self) -> Vec<Chat> {
        self.iter().map(|c| c.chat.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Conversation> {
        self.order.iter().filter_map(|id| self.conversations.get(id))
    }

    /// Id of the conversation holding `message_id`
    pub fn find_message_owner(&self, message_id: &str) -> Option<&str> {
        self.iter()
            .find(|c| c.messages.contains(message_id))
            .map(|c| c.chat.id.as_str())
    }

    pub fn count(&self) -> usize {
        self.conversations.len()
    }
}
