//! What the studio tells the outside world

use crate::registry::{Chat, ConversationRegistry};
use crate::state_machine::AiState;
use crate::store::Message;
use serde::Serialize;

/// Live change notifications
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    ConversationsChanged {
        conversations: Vec<Chat>,
        current_conversation_id: Option<String>,
    },
    MessageUpdated {
        conversation_id: String,
        message: Message,
    },
    MessageRemoved {
        conversation_id: String,
        message_id: String,
    },
    StateChanged {
        conversation_id: String,
        ai_state: AiState,
        status_text: Option<String>,
        is_processing: bool,
    },
}

impl StudioEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ConversationsChanged { .. } => "conversations_changed",
            Self::MessageUpdated { .. } => "message_updated",
            Self::MessageRemoved { .. } => "message_removed",
            Self::StateChanged { .. } => "state_changed",
        }
    }
}

/// Everything a view needs to draw itself
#[derive(Debug, Clone, Serialize)]
pub struct StudioSnapshot {
    pub conversations: Vec<Chat>,
    pub current_conversation_id: Option<String>,
    /// Messages of the current conversation, oldest first
    pub messages: Vec<Message>,
    pub ai_state: AiState,
    pub ai_status_text: Option<String>,
    pub is_processing: bool,
}

impl StudioSnapshot {
    pub(super) fn capture(registry: &ConversationRegistry) -> Self {
        let current = registry.current();
        Self {
            conversations: registry.chats(),
            current_conversation_id: registry.current_id().map(str::to_string),
            messages: current
                .map(|c| c.messages.all().to_vec())
                .unwrap_or_default(),
            ai_state: current.map(|c| c.ai.current()).unwrap_or_default(),
            ai_status_text: current.and_then(|c| c.ai.status_text()),
            is_processing: current.is_some_and(|c| c.ai.is_processing()),
        }
    }
}
