//! The per-conversation state machine
//!
//! `transition` is deliberately permissive: it sets whatever state it is
//! given. Which transitions make sense is decided by the studio, which is
//! the only caller. The machine itself only guarantees that error detail
//! is present exactly when the state is `Error`.

use super::AiState;

const ERROR_FALLBACK_TEXT: &str = "Error occurred";

#[derive(Debug, Clone)]
pub struct AiStateMachine {
    conversation_id: String,
    state: AiState,
    error: Option<String>,
}

impl AiStateMachine {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            state: AiState::Idle,
            error: None,
        }
    }

    /// Set the state. Detail is kept only when moving to `Error`.
    pub fn transition(&mut self, state: AiState, detail: Option<String>) {
        let old = self.state;
        self.state = state;
        self.error = if state == AiState::Error { detail } else { None };

        tracing::debug!(
            conv_id = %self.conversation_id,
            from = %old,
            to = %state,
            detail = ?self.error,
            "AI state transition"
        );
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn current(&self) -> AiState {
        self.state
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Leave the error branch: drops the detail and, if the machine is in
    /// `Error`, returns it to `Idle`. Other states are left alone.
    pub fn clear_error(&mut self) {
        self.error = None;
        if self.state == AiState::Error {
            self.transition(AiState::Idle, None);
        }
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }

    /// Short user-facing description of the current state
    pub fn status_text(&self) -> Option<String> {
        let text = match self.state {
            AiState::Idle => return None,
            AiState::GeneratingCode => "Generating code...",
            AiState::CodeComplete => "Code ready",
            AiState::GeneratingVideo => "Rendering video...",
            AiState::VideoComplete => "Video ready",
            AiState::Error => self.error.as_deref().unwrap_or(ERROR_FALLBACK_TEXT),
        };
        Some(text.to_string())
    }
}
