//! AI processing state values

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where generation stands for one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    /// Nothing in flight
    #[default]
    Idle,

    /// A prompt was submitted and code is streaming in
    GeneratingCode,

    /// The stream finished successfully
    CodeComplete,

    /// A render of the generated code is in progress
    GeneratingVideo,

    /// The render finished and the message carries a video locator
    VideoComplete,

    /// Generation or rendering failed; detail lives on the machine
    Error,
}

impl AiState {
    #[cfg(test)]
    pub const ALL: [AiState; 6] = [
        AiState::Idle,
        AiState::GeneratingCode,
        AiState::CodeComplete,
        AiState::GeneratingVideo,
        AiState::VideoComplete,
        AiState::Error,
    ];

    /// Work is in flight for this conversation
    pub fn is_processing(self) -> bool {
        matches!(self, AiState::GeneratingCode | AiState::GeneratingVideo)
    }

    /// A render may start from here
    pub fn can_render(self) -> bool {
        matches!(self, AiState::CodeComplete | AiState::VideoComplete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AiState::Idle => "idle",
            AiState::GeneratingCode => "generating_code",
            AiState::CodeComplete => "code_complete",
            AiState::GeneratingVideo => "generating_video",
            AiState::VideoComplete => "video_complete",
            AiState::Error => "error",
        }
    }
}

impl fmt::Display for AiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
