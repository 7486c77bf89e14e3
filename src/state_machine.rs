//! Per-conversation AI processing state
//!
//! One machine per conversation tracks where generation stands:
//! idle → generating code → code ready → rendering video → video ready,
//! with an error branch reachable from anywhere.

pub mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use state::AiState;
pub use transition::AiStateMachine;
