//! Stream session: one in-flight generation attempt for one message
//!
//! A session turns transport bytes into [`StreamUpdate`]s. Updates arrive
//! as `Chunk*` followed by exactly one terminal update, unless the session
//! is cancelled first, in which case nothing more is delivered.
//!
//! ```text
//!            chunk
//!           ┌─────┐
//!           ▼     │
//!        ┌────────┴┐  completed      ┌───────────┐
//!        │ Active  ├────────────────►│ Completed │
//!        └┬───┬───┬┘                 └───────────┘
//!   error │   │   │ transport failure ┌────────────────────┐
//!         │   │   └──────────────────►│ ConnectionErrored  │
//!         ▼   │ cancel                └────────────────────┘
//!  ┌─────────┐│   ┌─────────┐
//!  │ Errored ││   │ Aborted │
//!  └─────────┘└──►└─────────┘
//! ```

use crate::transport::{EventParser, StreamEvent, TransportError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome delivered to the session's owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    Chunk(String),
    Completed,
    /// Application error reported by the backend
    Error(String),
    /// Transport-level failure; the detail is for logs, not for users
    ConnectionError(String),
}

impl StreamUpdate {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Errored,
    ConnectionErrored,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self != Self::Active
    }
}

/// Cloneable cancellation handle for a session
///
/// Cancelling is idempotent and harmless after the session has finished.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

pub struct StreamSession {
    message_id: String,
    state: SessionState,
    parser: EventParser,
    cancel: CancelHandle,
    idle_timeout: Option<Duration>,
}

impl StreamSession {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            state: SessionState::Active,
            parser: EventParser::new(),
            cancel: CancelHandle::default(),
            idle_timeout: None,
        }
    }

    /// Treat `timeout` of silence on the byte stream as a connection error
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Share a cancellation handle created before the session itself
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Feed raw bytes. Returns the state after processing them.
    pub fn feed(&mut self, bytes: &[u8], mut on_update: impl FnMut(StreamUpdate)) -> SessionState {
        if !self.refresh_cancelled() {
            return self.state;
        }
        self.parser.push(bytes);
        self.pump(&mut on_update)
    }

    /// The byte stream ended. A stream that closes before a terminal event
    /// is a connection error.
    pub fn finish(&mut self, mut on_update: impl FnMut(StreamUpdate)) -> SessionState {
        if !self.refresh_cancelled() {
            return self.state;
        }
        self.parser.finish();
        self.pump(&mut on_update);
        if self.state == SessionState::Active {
            self.terminate_with_connection_error(
                "Stream closed before generation completed".to_string(),
                &mut on_update,
            );
        }
        self.state
    }

    /// The transport failed
    pub fn fail(
        &mut self,
        error: &TransportError,
        mut on_update: impl FnMut(StreamUpdate),
    ) -> SessionState {
        if !self.refresh_cancelled() {
            return self.state;
        }
        tracing::warn!(
            message_id = %self.message_id,
            kind = ?error.kind,
            error = %error,
            "Code stream failed"
        );
        self.terminate_with_connection_error(error.message.clone(), &mut on_update);
        self.state
    }

    /// Consume `bytes` until a terminal state or cancellation.
    ///
    /// The byte stream is dropped (closing the connection) before this
    /// returns, whatever the outcome.
    pub async fn drive<S>(&mut self, mut bytes: S, mut on_update: impl FnMut(StreamUpdate)) -> SessionState
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
    {
        let cancel = self.cancel.clone();

        while self.refresh_cancelled() {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    self.state = SessionState::Aborted;
                    break;
                }
                next = next_chunk(&mut bytes, self.idle_timeout) => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    self.feed(&chunk, &mut on_update);
                }
                Some(Err(e)) => {
                    self.fail(&e, &mut on_update);
                }
                None => {
                    self.finish(&mut on_update);
                }
            }
        }

        drop(bytes);
        tracing::debug!(
            message_id = %self.message_id,
            state = ?self.state,
            skipped = self.parser.skipped(),
            "Stream session ended"
        );
        self.state
    }

    /// Move to `Aborted` if cancellation was requested. Returns whether the
    /// session is still active.
    fn refresh_cancelled(&mut self) -> bool {
        if !self.state.is_terminal() && self.cancel.is_cancelled() {
            self.state = SessionState::Aborted;
        }
        !self.state.is_terminal()
    }

    fn pump(&mut self, on_update: &mut impl FnMut(StreamUpdate)) -> SessionState {
        while self.refresh_cancelled() {
            let Some(event) = self.parser.next_event() else {
                break;
            };
            self.apply(event, on_update);
        }
        self.state
    }

    fn apply(&mut self, event: StreamEvent, on_update: &mut impl FnMut(StreamUpdate)) {
        if !event.message_id().is_empty() && event.message_id() != self.message_id {
            tracing::debug!(
                message_id = %self.message_id,
                echoed = %event.message_id(),
                "Backend echoed a different message id"
            );
        }

        if event.is_terminal() {
            tracing::debug!(message_id = %self.message_id, event = ?event, "Terminal event received");
        }

        match event {
            StreamEvent::CodeChunk { data, .. } => on_update(StreamUpdate::Chunk(data)),
            StreamEvent::Completed { .. } => {
                self.state = SessionState::Completed;
                on_update(StreamUpdate::Completed);
            }
            StreamEvent::Error { data, .. } => {
                self.state = SessionState::Errored;
                on_update(StreamUpdate::Error(data));
            }
        }
    }

    fn terminate_with_connection_error(
        &mut self,
        detail: String,
        on_update: &mut impl FnMut(StreamUpdate),
    ) {
        self.state = SessionState::ConnectionErrored;
        on_update(StreamUpdate::ConnectionError(detail));
    }
}

async fn next_chunk<S>(
    bytes: &mut S,
    idle_timeout: Option<Duration>,
) -> Option<Result<Bytes, TransportError>>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    match idle_timeout {
        None => bytes.next().await,
        Some(limit) => match tokio::time::timeout(limit, bytes.next()).await {
            Ok(next) => next,
            Err(_) => Some(Err(TransportError::idle_timeout(format!(
                "No data received for {}s",
                limit.as_secs_f32()
            )))),
        },
    }
}
