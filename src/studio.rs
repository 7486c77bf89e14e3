//! Orchestration façade
//!
//! The only entry point other layers use. It owns the conversation
//! registry and the table of in-flight sessions, spawns one task per
//! generation or render, and reconciles every update against the
//! conversation and message ids captured when that work started.
//!
//! Locking: the registry lock is taken before the session-table lock,
//! neither is ever held across an `.await`, and cancellation is checked
//! under the registry lock right before an update is applied. Once
//! [`Studio::cancel_stream`] returns, no update for that message lands.

mod events;

#[cfg(test)]
pub mod testing;

pub use events::{StudioEvent, StudioSnapshot};

use crate::backend::ChatBackend;
use crate::config::StudioConfig;
use crate::registry::{Chat, Conversation, ConversationRegistry};
use crate::session::{CancelHandle, StreamSession, StreamUpdate};
use crate::state_machine::{AiState, AiStateMachine};
use crate::store::{Message, MessagePatch, MessageStore, VIDEO_RENDERING};
use crate::transport::CodeStreamSource;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// User-facing text for any transport failure
pub const CONNECTION_ERROR_TEXT: &str = "Connection error occurred. Please try again.";
pub const SEND_FAILED_TEXT: &str = "Failed to send message";

const EVENT_CAPACITY: usize = 256;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkKind {
    Generate,
    Render,
}

/// Bookkeeping for one in-flight task, keyed by message id
struct ActiveWork {
    id: u64,
    conversation_id: String,
    kind: WorkKind,
    cancel: CancelHandle,
}

/// Identity of a task's work, captured when it starts
#[derive(Debug, Clone)]
struct Target {
    work_id: u64,
    conversation_id: String,
    message_id: String,
    cancel: CancelHandle,
}

struct Shared {
    registry: Mutex<ConversationRegistry>,
    work: Mutex<HashMap<String, ActiveWork>>,
    next_work_id: AtomicU64,
    source: Arc<dyn CodeStreamSource>,
    backend: Arc<dyn ChatBackend>,
    events: broadcast::Sender<StudioEvent>,
    idle_timeout: Option<Duration>,
}

/// Cheap to clone; all clones drive the same state
#[derive(Clone)]
pub struct Studio {
    shared: Arc<Shared>,
}

impl Studio {
    pub fn new(
        source: Arc<dyn CodeStreamSource>,
        backend: Arc<dyn ChatBackend>,
        config: &StudioConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(ConversationRegistry::new()),
                work: Mutex::new(HashMap::new()),
                next_work_id: AtomicU64::new(1),
                source,
                backend,
                events,
                idle_timeout: config.stream_idle_timeout,
            }),
        }
    }

    /// Live updates. Events sent before subscribing are not replayed; take a
    /// [`Studio::current_state`] snapshot first.
    pub fn subscribe(&self) -> broadcast::Receiver<StudioEvent> {
        self.shared.events.subscribe()
    }

    /// Start generating code for `prompt`.
    ///
    /// Without a conversation id a new conversation is created and made
    /// current. Returns the new message id, or `None` when the prompt is
    /// blank or the conversation is unknown. Must be called from within a
    /// Tokio runtime.
    pub fn submit_prompt(&self, prompt: &str, conversation_id: Option<&str>) -> Option<String> {
        if prompt.trim().is_empty() {
            tracing::debug!("Ignoring empty prompt");
            return None;
        }

        let message = Message::from_prompt(prompt);
        let message_id = message.id.clone();

        let (target, new_chat) = {
            let mut registry = lock(&self.shared.registry);

            let (conversation_id, new_chat) = match conversation_id {
                Some(id) if registry.contains(id) => (id.to_string(), None),
                Some(id) => {
                    tracing::warn!(conv_id = %id, "Prompt submitted to unknown conversation");
                    return None;
                }
                None => {
                    let chat = Chat::from_prompt(prompt);
                    let id = chat.id.clone();
                    registry.insert(Conversation::new(chat.clone()));
                    registry.select(&id);
                    tracing::info!(conv_id = %id, title = %chat.title, "Created conversation");
                    (id, Some(chat))
                }
            };

            let conversation = registry.get_mut(&conversation_id)?;
            if let Err(e) = conversation.messages.append(message.clone()) {
                tracing::error!(conv_id = %conversation_id, error = %e, "Could not append message");
                return None;
            }
            conversation.ai.transition(AiState::GeneratingCode, None);

            if new_chat.is_some() {
                self.shared.emit_conversations(&registry);
            }
            self.shared.emit(StudioEvent::MessageUpdated {
                conversation_id: conversation_id.clone(),
                message: message.clone(),
            });
            self.shared.emit_state(&registry, &conversation_id);

            let target = self.shared.register(&conversation_id, &message_id, WorkKind::Generate);
            (target, new_chat)
        };

        tracing::info!(
            conv_id = %target.conversation_id,
            message_id = %message_id,
            "Prompt submitted"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.generate(target, message, new_chat).await;
        });

        Some(message_id)
    }

    /// Switch the current conversation. Unknown ids are ignored.
    pub fn select_conversation(&self, conversation_id: &str) -> bool {
        let mut registry = lock(&self.shared.registry);
        if !registry.select(conversation_id) {
            tracing::debug!(conv_id = %conversation_id, "Select of unknown conversation ignored");
            return false;
        }
        self.shared.emit_conversations(&registry);
        true
    }

    /// Remove a conversation, cancelling anything in flight for it. The
    /// backend copy is deleted in the background; failures are only logged.
    pub fn delete_conversation(&self, conversation_id: &str) -> bool {
        {
            let mut registry = lock(&self.shared.registry);
            if registry.remove(conversation_id).is_none() {
                return false;
            }

            let mut work = lock(&self.shared.work);
            work.retain(|message_id, active| {
                if active.conversation_id != conversation_id {
                    return true;
                }
                tracing::debug!(message_id = %message_id, "Cancelling work of deleted conversation");
                active.cancel.cancel();
                false
            });
            drop(work);

            self.shared.emit_conversations(&registry);
        }

        tracing::info!(conv_id = %conversation_id, "Deleted conversation");

        let backend = Arc::clone(&self.shared.backend);
        let conversation_id = conversation_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = backend.delete_conversation(&conversation_id).await {
                tracing::warn!(conv_id = %conversation_id, error = %e, "Backend delete failed");
            }
        });
        true
    }

    pub fn rename_conversation(&self, conversation_id: &str, title: &str) -> bool {
        let mut registry = lock(&self.shared.registry);
        if !registry.rename(conversation_id, title) {
            return false;
        }
        self.shared.emit_conversations(&registry);
        true
    }

    /// Leave the error state of a conversation
    pub fn clear_error(&self, conversation_id: &str) -> bool {
        let mut registry = lock(&self.shared.registry);
        let Some(conversation) = registry.get_mut(conversation_id) else {
            return false;
        };
        conversation.ai.clear_error();
        self.shared.emit_state(&registry, conversation_id);
        true
    }

    /// Abort the generation or render running for `message_id`.
    ///
    /// The message stops streaming (a render leaves the code in place and
    /// drops the pending video). Returns false when nothing was running.
    pub fn cancel_stream(&self, message_id: &str) -> bool {
        let mut registry = lock(&self.shared.registry);
        let Some(active) = lock(&self.shared.work).remove(message_id) else {
            return false;
        };
        active.cancel.cancel();

        let conversation_id = active.conversation_id;
        let Some(conversation) = registry.get_mut(&conversation_id) else {
            return true;
        };

        let (patch, state) = match active.kind {
            WorkKind::Generate => (MessagePatch::default().streaming(false), AiState::Idle),
            WorkKind::Render => (MessagePatch::default().video_url(None), AiState::CodeComplete),
        };
        if let Some(message) = conversation.messages.update(message_id, patch) {
            let message = message.clone();
            self.shared.emit(StudioEvent::MessageUpdated {
                conversation_id: conversation_id.clone(),
                message,
            });
        }
        self.shared.settle(&mut conversation.ai, message_id, state, None);
        self.shared.emit_state(&registry, &conversation_id);

        tracing::info!(conv_id = %conversation_id, message_id = %message_id, kind = ?active.kind, "Cancelled");
        true
    }

    /// Render the code of a finished message to video.
    ///
    /// Only starts when the owning conversation is `code_complete` or
    /// `video_complete` and the message has finished streaming with code.
    pub fn render_video(&self, message_id: &str) -> bool {
        let (target, code) = {
            let mut registry = lock(&self.shared.registry);
            let Some(conversation_id) = registry.find_message_owner(message_id).map(str::to_string)
            else {
                tracing::debug!(message_id = %message_id, "Render requested for unknown message");
                return false;
            };
            let Some(conversation) = registry.get_mut(&conversation_id) else {
                return false;
            };

            if self.shared.running_in(&conversation_id, message_id) == Some(WorkKind::Generate) {
                tracing::debug!(conv_id = %conversation_id, "Render refused while code is generating");
                return false;
            }
            if !conversation.ai.current().can_render() {
                tracing::debug!(
                    conv_id = %conversation_id,
                    state = %conversation.ai.current(),
                    "Render not allowed in current state"
                );
                return false;
            }
            let code = match conversation.messages.get(message_id) {
                Some(message)
                    if !message.is_streaming
                        && !message.is_rendering()
                        && !message.code.trim().is_empty() =>
                {
                    message.code.clone()
                }
                _ => return false,
            };

            let patch = MessagePatch::default().video_url(Some(VIDEO_RENDERING.to_string()));
            if let Some(message) = conversation.messages.update(message_id, patch) {
                let message = message.clone();
                self.shared.emit(StudioEvent::MessageUpdated {
                    conversation_id: conversation_id.clone(),
                    message,
                });
            }
            conversation.ai.transition(AiState::GeneratingVideo, None);
            self.shared.emit_state(&registry, &conversation_id);

            (self.shared.register(&conversation_id, message_id, WorkKind::Render), code)
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.render(target, code).await;
        });
        true
    }

    /// Load conversations and messages from the backend.
    ///
    /// Conversations with work in flight keep their local copy, and ones
    /// deleted locally stay deleted. Returns false if the conversation list
    /// could not be fetched.
    pub async fn refresh(&self) -> bool {
        let chats = match self.shared.backend.list_conversations().await {
            Ok(chats) => chats,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load conversations");
                return false;
            }
        };

        let mut loaded = Vec::with_capacity(chats.len());
        for chat in chats {
            match self.shared.backend.list_messages(&chat.id).await {
                Ok(messages) => loaded.push((chat, Some(messages))),
                Err(e) => {
                    tracing::warn!(conv_id = %chat.id, error = %e, "Failed to load messages");
                    loaded.push((chat, None));
                }
            }
        }

        let mut registry = lock(&self.shared.registry);
        let busy: Vec<String> = lock(&self.shared.work)
            .values()
            .map(|active| active.conversation_id.clone())
            .collect();

        for (chat, messages) in loaded {
            // Deleted while the backend was being read
            if registry.was_removed(&chat.id) {
                tracing::debug!(conv_id = %chat.id, "Skipping deleted conversation");
                continue;
            }
            if busy.contains(&chat.id) {
                tracing::debug!(conv_id = %chat.id, "Keeping local copy of busy conversation");
                continue;
            }
            let conversation_id = chat.id.clone();
            match registry.get_mut(&conversation_id) {
                Some(existing) => {
                    existing.chat = chat;
                    if let Some(messages) = messages {
                        existing.messages = hydrate(&conversation_id, messages);
                    }
                }
                None => {
                    let mut conversation = Conversation::new(chat);
                    conversation.messages = hydrate(&conversation_id, messages.unwrap_or_default());
                    registry.push_back(conversation);
                }
            }
        }

        tracing::info!(conversations = registry.count(), "Refreshed from backend");
        self.shared.emit_conversations(&registry);
        if let Some(current) = registry.current_id().map(str::to_string) {
            self.shared.emit_state(&registry, &current);
        }
        true
    }

    /// Snapshot of the conversation list and the current conversation
    pub fn current_state(&self) -> StudioSnapshot {
        let registry = lock(&self.shared.registry);
        StudioSnapshot::capture(&registry)
    }

    /// Cancel everything in flight
    pub fn shutdown(&self) {
        let message_ids: Vec<String> = lock(&self.shared.work).keys().cloned().collect();
        for message_id in &message_ids {
            self.cancel_stream(message_id);
        }
        tracing::info!(cancelled = message_ids.len(), "Studio shut down");
    }
}

/// Build a store from backend messages. Nothing drives them locally, so
/// none of them can still be streaming.
fn hydrate(conversation_id: &str, messages: Vec<Message>) -> MessageStore {
    let mut store = MessageStore::new();
    for mut message in messages {
        message.is_streaming = false;
        if let Err(e) = store.append(message) {
            tracing::warn!(conv_id = %conversation_id, error = %e, "Skipping backend message");
        }
    }
    store
}

impl Shared {
    /// Record new work for `message_id`, cancelling whatever ran for it
    /// before. Called with the registry lock held.
    fn register(&self, conversation_id: &str, message_id: &str, kind: WorkKind) -> Target {
        let cancel = CancelHandle::default();
        let work_id = self.next_work_id.fetch_add(1, Ordering::Relaxed);

        let previous = lock(&self.work).insert(
            message_id.to_string(),
            ActiveWork {
                id: work_id,
                conversation_id: conversation_id.to_string(),
                kind,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        Target {
            work_id,
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            cancel,
        }
    }

    /// Kind of work still running in `conversation_id` apart from the work
    /// for `message_id`. Generation wins over rendering. Called with the
    /// registry lock held.
    fn running_in(&self, conversation_id: &str, message_id: &str) -> Option<WorkKind> {
        let mut running = None;
        for (id, active) in lock(&self.work).iter() {
            if active.conversation_id != conversation_id || id == message_id {
                continue;
            }
            if active.kind == WorkKind::Generate {
                return Some(WorkKind::Generate);
            }
            running = Some(active.kind);
        }
        running
    }

    /// Move a conversation to the state `message_id`'s work ended in. While
    /// other work in the conversation is still running the state is left as
    /// is, so it keeps reporting that work.
    fn settle(
        &self,
        ai: &mut AiStateMachine,
        message_id: &str,
        state: AiState,
        detail: Option<String>,
    ) {
        if let Some(kind) = self.running_in(ai.conversation_id(), message_id) {
            tracing::debug!(
                conv_id = %ai.conversation_id(),
                message_id,
                still_running = ?kind,
                skipped = %state,
                "Conversation still busy, keeping state"
            );
            return;
        }
        ai.transition(state, detail);
    }

    /// Drop the table entry for finished work, unless newer work replaced it
    fn release(&self, target: &Target) {
        let mut work = lock(&self.work);
        if work
            .get(&target.message_id)
            .is_some_and(|active| active.id == target.work_id)
        {
            work.remove(&target.message_id);
        }
    }

    async fn generate(self: Arc<Self>, target: Target, message: Message, new_chat: Option<Chat>) {
        if let Err(e) = self.acknowledge(&target, &message, new_chat.as_ref()).await {
            tracing::warn!(
                conv_id = %target.conversation_id,
                message_id = %target.message_id,
                error = %e,
                "Backend rejected message, rolling back"
            );
            self.roll_back(&target);
            self.release(&target);
            return;
        }

        let mut session = StreamSession::new(target.message_id.clone())
            .with_idle_timeout(self.idle_timeout)
            .with_cancel_handle(target.cancel.clone());

        let opened = tokio::select! {
            biased;
            () = target.cancel.cancelled() => {
                self.release(&target);
                return;
            }
            opened = self.source.open(&target.message_id) => opened,
        };

        let outcome = match opened {
            Ok(bytes) => {
                session
                    .drive(bytes, |update| self.apply_update(&target, update))
                    .await
            }
            Err(e) => session.fail(&e, |update| self.apply_update(&target, update)),
        };

        tracing::debug!(message_id = %target.message_id, outcome = ?outcome, "Generation finished");
        self.release(&target);
    }

    async fn acknowledge(
        &self,
        target: &Target,
        message: &Message,
        new_chat: Option<&Chat>,
    ) -> Result<(), crate::backend::BackendError> {
        if let Some(chat) = new_chat {
            self.backend.create_conversation(chat).await?;
        }
        self.backend
            .send_message(&target.conversation_id, message)
            .await
    }

    /// Undo the optimistic insert after the backend refused it
    fn roll_back(&self, target: &Target) {
        let mut registry = lock(&self.registry);
        if target.cancel.is_cancelled() {
            return;
        }
        let Some(conversation) = registry.get_mut(&target.conversation_id) else {
            return;
        };
        conversation.messages.remove(&target.message_id);
        self.settle(
            &mut conversation.ai,
            &target.message_id,
            AiState::Error,
            Some(SEND_FAILED_TEXT.to_string()),
        );

        self.emit(StudioEvent::MessageRemoved {
            conversation_id: target.conversation_id.clone(),
            message_id: target.message_id.clone(),
        });
        self.emit_state(&registry, &target.conversation_id);
    }

    fn apply_update(&self, target: &Target, update: StreamUpdate) {
        let mut registry = lock(&self.registry);
        if target.cancel.is_cancelled() {
            return;
        }
        let Some(conversation) = registry.get_mut(&target.conversation_id) else {
            tracing::debug!(conv_id = %target.conversation_id, "Update for removed conversation dropped");
            return;
        };

        let message_id = target.message_id.as_str();
        let terminal = update.is_terminal();
        let updated = match update {
            StreamUpdate::Chunk(text) => conversation
                .messages
                .update_with(message_id, |current| MessagePatch::append_code(current, &text)),
            StreamUpdate::Completed => {
                self.settle(&mut conversation.ai, message_id, AiState::CodeComplete, None);
                conversation
                    .messages
                    .update(message_id, MessagePatch::default().streaming(false))
            }
            StreamUpdate::Error(detail) => {
                self.settle(
                    &mut conversation.ai,
                    message_id,
                    AiState::Error,
                    Some(detail.clone()),
                );
                conversation
                    .messages
                    .update(message_id, MessagePatch::default().error(Some(detail)))
            }
            StreamUpdate::ConnectionError(detail) => {
                tracing::warn!(
                    conv_id = %target.conversation_id,
                    message_id,
                    detail = %detail,
                    "Connection error while streaming code"
                );
                self.settle(
                    &mut conversation.ai,
                    message_id,
                    AiState::Error,
                    Some(CONNECTION_ERROR_TEXT.to_string()),
                );
                conversation
                    .messages
                    .update(message_id, MessagePatch::default().streaming(false))
            }
        };

        if let Some(message) = updated {
            let message = message.clone();
            self.emit(StudioEvent::MessageUpdated {
                conversation_id: target.conversation_id.clone(),
                message,
            });
        }
        if terminal {
            self.emit_state(&registry, &target.conversation_id);
        }
    }

    async fn render(self: Arc<Self>, target: Target, code: String) {
        let result = tokio::select! {
            biased;
            () = target.cancel.cancelled() => {
                self.release(&target);
                return;
            }
            result = self.backend.render_video(&target.message_id, &code) => result,
        };

        {
            let mut registry = lock(&self.registry);
            if target.cancel.is_cancelled() {
                drop(registry);
                self.release(&target);
                return;
            }
            if let Some(conversation) = registry.get_mut(&target.conversation_id) {
                let patch = match result {
                    Ok(url) => {
                        tracing::info!(message_id = %target.message_id, %url, "Video rendered");
                        self.settle(
                            &mut conversation.ai,
                            &target.message_id,
                            AiState::VideoComplete,
                            None,
                        );
                        MessagePatch::default().video_url(Some(url))
                    }
                    Err(e) => {
                        tracing::warn!(message_id = %target.message_id, error = %e, "Render failed");
                        let detail = e.to_string();
                        self.settle(
                            &mut conversation.ai,
                            &target.message_id,
                            AiState::Error,
                            Some(detail.clone()),
                        );
                        MessagePatch::default().video_url(None).error(Some(detail))
                    }
                };
                if let Some(message) = conversation.messages.update(&target.message_id, patch) {
                    let message = message.clone();
                    self.emit(StudioEvent::MessageUpdated {
                        conversation_id: target.conversation_id.clone(),
                        message,
                    });
                }
                self.emit_state(&registry, &target.conversation_id);
            }
        }

        self.release(&target);
    }

    fn emit(&self, event: StudioEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn emit_conversations(&self, registry: &ConversationRegistry) {
        self.emit(StudioEvent::ConversationsChanged {
            conversations: registry.chats(),
            current_conversation_id: registry.current_id().map(str::to_string),
        });
    }

    fn emit_state(&self, registry: &ConversationRegistry, conversation_id: &str) {
        if let Some(conversation) = registry.get(conversation_id) {
            self.emit(StudioEvent::StateChanged {
                conversation_id: conversation_id.to_string(),
                ai_state: conversation.ai.current(),
                status_text: conversation.ai.status_text(),
                is_processing: conversation.ai.is_processing(),
            });
        }
    }
}
