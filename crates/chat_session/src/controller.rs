//! ConversationController - the only mutation surface of a conversation
//!
//! Tree state lives behind an async lock that is never held across a call to
//! the response generator, so reads and other mutations proceed while an
//! answer is pending. Concurrent generations are allowed; when they finish
//! out of order the configured `SelectionPolicy` decides whose answer becomes
//! the tip.

use std::sync::Arc;

use chat_tree::{navigator, BranchInfo, Node, NodeId, NodeStore, Turn};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{ConversationConfig, SelectionPolicy};
use crate::error::{ConversationError, GenerationError, Result};
use crate::events::ConversationEvent;
use crate::generator::{GeneratedResponse, PromptTurn, ResponseGenerator};
use crate::snapshot::ConversationSnapshot;

/// Result of a turn that reached the generator and produced an answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseOutcome {
    /// The user node the answer responds to.
    pub prompt_node_id: NodeId,
    pub response_node_id: NodeId,
    /// Whether the answer became the active thread's tip.
    pub selected: bool,
}

#[derive(Debug, Default)]
struct ConversationState {
    store: NodeStore,
    active_thread: Vec<NodeId>,
    /// Bumped on every active thread change.
    thread_version: u64,
}

impl ConversationState {
    fn set_thread(&mut self, thread: Vec<NodeId>) -> Vec<NodeId> {
        self.active_thread = thread;
        self.thread_version += 1;
        self.active_thread.clone()
    }

    /// Must be built under the same lock as the change it reports.
    fn thread_event(&self) -> ConversationEvent {
        ConversationEvent::ActiveThreadChanged {
            thread: self.active_thread.clone(),
            version: self.thread_version,
        }
    }

    fn prompt_for(&self, node_id: NodeId) -> chat_tree::Result<Vec<PromptTurn>> {
        let path = navigator::path_to_root(&self.store, node_id)?;
        Ok(navigator::history(&self.store, &path)?
            .into_iter()
            .map(PromptTurn::from)
            .collect())
    }
}

/// Whether a newly stored answer becomes the active thread's tip.
#[derive(Debug, Clone, Copy)]
enum Selection {
    Never,
    Always,
    /// Decided by the configured policy for a generation that started when
    /// the thread was at this version.
    Policy { started_version: u64 },
}

/// A user turn that was stored and is about to be sent to the generator.
struct PendingGeneration {
    prompt_node_id: NodeId,
    prompt: Vec<PromptTurn>,
    started_version: u64,
}

#[derive(Clone)]
pub struct ConversationController {
    id: Uuid,
    state: Arc<RwLock<ConversationState>>,
    generator: Arc<dyn ResponseGenerator>,
    config: Arc<ConversationConfig>,
    event_tx: Option<mpsc::Sender<ConversationEvent>>,
}

impl ConversationController {
    pub fn new(generator: Arc<dyn ResponseGenerator>, config: ConversationConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: Arc::new(RwLock::new(ConversationState::default())),
            generator,
            config: Arc::new(config),
            event_tx: None,
        }
    }

    /// Reopen a conversation from a snapshot, validating the tree and thread.
    pub fn restore(
        snapshot: ConversationSnapshot,
        generator: Arc<dyn ResponseGenerator>,
        config: ConversationConfig,
    ) -> Result<Self> {
        let (id, store, active_thread) = snapshot.into_parts()?;
        tracing::info!(
            conversation_id = %id,
            pool_size = store.len(),
            thread_len = active_thread.len(),
            "Conversation restored"
        );
        Ok(Self {
            id,
            state: Arc::new(RwLock::new(ConversationState {
                store,
                active_thread,
                thread_version: 0,
            })),
            generator,
            config: Arc::new(config),
            event_tx: None,
        })
    }

    pub fn with_event_sender(mut self, event_tx: mpsc::Sender<ConversationEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    // ========== Reads ==========

    pub async fn active_thread(&self) -> Vec<NodeId> {
        self.state.read().await.active_thread.clone()
    }

    /// Full nodes of the active thread, root first, for rendering.
    pub async fn active_thread_nodes(&self) -> Result<Vec<Node>> {
        let state = self.state.read().await;
        state
            .active_thread
            .iter()
            .map(|id| state.store.get(*id).cloned().map_err(ConversationError::from))
            .collect()
    }

    pub async fn node(&self, node_id: NodeId) -> Result<Node> {
        Ok(self.state.read().await.store.get(node_id)?.clone())
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.store.len()
    }

    pub async fn branch_info(&self, node_id: NodeId) -> Result<BranchInfo> {
        Ok(navigator::branch_info(&self.state.read().await.store, node_id)?)
    }

    pub async fn path_to_root(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        Ok(navigator::path_to_root(&self.state.read().await.store, node_id)?)
    }

    pub async fn snapshot(&self) -> ConversationSnapshot {
        let state = self.state.read().await;
        ConversationSnapshot {
            conversation_id: self.id,
            nodes: state.store.iter().cloned().collect(),
            active_thread: state.active_thread.clone(),
        }
    }

    // ========== Mutations ==========

    /// Append a user message at the tip and generate the answer to it.
    ///
    /// On generation failure the user node stays in the tree as the tip and
    /// the error carries its id so the caller can regenerate.
    pub async fn add_message(&self, text: impl Into<String>) -> Result<ResponseOutcome> {
        self.add_message_with_cancel(text, CancellationToken::new())
            .await
    }

    pub async fn add_message_with_cancel(
        &self,
        text: impl Into<String>,
        cancel_token: CancellationToken,
    ) -> Result<ResponseOutcome> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let (pending, created, thread_changed) = {
            let mut state = self.state.write().await;
            let mut created = Vec::new();
            let mut parent = state.active_thread.last().copied();

            if parent.is_none() {
                if let Some(system_prompt) = self.config.system_prompt.as_deref() {
                    let system_id = state
                        .store
                        .create_node(None, Turn::system(system_prompt))?;
                    created.push(system_id);
                    parent = Some(system_id);
                }
            }

            let user_id = state.store.create_node(parent, Turn::user(text))?;
            created.push(user_id);
            let path = navigator::path_to_root(&state.store, user_id)?;
            let thread = state.set_thread(path);

            tracing::info!(
                conversation_id = %self.id,
                node_id = %user_id,
                parent_id = ?parent,
                thread_len = thread.len(),
                "Conversation: user message added"
            );

            let pending = PendingGeneration {
                prompt_node_id: user_id,
                prompt: state.prompt_for(user_id)?,
                started_version: state.thread_version,
            };
            (
                pending,
                self.created_events(&state.store, &created),
                state.thread_event(),
            )
        };

        for event in created {
            self.emit(event).await;
        }
        self.emit(thread_changed).await;

        self.generate_and_attach(pending, cancel_token).await
    }

    /// Store an assistant answer under `parent_id`.
    ///
    /// With `select` the new node becomes the active thread's tip; without it
    /// the answer is stored silently, e.g. to compare drafts.
    pub async fn add_response_node(
        &self,
        parent_id: NodeId,
        response: GeneratedResponse,
        select: bool,
    ) -> Result<NodeId> {
        let outcome = self
            .attach_response(
                parent_id,
                response,
                if select {
                    Selection::Always
                } else {
                    Selection::Never
                },
            )
            .await?;
        Ok(outcome.response_node_id)
    }

    /// Generate a new answer to an existing user message.
    ///
    /// The answer is added as a new sibling of any previous answers, which
    /// stay reachable.
    pub async fn regenerate_response(&self, user_node_id: NodeId) -> Result<ResponseOutcome> {
        self.regenerate_response_with_cancel(user_node_id, CancellationToken::new())
            .await
    }

    pub async fn regenerate_response_with_cancel(
        &self,
        user_node_id: NodeId,
        cancel_token: CancellationToken,
    ) -> Result<ResponseOutcome> {
        let pending = {
            let state = self.state.read().await;
            let node = state.store.get(user_node_id)?;
            if !node.turn().is_user() {
                return Err(ConversationError::NotAUserNode(user_node_id));
            }
            PendingGeneration {
                prompt_node_id: user_node_id,
                prompt: state.prompt_for(user_node_id)?,
                started_version: state.thread_version,
            }
        };

        tracing::info!(
            conversation_id = %self.id,
            node_id = %user_node_id,
            "Conversation: regenerating response"
        );

        self.generate_and_attach(pending, cancel_token).await
    }

    /// Resend an edited version of a user message as a new sibling of it.
    pub async fn edit_and_resend(
        &self,
        user_node_id: NodeId,
        text: impl Into<String>,
    ) -> Result<ResponseOutcome> {
        self.edit_and_resend_with_cancel(user_node_id, text, CancellationToken::new())
            .await
    }

    pub async fn edit_and_resend_with_cancel(
        &self,
        user_node_id: NodeId,
        text: impl Into<String>,
        cancel_token: CancellationToken,
    ) -> Result<ResponseOutcome> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConversationError::EmptyMessage);
        }

        let (pending, created, thread_changed) = {
            let mut state = self.state.write().await;
            let original = state.store.get(user_node_id)?;
            if !original.turn().is_user() {
                return Err(ConversationError::NotAUserNode(user_node_id));
            }
            let parent = original.parent_id();

            let edited_id = state.store.create_node(parent, Turn::user(text))?;
            let path = navigator::path_to_root(&state.store, edited_id)?;
            state.set_thread(path);

            tracing::info!(
                conversation_id = %self.id,
                node_id = %edited_id,
                replaces = %user_node_id,
                "Conversation: edited message resent"
            );

            let pending = PendingGeneration {
                prompt_node_id: edited_id,
                prompt: state.prompt_for(edited_id)?,
                started_version: state.thread_version,
            };
            (
                pending,
                self.created_events(&state.store, &[edited_id]),
                state.thread_event(),
            )
        };

        for event in created {
            self.emit(event).await;
        }
        self.emit(thread_changed).await;

        self.generate_and_attach(pending, cancel_token).await
    }

    /// Make the path ending at `node_id` the active thread.
    ///
    /// Descendants of `node_id` are not re-attached; the next message
    /// branches from it.
    pub async fn switch_branch(&self, node_id: NodeId) -> Result<Vec<NodeId>> {
        let (thread, thread_changed) = {
            let mut state = self.state.write().await;
            let path = navigator::path_to_root(&state.store, node_id)?;
            (state.set_thread(path), state.thread_event())
        };

        tracing::info!(
            conversation_id = %self.id,
            node_id = %node_id,
            thread_len = thread.len(),
            "Conversation: switched branch"
        );

        self.emit(thread_changed).await;
        Ok(thread)
    }

    /// Switch to the sibling at `index` in `node_id`'s branch group.
    pub async fn switch_to_sibling(&self, node_id: NodeId, index: usize) -> Result<Vec<NodeId>> {
        let target = {
            let state = self.state.read().await;
            navigator::sibling_at(&state.store, node_id, index)?
        };
        self.switch_branch(target).await
    }

    /// Clear the active thread so the next message starts a new root.
    pub async fn start_new_conversation(&self) {
        let thread_changed = {
            let mut state = self.state.write().await;
            state.set_thread(Vec::new());
            state.thread_event()
        };
        tracing::info!(conversation_id = %self.id, "Conversation: new thread started");
        self.emit(thread_changed).await;
    }

    /// Install an externally supplied active thread after validating it.
    pub async fn set_active_thread(&self, thread: Vec<NodeId>) -> Result<()> {
        let thread_changed = {
            let mut state = self.state.write().await;
            navigator::check_thread(&state.store, &thread)?;
            state.set_thread(thread);
            state.thread_event()
        };
        self.emit(thread_changed).await;
        Ok(())
    }

    // ========== Internals ==========

    async fn generate_and_attach(
        &self,
        pending: PendingGeneration,
        cancel_token: CancellationToken,
    ) -> Result<ResponseOutcome> {
        let prompt_node_id = pending.prompt_node_id;
        self.emit(ConversationEvent::GenerationStarted { prompt_node_id })
            .await;

        tracing::debug!(
            conversation_id = %self.id,
            prompt_node_id = %prompt_node_id,
            history_len = pending.prompt.len(),
            "Conversation: requesting response"
        );

        let generation = self.run_generator(&pending.prompt);
        let result = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                tracing::info!(
                    conversation_id = %self.id,
                    prompt_node_id = %prompt_node_id,
                    "Conversation: generation cancelled"
                );
                self.emit(ConversationEvent::GenerationCancelled { prompt_node_id })
                    .await;
                return Err(ConversationError::Cancelled { prompt_node_id });
            }
            result = generation => result,
        };

        match result {
            Ok(response) => {
                let selection = Selection::Policy {
                    started_version: pending.started_version,
                };
                self.attach_response(prompt_node_id, response, selection)
                    .await
            }
            Err(source) => {
                tracing::warn!(
                    conversation_id = %self.id,
                    prompt_node_id = %prompt_node_id,
                    error = %source,
                    "Conversation: generation failed"
                );
                self.emit(ConversationEvent::GenerationFailed {
                    prompt_node_id,
                    message: source.to_string(),
                })
                .await;
                Err(ConversationError::GenerationFailure {
                    prompt_node_id,
                    source,
                })
            }
        }
    }

    async fn run_generator(
        &self,
        prompt: &[PromptTurn],
    ) -> std::result::Result<GeneratedResponse, GenerationError> {
        let model = self.config.model.as_deref();
        match self.config.generation_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.generator.generate(prompt, model))
                .await
                .map_err(|_| GenerationError::Timeout(limit))?,
            None => self.generator.generate(prompt, model).await,
        }
    }

    /// Create the assistant node and decide whether it becomes the tip.
    async fn attach_response(
        &self,
        parent_id: NodeId,
        response: GeneratedResponse,
        selection: Selection,
    ) -> Result<ResponseOutcome> {
        let (node_id, selected, thread_changed, created) = {
            let mut state = self.state.write().await;
            let node_id = state
                .store
                .create_node(Some(parent_id), Turn::assistant(response.text, response.model))?;

            let selected = match selection {
                Selection::Never => false,
                Selection::Always => true,
                Selection::Policy { started_version } => match self.config.selection_policy {
                    SelectionPolicy::LastWriteWins => true,
                    SelectionPolicy::RejectStale => state.thread_version == started_version,
                },
            };

            let thread_changed = if selected {
                let path = navigator::path_to_root(&state.store, node_id)?;
                state.set_thread(path);
                Some(state.thread_event())
            } else {
                None
            };

            tracing::info!(
                conversation_id = %self.id,
                node_id = %node_id,
                parent_id = %parent_id,
                selected = selected,
                "Conversation: response added"
            );

            (
                node_id,
                selected,
                thread_changed,
                self.created_events(&state.store, &[node_id]),
            )
        };

        for event in created {
            self.emit(event).await;
        }
        match thread_changed {
            Some(event) => self.emit(event).await,
            None => {
                self.emit(ConversationEvent::ResponseNotSelected { node_id })
                    .await
            }
        }

        Ok(ResponseOutcome {
            prompt_node_id: parent_id,
            response_node_id: node_id,
            selected,
        })
    }

    fn created_events(&self, store: &NodeStore, ids: &[NodeId]) -> Vec<ConversationEvent> {
        ids.iter()
            .filter_map(|id| store.get(*id).ok())
            .map(|node| ConversationEvent::NodeCreated {
                node_id: node.id(),
                parent_id: node.parent_id(),
                role: node.role(),
            })
            .collect()
    }

    async fn emit(&self, event: ConversationEvent) {
        if let Some(event_tx) = &self.event_tx {
            if event_tx.send(event).await.is_err() {
                tracing::debug!(
                    conversation_id = %self.id,
                    "Conversation: event receiver dropped"
                );
            }
        }
    }
}
