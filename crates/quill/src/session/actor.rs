//! The single-writer session actor.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use futures::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};

use quill_protocol::{ChatMessage, Role, ServerEvent};

use crate::history::HistoryStore;
use crate::inference::InferenceBackend;
use crate::relay::{StreamEvent, StreamRelay};

use super::SessionError;

/// Size of the actor's command queue.
const COMMAND_BUFFER_SIZE: usize = 64;

/// Operations executed by the actor, strictly in arrival order.
enum SessionCommand {
    GetMessages {
        reply: oneshot::Sender<Result<Vec<ChatMessage>>>,
    },
    Clear {
        reply: oneshot::Sender<Result<()>>,
    },
    Bind {
        events: mpsc::Sender<ServerEvent>,
    },
    Prompt {
        text: String,
    },
}

/// Cheap cloneable handle to one user key's actor.
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    turn_active: Arc<AtomicBool>,
}

impl SessionHandle {
    /// Snapshot of the persisted history.
    ///
    /// Queued behind any turn in progress, so the caller never observes a
    /// half-written exchange.
    pub async fn get_messages(&self) -> Result<Vec<ChatMessage>> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::GetMessages { reply })
            .await
            .map_err(|_| anyhow::anyhow!("session actor unavailable"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("session actor dropped reply"))?
    }

    /// Erase the persisted history. Idempotent; queued behind any turn.
    pub async fn clear(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Clear { reply })
            .await
            .map_err(|_| anyhow::anyhow!("session actor unavailable"))?;
        rx.await
            .map_err(|_| anyhow::anyhow!("session actor dropped reply"))?
    }

    /// Bind the live connection for this key, replacing any previous one.
    pub async fn bind(&self, events: mpsc::Sender<ServerEvent>) -> Result<()> {
        self.command_tx
            .send(SessionCommand::Bind { events })
            .await
            .map_err(|_| anyhow::anyhow!("session actor unavailable"))
    }

    /// Start a turn for `text`.
    ///
    /// Rejected immediately with [`SessionError::Busy`] while another turn
    /// is streaming; a rejected prompt never enters the queue and leaves
    /// history and turn state untouched.
    pub async fn send_prompt(&self, text: String) -> Result<(), SessionError> {
        if self
            .turn_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy);
        }

        if self
            .command_tx
            .send(SessionCommand::Prompt { text })
            .await
            .is_err()
        {
            self.turn_active.store(false, Ordering::Release);
            return Err(SessionError::Backend("session actor unavailable".into()));
        }

        Ok(())
    }

    /// Whether a turn is currently active (or queued to start).
    pub fn is_turn_active(&self) -> bool {
        self.turn_active.load(Ordering::Acquire)
    }
}

/// Actor owning one user key's history handle and live connection.
pub struct SessionActor {
    user_id: String,
    store: HistoryStore,
    backend: Arc<dyn InferenceBackend>,
    connection: Option<mpsc::Sender<ServerEvent>>,
    turn_active: Arc<AtomicBool>,
}

impl SessionActor {
    /// Spawn the actor task for `user_id` and return its handle.
    pub fn spawn(
        user_id: String,
        store: HistoryStore,
        backend: Arc<dyn InferenceBackend>,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let turn_active = Arc::new(AtomicBool::new(false));

        let actor = Self {
            user_id,
            store,
            backend,
            connection: None,
            turn_active: Arc::clone(&turn_active),
        };
        tokio::spawn(actor.run(command_rx));

        SessionHandle {
            command_tx,
            turn_active,
        }
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<SessionCommand>) {
        info!("session actor started for key {}", self.user_id);

        while let Some(command) = command_rx.recv().await {
            match command {
                SessionCommand::GetMessages { reply } => {
                    let _ = reply.send(self.store.list(&self.user_id).await);
                }
                SessionCommand::Clear { reply } => {
                    let result = self.store.clear(&self.user_id).await.map(|removed| {
                        info!("cleared {} messages for key {}", removed, self.user_id);
                    });
                    let _ = reply.send(result);
                }
                SessionCommand::Bind { events } => {
                    if self.connection.is_some() {
                        debug!("replacing live connection for key {}", self.user_id);
                    }
                    self.connection = Some(events);
                }
                SessionCommand::Prompt { text } => {
                    self.run_turn(text).await;
                    self.turn_active.store(false, Ordering::Release);
                }
            }
        }

        info!("session actor stopped for key {}", self.user_id);
    }

    /// Drive one turn to its single terminal `Done` or `Error`.
    ///
    /// The user message is persisted before the backend is contacted, so a
    /// mid-stream failure never loses the prompt.
    async fn run_turn(&mut self, text: String) {
        if let Err(e) = self.store.append(&self.user_id, Role::User, &text).await {
            error!("failed to persist prompt for key {}: {e:#}", self.user_id);
            self.forward(ServerEvent::Error {
                error: "failed to persist prompt".to_string(),
            })
            .await;
            return;
        }

        let context = match self.store.list(&self.user_id).await {
            Ok(context) => context,
            Err(e) => {
                error!("failed to load context for key {}: {e:#}", self.user_id);
                self.forward(ServerEvent::Error {
                    error: "failed to load history".to_string(),
                })
                .await;
                return;
            }
        };

        let mut stream = match self.backend.stream_chat(&context).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("backend request failed for key {}: {e:#}", self.user_id);
                self.forward(ServerEvent::Error {
                    error: e.to_string(),
                })
                .await;
                return;
            }
        };

        let mut relay = StreamRelay::new();
        let mut accumulator = String::new();

        loop {
            let chunk = match stream.next().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    // User message stays; no assistant message is appended.
                    warn!("backend stream failed for key {}: {e:#}", self.user_id);
                    self.forward(ServerEvent::Error {
                        error: e.to_string(),
                    })
                    .await;
                    return;
                }
                None => break,
            };

            let events = relay.push_chunk(&String::from_utf8_lossy(&chunk));
            if self.dispatch(events, &mut accumulator).await {
                return;
            }
        }

        // Natural end of input without an explicit sentinel.
        if let Some(event) = relay.finish() {
            self.dispatch(vec![event], &mut accumulator).await;
        }
    }

    /// Forward relay events to the client, accumulating token deltas.
    /// Returns true once the terminal event has been handled.
    async fn dispatch(&mut self, events: Vec<StreamEvent>, accumulator: &mut String) -> bool {
        for event in events {
            match event {
                StreamEvent::Token(delta) => {
                    accumulator.push_str(&delta);
                    self.forward(ServerEvent::Token { response: delta }).await;
                }
                StreamEvent::Usage(usage) => {
                    self.forward(ServerEvent::Usage { usage }).await;
                }
                StreamEvent::Data(data) => {
                    self.forward(ServerEvent::Data { data }).await;
                }
                StreamEvent::Done => {
                    // The assistant message is appended atomically, only at
                    // successful completion and only if anything streamed.
                    if !accumulator.is_empty() {
                        if let Err(e) = self
                            .store
                            .append(&self.user_id, Role::Assistant, accumulator)
                            .await
                        {
                            error!(
                                "failed to persist assistant message for key {}: {e:#}",
                                self.user_id
                            );
                            self.forward(ServerEvent::Error {
                                error: "failed to persist response".to_string(),
                            })
                            .await;
                            return true;
                        }
                    }
                    self.forward(ServerEvent::Done).await;
                    return true;
                }
                StreamEvent::Error(message) => {
                    self.forward(ServerEvent::Error { error: message }).await;
                    return true;
                }
            }
        }
        false
    }

    /// Best-effort delivery to the bound connection. A vanished client does
    /// not abort the turn: persistence still completes.
    async fn forward(&mut self, event: ServerEvent) {
        if let Some(connection) = &self.connection {
            if connection.send(event).await.is_err() {
                debug!("live connection for key {} is gone", self.user_id);
                self.connection = None;
            }
        }
    }
}
