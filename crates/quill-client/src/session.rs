//! Client session: connection state machine, reconnect, and turn tracking.
//!
//! The session runs as one background task driven by three wake sources:
//! handle commands, inbound socket frames, and the reconnect backoff timer.
//! Being a single task makes the tricky guarantees cheap: a pending backoff
//! is a field, so `disconnect()` cancels it atomically, and frames are
//! applied in server order.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Sleep;

use quill_protocol::{ChatMessage, ClientCommand as WireCommand, ServerEvent};

use crate::error::ClientError;
use crate::transcript::Transcript;
use crate::transport::{Transport, TransportStreams};

/// Size of the event broadcast channel.
const EVENT_BUFFER_SIZE: usize = 256;

/// Size of the handle command channel.
const COMMAND_BUFFER_SIZE: usize = 64;

/// Default fixed reconnect delay.
///
/// Fixed and un-jittered by contract; under a mass disconnect every client
/// retries on the same beat, so deployments fronting many clients may want
/// a larger value.
const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Fixed delay between an unexpected close and the reconnect attempt.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }
}

/// Events emitted for rendering.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    /// Transcript was seeded with this many persisted messages.
    HistoryLoaded(usize),
    /// One token delta, already applied to the transcript.
    Token(String),
    Usage(Value),
    Data(String),
    TurnCompleted,
    TurnFailed(String),
}

/// Point-in-time view of the session for rendering or assertions.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub loading: bool,
    pub transcript: Vec<ChatMessage>,
}

enum Command {
    Connect { key: String },
    Disconnect,
    SendPrompt {
        text: String,
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    ClearHistory {
        reply: oneshot::Sender<Result<(), ClientError>>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Cheap cloneable handle to the session task.
#[derive(Clone)]
pub struct ClientHandle {
    command_tx: mpsc::Sender<Command>,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientHandle {
    /// Begin connecting for `key`. Any previous socket is closed first.
    pub async fn connect(&self, key: impl Into<String>) -> Result<(), ClientError> {
        self.send(Command::Connect { key: key.into() }).await
    }

    /// Drop the connection and cancel any pending reconnect.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.send(Command::Disconnect).await
    }

    /// Submit a prompt. Rejected locally unless connected and idle.
    pub async fn send_prompt(&self, text: impl Into<String>) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SendPrompt {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Erase the persisted history and the local transcript.
    pub async fn clear_history(&self) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearHistory { reply }).await?;
        rx.await.map_err(|_| ClientError::Closed)?
    }

    /// Current state, loading flag, and transcript.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| ClientError::Closed)
    }

    /// Subscribe to rendering events.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), ClientError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| ClientError::Closed)
    }
}

/// The session task. Owns the socket, the state machine, and the transcript.
pub struct ClientSession {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state: ConnectionState,
    key: Option<String>,
    socket: Option<TransportStreams>,
    backoff: Option<Pin<Box<Sleep>>>,
    loading: bool,
    transcript: Transcript,
    events: broadcast::Sender<ClientEvent>,
}

impl ClientSession {
    /// Spawn the session task and return its handle.
    pub fn spawn(transport: Arc<dyn Transport>, config: ClientConfig) -> ClientHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER_SIZE);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        let session = Self {
            transport,
            config,
            state: ConnectionState::Disconnected,
            key: None,
            socket: None,
            backoff: None,
            loading: false,
            transcript: Transcript::new(),
            events: events.clone(),
        };
        tokio::spawn(session.run(command_rx));

        ClientHandle { command_tx, events }
    }

    async fn run(mut self, mut command_rx: mpsc::Receiver<Command>) {
        enum Wake {
            Command(Option<Command>),
            Frame(Option<String>),
            Backoff,
        }

        loop {
            let wake = {
                let socket = &mut self.socket;
                let backoff = &mut self.backoff;
                tokio::select! {
                    command = command_rx.recv() => Wake::Command(command),
                    frame = async {
                        match socket {
                            Some(streams) => streams.incoming.recv().await,
                            None => std::future::pending().await,
                        }
                    } => Wake::Frame(frame),
                    _ = async {
                        match backoff {
                            Some(sleep) => sleep.as_mut().await,
                            None => std::future::pending().await,
                        }
                    } => Wake::Backoff,
                }
            };

            match wake {
                Wake::Command(None) => break,
                Wake::Command(Some(command)) => self.handle_command(command).await,
                Wake::Frame(Some(frame)) => self.handle_frame(&frame),
                Wake::Frame(None) => self.handle_close(),
                Wake::Backoff => {
                    self.backoff = None;
                    self.try_open().await;
                }
            }
        }

        debug!("client session task ended");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { key } => {
                // Close any previous socket and supersede a pending backoff.
                self.socket = None;
                self.backoff = None;
                self.loading = false;
                self.key = Some(key.clone());
                self.set_state(ConnectionState::Connecting);

                // Seed the transcript from persisted history. A failed fetch
                // degrades to an empty transcript; it does not block the
                // connection.
                match self.transport.fetch_history(&key).await {
                    Ok(history) => {
                        let count = history.len();
                        self.transcript.seed(history);
                        self.emit(ClientEvent::HistoryLoaded(count));
                    }
                    Err(e) => {
                        warn!("history fetch failed, starting empty: {e}");
                        self.transcript.seed(Vec::new());
                    }
                }

                self.try_open().await;
            }

            Command::Disconnect => {
                // Cancellation: the pending backoff timer is invalidated here,
                // in the same task that would have acted on it, so it can
                // never resurrect a connection afterwards.
                self.backoff = None;
                self.socket = None;
                self.loading = false;
                self.set_state(ConnectionState::Disconnected);
            }

            Command::SendPrompt { text, reply } => {
                let result = self.send_prompt(&text).await;
                let _ = reply.send(result);
            }

            Command::ClearHistory { reply } => {
                let result = self.clear_history().await;
                let _ = reply.send(result);
            }

            Command::Snapshot { reply } => {
                let _ = reply.send(SessionSnapshot {
                    state: self.state,
                    loading: self.loading,
                    transcript: self.transcript.entries().to_vec(),
                });
            }
        }
    }

    async fn send_prompt(&mut self, text: &str) -> Result<(), ClientError> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        if self.loading {
            return Err(ClientError::Busy);
        }
        let Some(socket) = &self.socket else {
            return Err(ClientError::NotConnected);
        };

        let frame = serde_json::to_string(&WireCommand::Prompt {
            prompt: text.to_string(),
        })
        .map_err(|e| ClientError::Transport(e.to_string()))?;

        socket
            .outgoing
            .send(frame)
            .await
            .map_err(|_| ClientError::Transport("socket closed".to_string()))?;

        self.transcript.push_user(text);
        self.loading = true;
        Ok(())
    }

    async fn clear_history(&mut self) -> Result<(), ClientError> {
        let Some(key) = self.key.clone() else {
            return Err(ClientError::NoKey);
        };
        self.transport.clear_history(&key).await?;
        self.transcript.clear();
        Ok(())
    }

    fn handle_frame(&mut self, frame: &str) {
        let event = match serde_json::from_str::<ServerEvent>(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!("undecodable server frame: {e}");
                return;
            }
        };

        match event {
            ServerEvent::Token { response } => {
                self.transcript.push_token(&response);
                self.emit(ClientEvent::Token(response));
            }
            ServerEvent::Usage { usage } => self.emit(ClientEvent::Usage(usage)),
            ServerEvent::Data { data } => self.emit(ClientEvent::Data(data)),
            ServerEvent::Done => {
                self.loading = false;
                self.transcript.finish_turn();
                self.emit(ClientEvent::TurnCompleted);
            }
            ServerEvent::Error { error } => {
                // Whatever already streamed stays in the transcript; the turn
                // just has no further finalization.
                self.loading = false;
                self.transcript.finish_turn();
                self.emit(ClientEvent::TurnFailed(error));
            }
        }
    }

    /// The socket closed without an explicit `disconnect()`.
    fn handle_close(&mut self) {
        self.socket = None;
        self.loading = false;
        if self.state == ConnectionState::Disconnected {
            return;
        }
        info!(
            "socket closed unexpectedly, reconnecting in {:?}",
            self.config.reconnect_delay
        );
        self.set_state(ConnectionState::Connecting);
        self.backoff = Some(Box::pin(tokio::time::sleep(self.config.reconnect_delay)));
    }

    async fn try_open(&mut self) {
        let Some(key) = self.key.clone() else {
            return;
        };
        match self.transport.open(&key).await {
            Ok(streams) => {
                self.socket = Some(streams);
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!("connect failed for key {key}: {e}");
                self.backoff = Some(Box::pin(tokio::time::sleep(self.config.reconnect_delay)));
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            self.state = state;
            self.emit(ClientEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
