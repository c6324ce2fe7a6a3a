//! Transport seam between the session state machine and the network.
//!
//! The state machine only ever sees channel pairs, which keeps its
//! reconnect and cancellation logic testable without sockets. The
//! production implementation bridges a WebSocket plus the HTTP history
//! endpoints.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use quill_protocol::ChatMessage;

use crate::error::ClientError;

/// Buffer size for the per-socket bridge channels.
const SOCKET_BUFFER_SIZE: usize = 64;

/// Channel pair representing one open socket.
///
/// Dropping `outgoing` (or a send error on it) means the socket is gone;
/// `incoming` yielding `None` signals the close from the other side.
pub struct TransportStreams {
    /// Frames to send to the server.
    pub outgoing: mpsc::Sender<String>,
    /// Frames received from the server, in server order.
    pub incoming: mpsc::Receiver<String>,
}

/// How the client reaches the gateway.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open the upgrade route for `key`. Resolves once the socket is open.
    async fn open(&self, key: &str) -> Result<TransportStreams, ClientError>;

    /// Fetch the persisted history for `key`.
    async fn fetch_history(&self, key: &str) -> Result<Vec<ChatMessage>, ClientError>;

    /// Erase the persisted history for `key`.
    async fn clear_history(&self, key: &str) -> Result<(), ClientError>;
}

/// Production transport: WebSocket for the event stream, HTTP for history.
pub struct WsTransport {
    base_url: String,
    client: reqwest::Client,
}

impl WsTransport {
    /// `base_url` is the gateway's HTTP origin, e.g. `http://127.0.0.1:8787`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn ws_url(&self, key: &str) -> String {
        // http -> ws, https -> wss
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https") {
            format!("wss{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http") {
            format!("ws{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}/connect?userId={}", urlencoding::encode(key))
    }

    fn http_url(&self, path: &str, key: &str) -> String {
        format!(
            "{}/{path}?userId={}",
            self.base_url,
            urlencoding::encode(key)
        )
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(&self, key: &str) -> Result<TransportStreams, ClientError> {
        let url = self.ws_url(key);
        let (socket, _response) = connect_async(url)
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = socket.split();

        let (outgoing, mut out_rx) = mpsc::channel::<String>(SOCKET_BUFFER_SIZE);
        let (in_tx, incoming) = mpsc::channel::<String>(SOCKET_BUFFER_SIZE);

        // Writer pump: channel -> socket.
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader pump: socket -> channel. Ends (dropping `in_tx`) when the
        // socket closes, which is the close signal upstream.
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("server closed the socket");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("socket error: {e}");
                        break;
                    }
                }
            }
        });

        Ok(TransportStreams { outgoing, incoming })
    }

    async fn fetch_history(&self, key: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let url = self.http_url("history", key);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "history fetch failed: {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))
    }

    async fn clear_history(&self, key: &str) -> Result<(), ClientError> {
        let url = self.http_url("clearHistory", key);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ClientError::Transport(format!(
                "clear failed: {}",
                response.status()
            )));
        }
        Ok(())
    }
}
