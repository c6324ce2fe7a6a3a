//! WebSocket handler for client connections.

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use quill_protocol::{ClientCommand, ServerEvent};

use crate::api::{ApiError, AppState, UserKeyQuery};
use crate::session::SessionHandle;

/// Size of the per-connection outbound event buffer.
const EVENT_BUFFER_SIZE: usize = 256;

/// WebSocket upgrade handler.
///
/// GET /connect?userId=<key>
///
/// Non-upgrade requests are rejected by the extractor before this body
/// runs; a missing user key is a 400 like everywhere else.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<UserKeyQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let key = query.require()?;
    info!("WebSocket upgrade request for key {key}");

    let session = state.sessions.session(&key);
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, session, key)))
}

/// Drive one accepted connection until the peer goes away.
async fn handle_connection(socket: WebSocket, session: SessionHandle, key: String) {
    let (mut sender, mut receiver) = socket.split();

    // The actor forwards turn events into this channel; binding replaces
    // any previous connection for the key.
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(EVENT_BUFFER_SIZE);
    if session.bind(event_tx.clone()).await.is_err() {
        warn!("session actor unavailable for key {key}");
        return;
    }

    // Outbound pump: event channel -> socket.
    let key_send = key.clone();
    let send_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to serialize event for key {key_send}: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop: parse frames, hand prompts to the actor. Failures are
    // reported as error events; the connection stays open.
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(ClientCommand::Prompt { prompt }) => {
                        if let Err(e) = session.send_prompt(prompt).await {
                            debug!("prompt rejected for key {key}: {e}");
                            let _ = event_tx
                                .send(ServerEvent::Error {
                                    error: e.to_string(),
                                })
                                .await;
                        }
                    }
                    Err(e) => {
                        warn!("unparseable frame from key {key}: {e}");
                        let _ = event_tx
                            .send(ServerEvent::Error {
                                error: format!("malformed message: {e}"),
                            })
                            .await;
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                debug!("ignoring binary frame from key {key}");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!("key {key} closed the connection");
                break;
            }
            Err(e) => {
                warn!("WebSocket error for key {key}: {e}");
                break;
            }
        }
    }

    send_task.abort();
    info!("WebSocket connection closed for key {key}");
}
