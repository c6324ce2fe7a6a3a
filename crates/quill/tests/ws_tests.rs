//! End-to-end WebSocket tests against a live server.

use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use quill::api::{AppState, create_router};
use quill_protocol::ServerEvent;

mod common;
use common::{ChannelBackend, ScriptedBackend, test_state};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the router on an ephemeral port.
async fn serve(state: AppState) -> SocketAddr {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, key: &str) -> Socket {
    let (socket, _response) = connect_async(format!("ws://{addr}/connect?userId={key}"))
        .await
        .unwrap();
    socket
}

async fn send_prompt(socket: &mut Socket, prompt: &str) {
    let frame = serde_json::json!({ "type": "prompt", "prompt": prompt }).to_string();
    socket.send(Message::Text(frame.into())).await.unwrap();
}

/// Next decoded server event, skipping transport frames.
async fn next_event(socket: &mut Socket) -> ServerEvent {
    loop {
        let msg = socket
            .next()
            .await
            .expect("socket closed early")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("undecodable server event");
        }
    }
}

#[tokio::test]
async fn test_prompt_streams_tokens_and_persists() {
    let state = test_state(ScriptedBackend::hello()).await;
    let addr = serve(state.clone()).await;

    let mut socket = connect(addr, "alice").await;
    send_prompt(&mut socket, "hi").await;

    assert_eq!(
        next_event(&mut socket).await,
        ServerEvent::Token {
            response: "Hel".to_string()
        }
    );
    assert_eq!(
        next_event(&mut socket).await,
        ServerEvent::Token {
            response: "lo".to_string()
        }
    );
    assert_eq!(next_event(&mut socket).await, ServerEvent::Done);

    let history = state.sessions.session("alice").get_messages().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].content, "Hello");
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let state = test_state(ScriptedBackend::hello()).await;
    let addr = serve(state).await;

    let mut socket = connect(addr, "alice").await;
    socket
        .send(Message::Text("this is not a command".into()))
        .await
        .unwrap();

    match next_event(&mut socket).await {
        ServerEvent::Error { error } => assert!(error.contains("malformed message")),
        other => panic!("expected error event, got {other:?}"),
    }

    // The connection survived: a real prompt still streams.
    send_prompt(&mut socket, "hi").await;
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::Token { .. }
    ));
}

#[tokio::test]
async fn test_second_prompt_mid_turn_is_rejected_over_the_wire() {
    let (backend, feeders) = ChannelBackend::new(1);
    let state = test_state(backend).await;
    let addr = serve(state.clone()).await;

    let mut socket = connect(addr, "alice").await;
    send_prompt(&mut socket, "first").await;

    feeders[0]
        .send(Bytes::from_static(b"data: {\"response\":\"a\"}\n"))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::Token { .. }
    ));

    send_prompt(&mut socket, "second").await;
    match next_event(&mut socket).await {
        ServerEvent::Error { error } => assert!(error.contains("already in progress")),
        other => panic!("expected busy error, got {other:?}"),
    }

    feeders[0]
        .send(Bytes::from_static(b"data: [DONE]\n"))
        .await
        .unwrap();
    assert_eq!(next_event(&mut socket).await, ServerEvent::Done);

    // Only the first turn reached history.
    let history = state.sessions.session("alice").get_messages().await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
}

#[tokio::test]
async fn test_backend_failure_surfaces_one_error() {
    // Zero scripted streams: the backend refuses the turn outright.
    let (backend, _feeders) = ChannelBackend::new(0);
    let state = test_state(backend).await;
    let addr = serve(state.clone()).await;

    let mut socket = connect(addr, "alice").await;
    send_prompt(&mut socket, "hi").await;

    assert!(matches!(
        next_event(&mut socket).await,
        ServerEvent::Error { .. }
    ));

    // The prompt was persisted before the backend was contacted.
    let history = state.sessions.session("alice").get_messages().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].content, "hi");
}

#[tokio::test]
async fn test_keys_stream_independently() {
    let state = test_state(ScriptedBackend::hello()).await;
    let addr = serve(state.clone()).await;

    let mut alice = connect(addr, "alice").await;
    let mut bob = connect(addr, "bob").await;

    send_prompt(&mut alice, "from alice").await;
    send_prompt(&mut bob, "from bob").await;

    // Both sessions run their own turn to completion.
    loop {
        if next_event(&mut alice).await == ServerEvent::Done {
            break;
        }
    }
    loop {
        if next_event(&mut bob).await == ServerEvent::Done {
            break;
        }
    }

    let alice_history = state.sessions.session("alice").get_messages().await.unwrap();
    let bob_history = state.sessions.session("bob").get_messages().await.unwrap();
    assert_eq!(alice_history[0].content, "from alice");
    assert_eq!(bob_history[0].content, "from bob");
}
