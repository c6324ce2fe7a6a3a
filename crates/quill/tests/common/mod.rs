//! Shared fixtures for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use tokio::sync::mpsc;

use quill::api::{AppState, create_router};
use quill::db::Database;
use quill::inference::{ChunkStream, InferenceBackend};
use quill_protocol::ChatMessage;

/// Backend that replays the same chunk script for every turn.
pub struct ScriptedBackend {
    chunks: Vec<&'static str>,
}

impl ScriptedBackend {
    pub fn new(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self { chunks })
    }

    /// The canonical two-token happy path.
    pub fn hello() -> Arc<Self> {
        Self::new(vec![
            "data: {\"response\":\"Hel\"}\n",
            "data: {\"response\":\"lo\"}\n",
            "data: [DONE]\n",
        ])
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<ChunkStream> {
        let items: Vec<Result<Bytes>> = self
            .chunks
            .iter()
            .map(|chunk| Ok(Bytes::from_static(chunk.as_bytes())))
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// Backend whose chunk streams are fed by the test, one channel per turn.
pub struct ChannelBackend {
    streams: Mutex<VecDeque<mpsc::Receiver<Bytes>>>,
}

impl ChannelBackend {
    /// Prepare `turns` sequential streams and return their feeders.
    pub fn new(turns: usize) -> (Arc<Self>, Vec<mpsc::Sender<Bytes>>) {
        let mut streams = VecDeque::new();
        let mut feeders = Vec::new();
        for _ in 0..turns {
            let (tx, rx) = mpsc::channel(8);
            streams.push_back(rx);
            feeders.push(tx);
        }
        (
            Arc::new(Self {
                streams: Mutex::new(streams),
            }),
            feeders,
        )
    }
}

#[async_trait]
impl InferenceBackend for ChannelBackend {
    async fn stream_chat(&self, _messages: &[ChatMessage]) -> Result<ChunkStream> {
        let rx = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted stream left"))?;
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        });
        Ok(Box::pin(stream))
    }
}

/// Application state over an in-memory store and the given backend.
pub async fn test_state(backend: Arc<dyn InferenceBackend>) -> AppState {
    let db = Database::in_memory().await.unwrap();
    AppState::new(db, backend)
}

/// Router over an in-memory store and the canonical scripted backend.
pub async fn test_app() -> Router {
    create_router(test_state(ScriptedBackend::hello()).await)
}
