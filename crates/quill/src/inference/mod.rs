//! Inference backend collaborator.
//!
//! The backend is an opaque source: given the conversation so far it yields
//! a sequence of raw stream chunks which the relay parses. The trait seam
//! keeps the session layer independent of the transport and lets tests
//! script chunk sequences.

use std::pin::Pin;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use log::debug;
use quill_protocol::ChatMessage;
use serde_json::json;

/// Raw chunk stream produced by a backend for one turn.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A streaming text-generation source.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Start a completion for the given context and return its chunk stream.
    ///
    /// `messages` is the full history in chronological order, ending with
    /// the user message that opened the turn.
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream>;
}

/// Configuration for the HTTP inference backend.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct InferenceConfig {
    /// Completion endpoint URL.
    pub url: String,
    /// Model identifier passed through to the endpoint.
    pub model: String,
    /// Optional bearer token.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Inference backend speaking the streaming HTTP completion protocol.
pub struct HttpInference {
    client: reqwest::Client,
    config: InferenceConfig,
}

impl HttpInference {
    pub fn new(config: InferenceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl InferenceBackend for HttpInference {
    async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<ChunkStream> {
        let context: Vec<_> = messages
            .iter()
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        debug!(
            "requesting completion from {} with {} context messages",
            self.config.url,
            context.len()
        );

        let mut request = self.client.post(&self.config.url).json(&json!({
            "model": self.config.model,
            "messages": context,
            "stream": true,
        }));
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("sending completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("completion request failed: {status} - {body}");
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| anyhow::anyhow!(e).context("reading completion stream"));

        Ok(Box::pin(stream))
    }
}
