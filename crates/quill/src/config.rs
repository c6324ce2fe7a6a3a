//! Server configuration.
//!
//! Layered the usual way: built-in defaults, then an optional TOML file,
//! then `QUILL_*` environment variables (double underscore for nesting,
//! e.g. `QUILL_INFERENCE__URL`).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::inference::InferenceConfig;

/// Default listen address.
const DEFAULT_LISTEN: &str = "127.0.0.1:8787";

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub listen: String,
    /// Path to the conversation database.
    pub database: PathBuf,
    /// Inference backend settings.
    pub inference: InferenceConfig,
}

impl ServerConfig {
    /// Load configuration, optionally from an explicit file path.
    ///
    /// Without an explicit path, `quill.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("listen", DEFAULT_LISTEN)?
            .set_default("database", default_database_path().display().to_string())?
            .set_default("inference.url", "http://127.0.0.1:8080/v1/chat/completions")?
            .set_default("inference.model", "@cf/meta/llama-3-8b-instruct")?;

        builder = match path {
            Some(path) => builder.add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(true),
            ),
            None => builder.add_source(
                File::new("quill.toml", FileFormat::Toml).required(false),
            ),
        };

        builder
            .add_source(Environment::with_prefix("QUILL").separator("__"))
            .build()
            .context("building configuration")?
            .try_deserialize()
            .context("deserializing configuration")
    }
}

/// Default database location under the platform data directory.
fn default_database_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
        .join("quill.db")
}
