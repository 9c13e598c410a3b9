//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// JSON arguments could not be parsed, or output could not be written.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The tool call failed on the way to or from the server.
    #[error(transparent)]
    Tool(#[from] runtime::ToolError),
}

pub type Result<T> = std::result::Result<T, Error>;
