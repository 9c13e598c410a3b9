//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

/// Transport-level failures talking to an MCP server.
///
/// A tool that runs and reports a logical failure is not an error at this
/// layer; it comes back as a successful response carrying an error flag.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to spawn server: {0}")]
    Spawn(std::io::Error),

    #[error("I/O error talking to server: {0}")]
    Io(#[from] std::io::Error),

    #[error("server not initialized")]
    NotInitialized,

    #[error("server exited unexpectedly")]
    ServerExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    #[error("output too large: {size} bytes (max {max})")]
    OutputTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
