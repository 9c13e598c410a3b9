use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The cancellation token fired before or during the call, or the user
    /// declined the confirmation prompt.
    #[error("tool call cancelled")]
    Cancelled,
    /// The call reached the server and the tool reported a failure.
    #[error("{message}")]
    RemoteTool {
        /// Full call parameters and raw response, for logs.
        diagnostic: String,
        /// Short text naming the tool, for the user.
        message: String,
    },
    /// The call itself failed on the way to or from the server.
    #[error("transport error: {0}")]
    Transport(#[from] mcp::Error),
}
