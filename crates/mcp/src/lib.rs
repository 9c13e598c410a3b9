//! MCP (Model Context Protocol) client library.
//!
//! This crate provides the wire layer for talking to MCP tool servers:
//! JSON-RPC framing over stdio, the content blocks servers answer with, and
//! the [`CallableTool`] interface the runtime invokes tools through.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{CallableTool, FunctionCall, Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig {
//!     name: "filesystem".to_string(),
//!     command: "mcp-filesystem".to_string(),
//!     args: vec!["--root".to_string(), "./workspace".to_string()],
//!     ..Default::default()
//! };
//!
//! let server = Server::spawn(config).await?;
//! server.initialize().await?;
//!
//! for tool in server.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let parts = server
//!     .call_tool(vec![FunctionCall {
//!         name: "read_file".to_string(),
//!         args: serde_json::json!({ "path": "./README.md" }),
//!     }])
//!     .await?;
//! println!("{parts:?}");
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod callable;
mod content;
mod error;
mod protocol;
mod server;

pub use callable::{
    CallableTool, FunctionCall, first_response, function_response_part, reports_error,
};
pub use content::{ContentBlock, EmbeddedResource, Media, MediaKind, ResourceLink};
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, ServerInfo, Tool,
};
pub use server::{DEFAULT_TIMEOUT, MAX_OUTPUT_SIZE, Server, ServerConfig};
