//! Tool invocation and response normalization for MCP servers.
//!
//! A [`ToolDefinition`] binds a tool listed by a server to the connection
//! serving it. Invoking it builds a [`ToolInvocation`], passes it through
//! the trust gate, and races the call against a cancellation token. What
//! comes back is normalized twice: into [`Part`]s for the model and into
//! [`DisplayContent`] for the user.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use mcp::{Server, ServerConfig};
//! use policy::{ConfirmationDetails, ConfirmationOutcome, ToolFilter};
//! use runtime::{Confirmer, InvocationContext, ToolRegistry};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Yes;
//!
//! impl Confirmer for Yes {
//!     async fn confirm(&self, _: &ConfirmationDetails) -> ConfirmationOutcome {
//!         ConfirmationOutcome::ProceedOnce
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = Server::spawn(ServerConfig {
//!     name: "fs".into(),
//!     command: "mcp-server-filesystem".into(),
//!     ..Default::default()
//! })
//! .await?;
//! server.initialize().await?;
//! let tools = server.tools().await;
//!
//! let mut registry = ToolRegistry::new();
//! registry.register_server(Arc::new(server), "fs", &tools, false, &ToolFilter::default());
//!
//! let result = registry
//!     .invoke(
//!         "read_file",
//!         serde_json::json!({"path": "README.md"}),
//!         &InvocationContext::default(),
//!         &Yes,
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{:?}", result.display_content);
//! # Ok(())
//! # }
//! ```

pub mod content;
mod naming;
pub mod tools;

pub use content::{DisplayContent, ImageStore, NormalizedResult, Part};
pub use naming::{MAX_TOOL_NAME_LEN, valid_tool_name};
pub use tools::{
    Confirmer, InvocationContext, InvocationEvent, InvocationId, ToolDefinition, ToolError,
    ToolInvocation, ToolRegistry, ToolResult, ToolSpec,
};
