//! Tool definitions, invocation, and the registry.

mod definition;
pub mod errors;
mod invocation;
mod registry;
mod types;

pub use definition::{Confirmer, InvocationContext, ToolDefinition};
pub use errors::ToolError;
pub use invocation::ToolInvocation;
pub use registry::ToolRegistry;
pub use types::{InvocationEvent, InvocationId, ToolResult, ToolSpec};
