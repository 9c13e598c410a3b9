//! Tool definitions discovered from MCP servers.

use std::future::Future;
use std::sync::Arc;

use mcp::CallableTool;
use policy::{ConfirmationDetails, ConfirmationOutcome, GateDecision, SERVER_SEPARATOR, TrustGate};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{InvocationEvent, ToolError, ToolInvocation, ToolSpec};
use crate::content::{ImageStore, NormalizedResult};
use crate::naming::valid_tool_name;

/// Asks the user whether a tool call may run.
pub trait Confirmer: Send + Sync {
    fn confirm(
        &self,
        details: &ConfirmationDetails,
    ) -> impl Future<Output = ConfirmationOutcome> + Send;
}

/// Session state shared by every invocation.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    pub gate: TrustGate,
    /// Host predicate: the working folder is trusted.
    pub folder_trusted: bool,
    pub images: ImageStore,
    pub events: Option<UnboundedSender<InvocationEvent>>,
}

/// A tool one server exposes, bound to the connection that serves it.
pub struct ToolDefinition<C> {
    connection: Arc<C>,
    server_name: String,
    server_tool_name: String,
    name: String,
    description: String,
    parameter_schema: Value,
    trust: bool,
    fully_qualified: bool,
}

impl<C> Clone for ToolDefinition<C> {
    fn clone(&self) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            server_name: self.server_name.clone(),
            server_tool_name: self.server_tool_name.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            parameter_schema: self.parameter_schema.clone(),
            trust: self.trust,
            fully_qualified: self.fully_qualified,
        }
    }
}

impl<C> std::fmt::Debug for ToolDefinition<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("server_name", &self.server_name)
            .field("server_tool_name", &self.server_tool_name)
            .field("name", &self.name)
            .field("trust", &self.trust)
            .field("fully_qualified", &self.fully_qualified)
            .finish_non_exhaustive()
    }
}

impl<C: CallableTool> ToolDefinition<C> {
    /// Create a definition whose model-facing name is the sanitized
    /// server tool name.
    pub fn new(
        connection: Arc<C>,
        server_name: impl Into<String>,
        server_tool_name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: Value,
        trust: bool,
    ) -> Self {
        let server_tool_name = server_tool_name.into();
        Self {
            connection,
            server_name: server_name.into(),
            name: valid_tool_name(&server_tool_name),
            server_tool_name,
            description: description.into(),
            parameter_schema,
            trust,
            fully_qualified: false,
        }
    }

    /// Create a definition from a `tools/list` entry.
    pub fn from_tool(
        connection: Arc<C>,
        server_name: impl Into<String>,
        tool: &mcp::Tool,
        trust: bool,
    ) -> Self {
        Self::new(
            connection,
            server_name,
            tool.name.clone(),
            tool.description.clone().unwrap_or_default(),
            tool.input_schema.clone(),
            trust,
        )
    }

    /// Use `name` verbatim as the model-facing name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// A copy named `{server}__{tool}`, for telling apart same-named tools
    /// from different servers. `self` is left unchanged.
    pub fn as_fully_qualified(&self) -> Self {
        let mut qualified = self
            .clone()
            .with_name(format!("{}{SERVER_SEPARATOR}{}", self.server_name, self.server_tool_name));
        qualified.fully_qualified = true;
        qualified
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_tool_name(&self) -> &str {
        &self.server_tool_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    pub fn is_trusted(&self) -> bool {
        self.trust
    }

    pub fn is_fully_qualified(&self) -> bool {
        self.fully_qualified
    }

    /// Description shown to the user, naming the serving server.
    pub fn display_description(&self) -> String {
        if self.description.is_empty() {
            format!("(MCP server: {})", self.server_name)
        } else {
            format!("{} (MCP server: {})", self.description, self.server_name)
        }
    }

    /// The declaration offered to the model.
    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            schema: self.parameter_schema.clone(),
        }
    }

    /// Bind parameters into an invocation. `null` means no arguments.
    pub fn build(&self, params: Value) -> Result<ToolInvocation<C>, ToolError> {
        let params = match params {
            Value::Null => Value::Object(Default::default()),
            Value::Object(map) => Value::Object(map),
            other => {
                return Err(ToolError::InvalidInput(format!(
                    "arguments for '{}' must be an object, got {other}",
                    self.name
                )));
            }
        };
        Ok(ToolInvocation::new(
            Arc::clone(&self.connection),
            self.server_name.clone(),
            self.server_tool_name.clone(),
            self.name.clone(),
            self.trust,
            params,
        ))
    }

    /// Build an invocation, pass it through the trust gate (asking
    /// `confirmer` when needed), and execute it.
    pub async fn invoke<F: Confirmer>(
        &self,
        params: Value,
        context: &InvocationContext,
        confirmer: &F,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult, ToolError> {
        let mut invocation = self.build(params)?.with_image_store(context.images.clone());
        if let Some(events) = &context.events {
            invocation = invocation.with_events(events.clone());
        }

        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        if let GateDecision::Confirm(request) =
            invocation.gate_decision(&context.gate, context.folder_trusted)
        {
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                outcome = confirmer.confirm(request.details()) => outcome,
            };
            if !request.resolve(outcome) {
                debug!(tool = %self.name, "user declined tool call");
                return Err(ToolError::Cancelled);
            }
        }

        invocation.execute(cancel).await
    }
}
