//! Running a single tool call.

use std::sync::Arc;

use mcp::{CallableTool, FunctionCall, reports_error};
use policy::{GateDecision, ToolIdentity, TrustGate};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{InvocationEvent, InvocationId, ToolError};
use crate::content::{ImageStore, NormalizedResult, normalize};

/// One call of one tool with a fixed set of parameters.
///
/// Parameters are frozen at construction; executing never changes them.
pub struct ToolInvocation<C> {
    id: InvocationId,
    connection: Arc<C>,
    server_name: String,
    server_tool_name: String,
    display_name: String,
    trust: bool,
    params: Value,
    images: ImageStore,
    events: Option<UnboundedSender<InvocationEvent>>,
}

impl<C: CallableTool> ToolInvocation<C> {
    pub(crate) fn new(
        connection: Arc<C>,
        server_name: String,
        server_tool_name: String,
        display_name: String,
        trust: bool,
        params: Value,
    ) -> Self {
        Self {
            id: InvocationId::new(),
            connection,
            server_name,
            server_tool_name,
            display_name,
            trust,
            params,
            images: ImageStore::default(),
            events: None,
        }
    }

    /// Write inline images under `images` instead of the temp directory.
    pub fn with_image_store(mut self, images: ImageStore) -> Self {
        self.images = images;
        self
    }

    /// Send progress events to `events`.
    pub fn with_events(mut self, events: UnboundedSender<InvocationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn id(&self) -> InvocationId {
        self.id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_tool_name(&self) -> &str {
        &self.server_tool_name
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Ask the gate whether this call needs the user's confirmation.
    pub fn gate_decision(&self, gate: &TrustGate, folder_trusted: bool) -> GateDecision {
        gate.decide(
            ToolIdentity {
                server: &self.server_name,
                tool: &self.server_tool_name,
                display_name: &self.display_name,
            },
            folder_trusted,
            self.trust,
        )
    }

    /// Call the tool, racing the call against `cancel`.
    ///
    /// An already-cancelled token returns before anything is sent. Once
    /// cancellation wins the race the pending call is dropped and its
    /// response, if any, is never looked at.
    pub async fn execute(&self, cancel: &CancellationToken) -> Result<NormalizedResult, ToolError> {
        if cancel.is_cancelled() {
            debug!(id = %self.id, tool = %self.server_tool_name, "cancelled before start");
            self.emit(InvocationEvent::Cancelled { id: self.id });
            return Err(ToolError::Cancelled);
        }

        self.emit(InvocationEvent::Started {
            id: self.id,
            tool: self.server_tool_name.clone(),
        });

        let call = FunctionCall {
            name: self.server_tool_name.clone(),
            args: self.params.clone(),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.connection.call_tool(vec![call.clone()]) => Some(result),
        };

        let raw = match outcome {
            None => {
                debug!(id = %self.id, tool = %self.server_tool_name, "cancelled during call");
                self.emit(InvocationEvent::Cancelled { id: self.id });
                return Err(ToolError::Cancelled);
            }
            Some(Err(e)) => {
                warn!(
                    id = %self.id,
                    server = %self.server_name,
                    tool = %self.server_tool_name,
                    "tool call failed: {e}"
                );
                self.emit(InvocationEvent::Failed {
                    id: self.id,
                    message: e.to_string(),
                });
                return Err(ToolError::Transport(e));
            }
            Some(Ok(raw)) => raw,
        };

        if reports_error(&raw) {
            let (diagnostic, message) = self.remote_error(&call, &raw);
            warn!(id = %self.id, server = %self.server_name, "{diagnostic}");
            self.emit(InvocationEvent::Failed {
                id: self.id,
                message: message.clone(),
            });
            return Err(ToolError::RemoteTool {
                diagnostic,
                message,
            });
        }

        let result = normalize(&self.server_tool_name, &raw, &self.images).await;
        self.emit(InvocationEvent::Completed { id: self.id });
        Ok(result)
    }

    /// Log line with the full call and response, and the short user text.
    fn remote_error(&self, call: &FunctionCall, raw: &[Value]) -> (String, String) {
        let tool = &self.server_tool_name;
        let call_json = serde_json::to_string(call).unwrap_or_else(|_| format!("{call:?}"));
        let raw_json = serde_json::to_string(raw).unwrap_or_else(|_| format!("{raw:?}"));
        (
            format!(
                "MCP tool '{tool}' reported tool error for function call: {call_json} \
                 with response: {raw_json}"
            ),
            format!("Error: MCP tool '{tool}' reported an error."),
        )
    }

    fn emit(&self, event: InvocationEvent) {
        if let Some(events) = &self.events {
            // Receiver may be gone; events are advisory.
            let _ = events.send(event);
        }
    }
}
