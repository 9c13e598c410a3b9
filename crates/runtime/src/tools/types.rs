//! Tool-related types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ToolError;
use crate::content::NormalizedResult;

/// A unique identifier for one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress notifications sent on an invocation's optional channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InvocationEvent {
    Started { id: InvocationId, tool: String },
    Completed { id: InvocationId },
    Cancelled { id: InvocationId },
    Failed { id: InvocationId, message: String },
}

/// A tool declaration offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// The outcome of a tool call as a value, for callers that report every
/// outcome to the model rather than bubbling errors.
#[derive(Debug)]
pub enum ToolResult {
    Success(NormalizedResult),
    Cancelled,
    Failure { message: String, error: ToolError },
}

impl ToolResult {
    /// Fold a call outcome into a result value.
    ///
    /// Transport failures stay errors; everything else becomes a result.
    pub fn from_outcome(outcome: Result<NormalizedResult, ToolError>) -> Result<Self, ToolError> {
        match outcome {
            Ok(result) => Ok(ToolResult::Success(result)),
            Err(ToolError::Cancelled) => Ok(ToolResult::Cancelled),
            Err(error @ ToolError::Transport(_)) => Err(error),
            Err(error) => Ok(ToolResult::Failure {
                message: error.to_string(),
                error,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolResult::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::DisplayContent;

    #[test]
    fn outcome_folding() {
        let ok = NormalizedResult {
            model_content: Vec::new(),
            display_content: DisplayContent::Text(String::new()),
        };
        assert!(ToolResult::from_outcome(Ok(ok)).unwrap().is_success());
        assert!(matches!(
            ToolResult::from_outcome(Err(ToolError::Cancelled)),
            Ok(ToolResult::Cancelled)
        ));

        let remote = ToolError::RemoteTool {
            diagnostic: "full dump".into(),
            message: "Error: MCP tool 'x' reported an error.".into(),
        };
        match ToolResult::from_outcome(Err(remote)) {
            Ok(ToolResult::Failure { message, .. }) => {
                assert_eq!(message, "Error: MCP tool 'x' reported an error.");
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(ToolResult::from_outcome(Err(ToolError::Transport(mcp::Error::Timeout))).is_err());
    }

    #[test]
    fn event_wire_shape() {
        let id = InvocationId::new();
        let value = serde_json::to_value(InvocationEvent::Completed { id }).unwrap();
        assert_eq!(value["event"], "completed");
        assert_eq!(value["id"], id.to_string());
    }
}
