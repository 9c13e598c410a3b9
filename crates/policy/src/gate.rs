//! Per-invocation confirmation decisions.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Allowlist;

/// Which tool an invocation targets.
#[derive(Debug, Clone, Copy)]
pub struct ToolIdentity<'a> {
    pub server: &'a str,
    /// Name as the server knows it; this is what the user is shown.
    pub tool: &'a str,
    /// Name the model calls the tool by.
    pub display_name: &'a str,
}

/// What to show the user when asking to confirm a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationDetails {
    pub title: String,
    pub server_name: String,
    pub tool_name: String,
    pub display_name: String,
}

/// How the user answered a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    ProceedOnce,
    ProceedAlwaysServer,
    ProceedAlwaysTool,
    Cancel,
}

impl ConfirmationOutcome {
    pub fn proceeds(self) -> bool {
        !matches!(self, ConfirmationOutcome::Cancel)
    }
}

/// A pending confirmation bound to the allowlist it may extend.
#[derive(Debug)]
pub struct ConfirmationRequest {
    details: ConfirmationDetails,
    allowlist: Allowlist,
}

impl ConfirmationRequest {
    pub fn details(&self) -> &ConfirmationDetails {
        &self.details
    }

    /// Apply the user's answer. "Always" answers are recorded before
    /// returning; the return value says whether the call should proceed.
    pub fn resolve(self, outcome: ConfirmationOutcome) -> bool {
        let details = &self.details;
        match outcome {
            ConfirmationOutcome::ProceedAlwaysServer => {
                self.allowlist.allow_server(&details.server_name);
            }
            ConfirmationOutcome::ProceedAlwaysTool => {
                self.allowlist
                    .allow_tool(&details.server_name, &details.tool_name);
            }
            ConfirmationOutcome::ProceedOnce | ConfirmationOutcome::Cancel => {}
        }
        debug!(
            server = %details.server_name,
            tool = %details.tool_name,
            ?outcome,
            "confirmation resolved"
        );
        outcome.proceeds()
    }
}

#[derive(Debug)]
pub enum GateDecision {
    Proceed,
    Confirm(ConfirmationRequest),
}

impl GateDecision {
    pub fn needs_confirmation(&self) -> bool {
        matches!(self, GateDecision::Confirm(_))
    }
}

/// Decides whether a tool call needs the user's confirmation.
#[derive(Debug, Clone, Default)]
pub struct TrustGate {
    allowlist: Allowlist,
}

impl TrustGate {
    pub fn new(allowlist: Allowlist) -> Self {
        Self { allowlist }
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// Calls skip confirmation when both the folder and the tool are
    /// trusted, or when an earlier "always" answer covers them.
    pub fn decide(
        &self,
        tool: ToolIdentity<'_>,
        folder_trusted: bool,
        tool_trusted: bool,
    ) -> GateDecision {
        if folder_trusted && tool_trusted {
            return GateDecision::Proceed;
        }
        if self.allowlist.allows(tool.server, tool.tool) {
            return GateDecision::Proceed;
        }

        GateDecision::Confirm(ConfirmationRequest {
            details: ConfirmationDetails {
                title: "Confirm MCP Tool Execution".to_string(),
                server_name: tool.server.to_string(),
                tool_name: tool.tool.to_string(),
                display_name: tool.display_name.to_string(),
            },
            allowlist: self.allowlist.clone(),
        })
    }
}
