//! Trust and confirmation policy for MCP tool calls.
//!
//! Core principle: **a tool call runs without asking only when trust was
//! declared for it or the user granted it during this session.**
//!
//! - [`Allowlist`] is the session-scoped record of "always allow" grants.
//! - [`TrustGate`] decides per invocation whether confirmation is needed.
//! - [`ToolFilter`] selects which discovered tools are exposed at all.

mod allowlist;
mod error;
mod filter;
mod gate;

pub use allowlist::Allowlist;
pub use error::{Error, Result};
pub use filter::{SERVER_SEPARATOR, ToolFilter};
pub use gate::{
    ConfirmationDetails, ConfirmationOutcome, ConfirmationRequest, GateDecision, ToolIdentity,
    TrustGate,
};
