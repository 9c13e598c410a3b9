//! Include/exclude rules for discovered tools.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Separator between server and tool in fully qualified tool names.
pub const SERVER_SEPARATOR: &str = "__";

/// Which tools are exposed to the model.
///
/// Patterns are matched against a tool as follows:
/// - `*` matches every tool
/// - `server__*` matches every tool of `server`
/// - `server__tool` matches one tool of one server
/// - `tool` matches that tool on any server
///
/// An empty include list includes everything. Exclusions win.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFilter {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl ToolFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    /// Reject patterns that can never match.
    pub fn validate(&self) -> Result<()> {
        for pattern in self.include.iter().chain(&self.exclude) {
            if pattern.is_empty() {
                return Err(Error::Invalid("empty pattern".to_string()));
            }
            let dangling = pattern
                .split_once(SERVER_SEPARATOR)
                .is_some_and(|(server, tool)| server.is_empty() || tool.is_empty());
            if dangling {
                return Err(Error::Invalid(pattern.clone()));
            }
        }
        Ok(())
    }

    /// Whether `tool` from `server` should be exposed.
    pub fn allows(&self, server: &str, tool: &str) -> bool {
        if self.exclude.iter().any(|p| pattern_matches(p, server, tool)) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|p| pattern_matches(p, server, tool))
    }
}

fn pattern_matches(pattern: &str, server: &str, tool: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.split_once(SERVER_SEPARATOR) {
        Some((s, "*")) => s == server,
        Some((s, t)) => s == server && t == tool,
        None => pattern == tool,
    }
}
