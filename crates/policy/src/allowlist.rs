//! Session-scoped "always allow" grants.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

/// Grants recorded while the process runs.
///
/// Keys are either a server name or `server.tool`. Membership only grows,
/// so clones share one set and concurrent additions need no coordination
/// beyond the lock. Nothing is written to disk.
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    entries: Arc<RwLock<HashSet<String>>>,
}

impl Allowlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key recorded for a single-tool grant.
    pub fn tool_key(server: &str, tool: &str) -> String {
        format!("{server}.{tool}")
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// Whether the server as a whole, or this one tool, was granted.
    pub fn allows(&self, server: &str, tool: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains(server) || entries.contains(&Self::tool_key(server, tool))
    }

    pub fn allow_server(&self, server: &str) {
        self.insert(server.to_string());
    }

    pub fn allow_tool(&self, server: &str, tool: &str) {
        self.insert(Self::tool_key(server, tool));
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: String) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.insert(key.clone()) {
            debug!(%key, "added allowlist entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_grant_covers_every_tool() {
        let allowlist = Allowlist::new();
        allowlist.allow_server("fs");
        assert!(allowlist.allows("fs", "read"));
        assert!(allowlist.allows("fs", "write"));
        assert!(!allowlist.allows("git", "read"));
    }

    #[test]
    fn tool_grant_is_narrow() {
        let allowlist = Allowlist::new();
        allowlist.allow_tool("fs", "read");
        assert!(allowlist.contains("fs.read"));
        assert!(allowlist.allows("fs", "read"));
        assert!(!allowlist.allows("fs", "write"));
    }

    #[test]
    fn additions_are_idempotent() {
        let allowlist = Allowlist::new();
        allowlist.allow_server("fs");
        allowlist.allow_server("fs");
        allowlist.allow_tool("fs", "read");
        allowlist.allow_tool("fs", "read");
        assert_eq!(allowlist.len(), 2);
    }

    #[test]
    fn clones_share_state() {
        let allowlist = Allowlist::new();
        let handle = allowlist.clone();
        handle.allow_server("fs");
        assert!(allowlist.contains("fs"));
        assert!(!allowlist.is_empty());
    }
}
