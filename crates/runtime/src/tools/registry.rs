//! The set of tools offered to the model.

use std::collections::BTreeMap;
use std::sync::Arc;

use mcp::CallableTool;
use policy::ToolFilter;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Confirmer, InvocationContext, ToolDefinition, ToolError, ToolSpec};
use crate::content::NormalizedResult;

/// Tools keyed by the name the model calls them by.
pub struct ToolRegistry<C> {
    tools: BTreeMap<String, ToolDefinition<C>>,
    filter: ToolFilter,
}

impl<C> Default for ToolRegistry<C> {
    fn default() -> Self {
        Self {
            tools: BTreeMap::new(),
            filter: ToolFilter::default(),
        }
    }
}

impl<C: CallableTool> ToolRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `filter` to every server registered from now on.
    pub fn with_filter(mut self, filter: ToolFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Add a definition. A name already taken by another tool is replaced
    /// with the `{server}__{tool}` form. Returns the name it was stored
    /// under.
    pub fn register(&mut self, definition: ToolDefinition<C>) -> String {
        let definition = match self.tools.get(definition.name()) {
            Some(existing) if existing.server_name() != definition.server_name() => {
                let qualified = definition.as_fully_qualified();
                debug!(
                    name = definition.name(),
                    qualified = qualified.name(),
                    "tool name taken by server '{}'",
                    existing.server_name()
                );
                qualified
            }
            _ => definition,
        };
        let name = definition.name().to_string();
        self.tools.insert(name.clone(), definition);
        name
    }

    /// Register every tool `server_name` lists that passes both the
    /// registry filter and the server's own.
    pub fn register_server(
        &mut self,
        connection: Arc<C>,
        server_name: &str,
        tools: &[mcp::Tool],
        trust: bool,
        server_filter: &ToolFilter,
    ) -> usize {
        let mut registered = 0;
        for tool in tools {
            if !self.filter.allows(server_name, &tool.name)
                || !server_filter.allows(server_name, &tool.name)
            {
                debug!(server = server_name, tool = %tool.name, "tool filtered out");
                continue;
            }
            self.register(ToolDefinition::from_tool(
                Arc::clone(&connection),
                server_name,
                tool,
                trust,
            ));
            registered += 1;
        }
        info!(server = server_name, registered, listed = tools.len(), "registered tools");
        registered
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition<C>> {
        self.tools.get(name)
    }

    /// Definitions in name order.
    pub fn list(&self) -> impl Iterator<Item = &ToolDefinition<C>> {
        self.tools.values()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.list().map(ToolDefinition::spec).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name` and invoke it.
    pub async fn invoke<F: Confirmer>(
        &self,
        name: &str,
        params: Value,
        context: &InvocationContext,
        confirmer: &F,
        cancel: &CancellationToken,
    ) -> Result<NormalizedResult, ToolError> {
        let definition = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        definition.invoke(params, context, confirmer, cancel).await
    }
}
