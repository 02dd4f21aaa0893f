//! ToolRegistry — named lookup plus session-config schema export.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{AssistantError, Result};
use crate::protocol::session::ToolDefinition;

use super::Tool;

#[derive(Default)]
pub struct ToolRegistry {
    /// Registration order is preserved so the exported schema is stable
    tools: RwLock<Vec<Arc<Tool>>>,
    /// Remote (MCP) tool references the model calls directly
    remote_tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remote_tools(remote_tools: Vec<ToolDefinition>) -> Self {
        Self {
            tools: RwLock::new(Vec::new()),
            remote_tools,
        }
    }

    /// Register a tool. Duplicate names are rejected.
    pub fn register(&self, tool: Tool) -> Result<()> {
        let mut tools = self.tools.write();
        if tools.iter().any(|t| t.name == tool.name) {
            return Err(AssistantError::Tool(format!(
                "tool '{}' already registered",
                tool.name
            )));
        }
        tools.push(Arc::new(tool));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Tool>> {
        self.tools.read().iter().find(|t| t.name == name).cloned()
    }

    /// Union of local function-tool descriptors and configured remote
    /// references, as they appear in the session config.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .read()
            .iter()
            .map(|tool| tool.definition())
            .collect();
        definitions.extend(self.remote_tools.iter().cloned());
        definitions
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}
