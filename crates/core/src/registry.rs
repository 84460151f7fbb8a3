// Tool registry: name -> descriptor + handler

use crate::handler::ToolHandler;
use crate::types::ToolDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry lookup/registration failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Tool already registered: {name}")]
    DuplicateTool { name: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
}

/// A descriptor paired with the handler that serves it
#[derive(Clone)]
pub struct RegisteredTool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Explicit registration list entry contributed by a provider
pub type ToolEntry = (ToolDescriptor, Arc<dyn ToolHandler>);

/// Tool registry for managing available tools.
///
/// Populated through `&mut self` at start-up, then shared behind an `Arc`;
/// reads never lock.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool
    pub fn register(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<(), RegistryError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool {
                name: descriptor.name,
            });
        }

        tracing::debug!(tool = %descriptor.name, "Registering tool");
        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool { descriptor, handler });
        Ok(())
    }

    /// Register every entry in order, stopping at the first duplicate
    pub fn register_all(
        &mut self,
        entries: impl IntoIterator<Item = ToolEntry>,
    ) -> Result<(), RegistryError> {
        for (descriptor, handler) in entries {
            self.register(descriptor, handler)?;
        }
        Ok(())
    }

    /// All descriptors in registration order
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    /// Get a tool's handler by name
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn ToolHandler>, RegistryError> {
        self.get(name)
            .map(|t| t.handler.clone())
            .ok_or_else(|| RegistryError::UnknownTool {
                name: name.to_string(),
            })
    }

    /// Get the full registration for a tool
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.index.get(name).and_then(|&i| self.tools.get(i))
    }

    /// Check if a tool exists
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.tools.iter().map(|t| t.descriptor.name.as_str()).collect();
        f.debug_struct("ToolRegistry")
            .field("registered", &names)
            .finish()
    }
}
