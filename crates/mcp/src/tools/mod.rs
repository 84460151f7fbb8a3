pub mod calculator;
pub mod clock;
pub mod files;
pub mod storage;

pub use files::FileWorkspace;
pub use storage::KeyValueStore;

use anyhow::Result;
use std::sync::Arc;
use toolbridge_core::ToolRegistry;

/// Build the registry served by this process.
///
/// Providers are registered in a fixed order (clock, calculator, files,
/// storage), which is also the order `listTools` reports.
pub fn default_registry(workspace: Arc<FileWorkspace>, store: Arc<KeyValueStore>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register_all(clock::tools())?;
    registry.register_all(calculator::tools())?;
    registry.register_all(files::tools(workspace))?;
    registry.register_all(storage::tools(store))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_registry_has_every_tool() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = Arc::new(FileWorkspace::new(temp_dir.path()).unwrap());
        let registry = default_registry(workspace, Arc::new(KeyValueStore::new())).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "getCurrentTime",
                "add",
                "subtract",
                "multiply",
                "divide",
                "power",
                "sqrt",
                "readFile",
                "writeFile",
                "appendToFile",
                "listFiles",
                "deleteFile",
                "getFileInfo",
                "getWorkspacePath",
                "store",
                "retrieve",
                "delete",
                "listKeys",
                "clear",
                "count",
            ]
        );
        for name in &names {
            assert!(registry.lookup(name).is_ok());
        }
    }
}
