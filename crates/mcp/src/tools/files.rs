// File tools confined to a workspace directory

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use toolbridge_core::{
    ParamSpec, ToolArgs, ToolDescriptor, ToolEntry, ToolError, ToolHandler, ToolOutput,
};

/// Directory every file tool reads from and writes to
#[derive(Debug, Clone)]
pub struct FileWorkspace {
    root: PathBuf,
}

impl FileWorkspace {
    /// Open the workspace, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace directory {}", root.display()))?;
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a file name to a path inside the workspace.
    ///
    /// Only plain relative names are accepted; `..`, absolute paths and
    /// prefixes are rejected.
    fn resolve(&self, filename: &str) -> Result<PathBuf, ToolError> {
        let relative = Path::new(filename);
        let plain = !filename.trim().is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(ToolError::domain(format!(
                "Invalid file name '{}': must be a relative path inside the workspace",
                filename
            )));
        }
        Ok(self.root.join(relative))
    }

    fn existing(&self, filename: &str) -> Result<PathBuf, ToolError> {
        let path = self.resolve(filename)?;
        if !path.exists() {
            return Err(ToolError::domain(format!("File '{}' does not exist", filename)));
        }
        Ok(path)
    }

    pub fn read_file(&self, filename: &str) -> Result<String, ToolError> {
        let path = self.existing(filename)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            ToolError::domain(format!("Error reading file '{}': {}", filename, e))
        })?;
        Ok(format!("Content of '{}':\n{}", filename, content))
    }

    pub fn write_file(&self, filename: &str, content: &str) -> Result<String, ToolError> {
        let path = self.resolve(filename)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ToolError::domain(format!("Error writing file '{}': {}", filename, e))
            })?;
        }
        fs::write(&path, content).map_err(|e| {
            ToolError::domain(format!("Error writing file '{}': {}", filename, e))
        })?;
        Ok(format!(
            "Successfully wrote {} characters to '{}'",
            content.chars().count(),
            filename
        ))
    }

    pub fn append_to_file(&self, filename: &str, content: &str) -> Result<String, ToolError> {
        let path = self.resolve(filename)?;
        if !path.exists() {
            return Err(ToolError::domain(format!(
                "File '{}' does not exist. Use writeFile to create it first.",
                filename
            )));
        }
        fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(content.as_bytes()))
            .map_err(|e| {
                ToolError::domain(format!("Error appending to file '{}': {}", filename, e))
            })?;
        Ok(format!(
            "Successfully appended {} characters to '{}'",
            content.chars().count(),
            filename
        ))
    }

    pub fn list_files(&self) -> Result<String, ToolError> {
        let entries = fs::read_dir(&self.root)
            .map_err(|e| ToolError::domain(format!("Error listing files: {}", e)))?;

        let mut files: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        files.sort();

        if files.is_empty() {
            return Ok("No files in workspace".to_string());
        }
        Ok(format!("Files in workspace:\n{}", files.join("\n")))
    }

    pub fn delete_file(&self, filename: &str) -> Result<String, ToolError> {
        let path = self.existing(filename)?;
        fs::remove_file(&path).map_err(|e| {
            ToolError::domain(format!("Error deleting file '{}': {}", filename, e))
        })?;
        Ok(format!("Successfully deleted '{}'", filename))
    }

    pub fn file_info(&self, filename: &str) -> Result<String, ToolError> {
        let path = self.existing(filename)?;
        let metadata = fs::metadata(&path).map_err(|e| {
            ToolError::domain(format!("Error getting file info '{}': {}", filename, e))
        })?;
        let modified = metadata
            .modified()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339_opts(SecondsFormat::AutoSi, true))
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(format!(
            "File: {}\nSize: {} bytes\nLast Modified: {}",
            filename,
            metadata.len(),
            modified
        ))
    }

    pub fn workspace_path(&self) -> String {
        format!("Workspace directory: {}", self.root.display())
    }
}

fn entry(
    descriptor: ToolDescriptor,
    workspace: &Arc<FileWorkspace>,
    f: fn(&FileWorkspace, &ToolArgs) -> Result<String, ToolError>,
) -> ToolEntry {
    let workspace = workspace.clone();
    let handler: Arc<dyn ToolHandler> =
        Arc::new(move |args: &ToolArgs| -> Result<ToolOutput, ToolError> {
            f(&workspace, args).map(ToolOutput::Text)
        });
    (descriptor, handler)
}

/// File tool registration list
pub fn tools(workspace: Arc<FileWorkspace>) -> Vec<ToolEntry> {
    vec![
        entry(
            ToolDescriptor::new("readFile", "Read the contents of a file from the workspace")
                .param(ParamSpec::string("filename")),
            &workspace,
            |w, args| w.read_file(args.text("filename")?),
        ),
        entry(
            ToolDescriptor::new(
                "writeFile",
                "Write content to a file in the workspace (creates or overwrites)",
            )
            .param(ParamSpec::string("filename"))
            .param(ParamSpec::string("content")),
            &workspace,
            |w, args| w.write_file(args.text("filename")?, args.text("content")?),
        ),
        entry(
            ToolDescriptor::new(
                "appendToFile",
                "Append content to an existing file in the workspace",
            )
            .param(ParamSpec::string("filename"))
            .param(ParamSpec::string("content")),
            &workspace,
            |w, args| w.append_to_file(args.text("filename")?, args.text("content")?),
        ),
        entry(
            ToolDescriptor::new("listFiles", "List all files in the workspace"),
            &workspace,
            |w, _| w.list_files(),
        ),
        entry(
            ToolDescriptor::new("deleteFile", "Delete a file from the workspace")
                .param(ParamSpec::string("filename")),
            &workspace,
            |w, args| w.delete_file(args.text("filename")?),
        ),
        entry(
            ToolDescriptor::new(
                "getFileInfo",
                "Get information about a file (size, last modified)",
            )
            .param(ParamSpec::string("filename")),
            &workspace,
            |w, args| w.file_info(args.text("filename")?),
        ),
        entry(
            ToolDescriptor::new("getWorkspacePath", "Get the workspace directory path"),
            &workspace,
            |w, _| Ok(w.workspace_path()),
        ),
    ]
}
