//! Filesystem tools: read_file, write_file, list_dir

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;

use crate::core::{ConvoyError, Result, ToolCategory, ToolDefinition};
use crate::tools::{optional_str, required_str, Tool};

/// Returns the raw file text
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "read_file",
            "Read the contents of a file at the given path",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute or relative file path"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileSystem
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let path = required_str(args, "path")?;
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConvoyError::tool(format!("File not found: {}", path)))
            }
            Err(e) => Err(ConvoyError::tool(format!("Failed to read {}: {}", path, e))),
        }
    }
}

/// Creates or overwrites a file, including missing parent directories
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "write_file",
            "Write content to a file, creating it if it doesn't exist",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Absolute or relative file path"
                    },
                    "content": {
                        "type": "string",
                        "description": "Content to write to the file"
                    }
                },
                "required": ["path", "content"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileSystem
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let path = required_str(args, "path")?;
        let content = required_str(args, "content")?;

        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;

        Ok(json!({ "success": true, "path": path }).to_string())
    }
}

#[derive(Serialize)]
struct DirEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
}

/// Lists one directory level, sorted by name
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "list_dir",
            "List files and directories at the given path",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Directory path to list (defaults to current directory)"
                    }
                }
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::FileSystem
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let dir = optional_str(args, "path").unwrap_or(".");
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ConvoyError::tool(format!("Cannot list {}: {}", dir, e)))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if is_dir { "directory" } else { "file" },
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(serde_json::to_string(&entries)?)
    }
}
