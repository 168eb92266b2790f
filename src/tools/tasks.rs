//! Task board - markdown tasks moving through todo, doing and done
//!
//! Each task is `<state_dir>/tasks/<status>/NNN-slug.md`. The folder is the status.
//! Acceptance criteria are checkbox lines (`- [ ] ...` / `- [x] ...`); a task cannot
//! be in `done` while any of them is unchecked.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::core::{now_timestamp, ConvoyError, Result, ToolCategory, ToolDefinition};
use crate::tools::{optional_str, required_str, Tool};

const UNCHECKED: &str = "- [ ]";
const ID_WIDTH: usize = 3;
const MAX_ATTEMPTS: u32 = 64;

/// Workflow column a task lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Todo,
    Doing,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Todo, TaskStatus::Doing, TaskStatus::Done];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::Doing => "doing",
            TaskStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ConvoyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "todo" => Ok(TaskStatus::Todo),
            "doing" => Ok(TaskStatus::Doing),
            "done" => Ok(TaskStatus::Done),
            other => Err(ConvoyError::invalid_args(format!(
                "Unknown task status: {} (expected todo, doing or done)",
                other
            ))),
        }
    }
}

/// Where a task currently lives
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskLocation {
    pub id: String,
    pub status: TaskStatus,
    pub filename: String,
    pub path: PathBuf,
}

/// Row returned by `list_tasks`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
    pub filename: String,
}

/// Lowercase, alphanumeric runs joined by single dashes
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Criterion text of every unchecked checkbox line
pub fn unchecked_criteria(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| line.trim_start().strip_prefix(UNCHECKED))
        .map(|rest| rest.trim().to_string())
        .collect()
}

/// Markdown body of a new task
pub fn render_task(title: &str, description: &str, criteria: &[String]) -> String {
    let mut lines = vec![
        format!("# {}", title),
        String::new(),
        "## Description".to_string(),
        description.to_string(),
        String::new(),
        "## Acceptance Criteria".to_string(),
    ];
    lines.extend(criteria.iter().map(|c| format!("{} {}", UNCHECKED, c)));
    lines.push(String::new());
    lines.join("\n")
}

fn leading_id(filename: &str) -> Option<u32> {
    let (digits, _) = filename.split_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Reject content that would leave a `done` task with open criteria
fn check_gate(content: &str) -> Result<()> {
    let unchecked = unchecked_criteria(content);
    if unchecked.is_empty() {
        Ok(())
    } else {
        Err(ConvoyError::DoneGate(unchecked))
    }
}

/// The shared task folders
#[derive(Debug, Clone)]
pub struct TaskBoard {
    root: PathBuf,
}

impl TaskBoard {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            root: state_dir.as_ref().join("tasks"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn folder(&self, status: TaskStatus) -> PathBuf {
        self.root.join(status.as_str())
    }

    async fn ensure_dirs(&self) -> Result<()> {
        for status in TaskStatus::ALL {
            fs::create_dir_all(self.folder(status)).await?;
        }
        Ok(())
    }

    async fn filenames(&self, status: TaskStatus) -> Vec<String> {
        let Ok(mut entries) = fs::read_dir(self.folder(status)).await else {
            return Vec::new();
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".md") {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    async fn scan_max(&self) -> u32 {
        let mut max = 0;
        for status in TaskStatus::ALL {
            for name in self.filenames(status).await {
                if let Some(id) = leading_id(&name) {
                    max = max.max(id);
                }
            }
        }
        max
    }

    /// Locate a task by id in any folder
    pub async fn find(&self, id: &str) -> Result<TaskLocation> {
        let prefix = format!("{}-", id);
        for status in TaskStatus::ALL {
            if let Some(filename) = self
                .filenames(status)
                .await
                .into_iter()
                .find(|name| name.starts_with(&prefix))
            {
                return Ok(TaskLocation {
                    id: id.to_string(),
                    status,
                    path: self.folder(status).join(&filename),
                    filename,
                });
            }
        }
        Err(ConvoyError::tool(format!("Task not found: {}", id)))
    }

    /// Create a task in `todo` with every criterion unchecked
    pub async fn create(&self, title: &str, description: &str, criteria: &[String]) -> Result<TaskLocation> {
        self.ensure_dirs().await?;
        let content = render_task(title, description, criteria);
        let slug = slugify(title);
        let mut next = self.scan_max().await + 1;

        for _ in 0..MAX_ATTEMPTS {
            let id = format!("{:0width$}", next, width = ID_WIDTH);
            let filename = format!("{}-{}.md", id, slug);
            let path = self.folder(TaskStatus::Todo).join(&filename);
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut file) => {
                    file.write_all(content.as_bytes()).await?;
                    tracing::debug!(task = %id, "created task");
                    return Ok(TaskLocation {
                        id,
                        status: TaskStatus::Todo,
                        filename,
                        path,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    next = next.max(self.scan_max().await) + 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConvoyError::storage("Could not allocate a task id"))
    }

    /// Tasks in folder order, optionally limited to one status
    pub async fn list(&self, status: Option<TaskStatus>) -> Vec<TaskSummary> {
        let folders = match status {
            Some(status) => vec![status],
            None => TaskStatus::ALL.to_vec(),
        };

        let mut tasks = Vec::new();
        for status in folders {
            for filename in self.filenames(status).await {
                let stem = filename.trim_end_matches(".md");
                let (id, rest) = stem.split_once('-').unwrap_or((stem, ""));
                tasks.push(TaskSummary {
                    id: id.to_string(),
                    title: rest.replace('-', " "),
                    status,
                    filename: filename.clone(),
                });
            }
        }
        tasks
    }

    /// Content and location of one task
    pub async fn read(&self, id: &str) -> Result<(TaskLocation, String)> {
        let location = self.find(id).await?;
        let content = fs::read_to_string(&location.path).await?;
        Ok((location, content))
    }

    /// Overwrite a task's markdown in place.
    ///
    /// A task in `done` only accepts content whose criteria are all checked.
    pub async fn update(&self, id: &str, content: &str) -> Result<TaskLocation> {
        let location = self.find(id).await?;
        if location.status == TaskStatus::Done {
            check_gate(content)?;
        }
        fs::write(&location.path, content).await?;
        Ok(location)
    }

    /// Move a task to another folder, enforcing the done gate.
    ///
    /// Returns the previous location.
    pub async fn move_to(&self, id: &str, to: TaskStatus) -> Result<TaskLocation> {
        self.ensure_dirs().await?;
        let (location, content) = self.read(id).await?;

        if location.status == to {
            return Err(ConvoyError::tool(format!("Task is already in {}", to)));
        }

        let content = if to == TaskStatus::Done {
            check_gate(&content)?;
            format!("{}\n\n## Completed\n{}\n", content.trim_end(), now_timestamp())
        } else {
            content
        };

        let target = self.folder(to).join(&location.filename);
        fs::write(&target, content).await?;
        fs::remove_file(&location.path).await?;
        tracing::debug!(task = %id, from = %location.status, to = %to, "moved task");

        Ok(location)
    }
}

/// create_task
pub struct CreateTaskTool {
    board: TaskBoard,
}

impl CreateTaskTool {
    pub fn new(board: TaskBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for CreateTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "create_task",
            "Create a new task in the todo folder with a title, description, and acceptance criteria",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "description": "Task title"},
                    "description": {"type": "string", "description": "Task description"},
                    "criteria": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "List of acceptance criteria"
                    }
                },
                "required": ["title", "description", "criteria"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let title = required_str(args, "title")?;
        let description = required_str(args, "description")?;
        let criteria: Vec<String> = args
            .get("criteria")
            .and_then(Value::as_array)
            .ok_or_else(|| ConvoyError::invalid_args("Missing required argument: criteria"))?
            .iter()
            .filter_map(|c| c.as_str().map(str::to_string))
            .collect();

        let location = self.board.create(title, description, &criteria).await?;
        Ok(json!({
            "id": location.id,
            "filename": location.filename,
            "path": location.path,
        })
        .to_string())
    }
}

/// list_tasks
pub struct ListTasksTool {
    board: TaskBoard,
}

impl ListTasksTool {
    pub fn new(board: TaskBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for ListTasksTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "list_tasks",
            "List tasks, optionally filtered by status (\"todo\", \"doing\", \"done\")",
            json!({
                "type": "object",
                "properties": {
                    "status": {
                        "type": "string",
                        "enum": ["todo", "doing", "done"],
                        "description": "Filter by status (omit for all)"
                    }
                }
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        // An unrecognised filter lists everything.
        let status = optional_str(args, "status").and_then(|s| s.parse().ok());
        Ok(serde_json::to_string(&self.board.list(status).await)?)
    }
}

/// read_task
pub struct ReadTaskTool {
    board: TaskBoard,
}

impl ReadTaskTool {
    pub fn new(board: TaskBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for ReadTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "read_task",
            "Read a task's full contents and current status by its ID",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Task ID, e.g. \"001\""}
                },
                "required": ["id"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let id = required_str(args, "id")?;
        let (location, content) = self.board.read(id).await?;
        Ok(json!({"id": id, "status": location.status, "content": content}).to_string())
    }
}

/// update_task
pub struct UpdateTaskTool {
    board: TaskBoard,
}

impl UpdateTaskTool {
    pub fn new(board: TaskBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "update_task",
            "Overwrite a task's markdown content (e.g. to check off acceptance criteria)",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Task ID, e.g. \"001\""},
                    "content": {"type": "string", "description": "Full new markdown content for the task"}
                },
                "required": ["id", "content"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let id = required_str(args, "id")?;
        let content = required_str(args, "content")?;
        let location = self.board.update(id, content).await?;
        Ok(json!({"success": true, "id": id, "path": location.path}).to_string())
    }
}

/// move_task
pub struct MoveTaskTool {
    board: TaskBoard,
}

impl MoveTaskTool {
    pub fn new(board: TaskBoard) -> Self {
        Self { board }
    }
}

#[async_trait]
impl Tool for MoveTaskTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::function(
            "move_task",
            "Move a task between statuses (todo, doing, done). Moving to \"done\" requires all acceptance criteria to be checked off.",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Task ID, e.g. \"001\""},
                    "to": {
                        "type": "string",
                        "enum": ["todo", "doing", "done"],
                        "description": "Target status"
                    }
                },
                "required": ["id", "to"]
            }),
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Tasks
    }

    async fn execute(&self, args: &Value) -> Result<String> {
        let id = required_str(args, "id")?;
        let to: TaskStatus = required_str(args, "to")?.parse()?;
        let from = self.board.move_to(id, to).await?;
        Ok(json!({
            "id": id,
            "from": from.status,
            "to": to,
            "filename": from.filename,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn criteria(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Fix the  Parser!"), "fix-the-parser");
        assert_eq!(slugify("--Already-slugged--"), "already-slugged");
        assert_eq!(slugify("???"), "");
    }

    #[tokio::test]
    async fn test_render_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());

        let first = board
            .create("Write docs", "Explain setup", &criteria(&["README exists"]))
            .await
            .unwrap();
        let second = board.create("Ship it", "Release", &[]).await.unwrap();
        assert_eq!(first.id, "001");
        assert_eq!(second.id, "002");
        assert_eq!(first.filename, "001-write-docs.md");

        let (_, content) = board.read("001").await.unwrap();
        assert_eq!(
            content,
            "# Write docs\n\n## Description\nExplain setup\n\n## Acceptance Criteria\n- [ ] README exists\n"
        );

        let listed = board.list(None).await;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].title, "write docs");
        assert_eq!(listed[1].status, TaskStatus::Todo);
        assert!(board.list(Some(TaskStatus::Done)).await.is_empty());
    }

    #[tokio::test]
    async fn test_ids_scan_all_folders() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board.create("One", "d", &[]).await.unwrap();
        board.move_to("001", TaskStatus::Done).await.unwrap();

        let next = board.create("Two", "d", &[]).await.unwrap();
        assert_eq!(next.id, "002");
    }

    #[tokio::test]
    async fn test_no_op_move_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board.create("One", "d", &[]).await.unwrap();

        let err = board.move_to("001", TaskStatus::Todo).await.unwrap_err();
        assert_eq!(err.to_payload(), r#"{"error":"Task is already in todo"}"#);
    }

    #[tokio::test]
    async fn test_unknown_task() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        let err = board.move_to("404", TaskStatus::Doing).await.unwrap_err();
        assert_eq!(err.to_payload(), r#"{"error":"Task not found: 404"}"#);
    }

    #[tokio::test]
    async fn test_done_gate_lists_unchecked() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board
            .create("Gate", "d", &criteria(&["tests pass", "docs updated"]))
            .await
            .unwrap();

        let err = board.move_to("001", TaskStatus::Done).await.unwrap_err();
        let payload: Value = serde_json::from_str(&err.to_payload()).unwrap();
        assert_eq!(payload["unchecked"], json!(["tests pass", "docs updated"]));
        assert_eq!(board.find("001").await.unwrap().status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn test_done_appends_completion() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board.create("Gate", "d", &criteria(&["works"])).await.unwrap();
        let (_, content) = board.read("001").await.unwrap();
        board.update("001", &content.replace("- [ ]", "- [x]")).await.unwrap();

        let from = board.move_to("001", TaskStatus::Done).await.unwrap();
        assert_eq!(from.status, TaskStatus::Todo);

        let (location, content) = board.read("001").await.unwrap();
        assert_eq!(location.status, TaskStatus::Done);
        assert!(content.contains("- [x] works\n\n## Completed\n"));
        assert!(!board.folder(TaskStatus::Todo).join(&location.filename).exists());
    }

    #[tokio::test]
    async fn test_gate_over_every_checkbox_combination() {
        let names = ["a", "b", "c", "d"];
        for mask in 0u32..(1 << names.len()) {
            let dir = tempfile::tempdir().unwrap();
            let board = TaskBoard::new(dir.path());
            board.create("Combo", "d", &criteria(&names)).await.unwrap();

            let (_, mut content) = board.read("001").await.unwrap();
            for (bit, name) in names.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    content = content.replace(&format!("- [ ] {}", name), &format!("- [x] {}", name));
                }
            }
            board.update("001", &content).await.unwrap();

            let all_checked = mask == (1 << names.len()) - 1;
            let moved = board.move_to("001", TaskStatus::Done).await;
            assert_eq!(moved.is_ok(), all_checked, "mask {:04b}", mask);
            let status = board.find("001").await.unwrap().status;
            assert_eq!(status == TaskStatus::Done, all_checked);
        }
    }

    #[tokio::test]
    async fn test_done_task_keeps_its_criteria_checked() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board.create("Gate", "d", &criteria(&["works"])).await.unwrap();
        let (_, content) = board.read("001").await.unwrap();
        board.update("001", &content.replace("- [ ]", "- [x]")).await.unwrap();
        board.move_to("001", TaskStatus::Done).await.unwrap();

        let tool = UpdateTaskTool::new(board.clone());
        let err = tool
            .execute(&json!({"id": "001", "content": "# Gate\n- [ ] works\n"}))
            .await
            .unwrap_err();
        let payload: Value = serde_json::from_str(&err.to_payload()).unwrap();
        assert_eq!(payload["unchecked"], json!(["works"]));

        let (location, content) = board.read("001").await.unwrap();
        assert_eq!(location.status, TaskStatus::Done);
        assert!(unchecked_criteria(&content).is_empty());

        // Checked edits to a finished task still go through.
        board.update("001", "# Gate\n- [x] works\n- [x] polished\n").await.unwrap();
    }

    #[tokio::test]
    async fn test_move_tool_parses_status() {
        let dir = tempfile::tempdir().unwrap();
        let board = TaskBoard::new(dir.path());
        board.create("One", "d", &[]).await.unwrap();
        let tool = MoveTaskTool::new(board);

        let out = tool.execute(&json!({"id": "001", "to": "doing"})).await.unwrap();
        let out: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(out["from"], "todo");
        assert_eq!(out["to"], "doing");

        assert!(tool
            .execute(&json!({"id": "001", "to": "archived"}))
            .await
            .is_err());
    }
}
