use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// A structured log item produced by a coding agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct NormalizedEntry {
    pub timestamp: Option<String>,
    pub entry_type: NormalizedEntryType,
    pub content: String,
    #[ts(type = "Record<string, unknown> | null")]
    pub metadata: Option<Value>,
}

impl NormalizedEntry {
    /// Epoch milliseconds of the entry's own RFC3339 timestamp, when it carries a valid one.
    pub fn timestamp_millis(&self) -> Option<i64> {
        let raw = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|ts| ts.timestamp_millis())
    }

    pub fn action_type(&self) -> Option<&ActionType> {
        match &self.entry_type {
            NormalizedEntryType::ToolUse { action_type, .. } => Some(action_type),
            _ => None,
        }
    }

    pub fn tool_status(&self) -> Option<&ToolStatus> {
        match &self.entry_type {
            NormalizedEntryType::ToolUse { status, .. } => Some(status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEntryType {
    UserMessage,
    UserFeedback {
        denied_tool: String,
    },
    AssistantMessage,
    ToolUse {
        tool_name: String,
        action_type: ActionType,
        #[serde(default)]
        status: ToolStatus,
    },
    SystemMessage,
    ErrorMessage {
        error_type: NormalizedEntryError,
    },
    Thinking,
    Loading,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEntryError {
    SetupRequired,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionType {
    FileRead {
        path: String,
    },
    FileEdit {
        path: String,
        #[serde(default)]
        changes: Vec<FileChange>,
    },
    CommandRun {
        command: String,
        #[serde(default)]
        result: Option<CommandRunResult>,
    },
    Search {
        query: String,
    },
    WebFetch {
        url: String,
    },
    Tool {
        tool_name: String,
        #[serde(default)]
        #[ts(type = "unknown")]
        arguments: Option<Value>,
        #[serde(default)]
        result: Option<ToolResult>,
    },
    TaskCreate {
        description: String,
    },
    PlanPresentation {
        plan: String,
    },
    TodoManagement {
        #[serde(default)]
        todos: Vec<TodoItem>,
        operation: String,
    },
    Other {
        description: String,
    },
    #[serde(other)]
    Unknown,
}

impl ActionType {
    pub fn name(&self) -> &'static str {
        match self {
            ActionType::FileRead { .. } => "file_read",
            ActionType::FileEdit { .. } => "file_edit",
            ActionType::CommandRun { .. } => "command_run",
            ActionType::Search { .. } => "search",
            ActionType::WebFetch { .. } => "web_fetch",
            ActionType::Tool { .. } => "tool",
            ActionType::TaskCreate { .. } => "task_create",
            ActionType::PlanPresentation { .. } => "plan_presentation",
            ActionType::TodoManagement { .. } => "todo_management",
            ActionType::Other { .. } => "other",
            ActionType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FileChange {
    Write {
        content: String,
    },
    Delete,
    Rename {
        new_path: String,
    },
    Edit {
        unified_diff: String,
        #[serde(default)]
        has_line_numbers: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct CommandRunResult {
    pub exit_status: Option<CommandExitStatus>,
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandExitStatus {
    ExitCode { code: i32 },
    Success { success: bool },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultValueType {
    Markdown,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct ToolResult {
    pub r#type: ToolResultValueType,
    #[ts(type = "unknown")]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
pub struct TodoItem {
    pub content: String,
    pub status: String,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, TS)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    #[default]
    Created,
    Success,
    Failed,
    Denied {
        reason: Option<String>,
    },
    PendingApproval {
        approval_id: String,
        requested_at: DateTime<Utc>,
        timeout_at: DateTime<Utc>,
    },
    TimedOut,
    #[serde(other)]
    Unknown,
}

impl ToolStatus {
    pub fn is_pending_approval(&self) -> bool {
        matches!(self, ToolStatus::PendingApproval { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_use_entry_decodes_action_and_status() {
        let entry: NormalizedEntry = serde_json::from_value(json!({
            "timestamp": "2025-01-01T00:00:01.500Z",
            "entry_type": {
                "type": "tool_use",
                "tool_name": "read",
                "action_type": { "action": "file_read", "path": "src/main.rs" },
                "status": { "status": "success" }
            },
            "content": "src/main.rs",
            "metadata": null
        }))
        .expect("entry");

        assert_eq!(
            entry.action_type(),
            Some(&ActionType::FileRead {
                path: "src/main.rs".to_string()
            })
        );
        assert_eq!(entry.tool_status(), Some(&ToolStatus::Success));
        assert_eq!(entry.timestamp_millis(), Some(1_735_689_601_500));
    }

    #[test]
    fn unknown_kinds_fall_back_instead_of_failing() {
        let entry: NormalizedEntry = serde_json::from_value(json!({
            "timestamp": null,
            "entry_type": {
                "type": "tool_use",
                "tool_name": "mystery",
                "action_type": { "action": "teleport", "target": "mars" },
                "status": { "status": "levitating" }
            },
            "content": "",
            "metadata": null
        }))
        .expect("entry");

        assert_eq!(entry.action_type(), Some(&ActionType::Unknown));
        assert_eq!(entry.tool_status(), Some(&ToolStatus::Unknown));

        let entry: NormalizedEntry = serde_json::from_value(json!({
            "timestamp": null,
            "entry_type": { "type": "token_usage_info", "total": 10 },
            "content": "",
            "metadata": null
        }))
        .expect("entry");
        assert_eq!(entry.entry_type, NormalizedEntryType::Unknown);
    }

    #[test]
    fn invalid_timestamp_is_ignored() {
        let entry = NormalizedEntry {
            timestamp: Some("yesterday".to_string()),
            entry_type: NormalizedEntryType::SystemMessage,
            content: "hi".to_string(),
            metadata: None,
        };
        assert_eq!(entry.timestamp_millis(), None);
    }

    #[test]
    fn pending_approval_status_is_detected() {
        let status: ToolStatus = serde_json::from_value(json!({
            "status": "pending_approval",
            "approval_id": "a-1",
            "requested_at": "2025-01-01T00:00:00Z",
            "timeout_at": "2025-01-01T00:05:00Z"
        }))
        .expect("status");
        assert!(status.is_pending_approval());
        assert!(!ToolStatus::Created.is_pending_approval());
    }
}
