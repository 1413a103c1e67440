//! Builders for log entries and processes used across the pipeline tests.

use chrono::{DateTime, Duration, Utc};
use logs_protocol::{
    ActionType, ExecutionProcess, ExecutionProcessRunReason, ExecutionProcessStatus, FileChange,
    NormalizedEntry, NormalizedEntryError, NormalizedEntryType, ToolResult, ToolResultValueType,
    ToolStatus,
};
use serde_json::Value;
use uuid::Uuid;

pub fn process(run_reason: ExecutionProcessRunReason) -> ExecutionProcess {
    ExecutionProcess::new(Uuid::new_v4(), run_reason, ExecutionProcessStatus::Running)
}

pub fn tool_use(tool_name: &str, action_type: ActionType, status: ToolStatus) -> NormalizedEntry {
    NormalizedEntry {
        timestamp: None,
        entry_type: NormalizedEntryType::ToolUse {
            tool_name: tool_name.to_string(),
            action_type,
            status,
        },
        content: tool_name.to_string(),
        metadata: None,
    }
}

pub fn file_read(path: &str) -> NormalizedEntry {
    tool_use(
        "read",
        ActionType::FileRead {
            path: path.to_string(),
        },
        ToolStatus::Success,
    )
}

pub fn search(query: &str) -> NormalizedEntry {
    tool_use(
        "grep",
        ActionType::Search {
            query: query.to_string(),
        },
        ToolStatus::Success,
    )
}

pub fn web_fetch(url: &str) -> NormalizedEntry {
    tool_use(
        "fetch",
        ActionType::WebFetch {
            url: url.to_string(),
        },
        ToolStatus::Success,
    )
}

pub fn command_run(command: &str) -> NormalizedEntry {
    tool_use(
        "bash",
        ActionType::CommandRun {
            command: command.to_string(),
            result: None,
        },
        ToolStatus::Success,
    )
}

pub fn tool_call(
    tool_name: &str,
    arguments: Option<Value>,
    result: Option<Value>,
) -> NormalizedEntry {
    tool_use(
        tool_name,
        ActionType::Tool {
            tool_name: tool_name.to_string(),
            arguments,
            result: result.map(|value| ToolResult {
                r#type: ToolResultValueType::Json,
                value,
            }),
        },
        ToolStatus::Success,
    )
}

pub fn file_edit(path: &str, changes: Vec<FileChange>, status: ToolStatus) -> NormalizedEntry {
    tool_use(
        "edit",
        ActionType::FileEdit {
            path: path.to_string(),
            changes,
        },
        status,
    )
}

pub fn plan(plan: &str) -> NormalizedEntry {
    tool_use(
        "exit_plan_mode",
        ActionType::PlanPresentation {
            plan: plan.to_string(),
        },
        ToolStatus::Success,
    )
}

pub fn pending_approval() -> ToolStatus {
    let requested_at = Utc::now();
    ToolStatus::PendingApproval {
        approval_id: Uuid::new_v4().to_string(),
        requested_at,
        timeout_at: requested_at + Duration::minutes(5),
    }
}

pub fn message(entry_type: NormalizedEntryType, content: &str) -> NormalizedEntry {
    NormalizedEntry {
        timestamp: None,
        entry_type,
        content: content.to_string(),
        metadata: None,
    }
}

pub fn assistant_message(content: &str) -> NormalizedEntry {
    message(NormalizedEntryType::AssistantMessage, content)
}

pub fn system_message(content: &str) -> NormalizedEntry {
    message(NormalizedEntryType::SystemMessage, content)
}

pub fn error_message(content: &str) -> NormalizedEntry {
    message(
        NormalizedEntryType::ErrorMessage {
            error_type: NormalizedEntryError::Other,
        },
        content,
    )
}

/// Stamp an entry with an RFC3339 timestamp at the given epoch milliseconds.
pub fn at_millis(mut entry: NormalizedEntry, millis: i64) -> NormalizedEntry {
    entry.timestamp = DateTime::<Utc>::from_timestamp_millis(millis).map(|ts| ts.to_rfc3339());
    entry
}
