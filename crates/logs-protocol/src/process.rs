use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProcessStatus {
    Running,
    Completed,
    Failed,
    Killed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProcessRunReason {
    SetupScript,
    CleanupScript,
    CodingAgent,
    DevServer,
}

impl ExecutionProcessRunReason {
    /// Agents publish a normalized conversation; every script flavour publishes raw lines.
    pub fn stream_kind(&self) -> StreamKind {
        match self {
            ExecutionProcessRunReason::CodingAgent => StreamKind::Normalized,
            ExecutionProcessRunReason::SetupScript
            | ExecutionProcessRunReason::CleanupScript
            | ExecutionProcessRunReason::DevServer => StreamKind::Raw,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ExecutionProcessRunReason::SetupScript => "Setup Script",
            ExecutionProcessRunReason::CleanupScript => "Cleanup Script",
            ExecutionProcessRunReason::CodingAgent => "Coding Agent",
            ExecutionProcessRunReason::DevServer => "Dev Server",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProcessRunReason::SetupScript => "setupscript",
            ExecutionProcessRunReason::CleanupScript => "cleanupscript",
            ExecutionProcessRunReason::CodingAgent => "codingagent",
            ExecutionProcessRunReason::DevServer => "devserver",
        }
    }
}

impl std::str::FromStr for ExecutionProcessRunReason {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "setupscript" => Ok(ExecutionProcessRunReason::SetupScript),
            "cleanupscript" => Ok(ExecutionProcessRunReason::CleanupScript),
            "codingagent" => Ok(ExecutionProcessRunReason::CodingAgent),
            "devserver" => Ok(ExecutionProcessRunReason::DevServer),
            _ => Err(format!("Unknown run reason: {value}")),
        }
    }
}

/// Which endpoint flavour a process streams from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Normalized,
    Raw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
pub struct ExecutionProcess {
    pub id: Uuid,
    pub run_reason: ExecutionProcessRunReason,
    pub status: ExecutionProcessStatus,
    /// Excluded from the conversation history view but still listed with the processes.
    #[serde(default)]
    pub dropped: bool,
}

impl ExecutionProcess {
    pub fn new(
        id: Uuid,
        run_reason: ExecutionProcessRunReason,
        status: ExecutionProcessStatus,
    ) -> Self {
        Self {
            id,
            run_reason,
            status,
            dropped: false,
        }
    }

    pub fn stream_kind(&self) -> StreamKind {
        self.run_reason.stream_kind()
    }

    pub fn display_name(&self) -> &'static str {
        self.run_reason.display_name()
    }

    pub fn is_running(&self) -> bool {
        self.status == ExecutionProcessStatus::Running
    }
}
