use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Display category of a unified log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryChannel {
    Stdout,
    Stderr,
    Normalized,
    Raw,
}

impl LogEntryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogEntryChannel::Stdout => "stdout",
            LogEntryChannel::Stderr => "stderr",
            LogEntryChannel::Normalized => "normalized",
            LogEntryChannel::Raw => "raw",
        }
    }
}

impl FromStr for LogEntryChannel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stdout" => Ok(LogEntryChannel::Stdout),
            "stderr" => Ok(LogEntryChannel::Stderr),
            "normalized" => Ok(LogEntryChannel::Normalized),
            "raw" => Ok(LogEntryChannel::Raw),
            _ => Err(format!("Unknown log entry channel: {value}")),
        }
    }
}

impl std::fmt::Display for LogEntryChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
