use logs_protocol::{
    ExecutionProcess, LogEntryChannel, NormalizedEntry, PatchType, StreamKind,
};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::config::LogPipelineConfig;

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum UnifiedPayload {
    Text(String),
    Entry(NormalizedEntry),
}

/// Renderer-facing entry of the merged cross-process log.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct UnifiedLogEntry {
    pub id: String,
    /// Epoch milliseconds; approximate when the source carried no timestamp.
    pub ts: i64,
    pub process_id: Uuid,
    pub process_name: String,
    pub channel: LogEntryChannel,
    pub payload: UnifiedPayload,
}

impl UnifiedLogEntry {
    pub fn normalized_entry(&self) -> Option<&NormalizedEntry> {
        match &self.payload {
            UnifiedPayload::Entry(entry) => Some(entry),
            UnifiedPayload::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    /// Stable position of the unit inside its process.
    pub position: usize,
    pub unit: PatchType,
    pub timestamp_ms: Option<i64>,
}

/// Everything the compositor needs to know about one process's current output.
#[derive(Debug, Clone)]
pub struct ProcessSource {
    pub process: ExecutionProcess,
    pub entries: Vec<SourceEntry>,
    /// When the latest batch for this process arrived; anchors approximate timestamps.
    pub batch_time_ms: i64,
}

pub fn channel_for(kind: StreamKind, unit: &PatchType) -> LogEntryChannel {
    match unit {
        PatchType::NormalizedEntry(_) => LogEntryChannel::Normalized,
        PatchType::Stderr(_) => LogEntryChannel::Stderr,
        PatchType::Stdout(_) => match kind {
            StreamKind::Raw => LogEntryChannel::Raw,
            StreamKind::Normalized => LogEntryChannel::Stdout,
        },
    }
}

/// Merges every process's output into one bounded, time-ordered list.
#[derive(Debug, Clone, Copy)]
pub struct UnifiedLogCompositor {
    max_entries: usize,
}

impl Default for UnifiedLogCompositor {
    fn default() -> Self {
        Self::from_config(&LogPipelineConfig::default())
    }
}

impl UnifiedLogCompositor {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
        }
    }

    pub fn from_config(config: &LogPipelineConfig) -> Self {
        Self::new(config.unified_max_entries)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Rebuild the merged log from scratch. Entries without a timestamp are
    /// placed just before their batch time, preserving their order within the
    /// batch; cross-process order is best effort.
    pub fn compose<I>(&self, sources: I) -> Vec<UnifiedLogEntry>
    where
        I: IntoIterator<Item = ProcessSource>,
    {
        let mut merged: Vec<UnifiedLogEntry> = Vec::new();

        for source in sources {
            let kind = source.process.stream_kind();
            let process_name = source.process.display_name().to_string();
            let len = source.entries.len() as i64;

            for (offset, entry) in source.entries.into_iter().enumerate() {
                let ts = entry
                    .timestamp_ms
                    .unwrap_or(source.batch_time_ms - (len - offset as i64));
                let channel = channel_for(kind, &entry.unit);
                let payload = match entry.unit {
                    PatchType::NormalizedEntry(normalized) => UnifiedPayload::Entry(normalized),
                    PatchType::Stdout(text) | PatchType::Stderr(text) => UnifiedPayload::Text(text),
                };

                merged.push(UnifiedLogEntry {
                    id: format!("{}:{}", source.process.id, entry.position),
                    ts,
                    process_id: source.process.id,
                    process_name: process_name.clone(),
                    channel,
                    payload,
                });
            }
        }

        merged.sort_by_key(|entry| entry.ts);

        if merged.len() > self.max_entries {
            let excess = merged.len() - self.max_entries;
            merged.drain(..excess);
        }

        merged
    }
}
