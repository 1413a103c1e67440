pub mod config;
pub mod conversation;
pub mod raw;
pub mod unified;

pub use config::LogPipelineConfig;
pub use conversation::{
    BatchOutcome, ConversationEntry, ConversationReconciler, ConversationSnapshot,
    ReconcileError, UPDATE_FAILED_MESSAGE,
};
pub use raw::{RawLine, RawLogBuffer};
pub use unified::{
    ProcessSource, SourceEntry, UnifiedLogCompositor, UnifiedLogEntry, UnifiedPayload,
    channel_for,
};

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
