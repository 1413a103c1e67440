pub mod channel;
pub mod log_msg;
pub mod normalized;
pub mod patch;
pub mod process;

pub use channel::LogEntryChannel;
pub use log_msg::{FrameError, LogMsg, LogStreamEvent, RawFrame};
pub use normalized::{
    ActionType, CommandExitStatus, CommandRunResult, FileChange, NormalizedEntry,
    NormalizedEntryError, NormalizedEntryType, TodoItem, ToolResult, ToolResultValueType,
    ToolStatus,
};
pub use patch::{ConversationPatch, PatchOperation, PatchType, extract_normalized_entry_from_patch};
pub use process::{ExecutionProcess, ExecutionProcessRunReason, ExecutionProcessStatus, StreamKind};
