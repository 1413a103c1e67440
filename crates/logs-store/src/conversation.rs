use std::sync::Arc;

use json_patch::{Patch, PatchOperation};
use logs_protocol::PatchType;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, warn};
use ts_rs::TS;
use uuid::Uuid;

/// Surfaced to the user when a frame or patch could not be applied.
pub const UPDATE_FAILED_MESSAGE: &str = "Failed to process log update";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to apply {op} operation #{op_index} at '{path}': {reason}")]
pub struct ReconcileError {
    pub op_index: usize,
    pub op: String,
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct ConversationEntry {
    /// Position of the entry inside the document's `entries` array.
    pub index: usize,
    pub unit: PatchType,
}

/// Immutable view of a conversation document, published after every applied batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationSnapshot {
    pub entries: Vec<ConversationEntry>,
    pub session_id: Option<String>,
    pub executor_type: Option<String>,
    pub prompt: Option<String>,
    pub summary: Option<String>,
    /// Epoch milliseconds of the batch that produced this snapshot.
    pub updated_at_ms: Option<i64>,
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: usize,
    pub errors: Vec<ReconcileError>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

fn empty_document() -> Value {
    json!({
        "entries": [],
        "session_id": null,
        "executor_type": null,
        "prompt": null,
        "summary": null,
    })
}

/// Rebuilds one process's conversation document from ordered patch batches.
pub struct ConversationReconciler {
    process_id: Option<Uuid>,
    document: Value,
    snapshot: Arc<ConversationSnapshot>,
}

impl Default for ConversationReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationReconciler {
    pub fn new() -> Self {
        Self {
            process_id: None,
            document: empty_document(),
            snapshot: Arc::new(ConversationSnapshot::default()),
        }
    }

    pub fn for_process(process_id: Uuid) -> Self {
        let mut reconciler = Self::new();
        reconciler.process_id = Some(process_id);
        reconciler
    }

    pub fn process_id(&self) -> Option<Uuid> {
        self.process_id
    }

    /// Point the reconciler at `process_id`, discarding the document if it belonged to another process.
    pub fn bind(&mut self, process_id: Uuid) {
        if self.process_id != Some(process_id) {
            self.reset();
            self.process_id = Some(process_id);
        }
    }

    pub fn reset(&mut self) {
        self.document = empty_document();
        self.snapshot = Arc::new(ConversationSnapshot::default());
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn snapshot(&self) -> Arc<ConversationSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn apply_batch(&mut self, patch: &Patch, received_at_ms: i64) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (op_index, op) in patch.iter().enumerate() {
            match self.apply_operation(op_index, op) {
                Ok(()) => outcome.applied += 1,
                Err(err) => {
                    warn!(
                        process_id = ?self.process_id,
                        op_index = err.op_index,
                        path = %err.path,
                        "Dropping patch operation: {}",
                        err.reason
                    );
                    outcome.errors.push(err);
                }
            }
        }

        if outcome.applied > 0 {
            self.snapshot = Arc::new(self.build_snapshot(received_at_ms));
        }

        outcome
    }

    fn apply_operation(&mut self, op_index: usize, op: &PatchOperation) -> Result<(), ReconcileError> {
        let err = match json_patch::patch(&mut self.document, std::slice::from_ref(op)) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        // A replace may arrive before the field it targets was ever written.
        let Some(add) = replace_as_add(op) else {
            return Err(reconcile_error(op_index, op, err.to_string()));
        };

        json_patch::patch(&mut self.document, std::slice::from_ref(&add)).map_err(|fallback_err| {
            reconcile_error(
                op_index,
                op,
                format!("{err}; add fallback failed: {fallback_err}"),
            )
        })
    }

    fn build_snapshot(&self, received_at_ms: i64) -> ConversationSnapshot {
        let entries = self
            .document
            .get("entries")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .enumerate()
                    .filter_map(|(index, value)| {
                        match serde_json::from_value::<PatchType>(value.clone()) {
                            Ok(unit) => Some(ConversationEntry { index, unit }),
                            Err(err) => {
                                debug!(
                                    process_id = ?self.process_id,
                                    index,
                                    "Skipping conversation entry of unknown shape: {err}"
                                );
                                None
                            }
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        ConversationSnapshot {
            entries,
            session_id: string_field(&self.document, "session_id"),
            executor_type: string_field(&self.document, "executor_type"),
            prompt: string_field(&self.document, "prompt"),
            summary: string_field(&self.document, "summary"),
            updated_at_ms: Some(received_at_ms),
        }
    }
}

fn string_field(document: &Value, field: &str) -> Option<String> {
    document
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn replace_as_add(op: &PatchOperation) -> Option<PatchOperation> {
    let PatchOperation::Replace(replace) = op else {
        return None;
    };
    let mut value = serde_json::to_value(replace).ok()?;
    value
        .as_object_mut()?
        .insert("op".to_string(), Value::String("add".to_string()));
    serde_json::from_value(value).ok()
}

fn reconcile_error(op_index: usize, op: &PatchOperation, reason: String) -> ReconcileError {
    let described = serde_json::to_value(op).unwrap_or(Value::Null);
    ReconcileError {
        op_index,
        op: described
            .get("op")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        path: described
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        reason,
    }
}
