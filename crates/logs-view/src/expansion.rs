use std::collections::HashMap;

use logs_protocol::{ActionType, FileChange, NormalizedEntry, NormalizedEntryType};
use serde_json::Value;
use tracing::debug;

/// Whether an entry's detail region starts expanded.
pub fn default_expanded(entry: &NormalizedEntry) -> bool {
    match &entry.entry_type {
        NormalizedEntryType::ToolUse {
            action_type,
            status,
            ..
        } => match action_type {
            ActionType::Tool {
                arguments, result, ..
            } => {
                has_content(arguments.as_ref()) || result.is_some()
            }
            ActionType::FileEdit { changes, .. } => {
                status.is_pending_approval()
                    && changes
                        .iter()
                        .any(|change| matches!(change, FileChange::Write { .. }))
            }
            ActionType::PlanPresentation { .. } => true,
            _ => false,
        },
        _ => false,
    }
}

fn has_content(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpansionState {
    DefaultApplied(bool),
    UserOverridden(bool),
}

impl ExpansionState {
    pub fn is_expanded(self) -> bool {
        match self {
            ExpansionState::DefaultApplied(expanded) | ExpansionState::UserOverridden(expanded) => {
                expanded
            }
        }
    }
}

/// Per-key expansion table. A key with no entry has not been decided yet.
///
/// Defaults are applied once per key; a user toggle wins from then on. The
/// table is scoped to a context (a process or session) and cleared when the
/// context changes.
#[derive(Debug, Default)]
pub struct ExpansionResolver {
    context: Option<String>,
    states: HashMap<String, ExpansionState>,
}

impl ExpansionResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns true when the context changed and the table was cleared.
    pub fn set_context(&mut self, context: &str) -> bool {
        if self.context.as_deref() == Some(context) {
            return false;
        }
        debug!(
            from = self.context.as_deref().unwrap_or("<none>"),
            to = context,
            decided = self.states.len(),
            "Expansion context changed, clearing decisions"
        );
        self.context = Some(context.to_string());
        self.states.clear();
        true
    }

    pub fn is_expanded(&mut self, key: &str, entry: &NormalizedEntry) -> bool {
        self.resolve_with(key, || default_expanded(entry))
    }

    /// Like [`Self::is_expanded`] with a caller-supplied default, evaluated
    /// only if the key is still undecided.
    pub fn resolve_with<F>(&mut self, key: &str, default: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        self.states
            .entry(key.to_string())
            .or_insert_with(|| ExpansionState::DefaultApplied(default()))
            .is_expanded()
    }

    /// Flip the current state of `key` and pin it as the user's choice.
    pub fn toggle(&mut self, key: &str, entry: &NormalizedEntry) -> bool {
        let expanded = !self.is_expanded(key, entry);
        self.set_expanded(key, expanded);
        expanded
    }

    pub fn set_expanded(&mut self, key: &str, expanded: bool) {
        self.states
            .insert(key.to_string(), ExpansionState::UserOverridden(expanded));
    }

    pub fn state(&self, key: &str) -> Option<ExpansionState> {
        self.states.get(key).copied()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}
