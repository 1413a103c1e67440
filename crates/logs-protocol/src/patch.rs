use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::normalized::NormalizedEntry;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum PatchOperation {
    Add,
    Replace,
    Remove,
}

/// The atomic unit delivered over a process stream and stored under `/entries/{n}`.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type", content = "content")]
pub enum PatchType {
    NormalizedEntry(NormalizedEntry),
    Stdout(String),
    Stderr(String),
}

impl PatchType {
    pub fn normalized_entry(&self) -> Option<&NormalizedEntry> {
        match self {
            PatchType::NormalizedEntry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            PatchType::Stdout(text) | PatchType::Stderr(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct PatchEntry {
    op: PatchOperation,
    path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
}

pub fn escape_json_pointer_segment(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

pub fn entry_path(entry_index: usize) -> String {
    format!("/entries/{entry_index}")
}

fn build_patch(entries: Vec<PatchEntry>) -> Result<Patch, serde_json::Error> {
    serde_json::to_value(entries).and_then(serde_json::from_value)
}

/// Builders for patches addressing the conversation document.
pub struct ConversationPatch;

impl ConversationPatch {
    pub fn add(entry_index: usize, unit: &PatchType) -> Result<Patch, serde_json::Error> {
        Self::add_value(entry_index, serde_json::to_value(unit)?)
    }

    pub fn replace(entry_index: usize, unit: &PatchType) -> Result<Patch, serde_json::Error> {
        Self::replace_value(entry_index, serde_json::to_value(unit)?)
    }

    pub fn add_value(entry_index: usize, value: Value) -> Result<Patch, serde_json::Error> {
        build_patch(vec![PatchEntry {
            op: PatchOperation::Add,
            path: entry_path(entry_index),
            value: Some(value),
        }])
    }

    pub fn replace_value(entry_index: usize, value: Value) -> Result<Patch, serde_json::Error> {
        build_patch(vec![PatchEntry {
            op: PatchOperation::Replace,
            path: entry_path(entry_index),
            value: Some(value),
        }])
    }

    pub fn remove(entry_index: usize) -> Result<Patch, serde_json::Error> {
        build_patch(vec![PatchEntry {
            op: PatchOperation::Remove,
            path: entry_path(entry_index),
            value: None,
        }])
    }

    /// Patch setting a top-level document field such as `/session_id` or `/summary`.
    pub fn replace_field(field: &str, value: Value) -> Result<Patch, serde_json::Error> {
        build_patch(vec![PatchEntry {
            op: PatchOperation::Replace,
            path: format!("/{}", escape_json_pointer_segment(field)),
            value: Some(value),
        }])
    }
}

/// Extract the entry index and `NormalizedEntry` from a JsonPatch if it contains one
pub fn extract_normalized_entry_from_patch(patch: &Patch) -> Option<(usize, NormalizedEntry)> {
    let value = serde_json::to_value(patch).ok()?;
    let ops = value.as_array()?;
    ops.iter().rev().find_map(|op| {
        let path = op.get("path")?.as_str()?;
        let entry_index = path.strip_prefix("/entries/")?.parse::<usize>().ok()?;

        let value = op.get("value")?;
        (value.get("type")?.as_str()? == "NORMALIZED_ENTRY")
            .then(|| value.get("content"))
            .flatten()
            .and_then(|c| serde_json::from_value::<NormalizedEntry>(c.clone()).ok())
            .map(|entry| (entry_index, entry))
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::normalized::NormalizedEntryType;

    fn user_message(content: &str) -> NormalizedEntry {
        NormalizedEntry {
            timestamp: None,
            entry_type: NormalizedEntryType::UserMessage,
            content: content.to_string(),
            metadata: None,
        }
    }

    #[test]
    fn escape_json_pointer_segment_escapes_tilde_and_slash() {
        assert_eq!(escape_json_pointer_segment("a/b~c"), "a~1b~0c");
    }

    #[test]
    fn patch_type_uses_screaming_tags() {
        let value = serde_json::to_value(PatchType::Stderr("boom".to_string())).expect("value");
        assert_eq!(value, json!({ "type": "STDERR", "content": "boom" }));

        let decoded =
            serde_json::from_value::<PatchType>(json!({ "type": "DIFF", "content": { "path": "a" } }));
        assert!(decoded.is_err());
    }

    #[test]
    fn builders_address_entries() {
        let patch = ConversationPatch::add(3, &PatchType::Stdout("hi".to_string())).expect("add");
        let value = serde_json::to_value(&patch).expect("value");
        assert_eq!(value[0]["op"], "add");
        assert_eq!(value[0]["path"], "/entries/3");
        assert_eq!(value[0]["value"]["type"], "STDOUT");

        let patch = ConversationPatch::remove(1).expect("remove");
        let value = serde_json::to_value(&patch).expect("value");
        assert_eq!(value, json!([{ "op": "remove", "path": "/entries/1" }]));

        let patch = ConversationPatch::replace_field("summary", json!("done")).expect("field");
        let value = serde_json::to_value(&patch).expect("value");
        assert_eq!(value[0]["path"], "/summary");
    }

    #[test]
    fn extract_normalized_entry_from_patch_reads_entry() {
        let patch = ConversationPatch::replace(
            2,
            &PatchType::NormalizedEntry(user_message("hello")),
        )
        .expect("patch");

        let (index, extracted) =
            extract_normalized_entry_from_patch(&patch).expect("normalized entry");
        assert_eq!(index, 2);
        assert_eq!(extracted.content, "hello");
    }

    #[test]
    fn extract_normalized_entry_from_patch_returns_none_for_malformed_entry() {
        let patch: Patch = serde_json::from_value(json!([{
            "op": "add",
            "path": "/entries/1",
            "value": {
                "type": "NORMALIZED_ENTRY",
                "content": "bad",
            },
        }]))
        .expect("patch");

        assert!(extract_normalized_entry_from_patch(&patch).is_none());

        let patch: Patch = serde_json::from_value(json!([{
            "op": "add",
            "path": "/entries/not-a-number",
            "value": serde_json::to_value(PatchType::NormalizedEntry(user_message("x"))).expect("value"),
        }]))
        .expect("patch");
        assert!(extract_normalized_entry_from_patch(&patch).is_none());
    }
}
