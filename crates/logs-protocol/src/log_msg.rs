#[cfg(feature = "axum")]
use axum::response::sse::Event;
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::patch::ConversationPatch;

pub const EV_STDOUT: &str = "stdout";
pub const EV_STDERR: &str = "stderr";
pub const EV_JSON_PATCH: &str = "json_patch";
pub const EV_SESSION_ID: &str = "session_id";
pub const EV_FINISHED: &str = "finished";
/// Default SSE event name, used by raw endpoints that emit bare `data:` lines.
pub const EV_MESSAGE: &str = "message";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LogMsg {
    Stdout(String),
    Stderr(String),
    JsonPatch(Patch),
    SessionId(String),
    Finished,
}

/// One framed message as delivered by a transport, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawFrame {
    /// A server-sent event: event name plus its (joined) data lines.
    Sse { event: String, data: String },
    /// A websocket text frame carrying JSON.
    Text(String),
}

impl RawFrame {
    pub fn sse(event: impl Into<String>, data: impl Into<String>) -> Self {
        RawFrame::Sse {
            event: event.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid json_patch payload: {0}")]
    Patch(#[source] serde_json::Error),
    #[error("invalid frame payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid entry index {0}")]
    InvalidIndex(i64),
}

/// Frame shape emitted by the paginated v2 log endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogStreamEvent {
    Append { entry_index: i64, entry: Value },
    Replace { entry_index: i64, entry: Value },
    Finished,
}

impl LogStreamEvent {
    pub fn into_log_msg(self) -> Result<LogMsg, FrameError> {
        match self {
            LogStreamEvent::Append { entry_index, entry } => {
                let index = entry_index_to_usize(entry_index)?;
                Ok(LogMsg::JsonPatch(ConversationPatch::add_value(index, entry)?))
            }
            LogStreamEvent::Replace { entry_index, entry } => {
                let index = entry_index_to_usize(entry_index)?;
                Ok(LogMsg::JsonPatch(ConversationPatch::replace_value(
                    index, entry,
                )?))
            }
            LogStreamEvent::Finished => Ok(LogMsg::Finished),
        }
    }
}

fn entry_index_to_usize(entry_index: i64) -> Result<usize, FrameError> {
    usize::try_from(entry_index).map_err(|_| FrameError::InvalidIndex(entry_index))
}

const LOG_MSG_VARIANTS: [&str; 5] = ["Stdout", "Stderr", "JsonPatch", "SessionId", "Finished"];

impl LogMsg {
    pub fn name(&self) -> &'static str {
        match self {
            LogMsg::Stdout(_) => EV_STDOUT,
            LogMsg::Stderr(_) => EV_STDERR,
            LogMsg::JsonPatch(_) => EV_JSON_PATCH,
            LogMsg::SessionId(_) => EV_SESSION_ID,
            LogMsg::Finished => EV_FINISHED,
        }
    }

    /// Decode a transport frame. `Ok(None)` means the frame is of a kind this
    /// pipeline does not consume (approval events and the like) and should be skipped.
    pub fn decode(frame: &RawFrame) -> Result<Option<LogMsg>, FrameError> {
        match frame {
            RawFrame::Sse { event, data } => Self::decode_sse(event, data),
            RawFrame::Text(text) => Self::decode_text(text),
        }
    }

    fn decode_sse(event: &str, data: &str) -> Result<Option<LogMsg>, FrameError> {
        let msg = match event {
            EV_STDOUT | EV_MESSAGE | "" => LogMsg::Stdout(data.to_string()),
            EV_STDERR => LogMsg::Stderr(data.to_string()),
            EV_JSON_PATCH => {
                LogMsg::JsonPatch(serde_json::from_str(data).map_err(FrameError::Patch)?)
            }
            EV_SESSION_ID => LogMsg::SessionId(data.to_string()),
            EV_FINISHED => LogMsg::Finished,
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }

    fn decode_text(text: &str) -> Result<Option<LogMsg>, FrameError> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("finished").and_then(Value::as_bool) == Some(true) {
            return Ok(Some(LogMsg::Finished));
        }

        if value.get("type").is_some() {
            let event: LogStreamEvent = serde_json::from_value(value)?;
            return event.into_log_msg().map(Some);
        }

        if let Some(object) = value.as_object()
            && object.len() == 1
            && object
                .keys()
                .all(|key| !LOG_MSG_VARIANTS.contains(&key.as_str()))
        {
            return Ok(None);
        }

        Ok(Some(serde_json::from_value(value)?))
    }

    #[cfg(feature = "axum")]
    pub fn to_sse_event(&self) -> Event {
        match self {
            LogMsg::Stdout(s) => Event::default().event(EV_STDOUT).data(s.clone()),
            LogMsg::Stderr(s) => Event::default().event(EV_STDERR).data(s.clone()),
            LogMsg::JsonPatch(patch) => {
                let data = serde_json::to_string(patch).unwrap_or_else(|_| "[]".to_string());
                Event::default().event(EV_JSON_PATCH).data(data)
            }
            LogMsg::SessionId(s) => Event::default().event(EV_SESSION_ID).data(s.clone()),
            LogMsg::Finished => Event::default().event(EV_FINISHED).data(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn sse_frames_decode_by_event_name() {
        assert_eq!(
            LogMsg::decode(&RawFrame::sse("stdout", "build start")).expect("decode"),
            Some(LogMsg::Stdout("build start".to_string()))
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::sse("message", "bare line")).expect("decode"),
            Some(LogMsg::Stdout("bare line".to_string()))
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::sse("stderr", "warning")).expect("decode"),
            Some(LogMsg::Stderr("warning".to_string()))
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::sse("finished", "")).expect("decode"),
            Some(LogMsg::Finished)
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::sse("approval_request", "{}")).expect("decode"),
            None
        );
    }

    #[test]
    fn sse_json_patch_frame_decodes_batch() {
        let data = json!([
            { "op": "add", "path": "/entries/0", "value": { "type": "STDOUT", "content": "x" } },
            { "op": "replace", "path": "/summary", "value": "s" }
        ])
        .to_string();

        let msg = LogMsg::decode(&RawFrame::sse("json_patch", data))
            .expect("decode")
            .expect("message");
        match msg {
            LogMsg::JsonPatch(patch) => assert_eq!(patch.0.len(), 2),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn malformed_patch_frame_is_an_error() {
        let err = LogMsg::decode(&RawFrame::sse("json_patch", "{not json")).unwrap_err();
        assert!(matches!(err, FrameError::Patch(_)));
    }

    #[test]
    fn websocket_frames_decode_all_shapes() {
        assert_eq!(
            LogMsg::decode(&RawFrame::Text(r#"{"finished":true}"#.to_string())).expect("decode"),
            Some(LogMsg::Finished)
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::Text(r#"{"Stderr":"oops"}"#.to_string())).expect("decode"),
            Some(LogMsg::Stderr("oops".to_string()))
        );
        assert_eq!(
            LogMsg::decode(&RawFrame::Text(r#"{"ApprovalRequest":{}}"#.to_string()))
                .expect("decode"),
            None
        );

        let append = json!({
            "type": "append",
            "entry_index": 4,
            "entry": { "type": "STDOUT", "content": "hello" }
        })
        .to_string();
        let msg = LogMsg::decode(&RawFrame::Text(append))
            .expect("decode")
            .expect("message");
        let LogMsg::JsonPatch(patch) = msg else {
            panic!("expected patch");
        };
        let value = serde_json::to_value(&patch).expect("value");
        assert_eq!(value[0]["op"], "add");
        assert_eq!(value[0]["path"], "/entries/4");

        assert_eq!(
            LogMsg::decode(&RawFrame::Text(r#"{"type":"finished"}"#.to_string()))
                .expect("decode"),
            Some(LogMsg::Finished)
        );
    }

    #[test]
    fn negative_entry_index_is_rejected() {
        let frame = RawFrame::Text(
            json!({ "type": "replace", "entry_index": -1, "entry": {} }).to_string(),
        );
        assert!(matches!(
            LogMsg::decode(&frame),
            Err(FrameError::InvalidIndex(-1))
        ));
    }

    proptest! {
        #[test]
        fn decoding_arbitrary_text_never_panics(text in ".*") {
            let _ = LogMsg::decode(&RawFrame::Text(text.clone()));
            let _ = LogMsg::decode(&RawFrame::sse("json_patch", text));
        }
    }
}
