use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use logs_protocol::RawFrame;
use reqwest::header::{ACCEPT, HeaderValue};
use tracing::debug;

use crate::{
    endpoint::StreamEndpoint,
    error::TransportError,
    transport::{FrameStream, LogTransport},
};

/// Server-sent events over HTTP.
#[derive(Debug, Clone, Default)]
pub struct SseTransport {
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LogTransport for SseTransport {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<FrameStream, TransportError> {
        debug!(process_id = %endpoint.process_id, url = %endpoint.url, "Opening log stream");

        let response = self
            .client
            .get(endpoint.url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status));
        }

        let frames = response
            .bytes_stream()
            .eventsource()
            .map(|event| match event {
                Ok(event) => Ok(RawFrame::Sse {
                    event: event.event,
                    data: event.data,
                }),
                Err(err) => Err(TransportError::Stream(err.to_string())),
            });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::{
        Router,
        extract::Path,
        response::sse::{Event, Sse},
        routing::get,
    };
    use futures::stream;
    use logs_protocol::{ConversationPatch, ExecutionProcessRunReason, LogMsg, PatchType};
    use test_support::fixtures;
    use uuid::Uuid;

    use super::*;
    use crate::endpoint::{BackendEndpoints, EndpointResolver};

    async fn raw_logs(Path(_id): Path<Uuid>) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
        let messages = vec![
            LogMsg::Stdout("installing".to_string()),
            LogMsg::Stderr("npm WARN deprecated".to_string()),
            LogMsg::Finished,
        ];
        Sse::new(stream::iter(
            messages.into_iter().map(|msg| Ok(msg.to_sse_event())),
        ))
    }

    async fn normalized_logs(
        Path(_id): Path<Uuid>,
    ) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
        let unit = PatchType::NormalizedEntry(fixtures::assistant_message("hello"));
        let patch = ConversationPatch::add(0, &unit).unwrap();
        Sse::new(stream::iter(vec![Ok(LogMsg::JsonPatch(patch).to_sse_event())]))
    }

    async fn serve() -> BackendEndpoints {
        let app = Router::new()
            .route("/api/execution-processes/{id}/raw-logs", get(raw_logs))
            .route(
                "/api/execution-processes/{id}/normalized-logs",
                get(normalized_logs),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        BackendEndpoints::new(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn raw_stream_yields_named_events_then_ends() {
        let endpoints = serve().await;
        let script = fixtures::process(ExecutionProcessRunReason::SetupScript);
        let endpoint = endpoints.resolve(&script).unwrap();

        let frames: Vec<_> = SseTransport::new()
            .connect(&endpoint)
            .await
            .unwrap()
            .collect()
            .await;

        let frames: Vec<_> = frames.into_iter().map(Result::unwrap).collect();
        assert_eq!(
            frames[..2],
            [
                RawFrame::sse("stdout", "installing"),
                RawFrame::sse("stderr", "npm WARN deprecated"),
            ]
        );
        // An empty-data event may be swallowed by the parser; the stream still ends.
        assert!(frames[2..].iter().all(|frame| matches!(
            LogMsg::decode(frame),
            Ok(Some(LogMsg::Finished))
        )));
    }

    #[tokio::test]
    async fn json_patch_frames_decode_back_into_patches() {
        let endpoints = serve().await;
        let agent = fixtures::process(ExecutionProcessRunReason::CodingAgent);
        let endpoint = endpoints.resolve(&agent).unwrap();

        let mut frames = SseTransport::new().connect(&endpoint).await.unwrap();
        let frame = frames.next().await.unwrap().unwrap();

        let Some(LogMsg::JsonPatch(patch)) = LogMsg::decode(&frame).unwrap() else {
            panic!("expected a json_patch frame, got {frame:?}");
        };
        let (index, entry) = logs_protocol::extract_normalized_entry_from_patch(&patch).unwrap();
        assert_eq!(index, 0);
        assert_eq!(entry.content, "hello");
    }

    #[tokio::test]
    async fn missing_route_is_a_status_error() {
        let endpoints = serve().await;
        let mut endpoint = endpoints
            .resolve(&fixtures::process(ExecutionProcessRunReason::SetupScript))
            .unwrap();
        endpoint.url = endpoints.base().join("api/nowhere").unwrap();

        let err = SseTransport::new().connect(&endpoint).await.err().unwrap();
        assert!(matches!(err, TransportError::Status(status) if status.as_u16() == 404));
    }
}
