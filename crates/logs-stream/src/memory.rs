use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use futures::StreamExt;
use logs_protocol::RawFrame;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::{
    endpoint::StreamEndpoint,
    error::TransportError,
    transport::{FrameStream, LogTransport},
};

type FrameSender = mpsc::UnboundedSender<Result<RawFrame, TransportError>>;

#[derive(Default)]
struct MemoryState {
    live: HashMap<Uuid, FrameSender>,
    connects: HashMap<Uuid, usize>,
    refusals: HashMap<Uuid, String>,
}

/// In-process transport: every `connect` opens a fresh channel that the owner
/// pushes frames into by process id. Used to embed the pipeline next to a
/// local producer and to drive it deterministically in tests.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Deliver a frame on the live connection for `process_id`.
    /// Returns false when no connection is open.
    pub fn send(&self, process_id: Uuid, frame: RawFrame) -> bool {
        self.state()
            .live
            .get(&process_id)
            .is_some_and(|tx| tx.send(Ok(frame)).is_ok())
    }

    /// Break the live connection with a transport error.
    pub fn fail(&self, process_id: Uuid, message: &str) -> bool {
        let Some(tx) = self.state().live.remove(&process_id) else {
            return false;
        };
        tx.send(Err(TransportError::Stream(message.to_string())))
            .is_ok()
    }

    /// End the live connection cleanly, as a server closing the response would.
    pub fn close(&self, process_id: Uuid) -> bool {
        self.state().live.remove(&process_id).is_some()
    }

    /// Make the next connect attempt for `process_id` fail.
    pub fn refuse_next(&self, process_id: Uuid, message: &str) {
        self.state()
            .refusals
            .insert(process_id, message.to_string());
    }

    pub fn is_open(&self, process_id: Uuid) -> bool {
        self.state()
            .live
            .get(&process_id)
            .is_some_and(|tx| !tx.is_closed())
    }

    pub fn connect_count(&self, process_id: Uuid) -> usize {
        self.state()
            .connects
            .get(&process_id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl LogTransport for MemoryTransport {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<FrameStream, TransportError> {
        let mut state = self.state();
        *state.connects.entry(endpoint.process_id).or_default() += 1;

        if let Some(message) = state.refusals.remove(&endpoint.process_id) {
            return Err(TransportError::Refused(message));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // Replacing the sender ends any previous connection for the process.
        state.live.insert(endpoint.process_id, tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use logs_protocol::StreamKind;
    use url::Url;

    use super::*;

    fn endpoint(process_id: Uuid) -> StreamEndpoint {
        StreamEndpoint {
            process_id,
            kind: StreamKind::Raw,
            url: Url::parse("memory://local").unwrap(),
        }
    }

    #[tokio::test]
    async fn frames_flow_until_close() {
        let transport = MemoryTransport::new();
        let id = Uuid::new_v4();
        let mut frames = transport.connect(&endpoint(id)).await.unwrap();

        assert!(transport.send(id, RawFrame::sse("stdout", "hi")));
        assert!(transport.close(id));

        assert_eq!(
            frames.next().await.map(|frame| frame.unwrap()),
            Some(RawFrame::sse("stdout", "hi"))
        );
        assert!(frames.next().await.is_none());
        assert!(!transport.send(id, RawFrame::sse("stdout", "late")));
    }

    #[tokio::test]
    async fn refusal_applies_once_and_counts_attempts() {
        let transport = MemoryTransport::new();
        let id = Uuid::new_v4();
        transport.refuse_next(id, "backend down");

        assert!(matches!(
            transport.connect(&endpoint(id)).await,
            Err(TransportError::Refused(_))
        ));
        assert!(transport.connect(&endpoint(id)).await.is_ok());
        assert_eq!(transport.connect_count(id), 2);
    }
}
