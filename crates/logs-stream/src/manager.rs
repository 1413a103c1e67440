use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::StreamExt;
use json_patch::{Patch, PatchOperation};
use logs_protocol::{ExecutionProcess, LogMsg, PatchType, RawFrame, StreamKind};
use logs_store::{
    ConversationReconciler, ConversationSnapshot, LogPipelineConfig, ProcessSource, RawLine,
    RawLogBuffer, SourceEntry, UPDATE_FAILED_MESSAGE, now_millis,
};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    endpoint::{EndpointResolver, StreamEndpoint},
    transport::LogTransport,
};

#[derive(Debug)]
enum ConnectionEventKind {
    Opened,
    Frame(RawFrame),
    Ended,
    Failed(String),
}

#[derive(Debug)]
struct ConnectionEvent {
    process_id: Uuid,
    generation: u64,
    kind: ConnectionEventKind,
}

struct ConnectionHandle {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What changed for a process after an event was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamChange {
    Connected,
    Entries,
    Session,
    /// A frame or patch could not be applied; the stream continues.
    UpdateFailed,
    Finished,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamUpdate {
    pub process_id: Uuid,
    pub change: StreamChange,
}

/// Decoded, cumulative state of one process's log stream.
pub struct ProcessStreamState {
    process: ExecutionProcess,
    conversation: ConversationReconciler,
    raw: RawLogBuffer,
    session_id: Option<String>,
    is_connected: bool,
    error: Option<String>,
    finished: bool,
    updated_at_ms: i64,
}

impl ProcessStreamState {
    fn new(process: ExecutionProcess, config: &LogPipelineConfig) -> Self {
        Self {
            conversation: ConversationReconciler::for_process(process.id),
            raw: RawLogBuffer::new(config),
            process,
            session_id: None,
            is_connected: false,
            error: None,
            finished: false,
            updated_at_ms: now_millis(),
        }
    }

    pub fn process(&self) -> &ExecutionProcess {
        &self.process
    }

    pub fn kind(&self) -> StreamKind {
        self.process.stream_kind()
    }

    pub fn conversation(&self) -> Arc<ConversationSnapshot> {
        self.conversation.snapshot()
    }

    pub fn raw_lines(&self) -> impl ExactSizeIterator<Item = &RawLine> {
        self.raw.lines()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .clone()
            .or_else(|| self.conversation.snapshot().session_id.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Compositor input for this process.
    pub fn source(&self) -> ProcessSource {
        match self.kind() {
            StreamKind::Raw => ProcessSource {
                process: self.process.clone(),
                entries: self
                    .raw
                    .lines()
                    .map(|line| SourceEntry {
                        position: line.position,
                        unit: line.unit.clone(),
                        timestamp_ms: Some(line.received_at_ms),
                    })
                    .collect(),
                batch_time_ms: self.updated_at_ms,
            },
            StreamKind::Normalized => {
                let snapshot = self.conversation.snapshot();
                ProcessSource {
                    process: self.process.clone(),
                    entries: snapshot
                        .entries
                        .iter()
                        .map(|entry| SourceEntry {
                            position: entry.index,
                            unit: entry.unit.clone(),
                            timestamp_ms: entry
                                .unit
                                .normalized_entry()
                                .and_then(|normalized| normalized.timestamp_millis()),
                        })
                        .collect(),
                    batch_time_ms: snapshot.updated_at_ms.unwrap_or(self.updated_at_ms),
                }
            }
        }
    }

    fn apply_msg(&mut self, msg: LogMsg, now_ms: i64) -> Option<StreamChange> {
        match (msg, self.kind()) {
            (LogMsg::Stdout(line), StreamKind::Raw) => {
                self.raw.push_stdout(line, now_ms);
                self.updated_at_ms = now_ms;
                Some(StreamChange::Entries)
            }
            (LogMsg::Stderr(line), StreamKind::Raw) => {
                self.raw.push_stderr(line, now_ms);
                self.updated_at_ms = now_ms;
                Some(StreamChange::Entries)
            }
            (LogMsg::Stdout(_) | LogMsg::Stderr(_), StreamKind::Normalized) => {
                debug!(
                    process_id = %self.process.id,
                    "Ignoring bare output line on a normalized stream"
                );
                None
            }
            (LogMsg::JsonPatch(patch), StreamKind::Normalized) => {
                let outcome = self.conversation.apply_batch(&patch, now_ms);
                self.updated_at_ms = now_ms;
                if outcome.is_clean() {
                    Some(StreamChange::Entries)
                } else {
                    self.error = Some(UPDATE_FAILED_MESSAGE.to_string());
                    Some(StreamChange::UpdateFailed)
                }
            }
            (LogMsg::JsonPatch(patch), StreamKind::Raw) => {
                let pushed = self.push_patched_lines(&patch, now_ms);
                (pushed > 0).then_some(StreamChange::Entries)
            }
            (LogMsg::SessionId(session_id), _) => {
                self.session_id = Some(session_id);
                Some(StreamChange::Session)
            }
            (LogMsg::Finished, _) => {
                self.mark_finished();
                Some(StreamChange::Finished)
            }
        }
    }

    /// Raw endpoints that publish patches append one output line per `add`.
    fn push_patched_lines(&mut self, patch: &Patch, now_ms: i64) -> usize {
        let mut pushed = 0;
        for op in patch.iter() {
            let PatchOperation::Add(add) = op else {
                continue;
            };
            match serde_json::from_value::<PatchType>(add.value.clone()) {
                Ok(unit @ (PatchType::Stdout(_) | PatchType::Stderr(_))) => {
                    self.raw.push(unit, now_ms);
                    pushed += 1;
                }
                Ok(PatchType::NormalizedEntry(_)) | Err(_) => {
                    debug!(
                        process_id = %self.process.id,
                        "Skipping non-output patch value on a raw stream"
                    );
                }
            }
        }
        if pushed > 0 {
            self.updated_at_ms = now_ms;
        }
        pushed
    }

    fn mark_finished(&mut self) {
        self.is_connected = false;
        self.finished = true;
    }
}

/// Owns one log connection per active execution process.
///
/// Connection tasks only forward tagged events; all decoding and state
/// mutation happens on the task that drives `next_update`/`drain_pending`.
/// Must be used inside a tokio runtime.
pub struct StreamConnectionManager {
    transport: Arc<dyn LogTransport>,
    resolver: Arc<dyn EndpointResolver>,
    config: LogPipelineConfig,
    connections: HashMap<Uuid, ConnectionHandle>,
    states: HashMap<Uuid, ProcessStreamState>,
    order: Vec<Uuid>,
    next_generation: u64,
    events_tx: mpsc::UnboundedSender<ConnectionEvent>,
    events_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl StreamConnectionManager {
    pub fn new(
        transport: Arc<dyn LogTransport>,
        resolver: Arc<dyn EndpointResolver>,
        config: LogPipelineConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            resolver,
            config,
            connections: HashMap::new(),
            states: HashMap::new(),
            order: Vec::new(),
            next_generation: 0,
            events_tx,
            events_rx,
        }
    }

    pub fn config(&self) -> &LogPipelineConfig {
        &self.config
    }

    /// Reconcile open connections with `processes`.
    ///
    /// Processes that left the set are closed and forgotten. Processes seen
    /// before keep their state and are never reopened here, even if their
    /// stream finished or failed; use [`Self::resubscribe`] for that.
    pub fn sync(&mut self, processes: &[ExecutionProcess], enabled: bool) {
        if !enabled {
            self.teardown();
            return;
        }

        let wanted: HashSet<Uuid> = processes.iter().map(|process| process.id).collect();
        let removed: Vec<Uuid> = self
            .states
            .keys()
            .filter(|id| !wanted.contains(id))
            .copied()
            .collect();
        for process_id in removed {
            info!(process_id = %process_id, "Closing log stream for removed process");
            self.connections.remove(&process_id);
            self.states.remove(&process_id);
        }

        self.order.clear();
        for process in processes {
            if self.order.contains(&process.id) {
                continue;
            }
            self.order.push(process.id);
            match self.states.get_mut(&process.id) {
                Some(state) => state.process = process.clone(),
                None => self.open(process.clone()),
            }
        }
    }

    /// Discard a process's state and open a fresh connection for it.
    pub fn resubscribe(&mut self, process_id: Uuid) -> bool {
        let Some(state) = self.states.remove(&process_id) else {
            return false;
        };
        self.connections.remove(&process_id);
        info!(process_id = %process_id, "Resubscribing to log stream");
        self.open(state.process);
        true
    }

    /// Close every connection and discard all state.
    pub fn teardown(&mut self) {
        if !self.connections.is_empty() {
            debug!(
                connections = self.connections.len(),
                "Tearing down log streams"
            );
        }
        self.connections.clear();
        self.states.clear();
        self.order.clear();
    }

    /// Wait for the next event that changes some process's state.
    /// Returns `None` once no connection is left open and nothing is queued.
    pub async fn next_update(&mut self) -> Option<StreamUpdate> {
        loop {
            let event = if self.connections.is_empty() {
                self.events_rx.try_recv().ok()?
            } else {
                self.events_rx.recv().await?
            };
            if let Some(update) = self.handle_event(event) {
                return Some(update);
            }
        }
    }

    /// Apply every event already queued, without waiting.
    pub fn drain_pending(&mut self) -> Vec<StreamUpdate> {
        let mut updates = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(update) = self.handle_event(event) {
                updates.push(update);
            }
        }
        updates
    }

    pub fn state(&self, process_id: Uuid) -> Option<&ProcessStreamState> {
        self.states.get(&process_id)
    }

    /// Process states in the order of the last `sync`.
    pub fn states(&self) -> impl Iterator<Item = &ProcessStreamState> {
        self.order.iter().filter_map(|id| self.states.get(id))
    }

    pub fn sources(&self) -> Vec<ProcessSource> {
        self.states().map(ProcessStreamState::source).collect()
    }

    pub fn is_connected(&self) -> bool {
        self.states().any(ProcessStreamState::is_connected)
    }

    pub fn first_error(&self) -> Option<&str> {
        self.states().find_map(ProcessStreamState::error)
    }

    pub fn has_open_connections(&self) -> bool {
        !self.connections.is_empty()
    }

    fn open(&mut self, process: ExecutionProcess) {
        let process_id = process.id;
        let mut state = ProcessStreamState::new(process, &self.config);

        match self.resolver.resolve(&state.process) {
            Ok(endpoint) => {
                self.next_generation += 1;
                let generation = self.next_generation;
                debug!(
                    process_id = %process_id,
                    generation,
                    url = %endpoint.url,
                    "Opening log stream"
                );
                let task = tokio::spawn(run_connection(
                    Arc::clone(&self.transport),
                    endpoint,
                    generation,
                    self.events_tx.clone(),
                ));
                self.connections
                    .insert(process_id, ConnectionHandle { generation, task });
            }
            Err(err) => {
                warn!(process_id = %process_id, "Cannot resolve log endpoint: {err}");
                state.error = Some(format!("Connection failed: {err}"));
            }
        }

        self.states.insert(process_id, state);
    }

    fn handle_event(&mut self, event: ConnectionEvent) -> Option<StreamUpdate> {
        let process_id = event.process_id;
        let live = self
            .connections
            .get(&process_id)
            .is_some_and(|handle| handle.generation == event.generation);
        if !live {
            debug!(
                process_id = %process_id,
                generation = event.generation,
                "Ignoring event from a closed connection"
            );
            return None;
        }

        let state = self.states.get_mut(&process_id)?;
        let now_ms = now_millis();
        let mut close = false;

        let change = match event.kind {
            ConnectionEventKind::Opened => {
                state.error = None;
                state.is_connected = true;
                StreamChange::Connected
            }
            ConnectionEventKind::Frame(frame) => match LogMsg::decode(&frame) {
                Ok(Some(msg)) => {
                    close = matches!(msg, LogMsg::Finished);
                    state.apply_msg(msg, now_ms)?
                }
                Ok(None) => {
                    debug!(process_id = %process_id, ?frame, "Skipping unhandled frame");
                    return None;
                }
                Err(err) => {
                    warn!(process_id = %process_id, "Failed to decode log frame: {err}");
                    state.error = Some(UPDATE_FAILED_MESSAGE.to_string());
                    StreamChange::UpdateFailed
                }
            },
            ConnectionEventKind::Ended => {
                debug!(process_id = %process_id, "Log stream ended");
                state.mark_finished();
                close = true;
                StreamChange::Finished
            }
            ConnectionEventKind::Failed(message) => {
                warn!(process_id = %process_id, "Log stream failed: {message}");
                state.is_connected = false;
                state.error = Some(message);
                close = true;
                StreamChange::Disconnected
            }
        };

        if close {
            self.connections.remove(&process_id);
        }

        Some(StreamUpdate { process_id, change })
    }
}

impl Drop for StreamConnectionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_connection(
    transport: Arc<dyn LogTransport>,
    endpoint: StreamEndpoint,
    generation: u64,
    events: mpsc::UnboundedSender<ConnectionEvent>,
) {
    let process_id = endpoint.process_id;
    let send = |kind| {
        events
            .send(ConnectionEvent {
                process_id,
                generation,
                kind,
            })
            .is_ok()
    };

    let mut frames = match transport.connect(&endpoint).await {
        Ok(frames) => frames,
        Err(err) => {
            send(ConnectionEventKind::Failed(format!("Connection failed: {err}")));
            return;
        }
    };

    if !send(ConnectionEventKind::Opened) {
        return;
    }

    while let Some(frame) = frames.next().await {
        let delivered = match frame {
            Ok(frame) => send(ConnectionEventKind::Frame(frame)),
            Err(err) => {
                send(ConnectionEventKind::Failed(format!("Connection failed: {err}")));
                return;
            }
        };
        if !delivered {
            return;
        }
    }

    send(ConnectionEventKind::Ended);
}
