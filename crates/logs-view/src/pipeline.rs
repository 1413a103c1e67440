use std::sync::Arc;

use logs_protocol::{ExecutionProcess, StreamKind};
use logs_store::{ConversationEntry, LogPipelineConfig, UnifiedLogCompositor, UnifiedLogEntry};
use logs_stream::{
    EndpointResolver, LogTransport, ProcessStreamState, StreamConnectionManager, StreamUpdate,
};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

use crate::aggregate::{AggregatableEntry, DisplayEntry, aggregate_entries};

/// What the presentation layer renders for one view.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct LogView<E> {
    pub entries: Vec<DisplayEntry<E>>,
    pub is_connected: bool,
    pub error: Option<String>,
}

/// Owns the connections for a set of processes and derives views from them.
pub struct LogPipeline {
    manager: StreamConnectionManager,
    compositor: UnifiedLogCompositor,
    aggregate: bool,
}

impl LogPipeline {
    pub fn new(
        transport: Arc<dyn LogTransport>,
        resolver: Arc<dyn EndpointResolver>,
        config: LogPipelineConfig,
    ) -> Self {
        let compositor = UnifiedLogCompositor::from_config(&config);
        Self {
            manager: StreamConnectionManager::new(transport, resolver, config),
            compositor,
            aggregate: true,
        }
    }

    pub fn with_aggregation(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn manager(&self) -> &StreamConnectionManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut StreamConnectionManager {
        &mut self.manager
    }

    pub fn sync(&mut self, processes: &[ExecutionProcess], enabled: bool) {
        self.manager.sync(processes, enabled);
    }

    pub async fn next_update(&mut self) -> Option<StreamUpdate> {
        self.manager.next_update().await
    }

    pub fn unified_entries(&self) -> Vec<UnifiedLogEntry> {
        self.compositor.compose(self.manager.sources())
    }

    /// Every process merged into one time-ordered view.
    pub fn unified_view(&self) -> LogView<UnifiedLogEntry> {
        LogView {
            entries: self.display(self.unified_entries()),
            is_connected: self.manager.is_connected(),
            error: self.manager.first_error().map(str::to_string),
        }
    }

    /// Single-process detail view in document order.
    pub fn conversation_view(&self, process_id: Uuid) -> Option<LogView<ConversationEntry>> {
        let state = self.manager.state(process_id)?;
        Some(LogView {
            entries: self.display(conversation_entries(state)),
            is_connected: state.is_connected(),
            error: state.error().map(str::to_string),
        })
    }

    fn display<E: AggregatableEntry>(&self, entries: Vec<E>) -> Vec<DisplayEntry<E>> {
        if self.aggregate {
            aggregate_entries(entries)
        } else {
            entries.into_iter().map(DisplayEntry::Entry).collect()
        }
    }
}

fn conversation_entries(state: &ProcessStreamState) -> Vec<ConversationEntry> {
    match state.kind() {
        StreamKind::Normalized => state.conversation().entries.clone(),
        StreamKind::Raw => state
            .raw_lines()
            .map(|line| ConversationEntry {
                index: line.position,
                unit: line.unit.clone(),
            })
            .collect(),
    }
}
