//! Collapses runs of incidental tool activity (reads, searches, fetches)
//! into groups so long agent turns stay readable.

use logs_protocol::{ActionType, NormalizedEntry, NormalizedEntryType};
use logs_store::{ConversationEntry, UnifiedLogEntry};
use serde::Serialize;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum AggregationType {
    FileRead,
    Search,
    WebFetch,
}

impl AggregationType {
    pub fn classify(entry: &NormalizedEntry) -> Option<Self> {
        let NormalizedEntryType::ToolUse { action_type, .. } = &entry.entry_type else {
            return None;
        };
        match action_type {
            ActionType::FileRead { .. } => Some(AggregationType::FileRead),
            ActionType::Search { .. } => Some(AggregationType::Search),
            ActionType::WebFetch { .. } => Some(AggregationType::WebFetch),
            _ => None,
        }
    }
}

/// Anything that can be shown as one row of a log view.
pub trait AggregatableEntry {
    /// Stable key of the entry within its view.
    fn entry_key(&self) -> String;

    fn normalized_entry(&self) -> Option<&NormalizedEntry>;

    /// Owning process, when the view mixes several.
    fn process_id(&self) -> Option<Uuid> {
        None
    }

    fn aggregation_type(&self) -> Option<AggregationType> {
        self.normalized_entry().and_then(AggregationType::classify)
    }
}

impl AggregatableEntry for UnifiedLogEntry {
    fn entry_key(&self) -> String {
        self.id.clone()
    }

    fn normalized_entry(&self) -> Option<&NormalizedEntry> {
        UnifiedLogEntry::normalized_entry(self)
    }

    fn process_id(&self) -> Option<Uuid> {
        Some(self.process_id)
    }
}

impl AggregatableEntry for ConversationEntry {
    fn entry_key(&self) -> String {
        format!("entry-{}", self.index)
    }

    fn normalized_entry(&self) -> Option<&NormalizedEntry> {
        self.unit.normalized_entry()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
pub struct AggregatedEntryGroup<E> {
    pub aggregation_type: AggregationType,
    pub entries: Vec<E>,
    pub group_key: String,
    pub process_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayEntry<E> {
    Entry(E),
    Group(AggregatedEntryGroup<E>),
}

impl<E: AggregatableEntry> DisplayEntry<E> {
    pub fn key(&self) -> String {
        match self {
            DisplayEntry::Entry(entry) => entry.entry_key(),
            DisplayEntry::Group(group) => group.group_key.clone(),
        }
    }
}

impl<E> DisplayEntry<E> {
    /// Number of underlying entries this row stands for.
    pub fn len(&self) -> usize {
        match self {
            DisplayEntry::Entry(_) => 1,
            DisplayEntry::Group(group) => group.entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group consecutive entries of the same aggregation type. Runs of one entry
/// are emitted unwrapped, and a run never spans two processes.
pub fn aggregate_entries<E, I>(entries: I) -> Vec<DisplayEntry<E>>
where
    E: AggregatableEntry,
    I: IntoIterator<Item = E>,
{
    let mut display = Vec::new();
    let mut run: Vec<E> = Vec::new();
    let mut run_type: Option<AggregationType> = None;

    for entry in entries {
        let entry_type = entry.aggregation_type();
        let extends_run = entry_type.is_some()
            && entry_type == run_type
            && run
                .last()
                .is_some_and(|last| last.process_id() == entry.process_id());

        if !extends_run {
            flush_run(&mut display, &mut run, run_type);
        }

        run_type = entry_type;
        if entry_type.is_some() {
            run.push(entry);
        } else {
            display.push(DisplayEntry::Entry(entry));
        }
    }

    flush_run(&mut display, &mut run, run_type);
    display
}

fn flush_run<E: AggregatableEntry>(
    display: &mut Vec<DisplayEntry<E>>,
    run: &mut Vec<E>,
    run_type: Option<AggregationType>,
) {
    if run.len() < 2 {
        display.extend(run.drain(..).map(DisplayEntry::Entry));
        return;
    }
    let Some(aggregation_type) = run_type else {
        display.extend(run.drain(..).map(DisplayEntry::Entry));
        return;
    };

    let entries = std::mem::take(run);
    let (group_key, process_id) = entries
        .first()
        .map(|first| (format!("agg-{}", first.entry_key()), first.process_id()))
        .unwrap_or_default();

    display.push(DisplayEntry::Group(AggregatedEntryGroup {
        aggregation_type,
        entries,
        group_key,
        process_id,
    }));
}

pub fn flatten_display_entries<E>(display: Vec<DisplayEntry<E>>) -> Vec<E> {
    display
        .into_iter()
        .flat_map(|item| match item {
            DisplayEntry::Entry(entry) => vec![entry],
            DisplayEntry::Group(group) => group.entries,
        })
        .collect()
}
