use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Local};
use logs_protocol::{
    ActionType, ExecutionProcess, ExecutionProcessRunReason, ExecutionProcessStatus,
    NormalizedEntry, NormalizedEntryType,
};
use logs_store::{UnifiedLogEntry, UnifiedPayload};
use logs_view::{AggregatedEntryGroup, AggregationType, DisplayEntry};
use uuid::Uuid;

/// Parse `<uuid>:<run_reason>`, e.g. `3f2a...:codingagent`.
pub fn parse_process_arg(value: &str) -> Result<ExecutionProcess, String> {
    let (id, run_reason) = value
        .split_once(':')
        .ok_or_else(|| format!("expected <uuid>:<run_reason>, got '{value}'"))?;
    let id = Uuid::parse_str(id.trim()).map_err(|err| format!("invalid process id: {err}"))?;
    let run_reason: ExecutionProcessRunReason = run_reason.trim().parse()?;
    Ok(ExecutionProcess::new(
        id,
        run_reason,
        ExecutionProcessStatus::Running,
    ))
}

fn format_time(ts: i64) -> String {
    DateTime::from_timestamp_millis(ts)
        .map(|ts| ts.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "--:--:--.---".to_string())
}

fn describe(entry: &NormalizedEntry) -> String {
    let NormalizedEntryType::ToolUse {
        tool_name,
        action_type,
        ..
    } = &entry.entry_type
    else {
        return entry.content.clone();
    };
    match action_type {
        ActionType::FileRead { path } => format!("read {path}"),
        ActionType::Search { query } => format!("search {query}"),
        ActionType::WebFetch { url } => format!("fetch {url}"),
        ActionType::FileEdit { path, .. } => format!("edit {path}"),
        ActionType::CommandRun { command, .. } => format!("$ {command}"),
        _ => format!("{tool_name}: {}", entry.content),
    }
}

pub fn format_entry(entry: &UnifiedLogEntry) -> String {
    let body = match &entry.payload {
        UnifiedPayload::Text(text) => text.clone(),
        UnifiedPayload::Entry(normalized) => describe(normalized),
    };
    format!(
        "{} [{}] {}: {}",
        format_time(entry.ts),
        entry.process_name,
        entry.channel,
        body
    )
}

fn group_label(aggregation_type: AggregationType) -> &'static str {
    match aggregation_type {
        AggregationType::FileRead => "file reads",
        AggregationType::Search => "searches",
        AggregationType::WebFetch => "web fetches",
    }
}

pub fn format_row(row: &DisplayEntry<UnifiedLogEntry>) -> String {
    match row {
        DisplayEntry::Entry(entry) => format_entry(entry),
        DisplayEntry::Group(group) => {
            let Some(first) = group.entries.first() else {
                return String::new();
            };
            let items: Vec<String> = group
                .entries
                .iter()
                .filter_map(|entry| entry.normalized_entry().map(describe))
                .collect();
            format!(
                "{} [{}] {} {}: {}",
                format_time(first.ts),
                first.process_name,
                group.entries.len(),
                group_label(group.aggregation_type),
                items.join(", ")
            )
        }
    }
}

/// Tracks which entries were printed so each is emitted once, and again
/// only if its content was replaced. The trailing row is held back until the
/// stream ends because a run may still grow into it.
#[derive(Debug, Default)]
pub struct RowPrinter {
    printed: HashMap<String, String>,
    json: bool,
}

impl RowPrinter {
    pub fn new(json: bool) -> Self {
        Self {
            printed: HashMap::new(),
            json,
        }
    }

    pub fn settle(&mut self, rows: &[DisplayEntry<UnifiedLogEntry>], done: bool) -> Vec<String> {
        let live: HashSet<&str> = rows
            .iter()
            .flat_map(row_entries)
            .map(|entry| entry.id.as_str())
            .collect();
        self.printed.retain(|id, _| live.contains(id.as_str()));

        let settled = if done {
            rows.len()
        } else {
            rows.len().saturating_sub(1)
        };

        let mut lines = Vec::new();
        for row in &rows[..settled] {
            let fresh: Vec<UnifiedLogEntry> = row_entries(row)
                .iter()
                .filter(|entry| self.mark_printed(entry))
                .cloned()
                .collect();
            if let Some(row) = regroup(row, fresh) {
                lines.push(self.render(&row));
            }
        }
        lines
    }

    /// Records `entry` and reports whether it has not been shown in this form.
    fn mark_printed(&mut self, entry: &UnifiedLogEntry) -> bool {
        let rendered = format_entry(entry);
        if self.printed.get(&entry.id) == Some(&rendered) {
            return false;
        }
        self.printed.insert(entry.id.clone(), rendered);
        true
    }

    fn render(&self, row: &DisplayEntry<UnifiedLogEntry>) -> String {
        if self.json {
            serde_json::to_string(row).unwrap_or_else(|err| format!("{{\"error\":\"{err}\"}}"))
        } else {
            format_row(row)
        }
    }
}

fn row_entries(row: &DisplayEntry<UnifiedLogEntry>) -> &[UnifiedLogEntry] {
    match row {
        DisplayEntry::Entry(entry) => std::slice::from_ref(entry),
        DisplayEntry::Group(group) => &group.entries,
    }
}

/// Rebuild `row` around the entries that still need printing.
fn regroup(
    row: &DisplayEntry<UnifiedLogEntry>,
    mut fresh: Vec<UnifiedLogEntry>,
) -> Option<DisplayEntry<UnifiedLogEntry>> {
    match (row, fresh.len()) {
        (_, 0) => None,
        (DisplayEntry::Group(group), n) if n >= 2 => {
            Some(DisplayEntry::Group(AggregatedEntryGroup {
                aggregation_type: group.aggregation_type,
                entries: fresh,
                group_key: group.group_key.clone(),
                process_id: group.process_id,
            }))
        }
        _ => fresh.pop().map(DisplayEntry::Entry),
    }
}

#[cfg(test)]
mod tests {
    use logs_protocol::LogEntryChannel;
    use logs_view::aggregate_entries;
    use test_support::fixtures;

    use super::*;

    fn entry(process_id: Uuid, position: usize, normalized: NormalizedEntry) -> UnifiedLogEntry {
        UnifiedLogEntry {
            id: format!("{process_id}:{position}"),
            ts: 1_700_000_000_000 + position as i64,
            process_id,
            process_name: "Coding Agent".to_string(),
            channel: LogEntryChannel::Normalized,
            payload: UnifiedPayload::Entry(normalized),
        }
    }

    #[test]
    fn process_args_parse_id_and_reason() {
        let id = Uuid::new_v4();
        let process = parse_process_arg(&format!("{id}:devserver")).unwrap();
        assert_eq!(process.id, id);
        assert_eq!(process.run_reason, ExecutionProcessRunReason::DevServer);

        assert!(parse_process_arg("no-separator").is_err());
        assert!(parse_process_arg(&format!("{id}:nightly")).is_err());
        assert!(parse_process_arg("nope:codingagent").is_err());
    }

    #[test]
    fn groups_render_as_one_summary_line() {
        let id = Uuid::new_v4();
        let rows = aggregate_entries(vec![
            entry(id, 0, fixtures::file_read("a.rs")),
            entry(id, 1, fixtures::file_read("b.rs")),
            entry(id, 2, fixtures::command_run("cargo build")),
        ]);

        let line = format_row(&rows[0]);
        assert!(line.contains("[Coding Agent] 2 file reads: read a.rs, read b.rs"));
        assert!(format_row(&rows[1]).ends_with("normalized: $ cargo build"));
    }

    #[test]
    fn printer_holds_back_the_trailing_row_until_done() {
        let id = Uuid::new_v4();
        let mut printer = RowPrinter::new(false);
        let first = aggregate_entries(vec![entry(id, 0, fixtures::file_read("a.rs"))]);
        assert!(printer.settle(&first, false).is_empty());

        let second = aggregate_entries(vec![
            entry(id, 0, fixtures::file_read("a.rs")),
            entry(id, 1, fixtures::file_read("b.rs")),
            entry(id, 2, fixtures::assistant_message("done")),
        ]);
        let lines = printer.settle(&second, false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("2 file reads"));

        let lines = printer.settle(&second, true);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("done"));
        assert!(printer.settle(&second, true).is_empty());
    }

    #[test]
    fn regrouped_entries_are_not_printed_twice() {
        let id = Uuid::new_v4();
        let mut printer = RowPrinter::new(false);
        let first = aggregate_entries(vec![
            entry(id, 0, fixtures::file_read("a.rs")),
            entry(id, 1, fixtures::assistant_message("reading")),
        ]);
        let lines = printer.settle(&first, false);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("normalized: read a.rs"));

        // The message was replaced by a second read, so a.rs now opens a group.
        let second = aggregate_entries(vec![
            entry(id, 0, fixtures::file_read("a.rs")),
            entry(id, 1, fixtures::file_read("b.rs")),
            entry(id, 2, fixtures::command_run("cargo build")),
        ]);
        let lines = printer.settle(&second, true);
        let output = lines.join("\n");
        assert_eq!(output.matches("read a.rs").count(), 0);
        assert_eq!(output.matches("read b.rs").count(), 1);
        assert!(lines.last().unwrap().ends_with("$ cargo build"));
    }

    #[test]
    fn replaced_entries_are_printed_again() {
        let id = Uuid::new_v4();
        let mut printer = RowPrinter::new(false);
        let rows = aggregate_entries(vec![entry(id, 0, fixtures::assistant_message("draft"))]);
        assert_eq!(printer.settle(&rows, true).len(), 1);

        let rows = aggregate_entries(vec![entry(id, 0, fixtures::assistant_message("final"))]);
        let lines = printer.settle(&rows, true);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("final"));
        assert!(printer.settle(&rows, true).is_empty());
    }

    #[test]
    fn evicted_entries_are_forgotten() {
        let id = Uuid::new_v4();
        let mut printer = RowPrinter::new(true);
        let rows = aggregate_entries(vec![
            entry(id, 0, fixtures::assistant_message("one")),
            entry(id, 1, fixtures::assistant_message("two")),
        ]);
        assert_eq!(printer.settle(&rows, true).len(), 2);
        assert_eq!(printer.printed.len(), 2);

        let rows = aggregate_entries(vec![entry(id, 1, fixtures::assistant_message("two"))]);
        assert!(printer.settle(&rows, true).is_empty());
        assert_eq!(printer.printed.len(), 1);
        assert!(printer.printed.contains_key(&format!("{id}:1")));
    }
}
