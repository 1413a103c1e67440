use std::collections::VecDeque;

use logs_protocol::PatchType;

use crate::config::LogPipelineConfig;

const ENTRY_OVERHEAD_BYTES: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    /// Monotonic per-process position; survives eviction of earlier lines.
    pub position: usize,
    pub unit: PatchType,
    /// Epoch milliseconds at which the line arrived.
    pub received_at_ms: i64,
    bytes: usize,
}

/// Bounded per-process buffer of stdout/stderr lines, evicting the oldest first.
#[derive(Debug)]
pub struct RawLogBuffer {
    lines: VecDeque<RawLine>,
    total_bytes: usize,
    next_position: usize,
    evicted: bool,
    max_entries: usize,
    max_bytes: usize,
}

impl RawLogBuffer {
    pub fn new(config: &LogPipelineConfig) -> Self {
        Self {
            lines: VecDeque::with_capacity(64),
            total_bytes: 0,
            next_position: 0,
            evicted: false,
            max_entries: config.raw_max_entries,
            max_bytes: config.raw_max_bytes,
        }
    }

    pub fn push_stdout<S: Into<String>>(&mut self, line: S, received_at_ms: i64) {
        self.push(PatchType::Stdout(line.into()), received_at_ms);
    }

    pub fn push_stderr<S: Into<String>>(&mut self, line: S, received_at_ms: i64) {
        self.push(PatchType::Stderr(line.into()), received_at_ms);
    }

    pub fn push(&mut self, unit: PatchType, received_at_ms: i64) {
        let bytes = approx_bytes(&unit);
        let position = self.next_position;
        self.next_position = self.next_position.saturating_add(1);

        // Arrival stamps never go backwards within one process.
        let received_at_ms = self
            .lines
            .back()
            .map_or(received_at_ms, |last| received_at_ms.max(last.received_at_ms));

        self.lines.push_back(RawLine {
            position,
            unit,
            received_at_ms,
            bytes,
        });
        self.total_bytes = self.total_bytes.saturating_add(bytes);
        self.trim();
    }

    pub fn lines(&self) -> impl ExactSizeIterator<Item = &RawLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Whether older lines were dropped to stay within budget.
    pub fn evicted(&self) -> bool {
        self.evicted
    }

    fn trim(&mut self) {
        while self.lines.len() > self.max_entries || self.total_bytes > self.max_bytes {
            if self.lines.len() <= 1 {
                break;
            }
            if let Some(front) = self.lines.pop_front() {
                self.total_bytes = self.total_bytes.saturating_sub(front.bytes);
                self.evicted = true;
            }
        }
    }
}

fn approx_bytes(unit: &PatchType) -> usize {
    match unit {
        PatchType::Stdout(text) | PatchType::Stderr(text) => text.len() + ENTRY_OVERHEAD_BYTES,
        PatchType::NormalizedEntry(entry) => {
            serde_json::to_string(entry).map(|s| s.len()).unwrap_or(2) + ENTRY_OVERHEAD_BYTES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_entries: usize, max_bytes: usize) -> LogPipelineConfig {
        LogPipelineConfig {
            raw_max_entries: max_entries,
            raw_max_bytes: max_bytes,
            ..LogPipelineConfig::default()
        }
    }

    #[test]
    fn lines_keep_positions_and_kinds() {
        let mut buffer = RawLogBuffer::new(&LogPipelineConfig::default());
        buffer.push_stdout("hello", 100);
        buffer.push_stderr("oops", 101);

        let lines: Vec<_> = buffer.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].position, 0);
        assert_eq!(lines[1].position, 1);
        assert_eq!(lines[0].unit, PatchType::Stdout("hello".to_string()));
        assert_eq!(lines[1].unit, PatchType::Stderr("oops".to_string()));
        assert!(!buffer.evicted());
    }

    #[test]
    fn oldest_lines_are_evicted_by_count() {
        let mut buffer = RawLogBuffer::new(&config(3, usize::MAX));
        for i in 0..5 {
            buffer.push_stdout(format!("line {i}"), i);
        }

        let positions: Vec<_> = buffer.lines().map(|line| line.position).collect();
        assert_eq!(positions, vec![2, 3, 4]);
        assert!(buffer.evicted());
    }

    #[test]
    fn oldest_lines_are_evicted_by_bytes() {
        let mut buffer = RawLogBuffer::new(&config(100, 40));
        buffer.push_stdout("aaaaaaaaaa", 1);
        buffer.push_stdout("bbbbbbbbbb", 2);
        buffer.push_stdout("cccccccccc", 3);

        assert_eq!(buffer.len(), 2);
        assert!(buffer.total_bytes() <= 40);
        assert_eq!(
            buffer.lines().next().map(|line| line.unit.clone()),
            Some(PatchType::Stdout("bbbbbbbbbb".to_string()))
        );
    }

    #[test]
    fn oversized_single_line_is_retained() {
        let mut buffer = RawLogBuffer::new(&config(10, 4));
        buffer.push_stdout("this line alone exceeds the budget", 1);
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn arrival_stamps_are_monotonic() {
        let mut buffer = RawLogBuffer::new(&LogPipelineConfig::default());
        buffer.push_stdout("late clock", 50);
        buffer.push_stdout("skewed clock", 40);

        let stamps: Vec<_> = buffer.lines().map(|line| line.received_at_ms).collect();
        assert_eq!(stamps, vec![50, 50]);
    }
}
