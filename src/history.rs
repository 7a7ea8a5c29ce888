use std::collections::{HashSet, VecDeque};
use std::time::{Duration, SystemTime};

use glob_match::glob_match;

/// One executed command as the console typed it.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub command: String,
    pub database: u32,
    /// Kind of the reply (`"simple"`, `"error"`, ...), or `"failed"` when no reply arrived.
    pub reply_kind: &'static str,
    pub elapsed: Duration,
    pub executed_at: SystemTime,
}

/// Bounded command history. Once full, recording evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl History {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> History {
        let capacity = capacity.max(1);
        History {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Shrinking drops the oldest entries that no longer fit.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// The `n` most recent entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<&HistoryEntry> {
        self.entries.iter().rev().take(n).collect()
    }

    /// Distinct previously executed commands starting with `prefix` (case-insensitive),
    /// newest first.
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_ascii_lowercase();
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .rev()
            .filter(|entry| entry.command.to_ascii_lowercase().starts_with(&prefix))
            .filter(|entry| seen.insert(entry.command.as_str()))
            .map(|entry| entry.command.clone())
            .collect()
    }

    /// Entries whose command text matches a glob such as `SET user:*`, newest first.
    pub fn matching(&self, pattern: &str) -> Vec<&HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .filter(|entry| glob_match(pattern, &entry.command))
            .collect()
    }
}

impl Default for History {
    fn default() -> Self {
        History::new(100)
    }
}
