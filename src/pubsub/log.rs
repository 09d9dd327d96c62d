//! Bounded FIFO history of published messages.

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::Serialize;

use crate::Payload;

/// One published message as recorded in the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub at: SystemTime,
    pub topic: String,
    pub payload: Payload,
}

/// Keeps the most recent `capacity` entries, oldest first.
#[derive(Debug)]
pub(crate) struct MessageLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl MessageLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub(crate) fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u64) -> LogEntry {
        LogEntry {
            at: SystemTime::now(),
            topic: "t".into(),
            payload: n.into(),
        }
    }

    #[test]
    fn keeps_most_recent_in_order() {
        let mut log = MessageLog::new(1000);
        for n in 0..1500 {
            log.push(entry(n));
        }
        assert_eq!(log.len(), 1000);

        let kept: Vec<u64> = log
            .snapshot()
            .iter()
            .filter_map(|e| e.payload.as_u64())
            .collect();
        let expected: Vec<u64> = (500..1500).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut log = MessageLog::new(0);
        log.push(entry(1));
        assert!(log.snapshot().is_empty());
    }
}
