//! # Status publication
//!
//! The loop publishes an immutable [`StatusReport`] after every state
//! change; readers load whichever report is current. Publishing swaps one
//! `Arc`, so modem, signal and watchdog state always change together and a
//! reader never waits on the loop.
//!
//! Log lines go into a bounded FIFO [`LogBuffer`] behind a short mutex. An
//! append and a read each hold it only for a push or a copy.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use chrono::{DateTime, Local};

use modem_doctor_common::models::{ModemSnapshot, SignalSnapshot, StatusReport, WatchdogState};

/// One timestamped log line. Immutable once appended.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            at: Local::now(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.at.format("%Y-%m-%d %H:%M:%S"), self.message)
    }
}

/// Fixed-capacity log ring; the oldest entry is evicted on overflow.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &LogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
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

    /// Shrinking evicts from the old end.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

/// Latest status snapshot plus the recent log. Cheap to clone; all clones
/// share the same state.
#[derive(Clone)]
pub struct StatusPublisher {
    inner: Arc<Inner>,
}

struct Inner {
    current: ArcSwap<StatusReport>,
    log: Mutex<LogBuffer>,
}

impl StatusPublisher {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                current: ArcSwap::from_pointee(StatusReport::default()),
                log: Mutex::new(LogBuffer::new(log_capacity)),
            }),
        }
    }

    /// Replace the current snapshot as a whole.
    pub fn publish(&self, modem: ModemSnapshot, signal: SignalSnapshot, watchdog: WatchdogState) {
        self.inner.current.store(Arc::new(StatusReport {
            modem,
            signal,
            watchdog,
        }));
    }

    /// Clear `running` in the current snapshot, leaving the rest as the
    /// loop last published it.
    pub fn mark_halted(&self) {
        self.inner.current.rcu(|current| {
            let mut report = StatusReport::clone(current);
            report.watchdog.running = false;
            report
        });
    }

    /// Latest published snapshot; all-absent defaults before the first
    /// publish.
    pub fn status(&self) -> Arc<StatusReport> {
        self.inner.current.load_full()
    }

    pub fn append_log(&self, line: impl Into<String>) {
        self.log().push(LogEntry::now(line));
    }

    /// The `lines` most recent log lines, most recent last.
    pub fn log_lines(&self, lines: usize) -> Vec<String> {
        self.log().recent(lines).map(ToString::to_string).collect()
    }

    pub fn set_log_capacity(&self, capacity: usize) {
        self.log().set_capacity(capacity);
    }

    fn log(&self) -> MutexGuard<'_, LogBuffer> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.inner.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}
