use std::{
    collections::VecDeque,
    fmt,
    sync::mpsc::Sender,
    time::{SystemTime, UNIX_EPOCH},
};

use log::debug;
use serde::{Deserialize, Serialize};

pub const EVENT_LOG_CAPACITY: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.pad("info"),
            Self::Warning => f.pad("warn"),
            Self::Success => f.pad("ok"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    /// Milliseconds since the unix epoch
    pub timestamp_ms: u64,
    pub level: LogLevel,
    pub message: String,
}

/// Operator facing log of what happened during the session, newest last.
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_seq: u64,
    mirror: Option<Sender<LogEntry>>,
}

impl Default for EventLog {
    fn default() -> Self {
        EventLog::new(EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(EVENT_LOG_CAPACITY)),
            capacity: capacity.max(1),
            next_seq: 0,
            mirror: None,
        }
    }

    /// Mirrors every new entry to `sender`, typically a file writer thread.
    pub fn attach_writer(&mut self, sender: Sender<LogEntry>) {
        self.mirror = Some(sender);
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.next_seq += 1;
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let entry = LogEntry {
            seq: self.next_seq,
            timestamp_ms,
            level,
            message: message.into(),
        };

        if let Some(mirror) = &self.mirror {
            if mirror.send(entry.clone()).is_err() {
                debug!("Event log writer has stopped, no longer mirroring");
                self.mirror = None;
            }
        }

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Info, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Warning, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(LogLevel::Success, message);
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Entries pushed after the one numbered `seq` that are still retained.
    pub fn entries_since(&self, seq: u64) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |entry| entry.seq > seq)
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
