//! Durable state of a bulk card-generation job.
//!
//! A `BatchJob` is created when a start request is accepted and lives in the
//! shared job store until it is downloaded or evicted by retention. The
//! orchestrator is the only writer; progress-poll requests read snapshots.

use std::collections::VecDeque;
use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Maximum number of entries kept in a job's event log.
pub const EVENT_LOG_CAPACITY: usize = 50;

/// Bounded ring buffer for the human-readable progress log.
///
/// Pushing past [`EVENT_LOG_CAPACITY`] evicts the oldest entry. Serialized as
/// a plain JSON array, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    entries: VecDeque<String>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        if self.entries.len() == EVENT_LOG_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(message.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Serialize for EventLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for entry in &self.entries {
            seq.serialize_element(entry)?;
        }
        seq.end()
    }
}

struct EventLogVisitor;

impl<'de> Visitor<'de> for EventLogVisitor {
    type Value = EventLog;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array of event strings")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> Result<EventLog, A::Error> {
        let mut log = EventLog::new();
        while let Some(entry) = access.next_element::<String>()? {
            log.push(entry);
        }
        Ok(log)
    }
}

impl<'de> Deserialize<'de> for EventLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<EventLog, D::Error> {
        deserializer.deserialize_seq(EventLogVisitor)
    }
}

/// Lifecycle of a batch job. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl BatchState {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchState::Completed | BatchState::Failed)
    }
}

/// The durable record of one bulk-generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub total: usize,
    /// Records attempted so far. Monotonically non-decreasing, `<= total`.
    pub processed: usize,
    pub state: BatchState,
    /// Per-record failure messages. These never fail the job.
    pub errors: Vec<String>,
    /// Fatal diagnostic, set when `state` is `Failed`.
    pub error: Option<String>,
    pub archive_path: Option<String>,
    pub events: EventLog,
    /// Epoch seconds of the terminal transition; drives retention eviction.
    pub finished_at: Option<u64>,
}

impl BatchJob {
    pub fn new(id: impl Into<String>, total: usize) -> Self {
        BatchJob {
            id: id.into(),
            total,
            processed: 0,
            state: BatchState::Pending,
            errors: Vec::new(),
            error: None,
            archive_path: None,
            events: EventLog::new(),
            finished_at: None,
        }
    }

    /// Completion percentage rounded to two decimals.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let raw = self.processed as f64 / self.total as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }
}
