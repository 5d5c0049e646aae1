//! Append-only, most-recent-first log of completed captures.

use crate::record::AnalysisRecord;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

/// Immutable view of the history, newest record first.
pub type HistorySnapshot = Arc<VecDeque<AnalysisRecord>>;

/// Record log shared by the capture state machine and its observers.
pub trait HistoryStore: Send + Sync {
    /// Add a record in front of all existing ones.
    fn append(&self, record: AnalysisRecord);

    fn snapshot(&self) -> HistorySnapshot;

    /// Receiver that is notified after every append.
    fn observe(&self) -> watch::Receiver<HistorySnapshot>;

    fn len(&self) -> usize {
        self.snapshot().len()
    }
}

/// Process-lifetime history held in memory.
///
/// One writer publishes copy-on-write snapshots through a watch channel, so
/// any number of readers can hold a snapshot while appends continue. With a
/// capacity set, the oldest record is evicted once the bound is exceeded.
pub struct InMemoryHistory {
    records: watch::Sender<HistorySnapshot>,
    capacity: Option<usize>,
}

impl InMemoryHistory {
    /// Unbounded history.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// `None` or `Some(0)` keeps every record.
    pub fn with_capacity(capacity: Option<usize>) -> Self {
        let (records, _) = watch::channel(Arc::new(VecDeque::new()));
        Self {
            records,
            capacity: capacity.filter(|&c| c > 0),
        }
    }
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&self, record: AnalysisRecord) {
        let capacity = self.capacity;
        self.records.send_modify(|snapshot| {
            let records = Arc::make_mut(snapshot);
            records.push_front(record);
            if let Some(cap) = capacity {
                while records.len() > cap {
                    if let Some(evicted) = records.pop_back() {
                        tracing::debug!(id = %evicted.id, "history full, evicted oldest record");
                    }
                }
            }
        });
    }

    fn snapshot(&self) -> HistorySnapshot {
        Arc::clone(&self.records.borrow())
    }

    fn observe(&self) -> watch::Receiver<HistorySnapshot> {
        self.records.subscribe()
    }
}
