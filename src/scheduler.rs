//! Priority scheduler for request admission
//!
//! One ordered queue per model group. Entries are served strictly in
//! ascending `(priority, enqueue_sequence)` order: lower priority values are
//! more urgent, and equal priorities are FIFO by a global monotonic sequence
//! counter. Model groups are fully independent — admitting a request under
//! one group never depends on another group's queue state.
//!
//! Admission is caller-driven: `poll` succeeds only for the entry at the
//! head of its queue, so callers loop with a backoff interval until they
//! reach the head or give up and `abandon` the entry.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::registry::DeploymentId;

/// One queued request awaiting admission.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Caller-unique request id
    pub request_id: String,
    /// Lower = more urgent
    pub priority: u8,
    /// Model group the request is addressed to
    pub model_group: String,
    /// Monotonic counter for FIFO tie-breaking
    pub enqueue_sequence: u64,
}

#[derive(Debug, Default)]
struct GroupQueue {
    entries: BTreeMap<(u8, u64), QueueEntry>,
    by_request: HashMap<String, (u8, u64)>,
}

impl GroupQueue {
    fn head_is(&self, request_id: &str) -> bool {
        self.entries
            .values()
            .next()
            .map(|entry| entry.request_id == request_id)
            .unwrap_or(false)
    }
}

/// Per-model-group priority queues with head-of-queue admission.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    queues: DashMap<String, Mutex<GroupQueue>>,
    sequence: AtomicU64,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a request under its model group.
    ///
    /// Returns the created entry, including its assigned sequence number.
    pub fn add_request(&self, request_id: &str, priority: u8, model_group: &str) -> QueueEntry {
        let entry = QueueEntry {
            request_id: request_id.to_string(),
            priority,
            model_group: model_group.to_string(),
            enqueue_sequence: self.sequence.fetch_add(1, Relaxed),
        };

        let queue = self
            .queues
            .entry(model_group.to_string())
            .or_insert_with(|| Mutex::new(GroupQueue::default()));
        let mut queue = queue.lock();
        queue
            .by_request
            .insert(entry.request_id.clone(), (entry.priority, entry.enqueue_sequence));
        queue
            .entries
            .insert((entry.priority, entry.enqueue_sequence), entry.clone());
        entry
    }

    /// Non-destructive head check: true iff the request is at the head of
    /// its group's queue.
    ///
    /// `candidates` is advisory context only; an empty list flags a group
    /// outage to the logs but never changes admission order.
    pub fn peek(&self, request_id: &str, model_group: &str, candidates: &[DeploymentId]) -> bool {
        self.note_candidates(model_group, candidates);
        match self.queues.get(model_group) {
            Some(queue) => queue.lock().head_is(request_id),
            None => false,
        }
    }

    /// Head check with removal: if the request is at the head of its queue
    /// it is dequeued and `true` is returned; otherwise the queue is
    /// untouched and `false` is returned.
    pub fn poll(&self, request_id: &str, model_group: &str, candidates: &[DeploymentId]) -> bool {
        self.note_candidates(model_group, candidates);
        let queue = match self.queues.get(model_group) {
            Some(queue) => queue,
            None => return false,
        };
        let mut queue = queue.lock();
        if !queue.head_is(request_id) {
            return false;
        }
        if let Some(key) = queue.by_request.remove(request_id) {
            queue.entries.remove(&key);
        }
        true
    }

    /// Remove a queued entry before admission (cancellation).
    ///
    /// Returns true if the entry was still queued.
    pub fn abandon(&self, request_id: &str, model_group: &str) -> bool {
        let queue = match self.queues.get(model_group) {
            Some(queue) => queue,
            None => return false,
        };
        let mut queue = queue.lock();
        match queue.by_request.remove(request_id) {
            Some(key) => {
                queue.entries.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Number of entries queued under a model group.
    pub fn queue_len(&self, model_group: &str) -> usize {
        self.queues
            .get(model_group)
            .map(|queue| queue.lock().entries.len())
            .unwrap_or(0)
    }

    fn note_candidates(&self, model_group: &str, candidates: &[DeploymentId]) {
        if candidates.is_empty() {
            tracing::debug!(
                model_group = %model_group,
                "polling with no healthy deployments in group"
            );
        }
    }
}
