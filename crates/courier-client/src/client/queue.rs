//! Bounded per-subscription delivery queue.
//!
//! # Purpose
//! Holds messages between the dispatcher (producer) and a subscription's
//! dispatch task (consumer), tracking occupancy in both messages and bytes.
//!
//! # Design notes
//! `enqueue` never waits: a message that would push occupancy past either
//! limit is rejected and the queue is left untouched. Occupancy counters only
//! change inside `enqueue` and `dequeue`, under the same lock as the entries,
//! so they always equal the number and total size of queued entries.
use courier_common::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

/// Optional caps on queued messages and bytes. `None` is unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingLimits {
    pub msgs: Option<usize>,
    pub bytes: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnqueueOutcome {
    Accepted,
    /// Limits exceeded; the message was dropped.
    Rejected,
    /// Queue closed by unsubscribe; the message was dropped.
    Closed,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<(Message, usize)>,
    pending_msgs: usize,
    pending_bytes: usize,
    closed: bool,
}

#[derive(Debug)]
pub(crate) struct DeliveryQueue {
    state: Mutex<QueueState>,
    // Single consumer: notify_one stores a permit when nobody is waiting yet.
    ready: Notify,
    limits: PendingLimits,
}

impl DeliveryQueue {
    pub(crate) fn new(limits: PendingLimits) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            ready: Notify::new(),
            limits,
        }
    }

    pub(crate) fn limits(&self) -> PendingLimits {
        self.limits
    }

    pub(crate) fn enqueue(&self, message: Message, size: usize) -> EnqueueOutcome {
        let mut state = self.state.lock();
        if state.closed {
            return EnqueueOutcome::Closed;
        }
        let exceeds_msgs = self
            .limits
            .msgs
            .is_some_and(|limit| state.pending_msgs + 1 > limit);
        let exceeds_bytes = self
            .limits
            .bytes
            .is_some_and(|limit| state.pending_bytes + size > limit);
        if exceeds_msgs || exceeds_bytes {
            return EnqueueOutcome::Rejected;
        }
        state.pending_msgs += 1;
        state.pending_bytes += size;
        state.entries.push_back((message, size));
        drop(state);
        self.ready.notify_one();
        EnqueueOutcome::Accepted
    }

    /// Wait for the next message. Returns `None` once the queue is closed and empty.
    pub(crate) async fn dequeue(&self) -> Option<Message> {
        loop {
            let notified = self.ready.notified();
            {
                let mut state = self.state.lock();
                if let Some((message, size)) = state.entries.pop_front() {
                    state.pending_msgs -= 1;
                    state.pending_bytes -= size;
                    return Some(message);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting messages. Already queued entries are still handed out.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        drop(state);
        self.ready.notify_one();
        true
    }

    /// Current `(messages, bytes)` occupancy.
    pub(crate) fn pending(&self) -> (usize, usize) {
        let state = self.state.lock();
        (state.pending_msgs, state.pending_bytes)
    }
}
