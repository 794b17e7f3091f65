// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task event bus: bounded ring buffer plus subscriber fan-out.
//!
//! `emit` appends to the ring (FIFO eviction at capacity) and notifies
//! every live subscriber in the same critical section, so a subscriber
//! that joined with `subscribe_since` sees replayed history and live
//! events as one gapless, in-order sequence. Subscriber channels are
//! unbounded and non-reentrant, so notification never blocks emit; a
//! dropped subscriber is pruned on its next failed send.

use loopsy_core::{TaskEvent, TaskEventPayload};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

/// Ring capacity per task.
pub const EVENT_RING_CAPACITY: usize = 500;

struct BusInner {
    ring: VecDeque<TaskEvent>,
    subscribers: HashMap<u64, mpsc::UnboundedSender<TaskEvent>>,
    next_subscriber: u64,
    last_timestamp: u64,
}

/// Event ring + subscriber set for one task.
pub struct TaskBus {
    inner: Mutex<BusInner>,
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
    pub receiver: mpsc::UnboundedReceiver<TaskEvent>,
}

impl TaskBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner {
                ring: VecDeque::with_capacity(EVENT_RING_CAPACITY),
                subscribers: HashMap::new(),
                next_subscriber: 0,
                last_timestamp: 0,
            }),
        }
    }

    /// Append an event and notify subscribers.
    ///
    /// Timestamps are clamped monotonically non-decreasing per task.
    pub fn emit(&self, payload: TaskEventPayload, now_ms: u64) -> TaskEvent {
        let mut inner = self.inner.lock();

        let timestamp = now_ms.max(inner.last_timestamp);
        inner.last_timestamp = timestamp;

        let event = TaskEvent { timestamp, payload };

        if inner.ring.len() == EVENT_RING_CAPACITY {
            inner.ring.pop_front();
        }
        inner.ring.push_back(event.clone());

        inner
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());

        event
    }

    /// Copy of the current ring contents, oldest first.
    pub fn snapshot(&self) -> Vec<TaskEvent> {
        self.inner.lock().ring.iter().cloned().collect()
    }

    /// Replay events newer than `since`, then attach a live subscriber.
    ///
    /// Replay and attachment happen under one lock, so no event can
    /// land between the replayed history and the live stream.
    pub fn subscribe_since(&self, since: u64) -> (Vec<TaskEvent>, Subscription) {
        let mut inner = self.inner.lock();

        let replay: Vec<TaskEvent> = inner
            .ring
            .iter()
            .filter(|e| e.timestamp > since)
            .cloned()
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.insert(id, tx);

        (replay, Subscription { receiver: rx })
    }

    /// Number of live subscribers (tested; pruning is lazy).
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

impl Default for TaskBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
