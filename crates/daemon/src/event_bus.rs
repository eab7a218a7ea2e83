// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process event fan-out.
//!
//! Emitters publish onto one bounded channel; a single fan-out task copies
//! each event into every subscriber's bounded queue and appends it to the
//! store. Both hops are lossy by design: a full queue drops the event and
//! the watcher is responsible for tolerating gaps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use mapd_core::{Clock, Event, EventKind, IdGen};

use crate::store::Store;

/// Capacity of the producer channel.
const PUBLISH_CAPACITY: usize = 100;

/// Capacity of each subscriber queue.
const SUBSCRIBER_CAPACITY: usize = 50;

type SubscriberMap = Arc<Mutex<HashMap<u64, mpsc::Sender<Event>>>>;

/// Handle used by components to emit events and by the listener to
/// subscribe. Cheap to clone.
pub struct EventBus<C: Clock> {
    tx: mpsc::Sender<Event>,
    subscribers: SubscriberMap,
    next_id: Arc<AtomicU64>,
    ids: Arc<dyn IdGen>,
    clock: C,
}

impl<C: Clock> Clone for EventBus<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
            ids: Arc::clone(&self.ids),
            clock: self.clock.clone(),
        }
    }
}

impl<C: Clock> EventBus<C> {
    /// Create the bus and its fan-out driver. The driver must be spawned
    /// (see [`EventFanOut::run`]) for events to reach subscribers.
    pub fn new(ids: Arc<dyn IdGen>, clock: C, store: Option<Arc<Store>>) -> (Self, EventFanOut) {
        let (tx, rx) = mpsc::channel(PUBLISH_CAPACITY);
        let subscribers: SubscriberMap = Arc::new(Mutex::new(HashMap::new()));

        let bus = Self {
            tx,
            subscribers: Arc::clone(&subscribers),
            next_id: Arc::new(AtomicU64::new(0)),
            ids,
            clock,
        };
        let driver = EventFanOut { rx, subscribers, store };
        (bus, driver)
    }

    /// Stamp and publish an event. Never blocks; a full producer channel
    /// drops the event.
    pub fn emit(&self, kind: EventKind) {
        let event = Event::new(
            self.ids.generate("evt-"),
            self.clock.epoch_secs(),
            kind,
        );
        self.publish(event);
    }

    /// Publish a pre-stamped event. Never blocks.
    pub fn publish(&self, event: Event) {
        if self.tx.try_send(event).is_err() {
            debug!("event channel full, dropping event");
        }
    }

    /// Register a new subscriber. Dropping the returned subscription
    /// unregisters it in O(1).
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        Subscription {
            id,
            receiver: rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// One subscriber's read end. Unsubscribes on drop.
pub struct Subscription {
    id: u64,
    pub receiver: mpsc::Receiver<Event>,
    subscribers: SubscriberMap,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.lock().remove(&self.id);
    }
}

/// Fan-out driver: consumes the producer channel until shutdown.
pub struct EventFanOut {
    rx: mpsc::Receiver<Event>,
    subscribers: SubscriberMap,
    store: Option<Arc<Store>>,
}

impl EventFanOut {
    /// Deliver events until the shutdown token fires or all senders drop.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return,
                received = self.rx.recv() => {
                    let Some(event) = received else { return };
                    self.deliver(event);
                }
            }
        }
    }

    fn deliver(&self, event: Event) {
        if let Some(store) = &self.store {
            if let Err(err) = store.append_event(&event) {
                warn!(error = %err, "failed to persist event");
            }
        }

        let subscribers = self.subscribers.lock();
        for tx in subscribers.values() {
            // Drop if the watcher is slow.
            let _ = tx.try_send(event.clone());
        }
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
