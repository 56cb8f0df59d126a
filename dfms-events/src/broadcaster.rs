// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use dfms_common::{MutexExt, Worker};

use crate::event::same_handler;
use crate::{Event, EventKind, Handler};

type SubKey = (String, EventKind);
type SubMap = HashMap<SubKey, Vec<Arc<dyn Handler>>>;

/// Object-safe facade over both broadcaster variants, so a DO can hold whichever one its
/// graph section was built with behind a single `Arc<dyn EventBus>`.
pub trait EventBus: Send + Sync {
    fn subscribe(&self, uid: &str, kind: EventKind, handler: Arc<dyn Handler>);
    fn unsubscribe(&self, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>);
    fn fire(&self, event: Event);
}

impl EventBus for LocalEventBroadcaster {
    fn subscribe(&self, uid: &str, kind: EventKind, handler: Arc<dyn Handler>) {
        LocalEventBroadcaster::subscribe(self, uid, kind, handler)
    }
    fn unsubscribe(&self, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>) {
        LocalEventBroadcaster::unsubscribe(self, uid, kind, handler)
    }
    fn fire(&self, event: Event) {
        LocalEventBroadcaster::fire(self, event)
    }
}

impl EventBus for ThreadedEventBroadcaster {
    fn subscribe(&self, uid: &str, kind: EventKind, handler: Arc<dyn Handler>) {
        ThreadedEventBroadcaster::subscribe(self, uid, kind, handler)
    }
    fn unsubscribe(&self, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>) {
        ThreadedEventBroadcaster::unsubscribe(self, uid, kind, handler)
    }
    fn fire(&self, event: Event) {
        ThreadedEventBroadcaster::fire(self, event)
    }
}

fn dispatch(uid: &str, kind: EventKind, subs: &Mutex<SubMap>, event: &Event) {
    let handlers = {
        let guard = subs.lock_or_panic();
        guard.get(&(uid.to_string(), kind)).cloned().unwrap_or_default()
    };
    for handler in handlers {
        let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle(event)));
        if outcome.is_err() {
            tracing::warn!(uid, ?kind, "event handler panicked, skipping");
        }
    }
}

fn subscribe(subs: &Mutex<SubMap>, uid: &str, kind: EventKind, handler: Arc<dyn Handler>) {
    let mut guard = subs.lock_or_panic();
    let entry = guard.entry((uid.to_string(), kind)).or_default();
    if !entry.iter().any(|h| same_handler(h, &handler)) {
        entry.push(handler);
    }
}

fn unsubscribe(subs: &Mutex<SubMap>, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>) {
    let mut guard = subs.lock_or_panic();
    if let Some(entry) = guard.get_mut(&(uid.to_string(), kind)) {
        entry.retain(|h| !same_handler(h, handler));
        if entry.is_empty() {
            guard.remove(&(uid.to_string(), kind));
        }
    }
}

/// Delivers every event on the caller's own thread, in subscription order, before `fire`
/// returns. This is the default broadcaster: producers and consumers observe each other's
/// state changes with no scheduling delay.
#[derive(Default)]
pub struct LocalEventBroadcaster {
    subs: Mutex<SubMap>,
}

impl LocalEventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, uid: &str, kind: EventKind, handler: Arc<dyn Handler>) {
        subscribe(&self.subs, uid, kind, handler);
    }

    pub fn unsubscribe(&self, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>) {
        unsubscribe(&self.subs, uid, kind, handler);
    }

    pub fn fire(&self, event: Event) {
        dispatch(&event.uid, event.kind(), &self.subs, &event);
    }
}

/// The dedicated worker loop a [`ThreadedEventBroadcaster`] drives on its own thread: drains
/// `receiver` until the sender half is dropped, dispatching each event against the shared
/// subscription map.
struct BroadcastWorker {
    subs: Arc<Mutex<SubMap>>,
    receiver: mpsc::Receiver<Event>,
}

impl Worker for BroadcastWorker {
    fn run(&mut self) {
        while let Ok(event) = self.receiver.recv() {
            dispatch(&event.uid, event.kind(), &self.subs, &event);
        }
    }
}

/// Delivers events from one dedicated worker thread per broadcaster, so `fire` never blocks
/// the producer. Events from a single producer are still delivered in the order they were
/// fired, because the channel is FIFO and a single worker thread drains it.
pub struct ThreadedEventBroadcaster {
    subs: Arc<Mutex<SubMap>>,
    sender: Option<mpsc::Sender<Event>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedEventBroadcaster {
    pub fn new() -> Self {
        let subs: Arc<Mutex<SubMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = mpsc::channel::<Event>();
        let mut worker = BroadcastWorker { subs: Arc::clone(&subs), receiver };
        let handle = std::thread::Builder::new()
            .name("dfms-event-broadcaster".into())
            .spawn(move || worker.run())
            .expect("failed to spawn event broadcaster thread");
        ThreadedEventBroadcaster { subs, sender: Some(sender), worker: Some(handle) }
    }

    pub fn subscribe(&self, uid: &str, kind: EventKind, handler: Arc<dyn Handler>) {
        subscribe(&self.subs, uid, kind, handler);
    }

    pub fn unsubscribe(&self, uid: &str, kind: EventKind, handler: &Arc<dyn Handler>) {
        unsubscribe(&self.subs, uid, kind, handler);
    }

    /// Enqueues `event` for delivery and returns immediately. Never blocks, even while the
    /// worker thread is busy running a slow handler.
    pub fn fire(&self, event: Event) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }

    /// Closes the input channel and waits for the worker to drain whatever was already
    /// enqueued. After this returns, `fire` is a no-op.
    pub fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for ThreadedEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadedEventBroadcaster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn Handler> {
        Arc::new(move |_event: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn local_fires_synchronously_in_subscription_order() {
        let broadcaster = LocalEventBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let a_order = Arc::clone(&order);
        let b_order = Arc::clone(&order);
        let a: Arc<dyn Handler> = Arc::new(move |_: &Event| a_order.lock_or_panic().push("a"));
        let b: Arc<dyn Handler> = Arc::new(move |_: &Event| b_order.lock_or_panic().push("b"));
        broadcaster.subscribe("do-1", EventKind::Write, a);
        broadcaster.subscribe("do-1", EventKind::Write, b);

        broadcaster.fire(Event::write("do-1", 0, 10));

        assert_eq!(*order.lock_or_panic(), vec!["a", "b"]);
    }

    #[test]
    fn subscribe_is_idempotent_per_kind_and_do() {
        let broadcaster = LocalEventBroadcaster::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&counter));
        broadcaster.subscribe("do-1", EventKind::Write, Arc::clone(&handler));
        broadcaster.subscribe("do-1", EventKind::Write, Arc::clone(&handler));

        broadcaster.fire(Event::write("do-1", 0, 1));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let broadcaster = LocalEventBroadcaster::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&counter));
        broadcaster.subscribe("do-1", EventKind::Write, Arc::clone(&handler));
        broadcaster.unsubscribe("do-1", EventKind::Write, &handler);

        broadcaster.fire(Event::write("do-1", 0, 1));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_panic_does_not_break_remaining_handlers() {
        let broadcaster = LocalEventBroadcaster::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let panicking: Arc<dyn Handler> = Arc::new(|_: &Event| panic!("boom"));
        let ok = counting_handler(Arc::clone(&counter));
        broadcaster.subscribe("do-1", EventKind::Write, panicking);
        broadcaster.subscribe("do-1", EventKind::Write, ok);

        broadcaster.fire(Event::write("do-1", 0, 1));

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_for_different_dos_do_not_cross_deliver() {
        let broadcaster = LocalEventBroadcaster::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&counter));
        broadcaster.subscribe("do-1", EventKind::Write, handler);

        broadcaster.fire(Event::write("do-2", 0, 1));

        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn threaded_delivers_off_the_firing_thread_eventually() {
        let broadcaster = ThreadedEventBroadcaster::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let handler = counting_handler(Arc::clone(&counter));
        broadcaster.subscribe("do-1", EventKind::StatusChange, handler);

        broadcaster.fire(Event::status_change(
            "do-1",
            dfms_common::DOStatus::Writing,
            dfms_common::DOStatus::Completed,
        ));

        for _ in 0..100 {
            if counter.load(Ordering::SeqCst) == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn threaded_preserves_per_producer_order() {
        let broadcaster = ThreadedEventBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&order);
        let handler: Arc<dyn Handler> = Arc::new(move |e: &Event| {
            if let crate::EventPayload::Write { offset, .. } = e.payload {
                recorder.lock_or_panic().push(offset);
            }
        });
        broadcaster.subscribe("do-1", EventKind::Write, handler);

        for offset in 0..20u64 {
            broadcaster.fire(Event::write("do-1", offset, 1));
        }

        let mut broadcaster = broadcaster;
        broadcaster.shutdown();
        assert_eq!(*order.lock_or_panic(), (0..20u64).collect::<Vec<_>>());
    }

    #[test]
    fn fire_after_shutdown_is_a_noop() {
        let mut broadcaster = ThreadedEventBroadcaster::new();
        broadcaster.shutdown();
        broadcaster.fire(Event::write("do-1", 0, 1));
    }
}
