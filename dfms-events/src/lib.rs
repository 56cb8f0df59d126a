// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-process pub/sub over DO lifecycle events.
//!
//! Two [`EventBroadcaster`] implementations are provided: [`LocalEventBroadcaster`] delivers on
//! the firing thread, synchronously, before `fire` returns; [`ThreadedEventBroadcaster`] hands
//! events to one dedicated worker thread per broadcaster and never blocks the firing thread.
//! Both preserve per-producer delivery order even when a handler panics.

mod broadcaster;
mod event;

pub use broadcaster::{EventBus, LocalEventBroadcaster, ThreadedEventBroadcaster};
pub use event::{Event, EventKind, EventPayload, Handler};
