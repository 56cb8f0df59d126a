// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dfms_common::DOStatus;

/// The event kinds a DO publishes over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatusChange,
    Write,
    ContentAvailable,
}

/// Per-kind payload carried alongside an [`Event`].
#[derive(Debug, Clone)]
pub enum EventPayload {
    StatusChange { old: DOStatus, new: DOStatus },
    Write { offset: u64, len: usize },
    ContentAvailable,
}

/// A single published occurrence, scoped to the DO that produced it.
#[derive(Debug, Clone)]
pub struct Event {
    pub uid: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::StatusChange { .. } => EventKind::StatusChange,
            EventPayload::Write { .. } => EventKind::Write,
            EventPayload::ContentAvailable => EventKind::ContentAvailable,
        }
    }

    pub fn status_change(uid: impl Into<String>, old: DOStatus, new: DOStatus) -> Self {
        Event { uid: uid.into(), payload: EventPayload::StatusChange { old, new } }
    }

    pub fn write(uid: impl Into<String>, offset: u64, len: usize) -> Self {
        Event { uid: uid.into(), payload: EventPayload::Write { offset, len } }
    }

    pub fn content_available(uid: impl Into<String>) -> Self {
        Event { uid: uid.into(), payload: EventPayload::ContentAvailable }
    }
}

/// A subscriber callback. Implementations must not panic across an unwind boundary the
/// broadcaster cannot observe; any panic raised inside `handle` is caught, logged, and treated
/// as a skipped handler rather than propagated to the caller or to sibling handlers.
pub trait Handler: Send + Sync {
    fn handle(&self, event: &Event);
}

impl<F> Handler for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn handle(&self, event: &Event) {
        self(event)
    }
}

pub(crate) fn same_handler(a: &Arc<dyn Handler>, b: &Arc<dyn Handler>) -> bool {
    Arc::ptr_eq(a, b)
}
