// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use dfms_common::{ChecksumKind, DOStatus, DfmsError, ExecutionMode, MutexExt, Result};
use dfms_events::{Event, EventBus, EventKind, EventPayload, Handler};
use dfms_io::{Backend, ReadToken};

use crate::checksum::ChecksumAccumulator;
use crate::producer::ProducerHandle;
use crate::stage::Stage;

struct DOState {
    status: DOStatus,
    size: Option<u64>,
    checksum_acc: Option<ChecksumAccumulator>,
    checksum_final: Option<u32>,
    expected_size: Option<u64>,
    open_fds: HashSet<ReadToken>,
    consumers: Vec<Arc<DataObject>>,
    immediate_consumers: Vec<Arc<DataObject>>,
    children: Vec<Arc<DataObject>>,
    parent: Option<Weak<DataObject>>,
}

/// The unit of the execution graph: identity, lifecycle, content, checksum, consumer/child
/// relationships and triggering rules. Hosts exactly one [`Backend`] and, optionally, one
/// [`Stage`].
pub struct DataObject {
    oid: String,
    uid: String,
    backend: Box<dyn Backend>,
    broadcaster: Arc<dyn EventBus>,
    execution_mode: ExecutionMode,
    stage: Option<Arc<dyn Stage>>,
    is_container: bool,
    state: Mutex<DOState>,
}

/// Construction options for a leaf (non-container) DO.
pub struct DataObjectSpec {
    pub oid: String,
    pub uid: String,
    pub backend: Box<dyn Backend>,
    pub broadcaster: Arc<dyn EventBus>,
    pub checksum_kind: ChecksumKind,
    pub expected_size: Option<u64>,
    pub execution_mode: ExecutionMode,
    pub stage: Option<Arc<dyn Stage>>,
}

impl DataObject {
    /// Builds a leaf DO: it accumulates a checksum over its own writes and reports `size` from
    /// either those writes or its backend.
    pub fn new(spec: DataObjectSpec) -> Arc<Self> {
        Arc::new(DataObject {
            oid: spec.oid,
            uid: spec.uid,
            backend: spec.backend,
            broadcaster: spec.broadcaster,
            execution_mode: spec.execution_mode,
            stage: spec.stage,
            is_container: false,
            state: Mutex::new(DOState {
                status: DOStatus::Initialized,
                size: None,
                checksum_acc: Some(ChecksumAccumulator::new(spec.checksum_kind)),
                checksum_final: None,
                expected_size: spec.expected_size,
                open_fds: HashSet::new(),
                consumers: Vec::new(),
                immediate_consumers: Vec::new(),
                children: Vec::new(),
                parent: None,
            }),
        })
    }

    /// Builds a container DO: its content is the aggregate of its children, its `checksum`
    /// stays `None` forever, and its own completion is driven by every child reaching
    /// COMPLETED rather than by direct writes.
    pub fn new_container(
        oid: impl Into<String>,
        uid: impl Into<String>,
        broadcaster: Arc<dyn EventBus>,
        execution_mode: ExecutionMode,
        stage: Option<Arc<dyn Stage>>,
    ) -> Arc<Self> {
        Arc::new(DataObject {
            oid: oid.into(),
            uid: uid.into(),
            backend: Box::new(dfms_io::NullBackend::default()),
            broadcaster,
            execution_mode,
            stage,
            is_container: true,
            state: Mutex::new(DOState {
                status: DOStatus::Initialized,
                size: None,
                checksum_acc: None,
                checksum_final: None,
                expected_size: None,
                open_fds: HashSet::new(),
                consumers: Vec::new(),
                immediate_consumers: Vec::new(),
                children: Vec::new(),
                parent: None,
            }),
        })
    }

    pub fn oid(&self) -> &str {
        &self.oid
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn is_container(&self) -> bool {
        self.is_container
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    pub fn status(&self) -> DOStatus {
        self.state.lock_or_panic().status
    }

    pub fn size(&self) -> Option<u64> {
        self.state.lock_or_panic().size
    }

    pub fn checksum(&self) -> Option<u32> {
        self.state.lock_or_panic().checksum_final
    }

    pub fn is_being_read(&self) -> bool {
        !self.state.lock_or_panic().open_fds.is_empty()
    }

    pub fn children(&self) -> Vec<Arc<DataObject>> {
        self.state.lock_or_panic().children.clone()
    }

    pub fn parent(&self) -> Option<Arc<DataObject>> {
        self.state.lock_or_panic().parent.as_ref().and_then(Weak::upgrade)
    }

    fn fire_status_change(&self, old: DOStatus, new: DOStatus) {
        self.broadcaster.fire(Event::status_change(&self.uid, old, new));
    }

    fn invalid_transition(&self, from: DOStatus, attempted: &'static str) -> DfmsError {
        DfmsError::InvalidStateTransition {
            oid: self.oid.clone(),
            uid: self.uid.clone(),
            from,
            attempted,
        }
    }

    /// Accepts a write only in INITIALIZED/WRITING. Appends to the backend,
    /// updates `size` and `checksum`, transitions to WRITING on the first call, fires the
    /// `write` event, and delivers the bytes to every immediate consumer. Auto-completes if
    /// `expected_size` is reached.
    pub fn write(self: &Arc<Self>, bytes: &[u8]) -> Result<usize> {
        let (offset, was_initialized, auto_complete, immediate_consumers) = {
            let mut guard = self.state.lock_or_panic();
            if guard.status.is_terminal_for_writes() {
                return Err(self.invalid_transition(guard.status, "write"));
            }
            let was_initialized = guard.status == DOStatus::Initialized;
            let offset = guard.size.unwrap_or(0);
            let written = self.backend.write(bytes)?;
            guard.size = Some(offset + written as u64);
            if let Some(acc) = guard.checksum_acc.as_mut() {
                acc.update(bytes);
            }
            guard.status = DOStatus::Writing;
            let auto_complete =
                guard.expected_size.map(|expected| guard.size.unwrap_or(0) >= expected).unwrap_or(false);
            (offset, was_initialized, auto_complete, guard.immediate_consumers.clone())
        };

        if was_initialized {
            self.fire_status_change(DOStatus::Initialized, DOStatus::Writing);
        }
        self.broadcaster.fire(Event::write(&self.uid, offset, bytes.len()));

        for consumer in &immediate_consumers {
            if let Some(stage) = consumer.stage.clone() {
                if let Err(error) = stage.consume(consumer, bytes) {
                    tracing::warn!(uid = %consumer.uid, %error, "immediate consumer failed, cancelling it");
                    let _ = consumer.fail_with_execution_error(error.to_string());
                }
            }
        }

        if auto_complete {
            self.set_completed()?;
        }
        Ok(bytes.len())
    }

    /// Settable exactly once, and only while no write has ever passed through the DO. Lets a
    /// caller declare the final size when the data itself arrived out-of-band.
    pub fn set_size_out_of_band(&self, size: u64) -> Result<()> {
        let mut guard = self.state.lock_or_panic();
        if guard.size.is_some() {
            return Err(DfmsError::InvalidArgument(format!(
                "size for {} is already set (either by a prior write or a prior out-of-band set)",
                self.uid
            )));
        }
        guard.size = Some(size);
        guard.checksum_acc = None;
        guard.checksum_final = None;
        Ok(())
    }

    fn ensure_can_complete(&self, status: DOStatus) -> Result<()> {
        match status {
            DOStatus::Initialized | DOStatus::Writing => Ok(()),
            DOStatus::Completed | DOStatus::Expired | DOStatus::Cancelled => {
                Err(self.invalid_transition(status, "setCompleted"))
            }
        }
    }

    /// Transitions to COMPLETED. Fires `status-change(COMPLETED)`, signals every immediate
    /// consumer's `consumptionCompleted`, and (under `execution_mode == Do`) invokes every
    /// deferred consumer's `consume` in subscription order. A container instead derives `size`
    /// from its children and leaves `checksum` unset.
    ///
    /// Rejects a DO that is already COMPLETED/EXPIRED/CANCELLED. A caller that wants
    /// at-least-once tolerance for a remote, repeated completion should check `status()` first
    /// rather than rely on this method to absorb the duplicate.
    pub fn set_completed(self: &Arc<Self>) -> Result<()> {
        let (old_status, consumers, immediate_consumers) = {
            let mut guard = self.state.lock_or_panic();
            self.ensure_can_complete(guard.status)?;
            let old = guard.status;
            guard.status = DOStatus::Completed;
            if self.is_container {
                let total: u64 = guard.children.iter().filter_map(|c| c.size()).sum();
                guard.size = Some(total);
                guard.checksum_final = None;
            } else {
                if let Some(acc) = guard.checksum_acc.take() {
                    guard.checksum_final = Some(acc.value());
                }
                if guard.size.is_none() {
                    guard.size = Some(self.backend.size());
                }
            }
            (old, guard.consumers.clone(), guard.immediate_consumers.clone())
        };

        self.fire_status_change(old_status, DOStatus::Completed);
        self.broadcaster.fire(Event::content_available(&self.uid));

        for consumer in &immediate_consumers {
            if let Some(stage) = consumer.stage.clone() {
                if let Err(error) = stage.consumption_completed(consumer) {
                    tracing::warn!(uid = %consumer.uid, %error, "immediate consumer failed on completion, cancelling it");
                    let _ = consumer.fail_with_execution_error(error.to_string());
                }
            }
        }

        if self.execution_mode == ExecutionMode::Do {
            for consumer in &consumers {
                if let Err(error) = consumer.consume(self) {
                    tracing::warn!(uid = %consumer.uid, %error, "deferred consumer failed");
                }
            }
        }

        Ok(())
    }

    /// Invoked explicitly by an external driver when `execution_mode == External`. Identical to
    /// the `Do`-mode automatic path otherwise.
    pub fn consume(self: &Arc<Self>, producer: &Arc<DataObject>) -> Result<()> {
        let token = producer.open()?;
        let handle = ProducerHandle::new(producer, token);
        let outcome = match self.stage.clone() {
            Some(stage) => stage.run(&handle, self),
            None => Ok(()),
        };
        producer.close(token)?;

        if let Err(error) = outcome {
            let reason = error.to_string();
            let _ = self.fail_with_execution_error(reason.clone());
            return Err(DfmsError::ExecutionFailed { uid: self.uid.clone(), reason });
        }
        Ok(())
    }

    /// Records an application consumer's failed `run`/`consume` as CANCELLED and propagates
    /// that status downstream.
    fn fail_with_execution_error(self: &Arc<Self>, _reason: String) -> Result<()> {
        self.terminate(DOStatus::Cancelled)
    }

    /// Valid only in COMPLETED; returns an opaque read token tracked in `open_fds`.
    pub fn open(&self) -> Result<ReadToken> {
        let mut guard = self.state.lock_or_panic();
        if guard.status != DOStatus::Completed {
            return Err(self.invalid_transition(guard.status, "open"));
        }
        let token = self.backend.open()?;
        guard.open_fds.insert(token);
        Ok(token)
    }

    /// Valid only with an open token; returns up to `max_len` bytes, or everything remaining
    /// when `max_len` is `None`.
    pub fn read(&self, token: ReadToken, max_len: Option<usize>) -> Result<Vec<u8>> {
        {
            let guard = self.state.lock_or_panic();
            if guard.status != DOStatus::Completed {
                return Err(self.invalid_transition(guard.status, "read"));
            }
            if !guard.open_fds.contains(&token) {
                return Err(DfmsError::InvalidArgument(format!("unknown read token {token} on {}", self.uid)));
            }
        }
        self.backend.read(token, max_len)
    }

    /// Releases a token; unknown tokens fail.
    pub fn close(&self, token: ReadToken) -> Result<()> {
        {
            let mut guard = self.state.lock_or_panic();
            if !guard.open_fds.remove(&token) {
                return Err(DfmsError::InvalidArgument(format!("unknown read token {token} on {}", self.uid)));
            }
        }
        self.backend.close(token)
    }

    /// Adds to the deferred consumer set; fails if `consumer` is already an immediate consumer.
    /// A DO's deferred and immediate consumer sets are always disjoint.
    pub fn add_consumer(&self, consumer: Arc<DataObject>) -> Result<()> {
        let mut guard = self.state.lock_or_panic();
        if guard.immediate_consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            return Err(DfmsError::InvalidArgument(format!(
                "{} is already an immediate consumer of {}, cannot also be a deferred consumer",
                consumer.uid, self.uid
            )));
        }
        if !guard.consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            guard.consumers.push(consumer);
        }
        Ok(())
    }

    /// Adds to the immediate consumer set; fails if `consumer` is already a deferred consumer.
    pub fn add_immediate_consumer(&self, consumer: Arc<DataObject>) -> Result<()> {
        let mut guard = self.state.lock_or_panic();
        if guard.consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            return Err(DfmsError::InvalidArgument(format!(
                "{} is already a deferred consumer of {}, cannot also be an immediate consumer",
                consumer.uid, self.uid
            )));
        }
        if !guard.immediate_consumers.iter().any(|c| Arc::ptr_eq(c, &consumer)) {
            guard.immediate_consumers.push(consumer);
        }
        Ok(())
    }

    fn set_parent(self: &Arc<Self>, parent: &Arc<DataObject>) {
        self.state.lock_or_panic().parent = Some(Arc::downgrade(parent));
    }

    /// Adds `child` to this container and wires the container as a listener on the child's
    /// `status-change`. Once every child is COMPLETED, the container transitions to COMPLETED
    /// too.
    pub fn add_child(self: &Arc<Self>, child: Arc<DataObject>) -> Result<()> {
        if !self.is_container {
            return Err(DfmsError::InvalidArgument(format!("{} is not a container", self.uid)));
        }
        child.set_parent(self);
        self.state.lock_or_panic().children.push(Arc::clone(&child));

        let container = Arc::clone(self);
        let handler: Arc<dyn Handler> = Arc::new(move |event: &Event| {
            if event.kind() != EventKind::StatusChange {
                return;
            }
            if let EventPayload::StatusChange { new, .. } = event.payload {
                if new == DOStatus::Completed {
                    container.on_child_completed();
                }
            }
        });
        self.broadcaster.subscribe(&child.uid, EventKind::StatusChange, handler);
        Ok(())
    }

    fn on_child_completed(self: &Arc<Self>) {
        let all_completed = {
            let guard = self.state.lock_or_panic();
            !guard.children.is_empty() && guard.children.iter().all(|c| c.status() == DOStatus::Completed)
        };
        if all_completed && self.status() != DOStatus::Completed {
            if let Err(error) = self.set_completed() {
                tracing::warn!(uid = %self.uid, %error, "container failed to auto-complete after all children completed");
            }
        }
    }

    /// Terminal, mutually exclusive with further `setCompleted`. Propagates to every consumer
    /// of this DO without invoking their `run`.
    pub fn cancel(self: &Arc<Self>) -> Result<()> {
        self.terminate(DOStatus::Cancelled)
    }

    /// Terminal; valid only from COMPLETED.
    pub fn expire(self: &Arc<Self>) -> Result<()> {
        self.terminate(DOStatus::Expired)
    }

    fn terminate(self: &Arc<Self>, target: DOStatus) -> Result<()> {
        let (old, consumers, immediate_consumers) = {
            let mut guard = self.state.lock_or_panic();
            if matches!(guard.status, DOStatus::Expired | DOStatus::Cancelled) {
                return Err(self.invalid_transition(guard.status, "terminate"));
            }
            if target == DOStatus::Expired && guard.status != DOStatus::Completed {
                return Err(self.invalid_transition(guard.status, "expire"));
            }
            let old = guard.status;
            guard.status = target;
            (old, guard.consumers.clone(), guard.immediate_consumers.clone())
        };
        self.fire_status_change(old, target);

        if target == DOStatus::Cancelled {
            for consumer in consumers.iter().chain(immediate_consumers.iter()) {
                let _ = consumer.cancel();
            }
        }
        Ok(())
    }
}
