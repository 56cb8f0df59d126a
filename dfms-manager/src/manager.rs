// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Node Manager itself: a per-process registry of sessions, each holding a
//! graph of [`DataObject`]s, plus the stage registry and backend wiring graph descriptors are
//! resolved against.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};

use dfms_common::{ChecksumKind, DfmsError, ExecutionMode, MutexExt, Result};
use dfms_core::{DataObject, DataObjectSpec};
use dfms_events::{EventBus, LocalEventBroadcaster, ThreadedEventBroadcaster};
use dfms_io::{Backend, FileBackend, MemoryBackend, NullBackend, SocketListenerBackend};
use dfms_rpc::{BackendKind, DoSpec, EdgeKind, EdgeSpec, GraphSpec, StatusMap};

use crate::session::Session;
use crate::stage_registry::StageRegistry;

/// Which [`EventBus`] implementation new sessions are given: `Local` delivers
/// synchronously on the firing thread, `Threaded` hands off to one dedicated worker per
/// session's broadcaster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcasterMode {
    Local,
    Threaded,
}

/// Owns every session on this process and the stage registry its graphs are resolved against.
pub struct NodeManager {
    sessions: Mutex<HashMap<String, Session>>,
    stage_registry: Arc<StageRegistry>,
    broadcaster_mode: BroadcasterMode,
    data_root: PathBuf,
}

impl NodeManager {
    pub fn new(stage_registry: Arc<StageRegistry>, broadcaster_mode: BroadcasterMode, data_root: PathBuf) -> Self {
        NodeManager { sessions: Mutex::new(HashMap::new()), stage_registry, broadcaster_mode, data_root }
    }

    fn new_broadcaster(&self) -> Arc<dyn EventBus> {
        match self.broadcaster_mode {
            BroadcasterMode::Local => Arc::new(LocalEventBroadcaster::new()),
            BroadcasterMode::Threaded => Arc::new(ThreadedEventBroadcaster::new()),
        }
    }

    pub fn create_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        if sessions.contains_key(session_id) {
            return Err(DfmsError::InvalidArgument(format!("session {session_id} already exists")));
        }
        sessions.insert(session_id.to_string(), Session::new(self.new_broadcaster()));
        Ok(())
    }

    pub fn destroy_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        sessions
            .remove(session_id)
            .map(|_| ())
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))
    }

    pub fn add_graph_spec(&self, session_id: &str, graph: GraphSpec) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        if session.deployed {
            return Err(DfmsError::InvalidArgument(format!("session {session_id} is already deployed")));
        }

        for do_spec in graph.dos {
            match session.dos.get(&do_spec.uid) {
                Some(existing) if existing == &do_spec => {}
                Some(_) => {
                    return Err(DfmsError::InvalidArgument(format!(
                        "uid {} already named by a different DO spec in session {session_id}",
                        do_spec.uid
                    )));
                }
                None => {
                    session.dos_order.push(do_spec.uid.clone());
                    session.dos.insert(do_spec.uid.clone(), do_spec);
                }
            }
        }

        for edge in graph.edges {
            if !session.edges.iter().any(|e| {
                e.producer_uid == edge.producer_uid && e.consumer_uid == edge.consumer_uid && e.kind == edge.kind
            }) {
                session.edges.push(edge);
            }
        }

        Ok(())
    }

    /// Instantiates every DO named in the session's accumulated graph and wires their edges.
    /// Rejects a cycle among deferred-consumer (`Consumer`-kind) edges before constructing
    /// anything, so a rejected deploy never leaves the session partially wired.
    pub fn deploy(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        if session.deployed {
            return Ok(());
        }

        for edge in &session.edges {
            if !session.dos.contains_key(&edge.producer_uid) {
                return Err(DfmsError::InvalidArgument(format!("edge refers to unknown uid {}", edge.producer_uid)));
            }
            if !session.dos.contains_key(&edge.consumer_uid) {
                return Err(DfmsError::InvalidArgument(format!("edge refers to unknown uid {}", edge.consumer_uid)));
            }
        }

        detect_consumer_cycle(&session.edges)?;

        let mut objects: HashMap<String, Arc<DataObject>> = HashMap::new();
        for uid in &session.dos_order {
            let do_spec = &session.dos[uid];
            let object = self.build_data_object(session_id, do_spec, &session.broadcaster)?;
            objects.insert(uid.clone(), object);
        }

        for edge in &session.edges {
            let producer = Arc::clone(&objects[&edge.producer_uid]);
            let consumer = Arc::clone(&objects[&edge.consumer_uid]);
            match edge.kind {
                EdgeKind::Consumer => producer.add_consumer(consumer)?,
                EdgeKind::Immediate => producer.add_immediate_consumer(consumer)?,
                EdgeKind::Child => producer.add_child(consumer)?,
            }
        }

        session.objects = objects;
        session.deployed = true;
        Ok(())
    }

    fn build_data_object(
        &self,
        session_id: &str,
        spec: &DoSpec,
        broadcaster: &Arc<dyn EventBus>,
    ) -> Result<Arc<DataObject>> {
        let mode = if spec.execution_mode_external { ExecutionMode::External } else { ExecutionMode::Do };
        let stage = match &spec.stage {
            Some(name) => Some(self.stage_registry.create(name, &spec.options)?),
            None => None,
        };

        if spec.is_container {
            return Ok(DataObject::new_container(spec.oid.clone(), spec.uid.clone(), Arc::clone(broadcaster), mode, stage));
        }

        let (backend, socket_target) = self.build_backend(session_id, spec)?;
        let object = DataObject::new(DataObjectSpec {
            oid: spec.oid.clone(),
            uid: spec.uid.clone(),
            backend,
            broadcaster: Arc::clone(broadcaster),
            checksum_kind: ChecksumKind::default(),
            expected_size: spec.expected_size,
            execution_mode: mode,
            stage,
        });
        // The socket backend's `on_write`/`on_closed` callbacks were created before this DO
        // existed; hand them a weak reference now, before the listener's background task can
        // possibly have accepted a connection and started calling them.
        if let Some(target) = socket_target {
            *target.lock_or_panic() = Some(Arc::downgrade(&object));
        }
        Ok(object)
    }

    fn build_backend(
        &self,
        session_id: &str,
        spec: &DoSpec,
    ) -> Result<(Box<dyn Backend>, Option<Arc<Mutex<Option<Weak<DataObject>>>>>)> {
        match &spec.backend {
            BackendKind::Memory => Ok((Box::new(MemoryBackend::new(spec.expected_size)), None)),
            BackendKind::Null => Ok((Box::new(NullBackend::default()), None)),
            BackendKind::File => {
                let dir = self.data_root.join(session_id);
                Ok((Box::new(FileBackend::new(&dir, &spec.oid, &spec.uid)?), None))
            }
            BackendKind::Socket { host, port } => {
                let addr = format!("{host}:{port}")
                    .parse()
                    .map_err(|_| DfmsError::InvalidArgument(format!("invalid socket address {host}:{port}")))?;
                // `on_write`/`on_closed` must reach the DataObject this backend ends up inside,
                // but that DataObject cannot exist until after the backend does. Both closures
                // instead call through a cell the caller populates with a weak reference right
                // after constructing the DataObject.
                let pending: Arc<Mutex<Option<Weak<DataObject>>>> = Arc::new(Mutex::new(None));

                let on_write_pending = Arc::clone(&pending);
                let on_write: Arc<dyn Fn(&[u8]) + Send + Sync> = Arc::new(move |bytes: &[u8]| {
                    if let Some(object) = on_write_pending.lock_or_panic().as_ref().and_then(Weak::upgrade) {
                        if let Err(error) = object.write(bytes) {
                            tracing::warn!(%error, "socket-fed write rejected by DO");
                        }
                    }
                });

                let on_closed_pending = Arc::clone(&pending);
                let on_closed: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
                    if let Some(object) = on_closed_pending.lock_or_panic().as_ref().and_then(Weak::upgrade) {
                        if let Err(error) = object.set_completed() {
                            tracing::warn!(%error, "socket close could not complete DO");
                        }
                    }
                });

                let backend = SocketListenerBackend::bind(addr, spec.uid.clone(), on_write, on_closed)?;
                Ok((Box::new(backend), Some(pending)))
            }
        }
    }

    pub fn trigger(&self, session_id: &str, uid: &str, bytes: &[u8]) -> Result<()> {
        self.with_object(session_id, uid, |object| object.write(bytes).map(|_| ()))
    }

    pub fn set_completed(&self, session_id: &str, uid: &str) -> Result<()> {
        self.with_object(session_id, uid, |object| object.set_completed())
    }

    /// Remote-tolerant completion: a proxy consumer's `Fanout::deliver_completed` may be
    /// retried after a network hiccup, so a DO that is already COMPLETED is treated as success
    /// rather than an error.
    pub fn set_completed_tolerant(&self, session_id: &str, uid: &str) -> Result<()> {
        self.with_object(session_id, uid, |object| {
            if object.status() == dfms_common::DOStatus::Completed {
                Ok(())
            } else {
                object.set_completed()
            }
        })
    }

    pub fn cancel(&self, session_id: &str, uid: &str) -> Result<()> {
        self.with_object(session_id, uid, |object| object.cancel())
    }

    pub fn get_status(&self, session_id: &str) -> Result<StatusMap> {
        let sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        Ok(session.objects.iter().map(|(uid, object)| (uid.clone(), object.status() as u8)).collect())
    }

    /// Best-effort: drops every session this process owns. A Composite Manager fans this call
    /// out to every child it knows about.
    pub fn shutdown(&self) -> Result<()> {
        self.sessions.lock_or_panic().clear();
        Ok(())
    }

    /// Reads the full content of a COMPLETED DO. Not part of the `NodeControl` RPC surface
    /// (content only ever moves along graph edges or an out-of-band socket), but a manager
    /// still needs this internally to serve a proxy consumer's first read of a cross-manager
    /// producer, and it is the natural way for a caller in the same process to retrieve a
    /// result DO's bytes once a graph finishes running.
    pub fn read_all(&self, session_id: &str, uid: &str) -> Result<Vec<u8>> {
        let sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        let object = session
            .objects
            .get(uid)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such DO {uid} in session {session_id}")))?;
        let token = object.open()?;
        let bytes = object.read(token, None)?;
        object.close(token)?;
        Ok(bytes)
    }

    fn with_object<F>(&self, session_id: &str, uid: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Arc<DataObject>) -> Result<()>,
    {
        let sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        let object = session
            .objects
            .get(uid)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such DO {uid} in session {session_id}")))?;
        f(object)
    }
}

fn detect_consumer_cycle(edges: &[EdgeSpec]) -> Result<()> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        if edge.kind == EdgeKind::Consumer {
            adjacency.entry(edge.producer_uid.as_str()).or_default().push(edge.consumer_uid.as_str());
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        InProgress,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        node: &'a str,
        adjacency: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<()> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(DfmsError::InvalidArgument(format!(
                    "deploy would create a cycle among deferred-consumer edges at {node}"
                )));
            }
            None => {}
        }
        marks.insert(node, Mark::InProgress);
        if let Some(next) = adjacency.get(node) {
            for &child in next {
                visit(child, adjacency, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for &node in adjacency.keys() {
        visit(node, &adjacency, &mut marks)?;
    }
    Ok(())
}
