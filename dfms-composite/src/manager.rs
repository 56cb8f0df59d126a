// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Composite Manager itself: partitions a graph spec by each DO's `node`
//! attribute, forwards each partition to the named child, and wires cross-manager edges by
//! installing a [`ProxyForwardStage`] on the producer's side of the edge.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use dfms_common::{DfmsError, MutexExt, Result};
use dfms_rpc::{BackendKind, DoSpec, EdgeKind, EdgeSpec, GraphSpec, StatusMap};

use crate::child::ChildHandle;
use crate::proxy::ProxyForwardStage;

/// Graph state accumulated for one session before `deploy` partitions and forwards it.
struct CompositeSession {
    dos: HashMap<String, DoSpec>,
    edges: Vec<EdgeSpec>,
    deployed: bool,
    /// Which child owns each uid, populated at deploy time and consulted by `trigger` /
    /// `set_completed` afterwards.
    owner: HashMap<String, String>,
}

impl CompositeSession {
    fn new() -> Self {
        CompositeSession { dos: HashMap::new(), edges: Vec::new(), deployed: false, owner: HashMap::new() }
    }
}

/// Fans session and graph operations out across a fixed set of child managers, reached by name.
pub struct CompositeManager {
    children: HashMap<String, ChildHandle>,
    sessions: Mutex<HashMap<String, CompositeSession>>,
}

impl CompositeManager {
    /// Connects to (and health-probes) every child up front. A child that is unreachable at
    /// construction is kept in the map. It only fails a `deploy` that actually targets it,
    /// rather than failing the whole composite manager's construction.
    pub async fn connect(children: Vec<(String, SocketAddr)>) -> std::io::Result<Self> {
        let mut map = HashMap::new();
        for (name, addr) in children {
            let handle = ChildHandle::connect(name.clone(), addr).await?;
            map.insert(name, handle);
        }
        Ok(CompositeManager { children: map, sessions: Mutex::new(HashMap::new()) })
    }

    pub fn child(&self, name: &str) -> Option<&ChildHandle> {
        self.children.get(name)
    }

    pub fn create_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        if sessions.contains_key(session_id) {
            return Err(DfmsError::InvalidArgument(format!("session {session_id} already exists")));
        }
        sessions.insert(session_id.to_string(), CompositeSession::new());
        Ok(())
    }

    pub async fn destroy_session(&self, session_id: &str) -> Result<()> {
        let owners: Vec<String> = {
            let mut sessions = self.sessions.lock_or_panic();
            let session = sessions
                .remove(session_id)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
            let mut names: Vec<String> = session.owner.values().cloned().collect();
            names.sort();
            names.dedup();
            names
        };
        for name in owners {
            if let Some(child) = self.children.get(&name) {
                if let Err(error) = child.destroy_session(session_id).await {
                    tracing::warn!(child = %name, %error, "destroy_session on child failed");
                }
            }
        }
        Ok(())
    }

    /// Merges `graph` into the session's accumulated spec, same idempotent duplicate-uid /
    /// duplicate-edge rules as a Node Manager applies.
    pub fn add_graph_spec(&self, session_id: &str, graph: GraphSpec) -> Result<()> {
        let mut sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        if session.deployed {
            return Err(DfmsError::InvalidArgument(format!("session {session_id} is already deployed")));
        }

        for do_spec in graph.dos {
            if do_spec.node.is_none() {
                return Err(DfmsError::InvalidArgument(format!(
                    "DO {} has no node assignment; a composite manager requires one",
                    do_spec.uid
                )));
            }
            match session.dos.get(&do_spec.uid) {
                Some(existing) if existing == &do_spec => {}
                Some(_) => {
                    return Err(DfmsError::InvalidArgument(format!(
                        "uid {} already named by a different DO spec in session {session_id}",
                        do_spec.uid
                    )));
                }
                None => {
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

    /// Partitions the session's accumulated graph by node, synthesizes a [`ProxyForwardStage`]
    /// DO on the producer side of every cross-manager edge, then deploys each referenced child
    /// exactly once. Idempotent once deployed, matching a Node Manager's own `deploy`.
    pub async fn deploy(&self, session_id: &str) -> Result<()> {
        let (dos, edges, already_deployed) = {
            let sessions = self.sessions.lock_or_panic();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
            (session.dos.clone(), session.edges.clone(), session.deployed)
        };
        if already_deployed {
            return Ok(());
        }

        for edge in &edges {
            if !dos.contains_key(&edge.producer_uid) {
                return Err(DfmsError::InvalidArgument(format!("edge refers to unknown uid {}", edge.producer_uid)));
            }
            if !dos.contains_key(&edge.consumer_uid) {
                return Err(DfmsError::InvalidArgument(format!("edge refers to unknown uid {}", edge.consumer_uid)));
            }
        }

        let mut partitions: HashMap<String, GraphSpec> = HashMap::new();
        for do_spec in dos.values() {
            let node = do_spec.node.clone().expect("validated non-None in add_graph_spec");
            partitions.entry(node).or_default().dos.push(do_spec.clone());
        }

        let mut owner: HashMap<String, String> = HashMap::new();
        for do_spec in dos.values() {
            owner.insert(do_spec.uid.clone(), do_spec.node.clone().expect("validated non-None"));
        }

        let mut proxy_counter = 0usize;
        for edge in &edges {
            let producer_node = &owner[&edge.producer_uid];
            let consumer_node = &owner[&edge.consumer_uid];
            if producer_node == consumer_node {
                partitions.get_mut(producer_node).expect("partition created above").edges.push(edge.clone());
                continue;
            }
            if edge.kind == EdgeKind::Child {
                return Err(DfmsError::InvalidArgument(format!(
                    "child edge {} -> {} crosses a manager boundary; containers cannot split across nodes",
                    edge.producer_uid, edge.consumer_uid
                )));
            }

            let consumer_addr = self
                .children
                .get(consumer_node)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("no such child manager {consumer_node}")))?
                .addr();
            let fanout_addr = dfms_rpc::transport::fanout_addr(consumer_addr);
            proxy_counter += 1;
            let proxy_uid = format!("__proxy_{session_id}_{proxy_counter}_{}", edge.consumer_uid);
            let mut options = HashMap::new();
            options.insert("host".to_string(), fanout_addr.ip().to_string());
            options.insert("port".to_string(), fanout_addr.port().to_string());
            options.insert("session_id".to_string(), session_id.to_string());
            options.insert("uid".to_string(), edge.consumer_uid.clone());
            let proxy_spec = DoSpec {
                oid: proxy_uid.clone(),
                uid: proxy_uid.clone(),
                backend: BackendKind::Null,
                node: Some(producer_node.clone()),
                stage: Some(crate::proxy::PROXY_FORWARD_STAGE.to_string()),
                is_container: false,
                expected_size: None,
                execution_mode_external: false,
                options,
            };
            let producer_partition = partitions.get_mut(producer_node).expect("partition created above");
            producer_partition.dos.push(proxy_spec);
            producer_partition
                .edges
                .push(EdgeSpec { producer_uid: edge.producer_uid.clone(), consumer_uid: proxy_uid, kind: edge.kind });
        }

        for (name, graph) in &partitions {
            let child = self
                .children
                .get(name)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("no such child manager {name}")))?;
            child.ensure_reachable().await?;
            child.create_session(session_id).await?;
            child.add_graph_spec(session_id, graph.clone()).await?;
            child.deploy(session_id).await?;
        }

        let mut sessions = self.sessions.lock_or_panic();
        let session = sessions.get_mut(session_id).expect("session still present");
        session.owner = owner;
        session.deployed = true;
        Ok(())
    }

    pub async fn trigger(&self, session_id: &str, uid: &str, bytes: &[u8]) -> Result<()> {
        let child = self.owning_child(session_id, uid)?;
        child.trigger(session_id, uid, bytes.to_vec()).await
    }

    pub async fn set_completed(&self, session_id: &str, uid: &str) -> Result<()> {
        let child = self.owning_child(session_id, uid)?;
        child.set_completed(session_id, uid).await
    }

    /// Merges every referenced child's status map for this session. A child that has gone
    /// unreachable since deploy is simply omitted rather than failing the whole query.
    pub async fn get_status(&self, session_id: &str) -> Result<StatusMap> {
        let names: Vec<String> = {
            let sessions = self.sessions.lock_or_panic();
            let session = sessions
                .get(session_id)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
            let mut names: Vec<String> = session.owner.values().cloned().collect();
            names.sort();
            names.dedup();
            names
        };

        let mut merged = StatusMap::new();
        for name in names {
            let Some(child) = self.children.get(&name) else { continue };
            match child.get_status(session_id).await {
                Ok(partial) => merged.extend(partial),
                Err(error) => tracing::warn!(child = %name, %error, "get_status on child failed"),
            }
        }
        Ok(merged)
    }

    /// Best-effort fan-out: every child is asked to shut down; failures are logged, never
    /// returned, since a composite shutdown must not hang or fail on one unreachable child.
    pub async fn shutdown(&self) -> Result<()> {
        for child in self.children.values() {
            if let Err(error) = child.shutdown().await {
                tracing::warn!(child = child.name(), %error, "shutdown on child failed");
            }
        }
        Ok(())
    }

    pub fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn owning_child(&self, session_id: &str, uid: &str) -> Result<&ChildHandle> {
        let sessions = self.sessions.lock_or_panic();
        let session = sessions
            .get(session_id)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such session {session_id}")))?;
        let node = session
            .owner
            .get(uid)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no such DO {uid} in session {session_id}")))?;
        self.children.get(node).ok_or_else(|| DfmsError::InvalidArgument(format!("no such child manager {node}")))
    }
}
