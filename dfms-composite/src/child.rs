// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One child manager as seen by a Composite Manager: its address and the liveness state health
//! checks are run against. Every `NodeControl` call connects fresh rather than holding a
//! persistent client, so a child that is unreachable at construction never fails
//! [`CompositeManager::connect`] outright; an unreachable child only fails a deploy of specs
//! that reference it, not deploys that don't. Only an actual call against that child, or the
//! explicit health probe, observes the failure.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use dfms_common::{DfmsError, Result};
use dfms_rpc::service::NodeControlClient;
use dfms_rpc::transport::{call_with_timeout, client_config, connect_transport, probe_reachable};
use tarpc::context;

pub struct ChildHandle {
    name: String,
    addr: SocketAddr,
    reachable: AtomicBool,
}

impl ChildHandle {
    /// Probes `addr` once, with a bounded timeout, but never fails. An unreachable child is
    /// recorded, not rejected.
    pub async fn connect(name: impl Into<String>, addr: SocketAddr) -> std::io::Result<Self> {
        let reachable = probe_reachable(addr).await;
        Ok(ChildHandle { name: name.into(), addr, reachable: AtomicBool::new(reachable) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::Relaxed)
    }

    /// Re-probes this child and records the result. Called before a deploy targets it, so a
    /// child that died between construction and deploy is still caught.
    pub async fn ensure_reachable(&self) -> Result<()> {
        let reachable = probe_reachable(self.addr).await;
        self.reachable.store(reachable, Ordering::Relaxed);
        if reachable {
            Ok(())
        } else {
            Err(DfmsError::RemoteUnavailable { name: self.name.clone(), reason: "health probe failed".to_string() })
        }
    }

    async fn client(&self) -> Result<NodeControlClient> {
        let transport = connect_transport(self.addr)
            .await
            .map_err(|error| DfmsError::RemoteUnavailable { name: self.name.clone(), reason: error.to_string() })?;
        Ok(NodeControlClient::new(client_config(), transport).spawn())
    }

    fn unavailable(&self, error: impl ToString) -> DfmsError {
        DfmsError::RemoteUnavailable { name: self.name.clone(), reason: error.to_string() }
    }

    pub async fn create_session(&self, session_id: &str) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.create_session(context::current(), session_id.to_string()))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn destroy_session(&self, session_id: &str) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.destroy_session(context::current(), session_id.to_string()))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn add_graph_spec(&self, session_id: &str, graph: dfms_rpc::GraphSpec) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.add_graph_spec(context::current(), session_id.to_string(), graph))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn deploy(&self, session_id: &str) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.deploy(context::current(), session_id.to_string()))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn trigger(&self, session_id: &str, uid: &str, bytes: Vec<u8>) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.trigger(context::current(), session_id.to_string(), uid.to_string(), bytes))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn set_completed(&self, session_id: &str, uid: &str) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.set_completed(context::current(), session_id.to_string(), uid.to_string()))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn get_status(&self, session_id: &str) -> Result<dfms_rpc::StatusMap> {
        let client = self.client().await?;
        call_with_timeout(client.get_status(context::current(), session_id.to_string()))
            .await
            .map_err(|e| self.unavailable(e))?
            .map_err(|e| self.unavailable(e))
    }

    pub async fn shutdown(&self) -> Result<()> {
        let client = self.client().await?;
        call_with_timeout(client.shutdown(context::current())).await.map_err(|e| self.unavailable(e))?.map_err(
            |e| self.unavailable(e),
        )
    }
}
