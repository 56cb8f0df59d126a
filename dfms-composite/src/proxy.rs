// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The producer-side half of a cross-manager edge: a [`Stage`] that, wired
//! as an ordinary consumer of a local producer, forwards every write and the final completion to
//! a [`Fanout`] endpoint on whichever child manager actually hosts the real consumer. The DO it
//! is attached to is otherwise an unremarkable Null-backed DO; its own content is never read by
//! anything, only its `Stage` behavior matters.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use dfms_common::{DfmsError, Result};
use dfms_core::{DataObject, ProducerHandle, Stage};
use dfms_manager::StageRegistry;
use dfms_rpc::service::FanoutClient;
use dfms_rpc::transport::{call_with_timeout, client_config, connect_transport};
use dfms_rpc::CallbackUri;
use tarpc::context;

/// Name a synthesized proxy `DoSpec` carries in its `stage` field; its `options` map carries
/// `host`, `port`, `session_id` and `uid` describing the remote [`CallbackUri`] to forward to.
pub const PROXY_FORWARD_STAGE: &str = "composite_proxy_forward";

/// Registers [`PROXY_FORWARD_STAGE`] into a Node Manager's stage registry, so it can host the
/// producer side of a cross-manager edge a Composite Manager wires at deploy time. A process
/// that only ever runs as a leaf Node Manager has no reason to call this.
pub fn register_proxy_stage(registry: &mut StageRegistry) {
    registry.register(PROXY_FORWARD_STAGE, |options: &HashMap<String, String>| {
        let host = options
            .get("host")
            .ok_or_else(|| DfmsError::InvalidArgument("composite_proxy_forward requires a host option".to_string()))?
            .clone();
        let port: u16 = options
            .get("port")
            .ok_or_else(|| DfmsError::InvalidArgument("composite_proxy_forward requires a port option".to_string()))?
            .parse()
            .map_err(|_| DfmsError::InvalidArgument("composite_proxy_forward port option is not a u16".to_string()))?;
        let session_id = options
            .get("session_id")
            .ok_or_else(|| {
                DfmsError::InvalidArgument("composite_proxy_forward requires a session_id option".to_string())
            })?
            .clone();
        let uid = options
            .get("uid")
            .ok_or_else(|| DfmsError::InvalidArgument("composite_proxy_forward requires a uid option".to_string()))?
            .clone();
        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|_| DfmsError::InvalidArgument(format!("invalid composite_proxy_forward address {host}:{port}")))?;
        let target = CallbackUri::new(host, port, session_id, uid);
        Ok(Arc::new(ProxyForwardStage::new(addr, target)) as Arc<dyn Stage>)
    });
}

/// Forwards writes and completion for one cross-manager edge. `target` identifies the remote
/// DO; `addr` is the `Fanout` endpoint of the manager hosting it (the consumer's own manager,
/// resolved by the Composite Manager from its partition of the graph). A fresh connection is
/// opened per call rather than cached, keeping this stage free of any shared mutable connection
/// state. A cross-manager edge fires rarely enough next to the cost of a graph run that the
/// extra handshake is not worth the complexity of reconnect-on-failure bookkeeping.
pub struct ProxyForwardStage {
    addr: SocketAddr,
    target: CallbackUri,
}

impl ProxyForwardStage {
    pub fn new(addr: SocketAddr, target: CallbackUri) -> Self {
        ProxyForwardStage { addr, target }
    }

    /// Bridges a synchronous `Stage` callback onto the async `Fanout` client. Valid only when
    /// called from a thread already driven by a multi-threaded tokio runtime, which holds for
    /// every call site here: a proxy DO's consumer callbacks only ever fire from within a
    /// `NodeControl`/`Fanout` request handler.
    fn call_fanout<F, Fut>(&self, body: F) -> Result<()>
    where
        F: FnOnce(FanoutClient) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async {
                let transport = connect_transport(self.addr).await.map_err(|error| DfmsError::RemoteUnavailable {
                    name: self.target.addr(),
                    reason: error.to_string(),
                })?;
                let client = FanoutClient::new(client_config(), transport).spawn();
                body(client).await
            })
        })
    }

    fn forward_write(&self, bytes: Vec<u8>) -> Result<()> {
        let target = self.target.clone();
        self.call_fanout(move |client| async move {
            call_with_timeout(client.deliver_write(context::current(), target, bytes))
                .await
                .map_err(|error| DfmsError::RemoteUnavailable { name: "fanout".to_string(), reason: error.to_string() })?
                .map_err(|error| DfmsError::RemoteUnavailable { name: "fanout".to_string(), reason: error.to_string() })
        })
    }

    fn forward_completed(&self) -> Result<()> {
        let target = self.target.clone();
        self.call_fanout(move |client| async move {
            call_with_timeout(client.deliver_completed(context::current(), target))
                .await
                .map_err(|error| DfmsError::RemoteUnavailable { name: "fanout".to_string(), reason: error.to_string() })?
                .map_err(|error| DfmsError::RemoteUnavailable { name: "fanout".to_string(), reason: error.to_string() })
        })
    }
}

impl Stage for ProxyForwardStage {
    /// Deferred-consumer path (edge kind `Consumer`): the whole producer is read once it
    /// completes and forwarded as a single write, then the completion signal follows.
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let bytes = producer.read_all()?;
        self.forward_write(bytes)?;
        self.forward_completed()?;
        this.set_completed()
    }

    /// Immediate-consumer path (edge kind `Immediate`): every write is forwarded as it happens.
    fn consume(&self, _this: &Arc<DataObject>, bytes: &[u8]) -> Result<()> {
        self.forward_write(bytes.to_vec())
    }

    fn consumption_completed(&self, this: &Arc<DataObject>) -> Result<()> {
        self.forward_completed()?;
        this.set_completed()
    }
}
