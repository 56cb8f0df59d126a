// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Adapts [`NodeManager`] onto the `dfms-rpc` `NodeControl`/`Fanout` tarpc service
//! definitions, so the same operations this crate exposes in-process are reachable over the
//! network for a Composite Manager.

use std::sync::Arc;

use tarpc::context::Context;

use dfms_rpc::types::{CallbackUri, GraphSpec, RpcResult, StatusMap};
use dfms_rpc::{Fanout, NodeControl};

use crate::manager::NodeManager;

/// `NodeControl` surface backed by an in-process [`NodeManager`]. Cloned once per accepted
/// connection (tarpc requires its service handlers to be `Clone` and own `self`), so the clone
/// is cheap: just an `Arc` bump.
#[derive(Clone)]
pub struct NodeControlServer {
    manager: Arc<NodeManager>,
}

impl NodeControlServer {
    pub fn new(manager: Arc<NodeManager>) -> Self {
        NodeControlServer { manager }
    }
}

impl NodeControl for NodeControlServer {
    async fn create_session(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.create_session(&session_id).map_err(Into::into)
    }

    async fn destroy_session(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.destroy_session(&session_id).map_err(Into::into)
    }

    async fn add_graph_spec(self, _: Context, session_id: String, graph: GraphSpec) -> RpcResult<()> {
        self.manager.add_graph_spec(&session_id, graph).map_err(Into::into)
    }

    async fn deploy(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.deploy(&session_id).map_err(Into::into)
    }

    async fn trigger(self, _: Context, session_id: String, uid: String, bytes: Vec<u8>) -> RpcResult<()> {
        self.manager.trigger(&session_id, &uid, &bytes).map_err(Into::into)
    }

    async fn set_completed(self, _: Context, session_id: String, uid: String) -> RpcResult<()> {
        self.manager.set_completed(&session_id, &uid).map_err(Into::into)
    }

    async fn get_status(self, _: Context, session_id: String) -> RpcResult<StatusMap> {
        self.manager.get_status(&session_id).map_err(Into::into)
    }

    async fn shutdown(self, _: Context) -> RpcResult<()> {
        self.manager.shutdown().map_err(Into::into)
    }

    async fn ping(self, _: Context) -> RpcResult<()> {
        Ok(())
    }
}

/// `Fanout` surface: the receiving end of a cross-manager edge. Unlike `NodeControl::set_completed`,
/// `deliver_completed` applies remote-tolerant idempotency, since a proxy consumer on the
/// producer side may retry a delivery after a transport hiccup.
#[derive(Clone)]
pub struct FanoutServer {
    manager: Arc<NodeManager>,
}

impl FanoutServer {
    pub fn new(manager: Arc<NodeManager>) -> Self {
        FanoutServer { manager }
    }
}

impl Fanout for FanoutServer {
    async fn deliver_write(self, _: Context, target: CallbackUri, bytes: Vec<u8>) -> RpcResult<()> {
        self.manager.trigger(&target.session_id, &target.uid, &bytes).map_err(Into::into)
    }

    async fn deliver_completed(self, _: Context, target: CallbackUri) -> RpcResult<()> {
        self.manager.set_completed_tolerant(&target.session_id, &target.uid).map_err(Into::into)
    }

    async fn deliver_cancelled(self, _: Context, target: CallbackUri) -> RpcResult<()> {
        self.manager.cancel(&target.session_id, &target.uid).map_err(Into::into)
    }
}
