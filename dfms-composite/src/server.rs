// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exposes [`CompositeManager`] over the same `NodeControl` tarpc service a Node Manager
//! implements, so a higher-tier Composite Manager can treat an island exactly like any other
//! child, presenting the same operation surface as a Node Manager.

use std::sync::Arc;

use tarpc::context::Context;

use dfms_rpc::types::{GraphSpec, RpcResult, StatusMap};
use dfms_rpc::NodeControl;

use crate::manager::CompositeManager;

#[derive(Clone)]
pub struct CompositeControlServer {
    manager: Arc<CompositeManager>,
}

impl CompositeControlServer {
    pub fn new(manager: Arc<CompositeManager>) -> Self {
        CompositeControlServer { manager }
    }
}

impl NodeControl for CompositeControlServer {
    async fn create_session(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.create_session(&session_id).map_err(Into::into)
    }

    async fn destroy_session(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.destroy_session(&session_id).await.map_err(Into::into)
    }

    async fn add_graph_spec(self, _: Context, session_id: String, graph: GraphSpec) -> RpcResult<()> {
        self.manager.add_graph_spec(&session_id, graph).map_err(Into::into)
    }

    async fn deploy(self, _: Context, session_id: String) -> RpcResult<()> {
        self.manager.deploy(&session_id).await.map_err(Into::into)
    }

    async fn trigger(self, _: Context, session_id: String, uid: String, bytes: Vec<u8>) -> RpcResult<()> {
        self.manager.trigger(&session_id, &uid, &bytes).await.map_err(Into::into)
    }

    async fn set_completed(self, _: Context, session_id: String, uid: String) -> RpcResult<()> {
        self.manager.set_completed(&session_id, &uid).await.map_err(Into::into)
    }

    async fn get_status(self, _: Context, session_id: String) -> RpcResult<StatusMap> {
        self.manager.get_status(&session_id).await.map_err(Into::into)
    }

    async fn shutdown(self, _: Context) -> RpcResult<()> {
        self.manager.shutdown().await.map_err(Into::into)
    }

    async fn ping(self, _: Context) -> RpcResult<()> {
        self.manager.ping().map_err(Into::into)
    }
}
