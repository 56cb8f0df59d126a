// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::types::{CallbackUri, GraphSpec, RpcResult, StatusMap};

/// Per-manager session and graph control surface. Implemented by both Node
/// Managers and Composite Managers, which present the same operation surface to their caller
/// regardless of tier.
#[tarpc::service]
pub trait NodeControl {
    /// Creates a new, empty session. Fails if `session_id` is already in use.
    async fn create_session(session_id: String) -> RpcResult<()>;

    /// Tears down a session and every DO it owns, regardless of status.
    async fn destroy_session(session_id: String) -> RpcResult<()>;

    /// Adds (merges) a graph descriptor into an existing session. May be called more than once
    /// before `deploy`.
    async fn add_graph_spec(session_id: String, graph: GraphSpec) -> RpcResult<()>;

    /// Instantiates every DO named by the session's accumulated graph specs and wires their
    /// edges. Idempotent once deployed: a second call is a no-op.
    async fn deploy(session_id: String) -> RpcResult<()>;

    /// Writes bytes into the named DO, driving it through its lifecycle exactly as a local
    /// `DataObject::write` would.
    async fn trigger(session_id: String, uid: String, bytes: Vec<u8>) -> RpcResult<()>;

    /// Marks the named DO COMPLETED. Local DOs apply strict idempotency (a second call on an
    /// already-terminal DO fails); DOs fronting a cross-manager edge apply remote-tolerant
    /// idempotency (a second call is a no-op) since network retries can duplicate the signal.
    async fn set_completed(session_id: String, uid: String) -> RpcResult<()>;

    /// Returns a status code (see [`crate::types::StatusMap`]) per `uid` in the session.
    async fn get_status(session_id: String) -> RpcResult<StatusMap>;

    /// Best-effort graceful shutdown of the manager. A Composite Manager fans this out to every
    /// child it knows about and reports which ones it could not reach.
    async fn shutdown() -> RpcResult<()>;

    /// Liveness probe, used both standalone and as a pre-flight check before `deploy`.
    async fn ping() -> RpcResult<()>;
}

/// Cross-manager DO-level event forwarding: the proxy consumer that sits on
/// the producer's manager calls these against the [`CallbackUri`] resolved for the real
/// consumer on the other manager.
#[tarpc::service]
pub trait Fanout {
    /// Forwards one producer write to the remote consumer.
    async fn deliver_write(target: CallbackUri, bytes: Vec<u8>) -> RpcResult<()>;

    /// Forwards producer completion. Remote-tolerant: delivering this twice for the same
    /// `target` (e.g. after a retried call) must not fail.
    async fn deliver_completed(target: CallbackUri) -> RpcResult<()>;

    /// Forwards producer cancellation.
    async fn deliver_cancelled(target: CallbackUri) -> RpcResult<()>;
}
