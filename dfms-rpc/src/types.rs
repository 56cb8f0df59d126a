// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use dfms_common::DfmsError;

/// A serializable stand-in for [`DfmsError`] (which wraps a non-serializable
/// `std::io::Error`), carried over the wire as the `Err` arm of every `NodeControl`/`Fanout`
/// reply.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    pub message: String,
}

impl From<DfmsError> for RpcError {
    fn from(error: DfmsError) -> Self {
        RpcError { message: error.to_string() }
    }
}

impl From<String> for RpcError {
    fn from(message: String) -> Self {
        RpcError { message }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// A remote callback identified by a URI: `host:port/session_id/uid` resolves
/// back into the manager hosting that DO and the DO itself, so a cross-manager edge's proxy
/// consumer (on the producer side) knows exactly which `Fanout` endpoint to call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackUri {
    pub host: String,
    pub port: u16,
    pub session_id: String,
    pub uid: String,
}

impl CallbackUri {
    pub fn new(host: impl Into<String>, port: u16, session_id: impl Into<String>, uid: impl Into<String>) -> Self {
        CallbackUri { host: host.into(), port, session_id: session_id.into(), uid: uid.into() }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for CallbackUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}/{}", self.host, self.port, self.session_id, self.uid)
    }
}

/// Which kind of backend a [`DoSpec`] instantiates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Memory,
    File,
    Null,
    Socket { host: String, port: u16 },
}

/// How a consumer is wired to its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Consumer,
    Immediate,
    Child,
}

/// One DO in a graph descriptor. `stage` names a class registered in the
/// receiving manager's stage registry; `node` is the target manager name, used by a Composite
/// Manager to partition the spec and ignored by a Node Manager deploying its own partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoSpec {
    pub oid: String,
    pub uid: String,
    pub backend: BackendKind,
    pub node: Option<String>,
    pub stage: Option<String>,
    pub is_container: bool,
    pub expected_size: Option<u64>,
    pub execution_mode_external: bool,
    pub options: HashMap<String, String>,
}

/// An edge between two DOs already named in the same [`GraphSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub producer_uid: String,
    pub consumer_uid: String,
    pub kind: EdgeKind,
}

/// A graph descriptor: a list of DO specs plus edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    pub dos: Vec<DoSpec>,
    pub edges: Vec<EdgeSpec>,
}

/// Per-`uid` status snapshot returned by `get_status`.
pub type StatusMap = HashMap<String, u8>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_uri_display_matches_host_port_session_uid() {
        let uri = CallbackUri::new("10.0.0.1", 7000, "session-a", "do-7");
        assert_eq!(uri.to_string(), "10.0.0.1:7000/session-a/do-7");
        assert_eq!(uri.addr(), "10.0.0.1:7000");
    }

    #[test]
    fn rpc_error_roundtrips_through_dfms_error() {
        let error = DfmsError::InvalidArgument("bad uid".into());
        let rpc_error: RpcError = error.into();
        assert_eq!(rpc_error.message, "invalid argument: bad uid");
    }
}
