// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire types and tarpc service definitions shared by every tier of manager. A Node Manager
//! and a Composite Manager both implement
//! [`NodeControl`]; a producer's manager calls [`Fanout`] against the consumer's manager to
//! forward a cross-manager edge.

pub mod service;
pub mod transport;
pub mod types;

pub use service::{Fanout, NodeControl};
pub use types::{BackendKind, CallbackUri, DoSpec, EdgeKind, EdgeSpec, GraphSpec, RpcError, RpcResult, StatusMap};
