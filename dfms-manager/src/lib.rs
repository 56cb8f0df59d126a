// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Node Manager: owns a per-process registry of [`dfms_core::DataObject`]s
//! grouped into sessions, instantiates graph descriptors, and forwards per-DO operations by
//! `uid`. [`server`] adapts this surface onto the `dfms-rpc` `NodeControl`/`Fanout` tarpc
//! services so a Composite Manager (in `dfms-composite`) can drive it over the network exactly
//! as it would drive a child in-process.

mod manager;
mod server;
mod session;
mod stage_registry;
pub mod stages;

pub use manager::{BroadcasterMode, NodeManager};
pub use server::{FanoutServer, NodeControlServer};
pub use stage_registry::{StageFactory, StageRegistry};
