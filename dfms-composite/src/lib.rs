// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The Composite Manager tier: groups a fixed set of child managers (Node
//! Managers or, recursively, other Composite Managers) behind one `NodeControl` surface,
//! partitioning every graph spec it receives by each DO's `node` attribute and wiring any edge
//! that crosses a child boundary through a [`proxy::ProxyForwardStage`].

mod child;
mod manager;
mod proxy;
mod server;

pub use child::ChildHandle;
pub use manager::CompositeManager;
pub use proxy::{register_proxy_stage, ProxyForwardStage, PROXY_FORWARD_STAGE};
pub use server::CompositeControlServer;
