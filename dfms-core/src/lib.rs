// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The data object state machine: identity, lifecycle, checksum accumulation, consumer/child
//! wiring and the triggering rules that cascade execution down a graph. Depends only on
//! `dfms-common`, `dfms-events` and `dfms-io`, with no async runtime, so a purely synchronous
//! graph never needs tokio at all.

mod checksum;
mod object;
mod producer;
mod stage;

pub use object::{DataObject, DataObjectSpec};
pub use producer::ProducerHandle;
pub use stage::Stage;
