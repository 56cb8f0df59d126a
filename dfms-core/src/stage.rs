// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dfms_common::Result;

use crate::object::DataObject;
use crate::producer::ProducerHandle;

/// The executable behavior a DO may carry in addition to its storage backend. A DO's set of
/// consumers (`consumers` vs. `immediate_consumers`) decides which methods the engine calls;
/// a stage only needs to override the ones relevant to the role it is wired into.
///
/// - A *deferred* consumer overrides [`run`](Stage::run).
/// - An *immediate* consumer overrides [`consume`](Stage::consume) and
///   [`consumption_completed`](Stage::consumption_completed).
/// - A *container application* overrides `run` and reaches its own children through
///   [`DataObject::children`] instead of writing to itself.
pub trait Stage: Send + Sync {
    /// Runs once, after the producer opened by the engine reaches COMPLETED. Must read from
    /// `producer`, write into `this`'s own backend, and terminate with `this.set_completed()`,
    /// except for a container application, whose own completion is instead driven by its
    /// children completing.
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let _ = (producer, this);
        Ok(())
    }

    /// Delivered synchronously for every producer write this DO is an immediate consumer of.
    fn consume(&self, this: &Arc<DataObject>, bytes: &[u8]) -> Result<()> {
        let _ = (this, bytes);
        Ok(())
    }

    /// Delivered once the producer this DO is an immediate consumer of reaches COMPLETED.
    fn consumption_completed(&self, this: &Arc<DataObject>) -> Result<()> {
        let _ = this;
        Ok(())
    }
}
