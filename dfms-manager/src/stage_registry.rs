// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Maps the `stage` name carried by a [`dfms_rpc::DoSpec`] onto a concrete [`Stage`]
//! implementation, so a graph descriptor can reference application logic by name instead of the
//! caller shipping code. A Node Manager resolves every `DoSpec::stage` against its own registry
//! at deploy time; unknown names fail the whole deploy.

use std::collections::HashMap;
use std::sync::Arc;

use dfms_common::{DfmsError, Result};
use dfms_core::Stage;

use crate::stages::{
    CrcResultStage, GrepStage, LastCharStage, NumberWriterStage, OddAndEvenContainerStage, ReverseWordsStage,
    SortStage, SumupContainerCrcStage,
};

/// Builds a [`Stage`] from the `options` carried by its [`dfms_rpc::DoSpec`]. `stage` names a
/// class registered in the receiving manager's stage registry.
pub trait StageFactory: Send + Sync {
    fn create(&self, options: &HashMap<String, String>) -> Result<Arc<dyn Stage>>;
}

impl<F> StageFactory for F
where
    F: Fn(&HashMap<String, String>) -> Result<Arc<dyn Stage>> + Send + Sync,
{
    fn create(&self, options: &HashMap<String, String>) -> Result<Arc<dyn Stage>> {
        self(options)
    }
}

/// Name-to-factory map consulted during graph deploy.
pub struct StageRegistry {
    factories: HashMap<String, Arc<dyn StageFactory>>,
}

impl StageRegistry {
    pub fn empty() -> Self {
        StageRegistry { factories: HashMap::new() }
    }

    /// Registers every stage in [`crate::stages`] under the names a graph descriptor may
    /// reference.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("grep", |options| {
            let substring = options.get("substring").cloned().unwrap_or_default();
            Ok(Arc::new(GrepStage { substring }) as Arc<dyn Stage>)
        });
        registry.register("sort", |_| Ok(Arc::new(SortStage) as Arc<dyn Stage>));
        registry.register("reverse_words", |_| Ok(Arc::new(ReverseWordsStage) as Arc<dyn Stage>));
        registry.register("crc_result", |_| Ok(Arc::new(CrcResultStage) as Arc<dyn Stage>));
        registry.register("number_writer", |_| Ok(Arc::new(NumberWriterStage) as Arc<dyn Stage>));
        registry.register("odd_even_container", |_| Ok(Arc::new(OddAndEvenContainerStage) as Arc<dyn Stage>));
        registry.register("sumup_container_crc", |_| Ok(Arc::new(SumupContainerCrcStage) as Arc<dyn Stage>));
        registry.register("last_char", |_| Ok(Arc::new(LastCharStage::default()) as Arc<dyn Stage>));
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, factory: impl StageFactory + 'static) {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn create(&self, name: &str, options: &HashMap<String, String>) -> Result<Arc<dyn Stage>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DfmsError::InvalidArgument(format!("no stage registered under name {name:?}")))?;
        factory.create(options)
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
