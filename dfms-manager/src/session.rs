// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-session bookkeeping: the graph descriptors accumulated before `deploy`, and the live
//! [`DataObject`] registry afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use dfms_core::DataObject;
use dfms_events::EventBus;
use dfms_rpc::{DoSpec, EdgeSpec};

/// State for one session: pre-deploy graph accumulation, then the post-deploy DO registry.
pub(crate) struct Session {
    pub(crate) dos: HashMap<String, DoSpec>,
    pub(crate) dos_order: Vec<String>,
    pub(crate) edges: Vec<EdgeSpec>,
    pub(crate) deployed: bool,
    pub(crate) objects: HashMap<String, Arc<DataObject>>,
    pub(crate) broadcaster: Arc<dyn EventBus>,
}

impl Session {
    pub(crate) fn new(broadcaster: Arc<dyn EventBus>) -> Self {
        Session {
            dos: HashMap::new(),
            dos_order: Vec::new(),
            edges: Vec::new(),
            deployed: false,
            objects: HashMap::new(),
            broadcaster,
        }
    }
}
