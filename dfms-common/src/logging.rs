// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide logging bootstrap.
//!
//! Library crates (`dfms-core`, `dfms-io`, `dfms-manager`, `dfms-composite`) only ever emit
//! `tracing` events; installing a subscriber is left to the binary, exactly once, keeping
//! library logging calls separate from subscriber setup.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a global `tracing` subscriber reading its filter from `RUST_LOG` (default `info`).
/// Safe to call more than once; only the first call takes effect.
pub fn init_from_env(default_filter: &str) {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    });
}
