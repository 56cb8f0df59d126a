// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque read handle returned by `Backend::open`. Every token returned by `open` must be
/// presented back to `close`; reads against a closed or unknown token fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadToken(u64);

impl std::fmt::Display for ReadToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "fd-{}", self.0)
    }
}

/// Per-backend monotonically increasing token allocator.
#[derive(Debug, Default)]
pub(crate) struct TokenAllocator(AtomicU64);

impl TokenAllocator {
    pub(crate) fn next(&self) -> ReadToken {
        ReadToken(self.0.fetch_add(1, Ordering::SeqCst))
    }
}
