// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Mutex;

use dfms_common::{DfmsError, MutexExt, Result};

use crate::token::{ReadToken, TokenAllocator};
use crate::Backend;

struct State {
    buf: Vec<u8>,
    cursors: HashMap<ReadToken, usize>,
}

/// In-RAM byte buffer backend. Pre-sized to `expected_size` when known to avoid repeated
/// reallocation as writes accumulate.
pub struct MemoryBackend {
    state: Mutex<State>,
    tokens: TokenAllocator,
}

impl MemoryBackend {
    pub fn new(expected_size: Option<u64>) -> Self {
        let capacity = expected_size.map(|n| n as usize).unwrap_or(0);
        MemoryBackend {
            state: Mutex::new(State { buf: Vec::with_capacity(capacity), cursors: HashMap::new() }),
            tokens: TokenAllocator::default(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Backend for MemoryBackend {
    fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.lock_or_panic();
        state.buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn open(&self) -> Result<ReadToken> {
        let token = self.tokens.next();
        self.state.lock_or_panic().cursors.insert(token, 0);
        Ok(token)
    }

    fn read(&self, token: ReadToken, max_len: Option<usize>) -> Result<Vec<u8>> {
        let mut state = self.state.lock_or_panic();
        let Some(&cursor) = state.cursors.get(&token) else {
            return Err(DfmsError::InvalidArgument(format!("unknown read token {token}")));
        };
        let end = match max_len {
            Some(n) => (cursor + n).min(state.buf.len()),
            None => state.buf.len(),
        };
        let bytes = state.buf[cursor..end].to_vec();
        state.cursors.insert(token, end);
        Ok(bytes)
    }

    fn close(&self, token: ReadToken) -> Result<()> {
        let mut state = self.state.lock_or_panic();
        if state.cursors.remove(&token).is_none() {
            return Err(DfmsError::InvalidArgument(format!("unknown read token {token}")));
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.state.lock_or_panic().buf.len() as u64
    }

    fn delete(&self) -> Result<()> {
        let mut state = self.state.lock_or_panic();
        state.buf.clear();
        state.cursors.clear();
        Ok(())
    }
}
