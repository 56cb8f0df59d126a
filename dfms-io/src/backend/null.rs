// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dfms_common::{DfmsError, MutexExt, Result};

use crate::token::{ReadToken, TokenAllocator};
use crate::Backend;

/// A discard sink used for control-flow-only DOs. Writes succeed and count toward `size`, but
/// nothing is retained; `read` always reports end-of-stream.
#[derive(Default)]
pub struct NullBackend {
    total: AtomicU64,
    open: Mutex<HashSet<ReadToken>>,
    tokens: TokenAllocator,
}

impl Backend for NullBackend {
    fn write(&self, bytes: &[u8]) -> Result<usize> {
        self.total.fetch_add(bytes.len() as u64, Ordering::SeqCst);
        Ok(bytes.len())
    }

    fn open(&self) -> Result<ReadToken> {
        let token = self.tokens.next();
        self.open.lock_or_panic().insert(token);
        Ok(token)
    }

    fn read(&self, token: ReadToken, _max_len: Option<usize>) -> Result<Vec<u8>> {
        if !self.open.lock_or_panic().contains(&token) {
            return Err(DfmsError::InvalidArgument(format!("unknown read token {token}")));
        }
        Ok(Vec::new())
    }

    fn close(&self, token: ReadToken) -> Result<()> {
        if !self.open.lock_or_panic().remove(&token) {
            return Err(DfmsError::InvalidArgument(format!("unknown read token {token}")));
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    fn delete(&self) -> Result<()> {
        self.total.store(0, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_counts_toward_size_but_read_is_always_empty() {
        let backend = NullBackend::default();
        backend.write(b"discarded").unwrap();
        assert_eq!(backend.size(), 9);

        let token = backend.open().unwrap();
        assert_eq!(backend.read(token, None).unwrap(), Vec::<u8>::new());
        backend.close(token).unwrap();
    }

    #[test]
    fn close_with_unknown_token_fails() {
        let backend = NullBackend::default();
        let token = backend.open().unwrap();
        backend.close(token).unwrap();
        assert!(backend.close(token).is_err());
    }
}
