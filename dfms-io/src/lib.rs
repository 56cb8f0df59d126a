// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-DO storage strategies: an in-RAM buffer, an on-disk file, a discard
//! sink, and a one-shot TCP socket listener. Every backend implements the same
//! write/open/read/close/size/delete surface; checksum accumulation happens one layer up, in
//! `dfms-core`, so a backend never needs to know about CRCs.

mod backend;
mod token;

pub use backend::file::FileBackend;
pub use backend::memory::MemoryBackend;
pub use backend::null::NullBackend;
pub use backend::socket::SocketListenerBackend;
pub use token::ReadToken;

use dfms_common::Result;

/// Uniform storage contract every DO backend implements.
///
/// `read` with `max_len = None` returns everything remaining for that token; in COMPLETED
/// state on an exhausted token it returns an empty `Vec`, which the caller treats as the
/// end-of-stream marker.
pub trait Backend: Send + Sync {
    fn write(&self, bytes: &[u8]) -> Result<usize>;
    fn open(&self) -> Result<ReadToken>;
    fn read(&self, token: ReadToken, max_len: Option<usize>) -> Result<Vec<u8>>;
    fn close(&self, token: ReadToken) -> Result<()>;
    fn size(&self) -> u64;
    fn delete(&self) -> Result<()>;
}
