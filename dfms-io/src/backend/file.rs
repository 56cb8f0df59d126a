// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dfms_common::{DfmsError, MutexExt, Result};

use crate::token::{ReadToken, TokenAllocator};
use crate::Backend;

/// On-disk file backend. The path is derived deterministically from
/// `(oid, uid)` so a file populated out-of-band (before the engine ever calls `write`) is
/// still found at the path the DO expects.
pub struct FileBackend {
    path: PathBuf,
    uid: String,
    cursors: Mutex<HashMap<ReadToken, u64>>,
    tokens: TokenAllocator,
}

impl FileBackend {
    pub fn new(dir: &Path, oid: &str, uid: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|source| DfmsError::BackendIo {
            backend: "file",
            uid: uid.to_string(),
            source,
        })?;
        let path = dir.join(format!("{oid}_{uid}.dfms"));
        Ok(FileBackend {
            path,
            uid: uid.to_string(),
            cursors: Mutex::new(HashMap::new()),
            tokens: TokenAllocator::default(),
        })
    }

    /// The path this DO's bytes live at. Exposed so an out-of-band producer can be pointed at
    /// the same deterministic location before the engine observes any `write`.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> DfmsError {
        DfmsError::BackendIo { backend: "file", uid: self.uid.clone(), source }
    }
}

impl Backend for FileBackend {
    fn write(&self, bytes: &[u8]) -> Result<usize> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        file.write_all(bytes).map_err(|e| self.io_err(e))?;
        Ok(bytes.len())
    }

    fn open(&self) -> Result<ReadToken> {
        let token = self.tokens.next();
        self.cursors.lock_or_panic().insert(token, 0);
        Ok(token)
    }

    fn read(&self, token: ReadToken, max_len: Option<usize>) -> Result<Vec<u8>> {
        let cursor = {
            let guard = self.cursors.lock_or_panic();
            *guard
                .get(&token)
                .ok_or_else(|| DfmsError::InvalidArgument(format!("unknown read token {token}")))?
        };
        let mut file = std::fs::File::open(&self.path).map_err(|e| self.io_err(e))?;
        file.seek(SeekFrom::Start(cursor)).map_err(|e| self.io_err(e))?;
        let bytes = match max_len {
            Some(n) => {
                let mut buf = vec![0u8; n];
                let read = file.read(&mut buf).map_err(|e| self.io_err(e))?;
                buf.truncate(read);
                buf
            }
            None => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf).map_err(|e| self.io_err(e))?;
                buf
            }
        };
        self.cursors.lock_or_panic().insert(token, cursor + bytes.len() as u64);
        Ok(bytes)
    }

    fn close(&self, token: ReadToken) -> Result<()> {
        if self.cursors.lock_or_panic().remove(&token).is_none() {
            return Err(DfmsError::InvalidArgument(format!("unknown read token {token}")));
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_err(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_written_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "oid-1", "uid-1").unwrap();
        backend.write(b"first line\n").unwrap();
        backend.write(b"second line\n").unwrap();
        assert_eq!(backend.size(), 23);

        let token = backend.open().unwrap();
        let all = backend.read(token, None).unwrap();
        assert_eq!(all, b"first line\nsecond line\n");
        backend.close(token).unwrap();
    }

    #[test]
    fn path_is_deterministic_from_oid_and_uid() {
        let dir = tempfile::tempdir().unwrap();
        let a = FileBackend::new(dir.path(), "oid-1", "uid-1").unwrap();
        let b = FileBackend::new(dir.path(), "oid-1", "uid-1").unwrap();
        assert_eq!(a.path(), b.path());
    }

    #[test]
    fn reports_out_of_band_bytes_with_no_checksum_tracking_here() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "oid-1", "uid-1").unwrap();
        std::fs::write(backend.path(), b"populated externally").unwrap();
        assert_eq!(backend.size(), 21);
    }

    #[test]
    fn read_with_unknown_token_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path(), "oid-1", "uid-1").unwrap();
        backend.write(b"data").unwrap();
        let token = backend.open().unwrap();
        backend.close(token).unwrap();
        assert!(backend.read(token, None).is_err());
    }
}
