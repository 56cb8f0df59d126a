// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::sync::Arc;

use dfms_common::{DfmsError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::AsyncReadExt;

use crate::backend::memory::MemoryBackend;
use crate::token::ReadToken;
use crate::Backend;

/// TCP byte source. Binds `(host, port)` synchronously at construction, so a privileged port
/// without privilege, or any other bind failure, is reported to the caller before the backend
/// exists, not on first use. One connection is accepted in a
/// background task; every chunk read from the socket is handed to `on_write` so it is
/// forwarded through the owning DO's normal `write` path (and so accumulates checksum/size
/// at the DO layer, not here); connection close invokes `on_closed`, which the DO wires to its
/// own `set_completed`.
pub struct SocketListenerBackend {
    received: MemoryBackend,
}

impl SocketListenerBackend {
    pub fn bind(
        addr: SocketAddr,
        uid: String,
        on_write: Arc<dyn Fn(&[u8]) + Send + Sync>,
        on_closed: Arc<dyn Fn() + Send + Sync>,
    ) -> Result<Self> {
        let io_err = |source: std::io::Error| DfmsError::BackendIo { backend: "socket", uid: uid.clone(), source };

        let domain = if addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP)).map_err(io_err)?;
        socket.set_reuse_address(true).map_err(io_err)?;
        socket.bind(&addr.into()).map_err(io_err)?;
        socket.listen(1).map_err(io_err)?;
        socket.set_nonblocking(true).map_err(io_err)?;
        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener).map_err(io_err)?;

        tokio::spawn(async move {
            let (mut stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(error) => {
                    tracing::warn!(%error, "socket listener failed to accept connection");
                    return;
                }
            };
            tracing::debug!(%peer, "socket listener accepted connection");
            let mut buf = [0u8; 8192];
            loop {
                match stream.read(&mut buf).await {
                    Ok(0) => {
                        on_closed();
                        break;
                    }
                    Ok(n) => on_write(&buf[..n]),
                    Err(error) => {
                        tracing::warn!(%error, "socket listener read failed");
                        break;
                    }
                }
            }
        });

        Ok(SocketListenerBackend { received: MemoryBackend::default() })
    }
}

impl Backend for SocketListenerBackend {
    fn write(&self, bytes: &[u8]) -> Result<usize> {
        self.received.write(bytes)
    }

    fn open(&self) -> Result<ReadToken> {
        self.received.open()
    }

    fn read(&self, token: ReadToken, max_len: Option<usize>) -> Result<Vec<u8>> {
        self.received.read(token, max_len)
    }

    fn close(&self, token: ReadToken) -> Result<()> {
        self.received.close(token)
    }

    fn size(&self) -> u64 {
        self.received.size()
    }

    fn delete(&self) -> Result<()> {
        self.received.delete()
    }
}
