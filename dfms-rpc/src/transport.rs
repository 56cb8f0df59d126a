// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::net::SocketAddr;
use std::time::Duration;

use futures::{future, StreamExt};
use tarpc::client::{self, RpcError as TarpcRpcError};
use tarpc::serde_transport::tcp;
use tarpc::server::{BaseChannel, Channel};
use tarpc::tokio_serde::formats::Bincode;
use tokio::time::timeout;
use tracing::warn;

/// Default per-call timeout applied by [`call_with_timeout`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// A manager process serves `NodeControl` and `Fanout` as two separate tarpc services, since
/// each has its own request/response wire type and a single length-delimited channel can only
/// dispatch one. Rather than invent a side channel to advertise the second port, every manager
/// binds it at a fixed offset from the `NodeControl` port it was told to bind.
pub const FANOUT_PORT_OFFSET: u16 = 1;

/// The `Fanout` port implied by a manager's advertised `NodeControl` address. A proxy consumer
/// resolves this once it knows which child hosts the real consumer DO.
pub fn fanout_addr(node_control_addr: SocketAddr) -> SocketAddr {
    let mut addr = node_control_addr;
    addr.set_port(node_control_addr.port() + FANOUT_PORT_OFFSET);
    addr
}

/// Opens a length-delimited, bincode-framed client transport to `addr`. Callers wrap the
/// result in the generated `<Trait>Client::new(client::Config::default(), transport).spawn()`,
/// exactly as tarpc's own TCP client examples do.
pub async fn connect_transport<Req, Resp>(
    addr: SocketAddr,
) -> std::io::Result<
    tarpc::serde_transport::Transport<
        tokio::net::TcpStream,
        tarpc::Response<Resp>,
        tarpc::ClientMessage<Req>,
        Bincode<tarpc::Response<Resp>, tarpc::ClientMessage<Req>>,
    >,
>
where
    Req: serde::Serialize + Send + 'static,
    Resp: for<'de> serde::Deserialize<'de> + Send + 'static,
{
    let mut transport = tcp::connect(addr, Bincode::default).await?;
    transport.config_mut().max_frame_length(usize::MAX);
    Ok(transport)
}

/// Returns the default client configuration, so callers constructing a client stub do not need
/// a direct `tarpc::client` dependency just for `client::Config`.
pub fn client_config() -> client::Config {
    client::Config::default()
}

/// Runs `future` with [`DEFAULT_CALL_TIMEOUT`], turning an elapsed deadline into an
/// `std::io::Error` of kind `TimedOut` so callers can fold it into a [`crate::types::RpcError`]
/// the same way they fold any other transport failure, reported as a transport error rather
/// than a DO status transition.
pub async fn call_with_timeout<F, T>(future: F) -> std::io::Result<T>
where
    F: std::future::Future<Output = Result<T, TarpcRpcError>>,
{
    match timeout(DEFAULT_CALL_TIMEOUT, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(std::io::Error::other(err.to_string())),
        Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "rpc call timed out")),
    }
}

/// Binds a bincode/TCP listener at `addr` and serves every incoming connection with `serve`
/// (the `Serve` implementation a generated `<Trait>Server(handler).serve()` returns), spawning
/// one task per channel and one task per in-flight request, following tarpc's own
/// multi-threaded echo server pattern.
pub async fn serve<S>(addr: SocketAddr, serve: S) -> std::io::Result<()>
where
    S: tarpc::server::Serve + Clone + Send + 'static,
    S::Req: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + 'static,
    S::Resp: serde::Serialize + for<'de> serde::Deserialize<'de> + Send + 'static,
    S::Fut: Send,
{
    let mut listener = tcp::listen(addr, Bincode::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);
    listener
        .filter_map(|r| future::ready(r.ok()))
        .map(BaseChannel::with_defaults)
        .for_each(move |channel| {
            let serve = serve.clone();
            async move {
                tokio::spawn(async move {
                    channel
                        .execute(serve)
                        .for_each(|response_fut| async move {
                            tokio::spawn(response_fut);
                        })
                        .await;
                });
            }
        })
        .await;
    Ok(())
}

/// Probes `addr` with [`DEFAULT_CALL_TIMEOUT`] by attempting (and immediately dropping) a TCP
/// connection. Used for the bounded-timeout liveness check before a composite manager trusts a
/// child is reachable.
pub async fn probe_reachable(addr: SocketAddr) -> bool {
    match timeout(DEFAULT_CALL_TIMEOUT, tokio::net::TcpStream::connect(addr)).await {
        Ok(Ok(_)) => true,
        Ok(Err(error)) => {
            warn!(%addr, %error, "health probe connection failed");
            false
        }
        Err(_) => {
            warn!(%addr, "health probe timed out");
            false
        }
    }
}
