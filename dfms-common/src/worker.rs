// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// A unit of background work that runs on its own OS thread until its input is exhausted or
/// it is told to stop.
///
/// The threaded event broadcaster's dispatch loop and the socket-listener I/O backend's
/// acceptor are both instances of one dedicated worker per owning object. Keeping this
/// synchronous, rather than an `async fn run`, lets `dfms-core` stay free of any async runtime
/// dependency; only the socket backend and the RPC layer pull in tokio.
pub trait Worker: Send {
    /// Main worker loop. Returns once there is no more work to do.
    fn run(&mut self);

    /// Hook called to ask a still-running worker to stop as soon as it observes it.
    fn shutdown(&mut self) {}
}
