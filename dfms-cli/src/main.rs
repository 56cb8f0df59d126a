// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Launcher for the three manager tiers: a Node Manager or either tier of Composite
//! Manager, run in the foreground under whatever process supervisor the caller chooses.
//! Daemonization, PID files and SSH-based remote launch are left to that supervisor.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use dfms_composite::{CompositeControlServer, CompositeManager};
use dfms_manager::{BroadcasterMode, FanoutServer, NodeControlServer, NodeManager, StageRegistry};
use dfms_rpc::transport::{fanout_addr, serve};

#[derive(Parser)]
#[command(name = "dfms-cli")]
#[command(about = "Launches a Node Manager or a tier of Composite Manager")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Minimum level of log events emitted to stdout.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Command {
    /// Starts a Node Manager exposing `NodeControl` on `--bind` and `Fanout` one port above it.
    Node {
        #[arg(long)]
        bind: SocketAddr,

        /// Directory `File`-backed DOs write under, one subdirectory per session.
        #[arg(long, default_value = "./dfms-data")]
        data_dir: PathBuf,

        /// Whether each session's event broadcaster fires handlers synchronously on the
        /// firing thread (`local`) or from one dedicated worker thread (`threaded`).
        #[arg(long, default_value = "local")]
        broadcaster: String,
    },
    /// Starts an island-tier Composite Manager fanning out to a set of Node Managers.
    Island {
        #[arg(long)]
        bind: SocketAddr,

        #[arg(long, value_delimiter = ',')]
        children: Vec<SocketAddr>,
    },
    /// Starts a master-tier Composite Manager fanning out to a set of island managers.
    /// Structurally identical to `island`: the two tiers are distinct layers of the same
    /// composite contract rather than different code paths.
    Master {
        #[arg(long)]
        bind: SocketAddr,

        #[arg(long, value_delimiter = ',')]
        children: Vec<SocketAddr>,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dfms_common::logging::init_from_env(&args.log_level);

    match args.command {
        Command::Node { bind, data_dir, broadcaster } => run_node(bind, data_dir, &broadcaster).await,
        Command::Island { bind, children } => run_composite(bind, children, "island").await,
        Command::Master { bind, children } => run_composite(bind, children, "master").await,
    }
}

async fn run_node(bind: SocketAddr, data_dir: PathBuf, broadcaster: &str) -> anyhow::Result<()> {
    let mode = match broadcaster {
        "local" => BroadcasterMode::Local,
        "threaded" => BroadcasterMode::Threaded,
        other => anyhow::bail!("unknown broadcaster mode {other:?}, expected local or threaded"),
    };

    let mut registry = StageRegistry::with_builtins();
    dfms_composite::register_proxy_stage(&mut registry);
    let manager = Arc::new(NodeManager::new(Arc::new(registry), mode, data_dir));

    let fanout = fanout_addr(bind);
    info!(%bind, %fanout, "starting node manager");

    let node_control = serve(bind, NodeControlServer::new(Arc::clone(&manager)).serve());
    let fanout_service = serve(fanout, FanoutServer::new(manager).serve());
    tokio::try_join!(node_control, fanout_service)?;
    Ok(())
}

async fn run_composite(bind: SocketAddr, children: Vec<SocketAddr>, tier: &str) -> anyhow::Result<()> {
    if children.is_empty() {
        anyhow::bail!("{tier} requires at least one --children address");
    }
    let named = children.into_iter().map(|addr| (addr.to_string(), addr)).collect();
    let manager = Arc::new(CompositeManager::connect(named).await?);

    info!(%bind, tier, "starting composite manager");
    serve(bind, CompositeControlServer::new(manager).serve()).await?;
    Ok(())
}
