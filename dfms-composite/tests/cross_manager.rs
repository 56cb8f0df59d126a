// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end tests exercising real TCP between two Node Managers and the Composite Manager
//! that partitions a graph across them, wiring the cross-manager edge through the proxy-forward
//! stage and the `Fanout` surface.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dfms_composite::CompositeManager;
use dfms_manager::{BroadcasterMode, FanoutServer, NodeControlServer, NodeManager, StageRegistry};
use dfms_rpc::transport::{fanout_addr, serve};
use dfms_rpc::{BackendKind, DoSpec, EdgeKind, EdgeSpec, GraphSpec};

fn leaf(uid: &str, node: &str) -> DoSpec {
    DoSpec {
        oid: uid.to_string(),
        uid: uid.to_string(),
        backend: BackendKind::Memory,
        node: Some(node.to_string()),
        stage: None,
        is_container: false,
        expected_size: None,
        execution_mode_external: false,
        options: HashMap::new(),
    }
}

/// Starts a Node Manager (both its `NodeControl` and `Fanout` listeners) as a background task
/// and returns the manager handle so the test can assert on its local state directly.
async fn spawn_node(bind: SocketAddr) -> Arc<NodeManager> {
    let mut registry = StageRegistry::with_builtins();
    dfms_composite::register_proxy_stage(&mut registry);
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(NodeManager::new(Arc::new(registry), BroadcasterMode::Local, dir.path().to_path_buf()));

    let node_control = NodeControlServer::new(Arc::clone(&manager)).serve();
    let fanout = FanoutServer::new(Arc::clone(&manager)).serve();
    tokio::spawn(serve(bind, node_control));
    tokio::spawn(serve(fanout_addr(bind), fanout));
    tokio::time::sleep(Duration::from_millis(50)).await;
    manager
}

#[tokio::test]
async fn cross_manager_consumer_edge_is_delivered_via_fanout() {
    let addr_a: SocketAddr = "127.0.0.1:19301".parse().unwrap();
    let addr_b: SocketAddr = "127.0.0.1:19311".parse().unwrap();
    let manager_a = spawn_node(addr_a).await;
    let manager_b = spawn_node(addr_b).await;

    let composite = CompositeManager::connect(vec![("a".to_string(), addr_a), ("b".to_string(), addr_b)])
        .await
        .unwrap();

    composite.create_session("s").unwrap();
    let graph = GraphSpec {
        dos: vec![leaf("p", "a"), leaf("q", "b")],
        edges: vec![EdgeSpec { producer_uid: "p".to_string(), consumer_uid: "q".to_string(), kind: EdgeKind::Consumer }],
    };
    composite.add_graph_spec("s", graph).unwrap();
    composite.deploy("s").await.unwrap();

    composite.trigger("s", "p", b"hello across managers").await.unwrap();
    composite.set_completed("s", "p").await.unwrap();

    // Give the producer-side proxy's forwarding call a moment to land on node b.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let delivered = manager_b.read_all("s", "q").unwrap();
    assert_eq!(delivered, b"hello across managers");
    let status_b = manager_b.get_status("s").unwrap();
    assert_eq!(status_b["q"], dfms_common::DOStatus::Completed as u8);

    let merged = composite.get_status("s").await.unwrap();
    assert_eq!(merged["p"], dfms_common::DOStatus::Completed as u8);
    assert_eq!(merged["q"], dfms_common::DOStatus::Completed as u8);

    let _ = manager_a.get_status("s").unwrap();
}

#[tokio::test]
async fn deploy_fails_when_a_referenced_child_is_unreachable() {
    let addr_a: SocketAddr = "127.0.0.1:19321".parse().unwrap();
    let unreachable: SocketAddr = "127.0.0.1:19322".parse().unwrap();
    let _manager_a = spawn_node(addr_a).await;

    let composite =
        CompositeManager::connect(vec![("a".to_string(), addr_a), ("b".to_string(), unreachable)]).await.unwrap();

    composite.create_session("s").unwrap();
    let graph = GraphSpec { dos: vec![leaf("p", "a"), leaf("q", "b")], edges: vec![] };
    composite.add_graph_spec("s", graph).unwrap();
    assert!(composite.deploy("s").await.is_err());
}
