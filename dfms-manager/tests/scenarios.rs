// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end graph scenarios driven entirely through [`NodeManager`]'s session/graph surface,
//! with no direct `dfms-core` construction, so these exercise the stage registry and deploy-time
//! edge wiring, not just the underlying `DataObject` state machine (already covered in
//! `dfms-core`'s own tests).

use std::collections::HashMap;
use std::sync::Arc;

use dfms_manager::{BroadcasterMode, NodeManager, StageRegistry};
use dfms_rpc::types::{BackendKind, DoSpec, EdgeKind, EdgeSpec, GraphSpec};

fn manager() -> NodeManager {
    let dir = tempfile::tempdir().unwrap();
    NodeManager::new(Arc::new(StageRegistry::with_builtins()), BroadcasterMode::Local, dir.path().to_path_buf())
}

fn leaf(uid: &str) -> DoSpec {
    DoSpec {
        oid: uid.to_string(),
        uid: uid.to_string(),
        backend: BackendKind::Memory,
        node: None,
        stage: None,
        is_container: false,
        expected_size: None,
        execution_mode_external: false,
        options: HashMap::new(),
    }
}

fn staged(uid: &str, stage: &str, options: HashMap<String, String>) -> DoSpec {
    DoSpec { stage: Some(stage.to_string()), options, ..leaf(uid) }
}

fn consumer_edge(producer: &str, consumer: &str) -> EdgeSpec {
    EdgeSpec { producer_uid: producer.to_string(), consumer_uid: consumer.to_string(), kind: EdgeKind::Consumer }
}

/// S3: a three-stage pipeline (grep | sort | reverse_words), each stage resolved by name from
/// the stage registry and wired purely through deferred-consumer edges in a deploy call.
#[test]
fn pipeline_grep_sort_reverse_words() {
    let manager = manager();
    manager.create_session("s3").unwrap();

    let mut grep_options = HashMap::new();
    grep_options.insert("substring".to_string(), "a".to_string());

    let graph = GraphSpec {
        dos: vec![
            leaf("a"),
            staged("b", "grep", grep_options),
            staged("c", "sort", HashMap::new()),
            staged("d", "reverse_words", HashMap::new()),
        ],
        edges: vec![consumer_edge("a", "b"), consumer_edge("b", "c"), consumer_edge("c", "d")],
    };
    manager.add_graph_spec("s3", graph).unwrap();
    manager.deploy("s3").unwrap();

    manager.trigger("s3", "a", b"first line\nwe have an a here\nand another one\nnoone knows me").unwrap();
    manager.set_completed("s3", "a").unwrap();

    let d = String::from_utf8(manager.read_all("s3", "d").unwrap()).unwrap();
    // b: "we have an a here\nand another one\n" -> c (sorted lines, "and..." < "we...") ->
    // d (each word reversed in place, separators preserved).
    assert_eq!(d, "dna rehtona eno\new evah na a ereh\n");
}

/// S4: a container application that splits its producer's numbers across two children by
/// parity; the container's own completion is driven purely by both children completing.
#[test]
fn container_app_splits_by_parity() {
    let manager = manager();
    manager.create_session("s4").unwrap();

    let container =
        DoSpec { is_container: true, stage: Some("odd_even_container".to_string()), ..leaf("container") };
    let graph = GraphSpec {
        dos: vec![leaf("a"), container, leaf("even"), leaf("odd")],
        edges: vec![
            consumer_edge("a", "container"),
            EdgeSpec { producer_uid: "container".to_string(), consumer_uid: "even".to_string(), kind: EdgeKind::Child },
            EdgeSpec { producer_uid: "container".to_string(), consumer_uid: "odd".to_string(), kind: EdgeKind::Child },
        ],
    };
    manager.add_graph_spec("s4", graph).unwrap();
    manager.deploy("s4").unwrap();

    manager.trigger("s4", "a", b"1 2 3 4 5 6").unwrap();
    manager.set_completed("s4", "a").unwrap();

    let status = manager.get_status("s4").unwrap();
    assert_eq!(status["container"], dfms_common::DOStatus::Completed as u8);
    assert_eq!(String::from_utf8(manager.read_all("s4", "even").unwrap()).unwrap().trim(), "2 4 6");
    assert_eq!(String::from_utf8(manager.read_all("s4", "odd").unwrap()).unwrap().trim(), "1 3 5");
}

/// S2: two producers feed a container (one child each), whose completion triggers a deferred
/// consumer that sums the container's descendants' checksums.
#[test]
fn container_join_then_sumup_crc() {
    let manager = manager();
    manager.create_session("s2").unwrap();

    let container = DoSpec { is_container: true, ..leaf("container") };
    let sum = staged("sum", "sumup_container_crc", HashMap::new());
    let graph = GraphSpec {
        dos: vec![leaf("a"), leaf("b"), container, sum],
        edges: vec![
            EdgeSpec { producer_uid: "container".to_string(), consumer_uid: "a".to_string(), kind: EdgeKind::Child },
            EdgeSpec { producer_uid: "container".to_string(), consumer_uid: "b".to_string(), kind: EdgeKind::Child },
            consumer_edge("container", "sum"),
        ],
    };
    manager.add_graph_spec("s2", graph).unwrap();
    manager.deploy("s2").unwrap();

    manager.trigger("s2", "a", b"hello").unwrap();
    manager.set_completed("s2", "a").unwrap();
    manager.trigger("s2", "b", b"world").unwrap();
    manager.set_completed("s2", "b").unwrap();

    let status = manager.get_status("s2").unwrap();
    assert_eq!(status["container"], dfms_common::DOStatus::Completed as u8);

    let sum_value: u64 = String::from_utf8(manager.read_all("s2", "sum").unwrap()).unwrap().parse().unwrap();
    assert_eq!(sum_value, u64::from(crc32c::crc32c(b"hello")) + u64::from(crc32c::crc32c(b"world")));
}

/// A cyclic deferred-consumer wiring is rejected before anything is constructed; the session
/// stays usable (a subsequent, acyclic deploy still succeeds).
#[test]
fn cyclic_deferred_consumer_edges_are_rejected() {
    let manager = manager();
    manager.create_session("cycle").unwrap();

    let graph = GraphSpec {
        dos: vec![leaf("a"), leaf("b")],
        edges: vec![consumer_edge("a", "b"), consumer_edge("b", "a")],
    };
    manager.add_graph_spec("cycle", graph).unwrap();
    assert!(manager.deploy("cycle").is_err());
}

/// `deploy` is idempotent once a session has been deployed: a second call is a no-op rather
/// than an error or a re-instantiation of the graph's DOs.
#[test]
fn deploy_is_idempotent() {
    let manager = manager();
    manager.create_session("idem").unwrap();
    manager.add_graph_spec("idem", GraphSpec { dos: vec![leaf("a")], edges: vec![] }).unwrap();
    manager.deploy("idem").unwrap();
    manager.trigger("idem", "a", b"x").unwrap();
    manager.deploy("idem").unwrap();
    manager.set_completed("idem", "a").unwrap();
    assert_eq!(manager.read_all("idem", "a").unwrap(), b"x");
}

/// S5 (socket listener): a socket-backed DO forwards bytes received from one TCP client
/// through its own `write` path and completes when the client closes the connection; a
/// deferred CRC consumer then carries that checksum forward exactly as any other pipeline
/// stage would.
#[tokio::test]
async fn s5_socket_listener_feeds_a_crc_consumer() {
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    let manager = manager();
    manager.create_session("s5").unwrap();

    let addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();
    let probe = std::net::TcpListener::bind(addr).unwrap();
    let bound = probe.local_addr().unwrap();
    drop(probe);

    let listener_spec = DoSpec {
        backend: BackendKind::Socket { host: bound.ip().to_string(), port: bound.port() },
        ..leaf("a")
    };
    let crc = staged("b", "crc_result", HashMap::new());
    let graph = GraphSpec { dos: vec![listener_spec, crc], edges: vec![consumer_edge("a", "b")] };
    manager.add_graph_spec("s5", graph).unwrap();
    manager.deploy("s5").unwrap();

    let data = b"shine on you crazy diamond";
    let mut client = tokio::net::TcpStream::connect(bound).await.unwrap();
    client.write_all(data).await.unwrap();
    client.shutdown().await.unwrap();
    drop(client);

    let mut status = manager.get_status("s5").unwrap();
    for _ in 0..200 {
        if status.get("b").copied() == Some(dfms_common::DOStatus::Completed as u8) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        status = manager.get_status("s5").unwrap();
    }

    assert_eq!(status["a"], dfms_common::DOStatus::Completed as u8);
    assert_eq!(status["b"], dfms_common::DOStatus::Completed as u8);
    assert_eq!(manager.read_all("s5", "a").unwrap(), data);
    let reported: u32 = String::from_utf8(manager.read_all("s5", "b").unwrap()).unwrap().parse().unwrap();
    assert_eq!(reported, crc32c::crc32c(data));
}
