//! End-to-end importer tests over real loopback sockets
//!
//! Each test binds an ephemeral port, pushes records through a plain
//! `TcpStream`, and asserts on what the in-memory engine and stats
//! collector recorded.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use virta_core::{ExecutionEngine, MemoryEngine, MemoryStatsCollector, StatsCollector};
use virta_importer::{EndpointSpec, ServerAdapter, SocketImporter};

struct Fixture {
    engine: Arc<MemoryEngine>,
    stats: Arc<MemoryStatsCollector>,
    importer: SocketImporter,
}

fn fixture() -> Fixture {
    let engine = Arc::new(MemoryEngine::new());
    let stats = Arc::new(MemoryStatsCollector::new());
    let adapter = ServerAdapter::new(
        Arc::clone(&engine) as Arc<dyn ExecutionEngine>,
        Arc::clone(&stats) as Arc<dyn StatsCollector>,
    );
    Fixture {
        engine,
        stats,
        importer: SocketImporter::new(adapter),
    }
}

/// Poll until `cond` holds or five seconds pass
async fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn records_flow_from_socket_to_engine() {
    let f = fixture();
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"abc,123\n").await.unwrap();
    client.flush().await.unwrap();

    wait_until(|| f.engine.call_count() == 1).await;
    let calls = f.engine.calls();
    assert_eq!(calls[0].procedure, "INSERT_KV");
    assert_eq!(calls[0].fields, vec!["abc".to_string(), "123".to_string()]);
    assert_eq!(f.stats.queued_count("INSERT_KV"), 1);

    drop(client);
    f.importer.stop().await;
}

#[tokio::test]
async fn many_records_preserve_per_connection_order() {
    let f = fixture();
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut payload = String::new();
    for i in 0..200 {
        payload.push_str(&format!("key{i},{i}\n"));
    }
    client.write_all(payload.as_bytes()).await.unwrap();
    client.flush().await.unwrap();

    wait_until(|| f.engine.call_count() == 200).await;
    let calls = f.engine.calls();
    for (i, call) in calls.iter().enumerate() {
        assert_eq!(call.fields[0], format!("key{i}"));
    }

    drop(client);
    f.importer.stop().await;
}

#[tokio::test]
async fn backpressure_set_before_connect_defers_intake() {
    let f = fixture();
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    // Throttle before the client even connects; the late-constructed
    // handler must still observe the standing signal.
    f.importer.set_back_pressure(true);

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"deferred,1\n").await.unwrap();
    client.flush().await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(f.engine.call_count(), 0, "record submitted while throttled");

    f.importer.set_back_pressure(false);
    wait_until(|| f.engine.call_count() == 1).await;

    drop(client);
    f.importer.stop().await;
}

#[tokio::test]
async fn stop_closes_the_listening_socket() {
    let f = fixture();
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    // Endpoint accepts while running
    let probe = TcpStream::connect(("127.0.0.1", port)).await;
    assert!(probe.is_ok());
    drop(probe);

    f.importer.stop().await;

    // After stop the port no longer accepts; allow the kernel a moment to
    // release the socket.
    wait_until(|| {
        std::net::TcpStream::connect_timeout(
            &std::net::SocketAddr::from(([127, 0, 0, 1], port)),
            Duration::from_millis(50),
        )
        .is_err()
    })
    .await;
}

#[tokio::test]
async fn rejected_records_are_counted_without_closing_the_connection() {
    let f = fixture();
    f.engine.set_reject(true);
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    let mut client = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    client.write_all(b"a,1\nb,2\n").await.unwrap();
    client.flush().await.unwrap();
    wait_until(|| f.stats.failure_count("INSERT_KV") == 2).await;

    // The connection survived the rejections; only the accepted call is
    // recorded, the rejected lines are visible through stats alone.
    f.engine.set_reject(false);
    client.write_all(b"c,3\n").await.unwrap();
    client.flush().await.unwrap();
    wait_until(|| f.engine.call_count() == 1).await;
    assert_eq!(f.engine.calls()[0].fields[0], "c");
    assert_eq!(f.stats.queued_count("INSERT_KV"), 1);

    drop(client);
    f.importer.stop().await;
}

#[tokio::test]
async fn interleaved_connections_each_preserve_their_own_order() {
    let f = fixture();
    let port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();

    let mut a = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut b = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    for i in 0..50 {
        a.write_all(format!("a{i},x\n").as_bytes()).await.unwrap();
        b.write_all(format!("b{i},x\n").as_bytes()).await.unwrap();
    }
    a.flush().await.unwrap();
    b.flush().await.unwrap();

    wait_until(|| f.engine.call_count() == 100).await;

    // No global order across connections, but each connection's records
    // arrive in the order it sent them.
    let calls = f.engine.calls();
    let from = |prefix: &str| -> Vec<String> {
        calls
            .iter()
            .map(|c| c.fields[0].clone())
            .filter(|k| k.starts_with(prefix))
            .collect()
    };
    assert_eq!(from("a"), (0..50).map(|i| format!("a{i}")).collect::<Vec<_>>());
    assert_eq!(from("b"), (0..50).map(|i| format!("b{i}")).collect::<Vec<_>>());

    drop(a);
    drop(b);
    f.importer.stop().await;
}

#[tokio::test]
async fn connection_cap_queues_excess_clients() {
    let engine = Arc::new(MemoryEngine::new());
    let stats = Arc::new(MemoryStatsCollector::new());
    let adapter = ServerAdapter::new(
        Arc::clone(&engine) as Arc<dyn ExecutionEngine>,
        Arc::clone(&stats) as Arc<dyn StatsCollector>,
    );
    let importer = SocketImporter::new(adapter).max_connections(1);

    let port = importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    importer.ready_for_data("kv").await.unwrap();

    let mut first = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    first.write_all(b"first,1\n").await.unwrap();
    first.flush().await.unwrap();
    wait_until(|| engine.call_count() == 1).await;

    // Second client connects (kernel backlog) but is not serviced until
    // the first connection ends.
    let mut second = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    second.write_all(b"second,2\n").await.unwrap();
    second.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.call_count(), 1, "cap of one was not enforced");

    first.shutdown().await.unwrap();
    drop(first);
    wait_until(|| engine.call_count() == 2).await;
    assert_eq!(engine.calls()[1].fields[0], "second");

    drop(second);
    importer.stop().await;
}

#[tokio::test]
async fn two_endpoints_route_to_their_own_procedures() {
    let f = fixture();
    let kv_port = f
        .importer
        .configure("kv", EndpointSpec::new(0, "INSERT_KV"))
        .await
        .unwrap();
    let ev_port = f
        .importer
        .configure("events", EndpointSpec::new(0, "INSERT_EVENT"))
        .await
        .unwrap();
    f.importer.ready_for_data("kv").await.unwrap();
    f.importer.ready_for_data("events").await.unwrap();

    let mut kv = TcpStream::connect(("127.0.0.1", kv_port)).await.unwrap();
    let mut ev = TcpStream::connect(("127.0.0.1", ev_port)).await.unwrap();
    kv.write_all(b"k,1\n").await.unwrap();
    ev.write_all(b"e,2\n").await.unwrap();
    kv.flush().await.unwrap();
    ev.flush().await.unwrap();

    wait_until(|| f.engine.call_count() == 2).await;
    let mut procedures: Vec<String> =
        f.engine.calls().iter().map(|c| c.procedure.clone()).collect();
    procedures.sort();
    assert_eq!(procedures, vec!["INSERT_EVENT", "INSERT_KV"]);

    drop(kv);
    drop(ev);
    f.importer.stop().await;
}
