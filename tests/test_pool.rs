//! Tests for server pool management

use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use hive::config::{PortPolicy, ServerConfig};
use hive::error::Error;
use hive::pool::{EventOutcome, PoolOptions, PoolState, ServerPool, gateway};
use hive::server::{Dispatcher, Event, System, handler, router};

fn options() -> PoolOptions {
    PoolOptions {
        port_policy: PortPolicy::Ephemeral,
        server: ServerConfig {
            select_timeout_secs: 1,
            ..ServerConfig::default()
        },
    }
}

fn pool_with(members: usize) -> ServerPool {
    ServerPool::create_with(Dispatcher::new(), 0, "/", gateway::redirect(), members, &options()).unwrap()
}

fn system() -> Arc<System> {
    Arc::new(System::new("pool-test", Dispatcher::new()))
}

async fn exchange(port: u16, raw: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw).await.unwrap();
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    String::from_utf8_lossy(&buf).into_owned()
}

#[test]
fn test_pool_requires_members() {
    let result = ServerPool::create_with(Dispatcher::new(), 0, "/", gateway::redirect(), 0, &options());
    assert!(matches!(result, Err(Error::NoMembers)));
}

#[test]
fn test_pool_ports_are_distinct() {
    let pool = pool_with(32);
    let mut ports = pool.member_ports();
    ports.push(pool.gateway_port());
    ports.sort();
    ports.dedup();

    assert_eq!(pool.member_count(), 32);
    assert_eq!(ports.len(), 33);
}

#[test]
fn test_sequential_ports_follow_gateway() {
    let spare = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let gateway_port = spare.local_addr().unwrap().port();
    drop(spare);

    let options = PoolOptions {
        port_policy: PortPolicy::Sequential,
        ..options()
    };
    let pool = ServerPool::create_with(Dispatcher::new(), gateway_port, "/", gateway::redirect(), 2, &options)
        .unwrap();

    assert_eq!(pool.gateway_port(), gateway_port);
    assert_eq!(pool.member_ports(), vec![gateway_port + 1, gateway_port + 2]);
}

#[test]
fn test_round_robin_visits_each_member_once() {
    let pool = pool_with(3);
    let ports = pool.member_ports();

    let first_cycle: Vec<u16> = (0..3).map(|_| pool.next_port()).collect();
    assert_eq!(first_cycle, ports);
    assert_eq!(pool.next_port(), ports[0]);
}

#[test]
fn test_copy_ports_checks_buffer() {
    let pool = pool_with(3);

    let mut small = [0u16; 2];
    assert!(matches!(
        pool.copy_ports(&mut small),
        Err(Error::BufferTooSmall { given: 2, needed: 3 })
    ));

    let mut exact = [0u16; 4];
    pool.copy_ports(&mut exact).unwrap();
    assert_eq!(&exact[..3], pool.member_ports().as_slice());
    assert_eq!(exact[3], 0);
}

#[test]
fn test_add_route_reaches_every_listener() {
    let pool = pool_with(2);
    pool.add_route("/api", router::welcome()).unwrap();

    assert_eq!(pool.gateway().routes(), vec!["/".to_string(), "/api".to_string()]);
    for index in 0..2 {
        assert_eq!(pool.member(index).unwrap().routes(), vec!["/api".to_string()]);
    }
}

#[tokio::test]
async fn test_add_route_partial_failure_keeps_registered() {
    let pool = pool_with(3);
    let broken = pool.member(1).unwrap();
    broken.dispose().await.unwrap();

    let result = pool.add_route("/x", router::welcome());
    match result {
        Err(Error::RouteBroadcast { resource, ports }) => {
            assert_eq!(resource, "/x");
            assert_eq!(ports, vec![broken.port()]);
        }
        other => panic!("expected a broadcast failure, got {:?}", other),
    }

    assert!(pool.gateway().routes().contains(&"/x".to_string()));
    for index in [0, 2] {
        assert_eq!(pool.member(index).unwrap().routes(), vec!["/x".to_string()]);
    }
    assert!(broken.routes().is_empty());
}

#[test]
fn test_handle_event_counts_member_failures() {
    let pool = pool_with(2);
    let member_port = pool.member_ports()[1];

    let outcome = pool.handle_event(&Event::ServerFailed {
        port: member_port,
        reason: "accept failed".to_string(),
    });
    assert_eq!(outcome, EventOutcome::Handled);
    assert_eq!(pool.failures(1), 1);
    assert_eq!(pool.failures(0), 0);

    let gateway = pool.handle_event(&Event::ServerFailed {
        port: pool.gateway_port(),
        reason: "accept failed".to_string(),
    });
    assert_eq!(gateway, EventOutcome::Handled);

    let stranger = pool.handle_event(&Event::ServerFailed {
        port: 1,
        reason: "n/a".to_string(),
    });
    assert_eq!(stranger, EventOutcome::Ignored);

    let started = pool.handle_event(&Event::ServerStarted { port: member_port });
    assert_eq!(started, EventOutcome::Ignored);
}

#[test]
fn test_print_lists_every_member() {
    let pool = pool_with(2);
    let mut out = Vec::new();
    pool.print(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert!(text.contains("state: Created"));
    assert!(text.contains(&format!("gateway: {}", pool.gateway_port())));
    for port in pool.member_ports() {
        assert!(text.contains(&port.to_string()));
    }
}

#[tokio::test]
async fn test_gateway_redirects_round_robin() {
    let pool = pool_with(3);
    let ports = pool.member_ports();
    pool.add_route(
        "/work",
        handler(|ctx, _, res| {
            res.body(format!("member {}", ctx.port()));
        }),
    )
    .unwrap();
    pool.start(system(), router::not_found()).await.unwrap();
    assert_eq!(pool.state(), PoolState::Started);

    for expected in &ports[..2] {
        let response = exchange(pool.gateway_port(), b"GET / HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n").await;
        assert!(response.starts_with("HTTP/1.1 307 Temporary Redirect\r\n"));
        assert!(response.contains(&format!("Location: http://127.0.0.1:{}/\r\n", expected)));
    }
    // the gateway's handlers and the pool share one cursor
    assert_eq!(pool.next_port(), ports[2]);

    let response = exchange(ports[1], b"GET /work HTTP/1.1\r\n\r\n").await;
    assert!(response.ends_with(&format!("member {}", ports[1])));
    assert_eq!(pool.member(1).unwrap().request_count(), 1);

    pool.shutdown().await.unwrap();
    assert_eq!(pool.state(), PoolState::ShuttingDown);
    pool.dispose().await.unwrap();
    assert_eq!(pool.state(), PoolState::Disposed);
}

#[tokio::test]
async fn test_failed_start_rolls_back_and_can_retry() {
    let pool = pool_with(3);
    let busy = pool.member(1).unwrap();
    busy.start(system(), router::not_found()).await.unwrap();

    let result = pool.start(system(), router::not_found()).await;
    assert!(matches!(
        result,
        Err(Error::PoolStart { port, ref source }) if port == busy.port()
            && matches!(**source, Error::AlreadyStarted(_))
    ));
    assert_eq!(pool.state(), PoolState::Created);
    assert!(!pool.gateway().is_running());
    assert!(!pool.member(0).unwrap().is_running());
    assert!(!pool.member(2).unwrap().is_running());

    busy.shutdown().await.unwrap();
    pool.start(system(), router::not_found()).await.unwrap();
    assert!(pool.gateway().is_running());
    for index in 0..3 {
        assert!(pool.member(index).unwrap().is_running());
    }

    pool.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pool_state_machine() {
    let pool = pool_with(2);

    // shutdown before start is a no-op
    pool.shutdown().await.unwrap();
    assert_eq!(pool.state(), PoolState::Created);

    pool.start(system(), router::not_found()).await.unwrap();
    assert!(matches!(
        pool.start(system(), router::not_found()).await,
        Err(Error::InvalidState { state: PoolState::Started, .. })
    ));
    assert!(matches!(pool.dispose().await, Err(Error::StillRunning(_))));

    // routes can still be added while started
    pool.add_route("/late", router::welcome()).unwrap();

    pool.shutdown().await.unwrap();
    assert!(matches!(
        pool.start(system(), router::not_found()).await,
        Err(Error::InvalidState { state: PoolState::ShuttingDown, .. })
    ));
    assert!(matches!(
        pool.add_route("/after", router::welcome()),
        Err(Error::InvalidState { .. })
    ));

    pool.dispose().await.unwrap();
    assert!(matches!(pool.dispose().await, Err(Error::AlreadyDisposed(_))));
    assert!(matches!(
        pool.shutdown().await,
        Err(Error::InvalidState { state: PoolState::Disposed, .. })
    ));
}

#[tokio::test]
async fn test_dispose_refuses_running_member() {
    let pool = pool_with(2);
    let member = pool.member(0).unwrap();
    member.start(system(), router::not_found()).await.unwrap();

    assert!(matches!(pool.dispose().await, Err(Error::StillRunning(p)) if p == member.port()));

    member.shutdown().await.unwrap();
    pool.dispose().await.unwrap();
}

#[tokio::test]
async fn test_dispose_skips_member_disposed_on_its_own() {
    let pool = pool_with(3);
    pool.member(1).unwrap().dispose().await.unwrap();

    pool.dispose().await.unwrap();

    assert_eq!(pool.state(), PoolState::Disposed);
    assert!(pool.gateway().is_disposed());
    for index in 0..3 {
        assert!(pool.member(index).unwrap().is_disposed());
    }
    assert!(matches!(pool.dispose().await, Err(Error::AlreadyDisposed(_))));
}
