//! The load client driven against a real server.

use forking_hello::client::{self, LoadConfig, LoadReport};
use forking_hello::{Config, Server};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn start_server() -> (Arc<Server>, SocketAddr) {
    let config = Config {
        listen: "127.0.0.1:0".parse().unwrap(),
        ..Config::default()
    };
    let server = Arc::new(Server::bind(&config).unwrap());
    let addr = server.local_addr().unwrap();
    let serving = Arc::clone(&server);
    thread::spawn(move || serving.serve());
    (server, addr)
}

fn wait_for_reclaim(server: &Server) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while server.live_workers() > 0 {
        assert!(Instant::now() < deadline, "workers were not reclaimed");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_every_connection_verified() {
    let (server, target) = start_server();

    let report = tokio_test::block_on(client::run(&LoadConfig {
        target,
        max_clients: 4,
        max_conns: 64,
        read_responses: true,
    }));

    assert_eq!(
        report,
        LoadReport {
            connected: 256,
            sent: 256,
            verified: 256,
            failed: 0,
        }
    );
    wait_for_reclaim(&server);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fire_and_forget_peers_are_reclaimed() {
    let (server, target) = start_server();

    let report = client::run(&LoadConfig {
        target,
        max_clients: 2,
        max_conns: 100,
        read_responses: false,
    })
    .await;

    assert_eq!(report.sent, 200);
    assert_eq!(report.failed, 0);

    // Workers finish even though nobody read their responses.
    tokio::task::spawn_blocking(move || wait_for_reclaim(&server))
        .await
        .unwrap();
}
