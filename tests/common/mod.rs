//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cluster_balance::config::{ClusterConf, ClusterConfTable, ClusterTableConf, GslbConf, HealthCheckConf};
use cluster_balance::health::StatusCodeMatcher;
use cluster_balance::{BalancerTable, ClusterConfStore, HealthMonitor};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Start a programmable mock HTTP backend on an ephemeral port.
///
/// `f` is called once per request and returns the status and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 2048];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Health check policy tuned for fast tests.
pub fn fast_check(fail_num: u32) -> HealthCheckConf {
    HealthCheckConf {
        uri: "/health".into(),
        status_code: StatusCodeMatcher::Exact(200),
        fail_num,
        succ_num: 1,
        check_interval_ms: 50,
        check_timeout_ms: Some(1000),
        ..HealthCheckConf::default()
    }
}

/// Policy store holding `conf` for `cluster`.
pub fn store_with(cluster: &str, conf: ClusterConf) -> Arc<ClusterConfStore> {
    let mut table = ClusterConfTable {
        version: "test".into(),
        ..Default::default()
    };
    table.config.insert(cluster.to_string(), conf);
    Arc::new(ClusterConfStore::new(table))
}

/// Table whose checkers run on the calling test's runtime.
pub fn table_with(store: Arc<ClusterConfStore>) -> BalancerTable {
    BalancerTable::new(HealthMonitor::new(store, tokio::runtime::Handle::current()).unwrap())
}

pub fn gslb(clusters: serde_json::Value) -> GslbConf {
    serde_json::from_value(json!({ "clusters": clusters, "hostname": "test", "ts": "1" })).unwrap()
}

pub fn backends(version: &str, config: serde_json::Value) -> ClusterTableConf {
    serde_json::from_value(json!({ "version": version, "config": config })).unwrap()
}

/// Backend descriptor pointing at a mock server.
pub fn backend_json(name: &str, addr: SocketAddr, weight: i32) -> serde_json::Value {
    json!({ "name": name, "addr": addr.ip().to_string(), "port": addr.port(), "weight": weight })
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Write `content` to a fresh file in the temp dir.
pub fn temp_file(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "cluster-balance-it-{}-{}-{}",
        std::process::id(),
        fastrand::u64(..),
        name
    ));
    std::fs::write(&path, content).unwrap();
    path
}
