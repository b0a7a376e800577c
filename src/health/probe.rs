//! Network probes used by the health checker.
//!
//! # Responsibilities
//! - Resolve the probe address from backend + check policy
//! - TCP connect probe
//! - HTTP GET probe with expected-status matching
//!
//! # Design Decisions
//! - Redirects are never followed; the first response decides
//! - The optional timeout bounds the whole probe (connect + response)

use std::time::Duration;

use reqwest::header::{ACCEPT, HOST};
use reqwest::redirect;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time;

use crate::config::{CheckScheme, HealthCheckConf};
use crate::health::StatusCodeMatcher;
use crate::load_balancer::Backend;

/// Why a probe failed.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected status {status} from {url}, expect {expect}")]
    Status {
        url: String,
        status: u16,
        expect: StatusCodeMatcher,
    },

    #[error("probe to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },
}

/// HTTP client shared by all HTTP probes.
pub fn probe_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .no_proxy()
        .pool_max_idle_per_host(0)
        .user_agent("cluster-balance-health-check")
        .build()
}

/// Address to probe: the backend address, with the port replaced when the
/// check host carries a `:port` suffix.
pub fn health_check_addr(backend: &Backend, conf: &HealthCheckConf) -> String {
    let port = conf
        .host_header()
        .and_then(|host| host.rsplit_once(':'))
        .and_then(|(_, port)| port.parse::<u16>().ok());

    match port {
        Some(port) => format!("{}:{}", backend.addr, port),
        None => backend.addr_info.clone(),
    }
}

/// Run one probe against `backend`.
pub async fn probe(
    client: &reqwest::Client,
    backend: &Backend,
    conf: &HealthCheckConf,
) -> Result<(), ProbeError> {
    let addr = health_check_addr(backend, conf);

    let check = async {
        match conf.scheme {
            CheckScheme::Tcp => tcp_probe(&addr).await,
            CheckScheme::Http => http_probe(client, &addr, conf).await,
        }
    };

    match conf.check_timeout() {
        Some(timeout) => match time::timeout(timeout, check).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Timeout {
                addr: addr.clone(),
                timeout,
            }),
        },
        None => check.await,
    }
}

async fn tcp_probe(addr: &str) -> Result<(), ProbeError> {
    TcpStream::connect(addr)
        .await
        .map(drop)
        .map_err(|source| ProbeError::Connect {
            addr: addr.to_string(),
            source,
        })
}

async fn http_probe(
    client: &reqwest::Client,
    addr: &str,
    conf: &HealthCheckConf,
) -> Result<(), ProbeError> {
    let url = format!("http://{}{}", addr, conf.uri);

    let mut request = client.get(&url).header(ACCEPT, "*/*");
    if let Some(host) = conf.host_header() {
        request = request.header(HOST, host);
    }

    let response = request.send().await.map_err(|source| ProbeError::Http {
        url: url.clone(),
        source,
    })?;

    let status = response.status().as_u16();
    if !conf.status_code.matches(status) {
        return Err(ProbeError::Status {
            url,
            status,
            expect: conf.status_code,
        });
    }
    Ok(())
}
