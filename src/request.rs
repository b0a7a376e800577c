//! Per-request balancing state.
//!
//! The routing layer fills in the client address, headers and cookies; the
//! balancer reads them to build the hash key and writes back the retry
//! count, the chosen sub-cluster and the cross-cluster flag.

use std::net::{IpAddr, SocketAddr};

/// A request as seen by the balancer.
#[derive(Debug, Clone, Default)]
pub struct BalanceRequest {
    /// Client socket address, if known.
    pub client_addr: Option<SocketAddr>,

    headers: Vec<(String, String)>,
    cookies: Vec<(String, String)>,

    /// Retries already made for this request. Clamped by the balancer when
    /// the selected sub-cluster is exhausted.
    pub retry_count: i32,

    /// Set when the backend was chosen by cross-sub-cluster retry.
    pub cross_cluster: bool,

    /// Sub-cluster chosen for the last `balance` call.
    pub sub_cluster: Option<String>,

    /// Last internal selection failure, for access logs.
    pub error_message: Option<String>,
}

impl BalanceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    pub fn with_retry_count(mut self, retry_count: i32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    /// First value of header `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Value of cookie `name` (case-sensitive).
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}
