//! Configuration schema definitions.
//!
//! Three JSON documents feed the balancing core:
//! - the GSLB weight config (`GslbConf`)
//! - the cluster backend table (`ClusterTableConf`)
//! - per-cluster policy (`ClusterConfTable`)
//!
//! The process itself is configured with a small TOML file (`ServiceConfig`).
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::health::StatusCodeMatcher;

/// Sub-cluster name → GSLB weight for one cluster.
pub type GslbClusterConf = HashMap<String, i32>;

/// GSLB weight configuration for all clusters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GslbConf {
    /// Cluster name → sub-cluster weights.
    pub clusters: HashMap<String, GslbClusterConf>,

    /// Host that produced this config.
    pub hostname: String,

    /// Config timestamp, used as its version stamp.
    pub ts: String,
}

/// Backend server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct BackendConf {
    /// Backend identifier.
    pub name: String,

    /// Backend address (host or IP, without port).
    pub addr: String,

    /// Backend port.
    pub port: u16,

    /// Weight for weighted load balancing.
    #[serde(default = "default_weight")]
    pub weight: i32,
}

impl BackendConf {
    /// `addr:port`, the identity of a backend across reloads.
    pub fn addr_info(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Return true if any backend in the list can take traffic.
    pub fn any_positive(backends: &[BackendConf]) -> bool {
        backends.iter().any(|b| b.weight > 0)
    }
}

fn default_weight() -> i32 {
    1
}

/// Ordered backends of one sub-cluster.
pub type SubClusterBackend = Vec<BackendConf>;

/// Sub-cluster name → backends.
pub type ClusterBackend = HashMap<String, SubClusterBackend>;

/// Backend table for all clusters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ClusterTableConf {
    /// Config version stamp.
    pub version: String,

    /// Cluster name → sub-cluster backends.
    pub config: HashMap<String, ClusterBackend>,
}

/// Source of the bytes used for sticky / GSLB hashing.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashStrategy {
    /// Header or cookie value only.
    ClientIdOnly,
    /// Client IP address only.
    #[default]
    ClientIpOnly,
    /// Header or cookie value, falling back to the client IP.
    ClientIdPreferred,
}

impl HashStrategy {
    /// Return true if the strategy reads a client-supplied identifier.
    pub fn uses_client_id(self) -> bool {
        matches!(self, HashStrategy::ClientIdOnly | HashStrategy::ClientIdPreferred)
    }
}

/// Hashing configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct HashConf {
    /// Where the hash key comes from.
    pub hash_strategy: HashStrategy,

    /// Header name, or `cookie:<name>` to read a cookie.
    pub hash_header: Option<String>,

    /// Pin sessions to a backend with sticky hashing.
    pub session_sticky: bool,
}

impl HashConf {
    /// Cookie name when `hash_header` has the `cookie:<name>` form.
    pub fn cookie_key(&self) -> Option<&str> {
        self.hash_header.as_deref().and_then(cookie_key)
    }
}

/// Extract `<name>` from a `cookie:<name>` hash header.
pub fn cookie_key(header: &str) -> Option<&str> {
    let (prefix, key) = header.split_once(':')?;
    if prefix.trim().eq_ignore_ascii_case("cookie") {
        Some(key.trim())
    } else {
        None
    }
}

/// Intra-sub-cluster balancing mode.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
pub enum BalanceMode {
    /// Weighted round robin.
    #[default]
    #[serde(rename = "WRR", alias = "wrr")]
    Wrr,
    /// Weighted least connections.
    #[serde(rename = "WLC", alias = "wlc")]
    Wlc,
}

/// GSLB policy of one cluster.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GslbBasicConf {
    /// Retries allowed against another sub-cluster.
    pub cross_retry: i32,

    /// Retries allowed inside the selected sub-cluster.
    pub retry_max: i32,

    /// Hash key source and stickiness.
    pub hash_conf: HashConf,

    /// Algorithm used inside a sub-cluster.
    pub balance_mode: BalanceMode,
}

impl Default for GslbBasicConf {
    fn default() -> Self {
        Self {
            cross_retry: 0,
            retry_max: 2,
            hash_conf: HashConf::default(),
            balance_mode: BalanceMode::Wrr,
        }
    }
}

/// Health check probe kind.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CheckScheme {
    #[default]
    Http,
    Tcp,
}

/// Health check policy of one cluster.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthCheckConf {
    /// Probe kind.
    pub scheme: CheckScheme,

    /// Path to probe for HTTP health checks.
    pub uri: String,

    /// Host header for HTTP probes; a `:port` suffix also overrides the
    /// probed port. Empty means no override.
    pub host: Option<String>,

    /// Expected status code for HTTP probes.
    pub status_code: StatusCodeMatcher,

    /// Number of consecutive request failures before marking unavailable.
    pub fail_num: u32,

    /// Number of consecutive probe successes before marking available.
    pub succ_num: u32,

    /// Delay between probes in milliseconds.
    pub check_interval_ms: u64,

    /// Probe timeout in milliseconds (none = no timeout).
    pub check_timeout_ms: Option<u64>,
}

impl HealthCheckConf {
    /// Configured `Host` override, if any.
    pub fn host_header(&self) -> Option<&str> {
        self.host.as_deref().filter(|host| !host.is_empty())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for HealthCheckConf {
    fn default() -> Self {
        Self {
            scheme: CheckScheme::Http,
            uri: "/health_check".to_string(),
            host: None,
            status_code: StatusCodeMatcher::Any,
            fail_num: 5,
            succ_num: 1,
            check_interval_ms: 1000,
            check_timeout_ms: None,
        }
    }
}

/// Per-cluster policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ClusterConf {
    /// GSLB policy.
    pub gslb_basic: GslbBasicConf,

    /// Health check policy.
    pub check_conf: HealthCheckConf,
}

/// Policy for all clusters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct ClusterConfTable {
    /// Config version stamp.
    pub version: String,

    /// Cluster name → policy.
    pub config: HashMap<String, ClusterConf>,
}

/// Root configuration for the balancer service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path to the GSLB weight config (JSON).
    pub gslb_conf_path: PathBuf,

    /// Path to the cluster backend table (JSON).
    pub cluster_table_path: PathBuf,

    /// Path to the per-cluster policy config (JSON).
    pub cluster_conf_path: PathBuf,

    /// Reload automatically when any of the files change.
    pub watch: bool,

    /// Interval between balancer state log lines, 0 to disable.
    pub status_interval_secs: u64,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            gslb_conf_path: PathBuf::from("conf/gslb.json"),
            cluster_table_path: PathBuf::from("conf/cluster_table.json"),
            cluster_conf_path: PathBuf::from("conf/cluster_conf.json"),
            watch: true,
            status_interval_secs: 60,
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_conf_defaults() {
        let conf: ClusterConf = serde_json::from_str("{}").unwrap();
        assert_eq!(conf.gslb_basic.retry_max, 2);
        assert_eq!(conf.gslb_basic.cross_retry, 0);
        assert_eq!(conf.gslb_basic.hash_conf.hash_strategy, HashStrategy::ClientIpOnly);
        assert_eq!(conf.gslb_basic.balance_mode, BalanceMode::Wrr);
        assert_eq!(conf.check_conf.scheme, CheckScheme::Http);
        assert_eq!(conf.check_conf.uri, "/health_check");
        assert_eq!(conf.check_conf.fail_num, 5);
        assert_eq!(conf.check_conf.succ_num, 1);
        assert_eq!(conf.check_conf.check_interval(), Duration::from_secs(1));
        assert_eq!(conf.check_conf.check_timeout(), None);
        assert_eq!(conf.check_conf.status_code, StatusCodeMatcher::Any);
    }

    #[test]
    fn test_parse_cluster_conf() {
        let json = r#"{
            "gslb_basic": {
                "cross_retry": 1,
                "balance_mode": "WLC",
                "hash_conf": {
                    "hash_strategy": "client_id_preferred",
                    "hash_header": "Cookie:UID",
                    "session_sticky": true
                }
            },
            "check_conf": { "scheme": "tcp", "status_code": 200, "check_timeout_ms": 500 }
        }"#;
        let conf: ClusterConf = serde_json::from_str(json).unwrap();
        assert_eq!(conf.gslb_basic.balance_mode, BalanceMode::Wlc);
        assert_eq!(conf.gslb_basic.hash_conf.cookie_key(), Some("UID"));
        assert!(conf.gslb_basic.hash_conf.session_sticky);
        assert_eq!(conf.check_conf.scheme, CheckScheme::Tcp);
        assert_eq!(conf.check_conf.status_code, StatusCodeMatcher::Exact(200));
        assert_eq!(conf.check_conf.check_timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_invalid_status_code_rejected() {
        let json = r#"{ "check_conf": { "status_code": 42 } }"#;
        assert!(serde_json::from_str::<ClusterConf>(json).is_err());
    }

    #[test]
    fn test_cookie_key() {
        assert_eq!(cookie_key("cookie: sid"), Some("sid"));
        assert_eq!(cookie_key("X-Session-Id"), None);
        assert_eq!(cookie_key("X-Foo:bar"), None);
    }

    #[test]
    fn test_backend_conf_defaults() {
        let b: BackendConf =
            serde_json::from_str(r#"{ "name": "a", "addr": "10.0.0.1", "port": 80 }"#).unwrap();
        assert_eq!(b.weight, 1);
        assert_eq!(b.addr_info(), "10.0.0.1:80");
    }
}
