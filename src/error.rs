//! Error types of the balancing core.
//!
//! Selection errors (`BalanceError`, `PoolError`) are per-request and
//! recoverable; configuration errors (`GslbError`, `TableError`) are raised by
//! Init/Reload and never abort processing of unrelated clusters.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by a pool when no backend can be chosen.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Pool has no backends at all.
    #[error("no backend in sub cluster [{0}]")]
    Empty(String),

    /// Every backend is unavailable or has zero weight.
    #[error("rr_bal: all backends are down in [{0}]")]
    AllDown(String),
}

/// Errors returned by `Balance`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Cluster name is not in the balancer table.
    #[error("BK_NO_CLUSTER: cluster [{0}] not found")]
    NoCluster(String),

    /// No sub-cluster could be selected.
    #[error("BK_NO_SUB_CLUSTER")]
    NoSubCluster,

    /// The selected sub-cluster has no usable backend and cross retry is off.
    #[error("BK_NO_BACKEND")]
    NoBackend,

    /// The request has used its whole retry budget.
    #[error("BK_RETRY_TOOMANY")]
    RetryTooMany,

    /// No other sub-cluster is eligible for cross retry.
    #[error("BK_NO_SUB_CLUSTER_CROSS")]
    NoSubClusterCross,

    /// Cross retry picked a sub-cluster but it had no usable backend.
    #[error("BK_CROSS_RETRY_BALANCE")]
    CrossRetryBalance,
}

impl BalanceError {
    /// Stable label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BalanceError::NoCluster(_) => "no_cluster",
            BalanceError::NoSubCluster => "no_sub_cluster",
            BalanceError::NoBackend => "no_backend",
            BalanceError::RetryTooMany => "retry_too_many",
            BalanceError::NoSubClusterCross => "no_sub_cluster_cross",
            BalanceError::CrossRetryBalance => "cross_retry_balance",
        }
    }
}

/// Errors applying GSLB weights to one cluster.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GslbError {
    #[error("gslb [{0}] total weight <= 0")]
    ZeroTotalWeight(String),
}

/// Why a single cluster failed to load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClusterError {
    #[error(transparent)]
    Gslb(#[from] GslbError),

    #[error("cluster not found in backend table")]
    MissingBackends,

    #[error("sub cluster [{0}] has no backend with positive weight")]
    NoAvailBackend(String),
}

/// One failing cluster of an Init/Reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterFailure {
    pub cluster: String,
    pub error: ClusterError,
}

impl fmt::Display for ClusterFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cluster, self.error)
    }
}

/// Errors returned by balancer table Init/Reload.
#[derive(Debug, Error)]
pub enum TableError {
    /// Config files could not be loaded; nothing was applied.
    #[error("config load failed: {0}")]
    Config(#[from] ConfigError),

    /// Some clusters failed; all others were applied.
    #[error("{} cluster(s) failed: {}", .0.len(), join_failures(.0))]
    Partial(Vec<ClusterFailure>),
}

impl TableError {
    /// Failing clusters, if any were applied partially.
    pub fn failures(&self) -> &[ClusterFailure] {
        match self {
            TableError::Partial(failures) => failures,
            TableError::Config(_) => &[],
        }
    }
}

fn join_failures(failures: &[ClusterFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
