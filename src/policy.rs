//! Per-cluster policy lookup.
//!
//! The balancer table and the health checkers ask for a cluster's policy at
//! the moment they need it, so a policy reload is picked up without touching
//! any balancer state.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{ClusterConfTable, GslbBasicConf, HealthCheckConf};

/// Source of per-cluster policy.
pub trait ClusterPolicy: Send + Sync {
    /// GSLB policy of `cluster`, if configured.
    fn gslb_basic(&self, cluster: &str) -> Option<GslbBasicConf>;

    /// Health check policy of `cluster`, if configured.
    fn health_check(&self, cluster: &str) -> Option<HealthCheckConf>;
}

/// Policy backed by a hot-swappable `ClusterConfTable`.
#[derive(Debug, Default)]
pub struct ClusterConfStore {
    table: ArcSwap<ClusterConfTable>,
}

impl ClusterConfStore {
    pub fn new(table: ClusterConfTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    /// Replace the whole table.
    pub fn store(&self, table: ClusterConfTable) {
        tracing::info!(version = %table.version, clusters = table.config.len(), "Cluster policy updated");
        self.table.store(Arc::new(table));
    }

    /// Current table.
    pub fn load(&self) -> Arc<ClusterConfTable> {
        self.table.load_full()
    }

    pub fn version(&self) -> String {
        self.table.load().version.clone()
    }
}

impl ClusterPolicy for ClusterConfStore {
    fn gslb_basic(&self, cluster: &str) -> Option<GslbBasicConf> {
        self.table
            .load()
            .config
            .get(cluster)
            .map(|conf| conf.gslb_basic.clone())
    }

    fn health_check(&self, cluster: &str) -> Option<HealthCheckConf> {
        self.table
            .load()
            .config
            .get(cluster)
            .map(|conf| conf.check_conf.clone())
    }
}
