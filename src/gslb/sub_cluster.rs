//! Sub-cluster: a named, weighted pool.

use std::sync::Arc;

use crate::config::BackendConf;
use crate::error::PoolError;
use crate::load_balancer::{Algorithm, Backend, Pool};

/// Reserved sub-cluster name meaning "drop traffic sent here".
pub const GSLB_BLACKHOLE: &str = "GSLB_BLACKHOLE";

/// Kind of sub-cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubClusterType {
    Normal,
    /// Never picked by cross retry.
    Blackhole,
}

/// A named pool with a GSLB weight.
#[derive(Debug)]
pub struct SubCluster {
    pub name: String,
    pub kind: SubClusterType,
    pub weight: i32,
    pool: Pool,
}

impl SubCluster {
    pub fn new(name: impl Into<String>, weight: i32) -> Self {
        let name = name.into();
        let kind = if name == GSLB_BLACKHOLE {
            SubClusterType::Blackhole
        } else {
            SubClusterType::Normal
        };
        Self {
            pool: Pool::new(name.clone()),
            name,
            kind,
            weight,
        }
    }

    /// Number of backends.
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Merge a new backend list, keeping surviving backends.
    pub fn update(&self, backends: &[BackendConf]) {
        self.pool.update(backends);
    }

    /// Stop every backend of this sub-cluster.
    pub fn release(&self) {
        self.pool.release();
    }

    pub fn backends(&self) -> Vec<(Arc<Backend>, i32)> {
        self.pool.backends()
    }

    pub fn balance(&self, algorithm: Algorithm, key: &[u8]) -> Result<Arc<Backend>, PoolError> {
        self.pool.balance(algorithm, key)
    }
}
