//! Backend pool of one sub-cluster.
//!
//! # Responsibilities
//! - Hold the weighted backends of a sub-cluster in configuration order
//! - Apply the configured balancing algorithm
//! - Diff membership on reload, keeping backends whose `addr:port` survives
//!
//! # Design Decisions
//! - One mutex per pool guards entries, the sorted cache and the RR cursor;
//!   different pools never contend
//! - The address-sorted view for sticky hashing is an index list built lazily
//!   and dropped on every membership change

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;

use crate::config::BackendConf;
use crate::error::PoolError;
use crate::load_balancer::{
    backend::Backend,
    least_conn::least_conn_candidates,
    round_robin::{simple_select, smooth_select},
    sticky::sticky_select,
};

/// Balancing algorithm used inside a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Cursor based weighted round robin.
    WrrSimple,
    /// Smooth weighted round robin.
    #[default]
    WrrSmooth,
    /// Hash the request key onto the weighted, address-sorted backends.
    WrrSticky,
    /// Least connections, random tie break.
    WlcSimple,
    /// Least connections, smooth WRR tie break.
    WlcSmooth,
}

/// A backend with its pool-local scheduling state.
#[derive(Debug)]
pub struct PoolEntry {
    pub weight: i32,
    pub credit: i64,
    pub backend: Arc<Backend>,
}

impl PoolEntry {
    pub fn new(backend: Arc<Backend>, weight: i32) -> Self {
        Self {
            weight,
            credit: weight as i64,
            backend,
        }
    }

    /// Available and positively weighted.
    pub fn eligible(&self) -> bool {
        self.weight > 0 && self.backend.avail()
    }

    pub fn reset_credit(&mut self) {
        self.credit = self.weight as i64;
    }

    fn update_weight(&mut self, weight: i32) {
        self.weight = weight;
        if weight <= 0 {
            self.credit = 0;
        }
    }
}

#[derive(Debug, Default)]
struct PoolInner {
    entries: Vec<PoolEntry>,
    sorted: Option<Vec<usize>>,
    next: usize,
}

impl PoolInner {
    fn ensure_sorted(&mut self) {
        if self.sorted.is_some() {
            return;
        }
        let entries = &self.entries;
        let mut idx: Vec<usize> = (0..entries.len()).collect();
        idx.sort_by(|&a, &b| entries[a].backend.addr_info.cmp(&entries[b].backend.addr_info));
        self.sorted = Some(idx);
    }
}

/// Weighted backends of one sub-cluster.
#[derive(Debug)]
pub struct Pool {
    name: String,
    inner: Mutex<PoolInner>,
}

impl Pool {
    /// Create an empty pool.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(PoolInner::default()),
        }
    }

    fn inner(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().expect("pool mutex poisoned")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of backends, available or not.
    pub fn len(&self) -> usize {
        self.inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the backends with their weights, in pool order.
    pub fn backends(&self) -> Vec<(Arc<Backend>, i32)> {
        self.inner()
            .entries
            .iter()
            .map(|e| (e.backend.clone(), e.weight))
            .collect()
    }

    /// Apply a backend list.
    ///
    /// Backends whose `addr:port` is still present are kept (health state and
    /// running checkers included) and only get the new weight. Others are
    /// released. The resulting order is the configuration order.
    pub fn update(&self, confs: &[BackendConf]) {
        let mut inner = self.inner();

        let mut existing: HashMap<String, PoolEntry> = inner
            .entries
            .drain(..)
            .map(|e| (e.backend.addr_info.clone(), e))
            .collect();

        let mut entries: Vec<PoolEntry> = Vec::with_capacity(confs.len());
        let mut position: HashMap<String, usize> = HashMap::with_capacity(confs.len());
        for conf in confs {
            let addr_info = conf.addr_info();
            // one backend per address; the last weight listed wins
            if let Some(&idx) = position.get(&addr_info) {
                tracing::debug!(pool = %self.name, backend = %addr_info, "Duplicate backend address");
                entries[idx].update_weight(conf.weight);
                continue;
            }
            position.insert(addr_info.clone(), entries.len());

            match existing.remove(&addr_info) {
                Some(mut entry) if entry.backend.matches(&conf.addr, conf.port) => {
                    entry.update_weight(conf.weight);
                    entries.push(entry);
                }
                other => {
                    if let Some(stale) = other {
                        stale.backend.release();
                    }
                    let backend = Arc::new(Backend::from_conf(&self.name, conf));
                    tracing::debug!(pool = %self.name, backend = %backend.addr_info, "Backend added");
                    entries.push(PoolEntry::new(backend, conf.weight));
                }
            }
        }

        for (addr, stale) in existing {
            tracing::debug!(pool = %self.name, backend = %addr, "Backend removed");
            stale.backend.release();
        }

        inner.entries = entries;
        inner.sorted = None;
        inner.next = 0;
    }

    /// Release every backend, stopping their health checkers.
    pub fn release(&self) {
        for entry in &self.inner().entries {
            entry.backend.release();
        }
    }

    /// Select a backend with `algorithm`. `key` is only used by sticky
    /// hashing.
    pub fn balance(&self, algorithm: Algorithm, key: &[u8]) -> Result<Arc<Backend>, PoolError> {
        let mut guard = self.inner();
        let inner = &mut *guard;
        if inner.entries.is_empty() {
            return Err(PoolError::Empty(self.name.clone()));
        }

        let len = inner.entries.len();
        let picked = match algorithm {
            Algorithm::WrrSmooth => smooth_select(&mut inner.entries, 0..len),
            Algorithm::WrrSimple => simple_select(&mut inner.entries, &mut inner.next),
            Algorithm::WrrSticky => {
                inner.ensure_sorted();
                let sorted = inner.sorted.as_deref().unwrap_or(&[]);
                sticky_select(&inner.entries, sorted, key)
            }
            Algorithm::WlcSmooth => match least_conn_candidates(&inner.entries).as_slice() {
                [] => None,
                [only] => Some(*only),
                tied => smooth_select(&mut inner.entries, tied.iter().copied()),
            },
            Algorithm::WlcSimple => match least_conn_candidates(&inner.entries).as_slice() {
                [] => None,
                [only] => Some(*only),
                tied => Some(tied[rand::thread_rng().gen_range(0..tied.len())]),
            },
        };

        picked
            .map(|idx| inner.entries[idx].backend.clone())
            .ok_or_else(|| PoolError::AllDown(self.name.clone()))
    }
}
