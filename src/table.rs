//! Balancer table: cluster name → GSLB balancer.
//!
//! # Responsibilities
//! - Build one `GslbBalancer` per cluster from the GSLB and backend configs
//! - Reload in place, reusing balancers (and their backends) that survive
//! - Report per-cluster failures without aborting the others
//! - Route request-outcome callbacks to the health monitor
//!
//! # Design Decisions
//! - The name → balancer map is swapped wholesale (`ArcSwap`); lookups never
//!   block on a reload
//! - A mutex serializes Init/Reload and guards the version stamps
//! - A cluster that fails a reload keeps serving with its previous balancer

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use serde::Serialize;

use crate::config::{load_cluster_table, load_gslb_conf, BackendConf, ClusterBackend, ClusterTableConf, GslbConf};
use crate::error::{BalanceError, ClusterError, ClusterFailure, TableError};
use crate::gslb::{GslbBalancer, GslbState};
use crate::health::HealthMonitor;
use crate::load_balancer::Backend;
use crate::observability::metrics;
use crate::request::BalanceRequest;

type BalancerMap = HashMap<String, Arc<GslbBalancer>>;

/// Version stamps of the configs currently applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalVersions {
    pub cluster_table_conf_ver: String,
    pub gslb_conf_timestamp: String,
    pub gslb_conf_src: String,
}

/// Backend counts for every cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BalTableState {
    pub balancers: BTreeMap<String, GslbState>,
    pub backend_num: usize,
}

pub struct BalancerTable {
    balancers: ArcSwap<BalancerMap>,
    versions: Mutex<BalVersions>,
    monitor: HealthMonitor,
}

impl BalancerTable {
    pub fn new(monitor: HealthMonitor) -> Self {
        Self {
            balancers: ArcSwap::from_pointee(HashMap::new()),
            versions: Mutex::new(BalVersions::default()),
            monitor,
        }
    }

    fn versions(&self) -> MutexGuard<'_, BalVersions> {
        self.versions.lock().expect("balancer table mutex poisoned")
    }

    pub fn monitor(&self) -> &HealthMonitor {
        &self.monitor
    }

    /// Build every balancer from scratch, releasing any previous ones.
    pub fn init(&self, gslb: &GslbConf, backends: &ClusterTableConf) -> Result<(), TableError> {
        self.apply(gslb, backends, false)
    }

    /// Apply new configs, reusing the balancers of surviving clusters.
    pub fn reload(&self, gslb: &GslbConf, backends: &ClusterTableConf) -> Result<(), TableError> {
        self.apply(gslb, backends, true)
    }

    /// Load both config files and `init`.
    pub fn init_from_files(&self, gslb_path: &Path, table_path: &Path) -> Result<(), TableError> {
        let gslb = load_gslb_conf(gslb_path)?;
        let backends = load_cluster_table(table_path)?;
        self.init(&gslb, &backends)
    }

    /// Load both config files and `reload`.
    pub fn reload_from_files(&self, gslb_path: &Path, table_path: &Path) -> Result<(), TableError> {
        let gslb = load_gslb_conf(gslb_path)?;
        let backends = load_cluster_table(table_path)?;
        self.reload(&gslb, &backends)
    }

    fn apply(&self, gslb: &GslbConf, backends: &ClusterTableConf, reuse: bool) -> Result<(), TableError> {
        let mut versions = self.versions();
        let current = self.balancers.load_full();

        let mut next = BalancerMap::with_capacity(gslb.clusters.len());
        let mut failures = Vec::new();

        for (name, weights) in &gslb.clusters {
            let previous = current.get(name).filter(|_| reuse).cloned();

            let applied = check_cluster(backends.config.get(name)).and_then(|cluster_backend| {
                let balancer = previous
                    .clone()
                    .unwrap_or_else(|| Arc::new(GslbBalancer::new(name.clone())));
                balancer.reload_with_backends(weights, cluster_backend)?;
                Ok(balancer)
            });

            match applied {
                Ok(balancer) => {
                    self.apply_policy(name, &balancer);
                    next.insert(name.clone(), balancer);
                }
                Err(error) => {
                    tracing::warn!(cluster = %name, error = %error, "Cluster not applied");
                    if let Some(previous) = previous {
                        next.insert(name.clone(), previous);
                    }
                    failures.push(ClusterFailure {
                        cluster: name.clone(),
                        error,
                    });
                }
            }
        }

        for (name, old) in current.iter() {
            let kept = next.get(name).is_some_and(|new| Arc::ptr_eq(new, old));
            if !kept {
                tracing::info!(cluster = %name, "Cluster balancer released");
                old.release();
            }
        }

        let cluster_num = next.len();
        self.balancers.store(Arc::new(next));

        *versions = BalVersions {
            cluster_table_conf_ver: backends.version.clone(),
            gslb_conf_timestamp: gslb.ts.clone(),
            gslb_conf_src: gslb.hostname.clone(),
        };

        metrics::record_reload(failures.is_empty());

        if failures.is_empty() {
            tracing::info!(
                clusters = cluster_num,
                table_version = %backends.version,
                gslb_ts = %gslb.ts,
                "Balancer table applied"
            );
            Ok(())
        } else {
            failures.sort_by(|a, b| a.cluster.cmp(&b.cluster));
            Err(TableError::Partial(failures))
        }
    }

    /// Balancer of `cluster`.
    pub fn lookup(&self, cluster: &str) -> Result<Arc<GslbBalancer>, BalanceError> {
        self.balancers
            .load()
            .get(cluster)
            .cloned()
            .ok_or_else(|| BalanceError::NoCluster(cluster.to_string()))
    }

    /// Look up `cluster` and select a backend for `req`.
    pub fn balance(&self, cluster: &str, req: &mut BalanceRequest) -> Result<Arc<Backend>, BalanceError> {
        let balancer = self.lookup(cluster).inspect_err(metrics::record_balance_error)?;
        balancer.balance(req)
    }

    /// Re-apply GSLB policy from the policy source to every balancer.
    ///
    /// A cluster whose policy is gone goes back to the built-in defaults.
    pub fn refresh_policies(&self) {
        for (name, balancer) in self.balancers.load().iter() {
            self.apply_policy(name, balancer);
        }
    }

    fn apply_policy(&self, name: &str, balancer: &GslbBalancer) {
        match self.monitor.policy().gslb_basic(name) {
            Some(conf) => balancer.set_policy(&conf),
            None => balancer.reset_policy(),
        }
    }

    pub fn on_success(&self, backend: &Backend) {
        self.monitor.on_success(backend);
    }

    /// Returns true if the failure took the backend down.
    pub fn on_fail(&self, backend: &Arc<Backend>, cluster: &str) -> bool {
        self.monitor.on_fail(backend, cluster)
    }

    pub fn get_state(&self) -> BalTableState {
        let mut state = BalTableState::default();
        for (name, balancer) in self.balancers.load().iter() {
            let gslb = balancer.state();
            state.backend_num += gslb.backend_num;
            state.balancers.insert(name.clone(), gslb);
        }
        state
    }

    pub fn get_versions(&self) -> BalVersions {
        self.versions().clone()
    }

    /// Release every balancer and empty the table.
    pub fn release(&self) {
        let _versions = self.versions();
        let old = self.balancers.swap(Arc::new(HashMap::new()));
        for balancer in old.values() {
            balancer.release();
        }
    }
}

impl std::fmt::Debug for BalancerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalancerTable")
            .field("clusters", &self.balancers.load().len())
            .field("monitor", &self.monitor)
            .finish()
    }
}

fn check_cluster(backends: Option<&ClusterBackend>) -> Result<&ClusterBackend, ClusterError> {
    let backends = backends.ok_or(ClusterError::MissingBackends)?;

    let mut empty: Vec<&String> = backends
        .iter()
        .filter(|(_, list)| !BackendConf::any_positive(list))
        .map(|(sub, _)| sub)
        .collect();
    empty.sort();

    match empty.first() {
        Some(sub) => Err(ClusterError::NoAvailBackend((*sub).clone())),
        None => Ok(backends),
    }
}
