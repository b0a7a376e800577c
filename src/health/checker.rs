//! Health checker: brings an unavailable backend back into service.
//!
//! # Responsibilities
//! - Drive the failure-threshold transition from request outcomes
//! - Run one probe task per unavailable backend
//! - Stop the task on recovery or when the backend is released
//!
//! # State Machine
//! ```text
//! Available --(fail_num >= threshold)--> Checking --(succ_num >= threshold)--> Available
//!                                           |
//!                                           +--(backend released)--> Terminated
//! ```
//!
//! # Design Decisions
//! - The transition itself (`Backend::update_status`) decides whether to
//!   spawn, so a backend never has two checkers
//! - Check policy is looked up on every iteration; a policy reload applies
//!   to running checkers
//! - Checkers run on the runtime handed to `HealthMonitor::new`, so a
//!   failure reported from any thread still starts one

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time;

use crate::health::probe::{probe, probe_client};
use crate::load_balancer::Backend;
use crate::observability::metrics;
use crate::policy::ClusterPolicy;

/// Delay before asking again for a missing check policy.
const POLICY_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Owns the request-outcome callbacks and spawns health checkers.
pub struct HealthMonitor {
    policy: Arc<dyn ClusterPolicy>,
    client: reqwest::Client,
    runtime: Handle,
    active: Arc<AtomicUsize>,
}

impl HealthMonitor {
    /// Create a monitor whose checkers run on `runtime`.
    pub fn new(policy: Arc<dyn ClusterPolicy>, runtime: Handle) -> Result<Self, reqwest::Error> {
        Ok(Self {
            policy,
            client: probe_client()?,
            runtime,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Policy source shared with the balancer table.
    pub fn policy(&self) -> &Arc<dyn ClusterPolicy> {
        &self.policy
    }

    /// Number of checker tasks currently running.
    pub fn active_checkers(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Request outcome callback: success.
    pub fn on_success(&self, backend: &Backend) {
        backend.on_success();
    }

    /// Request outcome callback: failure.
    ///
    /// Returns true if this failure took the backend down and started a
    /// checker.
    pub fn on_fail(&self, backend: &Arc<Backend>, cluster: &str) -> bool {
        backend.add_fail_num();
        self.update_status(backend, cluster)
    }

    fn update_status(&self, backend: &Arc<Backend>, cluster: &str) -> bool {
        let Some(conf) = self.policy.health_check(cluster) else {
            return false;
        };
        if !backend.update_status(conf.fail_num) {
            return false;
        }

        tracing::warn!(
            cluster = %cluster,
            backend = %backend.name,
            addr = %backend.addr_info,
            fail_num = conf.fail_num,
            "Backend marked unavailable"
        );
        metrics::record_backend_transition(false);
        self.spawn_checker(Arc::clone(backend), cluster.to_string());
        true
    }

    fn spawn_checker(&self, backend: Arc<Backend>, cluster: String) {
        let checker = Checker {
            policy: Arc::clone(&self.policy),
            client: self.client.clone(),
            backend,
            cluster,
            _active: ActiveGuard::new(Arc::clone(&self.active)),
        };

        self.runtime.spawn(checker.run());
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("active_checkers", &self.active_checkers())
            .finish_non_exhaustive()
    }
}

/// Counts a running checker for as long as it lives.
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        metrics::health_checker_started();
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
        metrics::health_checker_stopped();
    }
}

struct Checker {
    policy: Arc<dyn ClusterPolicy>,
    client: reqwest::Client,
    backend: Arc<Backend>,
    cluster: String,
    _active: ActiveGuard,
}

impl Checker {
    async fn run(self) {
        tracing::info!(cluster = %self.cluster, backend = %self.backend.name, "Health check started");

        loop {
            if self.backend.is_released() {
                tracing::info!(backend = %self.backend.name, "Backend released, health check stopped");
                break;
            }

            let Some(conf) = self.policy.health_check(&self.cluster) else {
                self.pause(POLICY_RETRY_DELAY).await;
                continue;
            };

            if let Err(e) = probe(&self.client, &self.backend, &conf).await {
                self.backend.reset_succ_num();
                tracing::debug!(backend = %self.backend.name, error = %e, "Backend still not available");
                self.pause(conf.check_interval()).await;
                continue;
            }

            self.backend.add_succ_num();
            if !self.backend.check_avail(conf.succ_num) {
                tracing::debug!(backend = %self.backend.name, "Probe succeeded, waiting for more");
                self.pause(conf.check_interval()).await;
                continue;
            }

            self.backend.set_avail(true);
            metrics::record_backend_transition(true);
            tracing::info!(
                cluster = %self.cluster,
                backend = %self.backend.name,
                addr = %self.backend.addr_info,
                "Backend back to normal"
            );
            break;
        }
    }

    /// Sleep for `delay`, waking early if the backend is released.
    async fn pause(&self, delay: Duration) {
        tokio::select! {
            _ = self.backend.released() => {}
            _ = time::sleep(delay) => {}
        }
    }
}
