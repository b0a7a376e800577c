//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single physical backend server
//! - Track active connections (for Least Connections LB)
//! - Track availability and consecutive failure/success counters
//! - Carry the lifecycle token that stops a running health checker
//!
//! # Design Decisions
//! - All counters live behind one per-backend mutex so the state transitions
//!   below are atomic with respect to each other
//! - Identity across reloads is the `addr:port` string (`addr_info`)

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::config::BackendConf;

#[derive(Debug)]
struct BackendState {
    avail: bool,
    conn_num: i64,
    fail_num: u32,
    succ_num: u32,
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Backend name from configuration.
    pub name: String,
    /// Host address (without port).
    pub addr: String,
    /// Port number.
    pub port: u16,
    /// `addr:port`, used to match backends across reloads.
    pub addr_info: String,
    /// Sub-cluster this backend belongs to.
    pub sub_cluster: String,

    state: Mutex<BackendState>,
    closed: CancellationToken,
}

impl Backend {
    /// Create a new, available backend.
    pub fn new(
        name: impl Into<String>,
        addr: impl Into<String>,
        port: u16,
        sub_cluster: impl Into<String>,
    ) -> Self {
        let addr = addr.into();
        let addr_info = format!("{}:{}", addr, port);
        Self {
            name: name.into(),
            addr,
            port,
            addr_info,
            sub_cluster: sub_cluster.into(),
            state: Mutex::new(BackendState {
                avail: true,
                conn_num: 0,
                fail_num: 0,
                succ_num: 0,
            }),
            closed: CancellationToken::new(),
        }
    }

    /// Create a backend from its configuration entry.
    pub fn from_conf(sub_cluster: &str, conf: &BackendConf) -> Self {
        Self::new(conf.name.clone(), conf.addr.clone(), conf.port, sub_cluster)
    }

    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().expect("backend state mutex poisoned")
    }

    /// Return true if the address and port match this backend.
    pub fn matches(&self, addr: &str, port: u16) -> bool {
        self.addr == addr && self.port == port
    }

    /// Return true if the backend currently accepts traffic.
    pub fn avail(&self) -> bool {
        self.state().avail
    }

    /// Set availability. Becoming available resets the connection count.
    pub fn set_avail(&self, avail: bool) {
        let mut state = self.state();
        set_avail_locked(&mut state, avail);
    }

    /// Current number of active connections.
    pub fn conn_num(&self) -> i64 {
        self.state().conn_num
    }

    /// Increment active connection count.
    pub fn inc_conn_num(&self) {
        self.state().conn_num += 1;
    }

    /// Decrement active connection count.
    pub fn dec_conn_num(&self) {
        self.state().conn_num -= 1;
    }

    /// Count the backend as in use until the returned guard is dropped.
    pub fn conn_guard(self: &Arc<Self>) -> BackendConnectionGuard {
        self.inc_conn_num();
        BackendConnectionGuard {
            backend: self.clone(),
        }
    }

    pub fn fail_num(&self) -> u32 {
        self.state().fail_num
    }

    pub fn succ_num(&self) -> u32 {
        self.state().succ_num
    }

    /// Report a failed request.
    pub fn add_fail_num(&self) {
        self.state().fail_num += 1;
    }

    /// Report a successful request.
    pub fn reset_fail_num(&self) {
        self.state().fail_num = 0;
    }

    /// Report a successful health probe.
    pub fn add_succ_num(&self) {
        self.state().succ_num += 1;
    }

    /// Report a failed health probe.
    pub fn reset_succ_num(&self) {
        self.state().succ_num = 0;
    }

    /// If at least `succ_threshold` probes succeeded in a row, reset the
    /// counter and return true.
    pub fn check_avail(&self, succ_threshold: u32) -> bool {
        let mut state = self.state();
        if state.succ_num >= succ_threshold {
            state.succ_num = 0;
            return true;
        }
        false
    }

    /// Mark the backend unavailable once `fail_threshold` consecutive failures
    /// have been seen.
    ///
    /// Returns true only on the available → unavailable transition, so the
    /// caller starts at most one health checker per outage.
    pub fn update_status(&self, fail_threshold: u32) -> bool {
        let mut state = self.state();
        let was_avail = state.avail;

        if state.fail_num >= fail_threshold {
            set_avail_locked(&mut state, false);
            return was_avail;
        }
        false
    }

    /// Request outcome callback: success.
    pub fn on_success(&self) {
        self.reset_fail_num();
    }

    /// Permanently remove the backend. Idempotent.
    pub fn release(&self) {
        self.closed.cancel();
    }

    /// Return true once `release` has been called.
    pub fn is_released(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves when the backend is released.
    pub fn released(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

fn set_avail_locked(state: &mut BackendState, avail: bool) {
    state.avail = avail;
    if avail {
        state.conn_num = 0;
    }
}

/// A RAII guard that manages the active connection count.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    pub backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_conn_num();
    }
}
