//! GSLB balancer: sub-cluster selection and cross-sub-cluster retry.
//!
//! # Responsibilities
//! - Pick a sub-cluster by weighted hash of the request key
//! - Delegate backend selection to the sub-cluster pool
//! - Retry once in another sub-cluster when the first one is exhausted
//! - Apply weight reloads without losing pool/backend identity
//!
//! # Design Decisions
//! - One mutex per balancer, held for the whole `balance` call so weights and
//!   the sub-cluster list are consistent with each other
//! - Sub-clusters kept sorted by name so hash buckets are deterministic
//! - A cluster with exactly one positive weight skips hashing entirely

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;

use crate::config::{
    cookie_key, BalanceMode, ClusterBackend, GslbBasicConf, GslbClusterConf, HashConf, HashStrategy,
};
use crate::error::{BalanceError, GslbError};
use crate::gslb::state::{GslbState, SubClusterState};
use crate::gslb::sub_cluster::{SubCluster, SubClusterType};
use crate::load_balancer::{get_hash, Algorithm, Backend};
use crate::observability::metrics;
use crate::request::BalanceRequest;

/// Retries inside a sub-cluster before any policy is applied.
pub const DEFAULT_RETRY_MAX: i32 = 3;
/// Cross-sub-cluster retries before any policy is applied.
pub const DEFAULT_CROSS_RETRY: i32 = 1;

#[derive(Debug)]
struct GslbInner {
    sub_clusters: Vec<SubCluster>,
    total_weight: i64,
    /// Index of the only positively weighted sub-cluster, if there is one.
    single: Option<usize>,

    retry_max: i32,
    cross_retry: i32,
    hash_conf: HashConf,
    algorithm: Algorithm,
}

impl GslbInner {
    fn select_sub_cluster(&self, key: &[u8]) -> Option<usize> {
        if self.total_weight <= 0 {
            return None;
        }
        if let Some(idx) = self.single {
            return Some(idx);
        }

        let mut value = get_hash(key, self.total_weight as u64) as i64;
        for (idx, sub) in self.sub_clusters.iter().enumerate() {
            if sub.weight <= 0 {
                continue;
            }
            value -= sub.weight as i64;
            if value < 0 {
                return Some(idx);
            }
        }
        None
    }

    fn random_select_exclude(&self, exclude: usize) -> Option<usize> {
        let candidates: Vec<usize> = self
            .sub_clusters
            .iter()
            .enumerate()
            .filter(|(idx, sub)| {
                *idx != exclude && sub.weight >= 0 && sub.kind != SubClusterType::Blackhole
            })
            .map(|(idx, _)| idx)
            .collect();

        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rand::thread_rng().gen_range(0..candidates.len())])
    }
}

/// Balancer for one logical cluster.
#[derive(Debug)]
pub struct GslbBalancer {
    name: String,
    inner: Mutex<GslbInner>,
}

impl GslbBalancer {
    /// Create a balancer with no sub-clusters and default policy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(GslbInner {
                sub_clusters: Vec::new(),
                total_weight: 0,
                single: None,
                retry_max: DEFAULT_RETRY_MAX,
                cross_retry: DEFAULT_CROSS_RETRY,
                hash_conf: HashConf::default(),
                algorithm: Algorithm::WrrSmooth,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, GslbInner> {
        self.inner.lock().expect("gslb balancer mutex poisoned")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Apply the cluster's GSLB policy.
    pub fn set_policy(&self, conf: &GslbBasicConf) {
        let algorithm = if conf.hash_conf.session_sticky {
            Algorithm::WrrSticky
        } else {
            match conf.balance_mode {
                BalanceMode::Wrr => Algorithm::WrrSmooth,
                BalanceMode::Wlc => Algorithm::WlcSmooth,
            }
        };

        let mut inner = self.inner();
        inner.retry_max = conf.retry_max;
        inner.cross_retry = conf.cross_retry;
        inner.hash_conf = conf.hash_conf.clone();
        inner.algorithm = algorithm;
    }

    /// Drop any applied policy and go back to the built-in defaults.
    pub fn reset_policy(&self) {
        let mut inner = self.inner();
        inner.retry_max = DEFAULT_RETRY_MAX;
        inner.cross_retry = DEFAULT_CROSS_RETRY;
        inner.hash_conf = HashConf::default();
        inner.algorithm = Algorithm::WrrSmooth;
    }

    /// Build the sub-cluster list of a fresh balancer.
    pub fn init(&self, conf: &GslbClusterConf) -> Result<(), GslbError> {
        self.reload(conf)
    }

    /// Apply new sub-cluster weights.
    ///
    /// Sub-clusters still present keep their pool; removed ones are
    /// released. If the new total weight is not positive nothing changes.
    pub fn reload(&self, conf: &GslbClusterConf) -> Result<(), GslbError> {
        let mut inner = self.inner();
        self.rebuild(&mut inner, conf)
    }

    /// Apply new weights and backend lists as one step.
    ///
    /// `balance` never sees the new sub-cluster list before its pools are
    /// filled.
    pub fn reload_with_backends(
        &self,
        conf: &GslbClusterConf,
        backends: &ClusterBackend,
    ) -> Result<(), GslbError> {
        let mut inner = self.inner();
        self.rebuild(&mut inner, conf)?;
        fill_pools(&inner, backends);
        Ok(())
    }

    fn rebuild(&self, inner: &mut GslbInner, conf: &GslbClusterConf) -> Result<(), GslbError> {
        let total: i64 = conf.values().filter(|w| **w > 0).map(|w| *w as i64).sum();
        if total <= 0 {
            return Err(GslbError::ZeroTotalWeight(self.name.clone()));
        }

        let mut existing: HashMap<String, SubCluster> = inner
            .sub_clusters
            .drain(..)
            .map(|sub| (sub.name.clone(), sub))
            .collect();

        let mut list: Vec<SubCluster> = conf
            .iter()
            .map(|(name, weight)| match existing.remove(name) {
                Some(mut sub) => {
                    sub.weight = *weight;
                    sub
                }
                None => SubCluster::new(name.clone(), *weight),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));

        for (name, sub) in existing {
            tracing::info!(cluster = %self.name, sub_cluster = %name, "Sub cluster removed");
            sub.release();
        }

        let positive: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, sub)| sub.weight > 0)
            .map(|(idx, _)| idx)
            .collect();

        inner.single = match positive.as_slice() {
            [only] => Some(*only),
            _ => None,
        };
        inner.total_weight = total;
        inner.sub_clusters = list;
        Ok(())
    }

    /// Push backend lists into the sub-clusters named in `backends`.
    pub fn update_backends(&self, backends: &ClusterBackend) {
        fill_pools(&self.inner(), backends);
    }

    /// Release every sub-cluster.
    pub fn release(&self) {
        let inner = self.inner();
        for sub in &inner.sub_clusters {
            sub.release();
        }
    }

    pub fn sub_cluster_num(&self) -> usize {
        self.inner().sub_clusters.len()
    }

    /// Names and weights of the sub-clusters, in name order.
    pub fn sub_cluster_weights(&self) -> Vec<(String, i32)> {
        self.inner()
            .sub_clusters
            .iter()
            .map(|sub| (sub.name.clone(), sub.weight))
            .collect()
    }

    /// Every backend of every sub-cluster.
    pub fn backends(&self) -> Vec<Arc<Backend>> {
        self.inner()
            .sub_clusters
            .iter()
            .flat_map(|sub| sub.backends())
            .map(|(backend, _)| backend)
            .collect()
    }

    /// Backend counts per sub-cluster.
    pub fn state(&self) -> GslbState {
        let inner = self.inner();
        let mut state = GslbState::default();
        for sub in &inner.sub_clusters {
            let backend_num = sub.len();
            state
                .sub_clusters
                .insert(sub.name.clone(), SubClusterState { backend_num });
            state.backend_num += backend_num;
        }
        state
    }

    /// Select a backend for `req`.
    ///
    /// Updates `req.sub_cluster`, `req.cross_cluster` and, when the first
    /// sub-cluster is exhausted, clamps `req.retry_count` to the in-cluster
    /// retry limit.
    pub fn balance(&self, req: &mut BalanceRequest) -> Result<Arc<Backend>, BalanceError> {
        let inner = self.inner();

        if req.retry_count > inner.retry_max + inner.cross_retry {
            return Err(fail(BalanceError::RetryTooMany));
        }

        let key = hash_key(&inner.hash_conf, req);

        let Some(current) = inner.select_sub_cluster(&key) else {
            return Err(fail(BalanceError::NoSubCluster));
        };
        let sub = &inner.sub_clusters[current];
        req.sub_cluster = Some(sub.name.clone());

        if req.retry_count <= inner.retry_max {
            match sub.balance(inner.algorithm, &key) {
                Ok(backend) => return Ok(backend),
                Err(e) => {
                    tracing::debug!(cluster = %self.name, sub_cluster = %sub.name, error = %e, "Sub cluster exhausted");
                    req.error_message = Some(format!(
                        "cluster[{}], sub[{}], err[{}]",
                        self.name, sub.name, e
                    ));
                    req.retry_count = inner.retry_max;
                }
            }
        }

        if inner.cross_retry <= 0 {
            return Err(fail(BalanceError::NoBackend));
        }

        req.cross_cluster = true;

        let Some(other) = inner.random_select_exclude(current) else {
            return Err(fail(BalanceError::NoSubClusterCross));
        };
        let sub = &inner.sub_clusters[other];
        req.sub_cluster = Some(sub.name.clone());

        match sub.balance(inner.algorithm, &key) {
            Ok(backend) => Ok(backend),
            Err(e) => {
                req.error_message = Some(format!(
                    "cluster[{}], sub[{}], err[{}]",
                    self.name, sub.name, e
                ));
                Err(fail(BalanceError::CrossRetryBalance))
            }
        }
    }
}

fn fill_pools(inner: &GslbInner, backends: &ClusterBackend) {
    for sub in &inner.sub_clusters {
        if let Some(list) = backends.get(&sub.name) {
            sub.update(list);
        }
    }
}

fn fail(err: BalanceError) -> BalanceError {
    metrics::record_balance_error(&err);
    err
}

/// Bytes hashed for sub-cluster and sticky selection. Never empty.
fn hash_key(conf: &HashConf, req: &BalanceRequest) -> Vec<u8> {
    let client_ip = req.client_ip().map(ip_bytes);

    let key = match conf.hash_strategy {
        HashStrategy::ClientIdOnly => client_id(conf, req),
        HashStrategy::ClientIpOnly => client_ip,
        HashStrategy::ClientIdPreferred => client_id(conf, req).or(client_ip),
    };

    match key {
        Some(key) if !key.is_empty() => key,
        _ => fastrand::u64(..).to_be_bytes().to_vec(),
    }
}

fn client_id(conf: &HashConf, req: &BalanceRequest) -> Option<Vec<u8>> {
    let header = conf.hash_header.as_deref()?;
    if let Some(value) = req.header(header).filter(|v| !v.is_empty()) {
        return Some(value.as_bytes().to_vec());
    }
    let cookie = cookie_key(header)?;
    req.cookie(cookie).map(|v| v.as_bytes().to_vec())
}

fn ip_bytes(ip: IpAddr) -> Vec<u8> {
    match ip {
        IpAddr::V4(v4) => v4.octets().to_vec(),
        IpAddr::V6(v6) => v6.octets().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConf;
    use crate::gslb::sub_cluster::GSLB_BLACKHOLE;

    fn weights(list: &[(&str, i32)]) -> GslbClusterConf {
        list.iter().map(|(n, w)| (n.to_string(), *w)).collect()
    }

    fn backends(list: &[(&str, &[&str])]) -> ClusterBackend {
        list.iter()
            .map(|(sub, addrs)| {
                let list = addrs
                    .iter()
                    .map(|addr| BackendConf {
                        name: format!("{}-{}", sub, addr),
                        addr: addr.to_string(),
                        port: 80,
                        weight: 1,
                    })
                    .collect();
                (sub.to_string(), list)
            })
            .collect()
    }

    fn set_all_avail(bal: &GslbBalancer, sub: &str, avail: bool) {
        for backend in bal.backends() {
            if backend.sub_cluster == sub {
                backend.set_avail(avail);
            }
        }
    }

    fn policy(retry_max: i32, cross_retry: i32) -> GslbBasicConf {
        GslbBasicConf {
            retry_max,
            cross_retry,
            ..GslbBasicConf::default()
        }
    }

    fn client(ip: &str) -> BalanceRequest {
        BalanceRequest::new().with_client_addr(format!("{}:1234", ip).parse().unwrap())
    }

    #[test]
    fn test_init_zero_weight_fails() {
        let bal = GslbBalancer::new("c");
        let err = bal.init(&weights(&[("a", 0), ("b", -1)])).unwrap_err();
        assert_eq!(err, GslbError::ZeroTotalWeight("c".into()));
    }

    #[test]
    fn test_reload_failure_keeps_previous_state() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 2)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));

        assert!(bal.reload(&weights(&[("a", 0)])).is_err());
        assert_eq!(
            bal.sub_cluster_weights(),
            vec![("a".to_string(), 1), ("b".to_string(), 2)]
        );
        assert!(bal.backends().iter().all(|b| !b.is_released()));
    }

    #[test]
    fn test_reload_keeps_and_releases_sub_clusters() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 1)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        let before = bal.backends();

        bal.reload(&weights(&[("a", 5), ("c", 1)])).unwrap();
        assert_eq!(
            bal.sub_cluster_weights(),
            vec![("a".to_string(), 5), ("c".to_string(), 1)]
        );
        let a = before.iter().find(|b| b.sub_cluster == "a").unwrap();
        let b = before.iter().find(|b| b.sub_cluster == "b").unwrap();
        assert!(!a.is_released());
        assert!(b.is_released());
        assert!(Arc::ptr_eq(a, &bal.backends()[0]));
    }

    #[test]
    fn test_reload_with_backends_fills_new_sub_cluster() {
        let bal = GslbBalancer::new("c");
        bal.reload_with_backends(&weights(&[("a", 1)]), &backends(&[("a", &["10.0.0.1"])]))
            .unwrap();

        bal.reload_with_backends(
            &weights(&[("a", 1), ("b", 1)]),
            &backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]),
        )
        .unwrap();
        assert_eq!(bal.state().sub_clusters["b"].backend_num, 1);

        for i in 0..50 {
            let mut req = client(&format!("2.2.2.{}", i));
            assert!(bal.balance(&mut req).is_ok());
            assert!(!req.cross_cluster);
        }

        let err = bal
            .reload_with_backends(&weights(&[("a", 0)]), &backends(&[("a", &["10.0.0.9"])]))
            .unwrap_err();
        assert_eq!(err, GslbError::ZeroTotalWeight("c".into()));
        assert_eq!(bal.backends().len(), 2);
        assert!(bal.backends().iter().all(|b| b.addr != "10.0.0.9"));
    }

    #[test]
    fn test_reset_policy_restores_defaults() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"])]));

        bal.set_policy(&policy(0, 0));
        let mut req = client("1.1.1.1");
        req.retry_count = 1;
        assert_eq!(bal.balance(&mut req).unwrap_err(), BalanceError::RetryTooMany);

        bal.reset_policy();
        let mut req = client("1.1.1.1");
        req.retry_count = DEFAULT_RETRY_MAX;
        assert!(bal.balance(&mut req).is_ok());
    }

    #[test]
    fn test_single_fast_path() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 0), ("b", 3), (GSLB_BLACKHOLE, 0)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));

        for i in 0..20 {
            let mut req = client(&format!("1.1.1.{}", i));
            bal.balance(&mut req).unwrap();
            assert_eq!(req.sub_cluster.as_deref(), Some("b"));
            assert!(!req.cross_cluster);
        }
    }

    #[test]
    fn test_same_client_same_sub_cluster() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 1), ("c", 2)])).unwrap();
        bal.update_backends(&backends(&[
            ("a", &["10.0.0.1"]),
            ("b", &["10.0.1.1"]),
            ("c", &["10.0.2.1"]),
        ]));

        let mut first = client("8.8.8.8");
        bal.balance(&mut first).unwrap();
        for _ in 0..10 {
            let mut req = client("8.8.8.8");
            bal.balance(&mut req).unwrap();
            assert_eq!(req.sub_cluster, first.sub_cluster);
        }
    }

    #[test]
    fn test_retry_too_many() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1)])).unwrap();
        bal.set_policy(&policy(2, 1));

        let mut req = client("1.2.3.4").with_retry_count(4);
        assert_eq!(bal.balance(&mut req).unwrap_err(), BalanceError::RetryTooMany);
    }

    #[test]
    fn test_no_cross_retry_returns_no_backend() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 1)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        bal.set_policy(&policy(2, 0));
        set_all_avail(&bal, "a", false);
        set_all_avail(&bal, "b", false);

        let mut req = client("1.2.3.4");
        assert_eq!(bal.balance(&mut req).unwrap_err(), BalanceError::NoBackend);
        assert_eq!(req.retry_count, 2);
        assert!(req.error_message.is_some());
    }

    #[test]
    fn test_cross_retry_picks_other_sub_cluster() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 0)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        bal.set_policy(&policy(2, 1));
        set_all_avail(&bal, "a", false);

        let mut req = client("1.2.3.4");
        let backend = bal.balance(&mut req).unwrap();
        assert_eq!(backend.sub_cluster, "b");
        assert_eq!(req.sub_cluster.as_deref(), Some("b"));
        assert!(req.cross_cluster);
        assert_eq!(req.retry_count, 2);
    }

    #[test]
    fn test_cross_retry_within_budget_skips_first_round() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 0)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        bal.set_policy(&policy(1, 1));

        // a is healthy but the request already used its in-cluster retries
        let mut req = client("1.2.3.4").with_retry_count(2);
        let backend = bal.balance(&mut req).unwrap();
        assert_eq!(backend.sub_cluster, "b");
        assert!(req.cross_cluster);
    }

    #[test]
    fn test_cross_retry_excludes_blackhole_and_current() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), (GSLB_BLACKHOLE, 0)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"])]));
        bal.set_policy(&policy(2, 1));
        set_all_avail(&bal, "a", false);

        for _ in 0..20 {
            let mut req = client("1.2.3.4");
            assert_eq!(
                bal.balance(&mut req).unwrap_err(),
                BalanceError::NoSubClusterCross
            );
            assert!(req.cross_cluster);
        }
    }

    #[test]
    fn test_cross_retry_excludes_negative_weight() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", -1)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        bal.set_policy(&policy(2, 1));
        set_all_avail(&bal, "a", false);

        let mut req = client("1.2.3.4");
        assert_eq!(
            bal.balance(&mut req).unwrap_err(),
            BalanceError::NoSubClusterCross
        );
    }

    #[test]
    fn test_cross_retry_balance_failed() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 0)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1"]), ("b", &["10.0.1.1"])]));
        bal.set_policy(&policy(2, 1));
        set_all_avail(&bal, "a", false);
        set_all_avail(&bal, "b", false);

        let mut req = client("1.2.3.4");
        assert_eq!(
            bal.balance(&mut req).unwrap_err(),
            BalanceError::CrossRetryBalance
        );
        assert_eq!(req.sub_cluster.as_deref(), Some("b"));
    }

    #[test]
    fn test_sticky_session_by_cookie() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1)])).unwrap();
        bal.update_backends(&backends(&[(
            "a",
            &["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"],
        )]));
        bal.set_policy(&GslbBasicConf {
            hash_conf: HashConf {
                hash_strategy: HashStrategy::ClientIdOnly,
                hash_header: Some("cookie:sid".into()),
                session_sticky: true,
            },
            ..GslbBasicConf::default()
        });

        for i in 0..20 {
            let sid = format!("session-{}", i);
            let mut req = BalanceRequest::new().with_cookie("sid", sid.clone());
            let first = bal.balance(&mut req).unwrap();
            for _ in 0..5 {
                let mut req = BalanceRequest::new().with_cookie("sid", sid.clone());
                assert!(Arc::ptr_eq(&first, &bal.balance(&mut req).unwrap()));
            }
        }
    }

    #[test]
    fn test_hash_key_sources() {
        let by_header = HashConf {
            hash_strategy: HashStrategy::ClientIdPreferred,
            hash_header: Some("X-Uid".into()),
            session_sticky: false,
        };
        let req = client("10.1.2.3").with_header("x-uid", "u1");
        assert_eq!(hash_key(&by_header, &req), b"u1".to_vec());

        // falls back to client ip
        let req = client("10.1.2.3");
        assert_eq!(hash_key(&by_header, &req), vec![10, 1, 2, 3]);

        // nothing available: random 8 bytes
        let id_only = HashConf {
            hash_strategy: HashStrategy::ClientIdOnly,
            ..by_header
        };
        assert_eq!(hash_key(&id_only, &BalanceRequest::new()).len(), 8);
    }

    #[test]
    fn test_state_counts() {
        let bal = GslbBalancer::new("c");
        bal.init(&weights(&[("a", 1), ("b", 1)])).unwrap();
        bal.update_backends(&backends(&[("a", &["10.0.0.1", "10.0.0.2"]), ("b", &["10.0.1.1"])]));

        let state = bal.state();
        assert_eq!(state.backend_num, 3);
        assert_eq!(state.sub_clusters["a"].backend_num, 2);
        assert_eq!(state.sub_clusters["b"].backend_num, 1);
    }
}
