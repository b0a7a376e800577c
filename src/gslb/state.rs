//! Read-only balancer snapshots for status endpoints.

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubClusterState {
    pub backend_num: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GslbState {
    pub sub_clusters: BTreeMap<String, SubClusterState>,
    pub backend_num: usize,
}
