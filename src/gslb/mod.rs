//! Global server load balancing across sub-clusters.
//!
//! # Data Flow
//! ```text
//! BalanceRequest
//!     → balancer.rs (retry budget check, build hash key)
//!     → Pick sub-cluster:
//!         - single positive weight: fast path
//!         - otherwise: weighted hash over name-sorted sub-clusters
//!     → sub_cluster.rs (pool balance)
//!     → On exhaustion: random other sub-cluster (cross retry)
//!     → Return backend or BalanceError
//! ```
//!
//! # Design Decisions
//! - `GSLB_BLACKHOLE` is a normal sub-cluster for hashing but never a
//!   cross-retry target
//! - Policy (retries, hashing, algorithm) is applied separately from weights
//!   so either can be reloaded on its own

pub mod balancer;
pub mod state;
pub mod sub_cluster;

pub use balancer::{GslbBalancer, DEFAULT_CROSS_RETRY, DEFAULT_RETRY_MAX};
pub use state::{GslbState, SubClusterState};
pub use sub_cluster::{SubCluster, SubClusterType, GSLB_BLACKHOLE};
