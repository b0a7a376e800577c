//! Intra-sub-cluster load balancing.
//!
//! # Data Flow
//! ```text
//! Sub-cluster selected by GSLB
//!     → pool.rs (lock pool, pick algorithm variant)
//!     → Apply load balancing algorithm over eligible entries:
//!         - round_robin.rs (smooth / simple weighted round robin)
//!         - least_conn.rs (lowest conn/weight ratio, tie break)
//!         - sticky.rs (hash key onto address-sorted weighted buckets)
//!     → backend.rs (shared backend record)
//!     → Return backend or PoolError
//! ```
//!
//! # Design Decisions
//! - Eligible = available AND weight > 0; everything else is skipped
//! - Algorithm is an enum chosen once per policy, matched per call
//! - Pool state is per sub-cluster; backend health is per backend

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod sticky;

pub use backend::{Backend, BackendConnectionGuard};
pub use pool::{Algorithm, Pool, PoolEntry};
pub use sticky::get_hash;
