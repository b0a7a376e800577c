//! Backend selection core for a layer-7 reverse proxy.
//!
//! Given a request already mapped to a cluster, pick the backend that
//! should serve it: first a sub-cluster by weighted hash (GSLB), then a
//! backend inside it by weighted round robin, least connections or sticky
//! hashing. Backends that fail too often are taken out and probed until
//! they recover. Configs reload in place without losing backend health.

pub mod config;
pub mod error;
pub mod gslb;
pub mod health;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod policy;
pub mod request;
pub mod table;

pub use error::{BalanceError, TableError};
pub use gslb::GslbBalancer;
pub use health::HealthMonitor;
pub use load_balancer::Backend;
pub use policy::{ClusterConfStore, ClusterPolicy};
pub use request::BalanceRequest;
pub use table::BalancerTable;
