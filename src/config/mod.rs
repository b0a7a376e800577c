//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gslb.json / cluster_table.json / cluster_conf.json
//!     → loader.rs (read & deserialize)
//!     → validation.rs (whole-file semantic checks)
//!     → GslbConf / ClusterTableConf → BalancerTable::init / reload
//!     → ClusterConfTable → ClusterConfStore (atomic swap)
//!
//! On reload signal:
//!     watcher.rs detects change (or SIGHUP)
//!     → loader.rs loads the changed file
//!     → validation.rs validates
//!     → table reload / policy swap
//! ```
//!
//! # Design Decisions
//! - A file that fails to load or validate is ignored as a whole; the
//!   running config stays in place
//! - All optional fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{
    load_cluster_conf, load_cluster_table, load_gslb_conf, load_service_config, ConfigError,
};
pub use schema::{
    cookie_key, BackendConf, BalanceMode, CheckScheme, ClusterBackend, ClusterConf,
    ClusterConfTable, ClusterTableConf, GslbBasicConf, GslbClusterConf, GslbConf, HashConf,
    HashStrategy, HealthCheckConf, LogFormat, ObservabilityConfig, ServiceConfig,
    SubClusterBackend,
};
pub use validation::ValidationError;
pub use watcher::{ConfigFile, ConfigWatcher};
