//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Request failure observed (checker.rs on_fail)
//!     → Increment backend fail_num
//!     → Threshold reached and backend was available?
//!         → mark unavailable, spawn one checker task
//!
//! Checker task (checker.rs):
//!     Fetch check policy for the cluster
//!     → Probe (probe.rs: TCP connect or HTTP GET, status.rs matching)
//!     → Count consecutive successes
//!     → Threshold reached: mark available, exit
//!     → Backend released: exit
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend, not per-pool
//! - Probing only runs while a backend is down
//! - Probe errors never reach `balance` callers

pub mod checker;
pub mod probe;
pub mod status;

pub use checker::HealthMonitor;
pub use probe::{health_check_addr, ProbeError};
pub use status::StatusCodeMatcher;
