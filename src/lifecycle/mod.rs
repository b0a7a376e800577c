//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → SignalEvent::Shutdown → release balancers → exit
//!     SIGHUP → SignalEvent::Reload → reload all config files
//! ```

pub mod signals;

pub use signals::{spawn_signal_listener, SignalEvent};
