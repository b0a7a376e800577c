//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP triggers config reload, not shutdown
//! - The listener task ends after the first shutdown signal

use tokio::signal;
use tokio::sync::mpsc;

/// What the process was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// Re-read every config file.
    Reload,
    /// Release all balancers and exit.
    Shutdown,
}

/// Spawn a task translating OS signals into `SignalEvent`s.
pub fn spawn_signal_listener() -> mpsc::UnboundedReceiver<SignalEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use signal::unix::{signal as unix_signal, SignalKind};

            let mut hangup = match unix_signal(SignalKind::hangup()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGHUP handler");
                    None
                }
            };

            loop {
                let reload = async {
                    match hangup.as_mut() {
                        Some(s) => s.recv().await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    _ = reload => {
                        tracing::info!("SIGHUP received, reloading configuration");
                        if tx.send(SignalEvent::Reload).is_err() {
                            return;
                        }
                    }
                    () = shutdown_signal() => {
                        let _ = tx.send(SignalEvent::Shutdown);
                        return;
                    }
                }
            }
        }

        #[cfg(not(unix))]
        {
            shutdown_signal().await;
            let _ = tx.send(SignalEvent::Shutdown);
        }
    });

    rx
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
