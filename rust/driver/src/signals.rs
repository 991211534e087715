//! Routes process signals into the driver's shutdown path.
//!
//! Interrupt, termination and illegal-instruction signals all become a
//! [`ShutdownReason`] sent through the driver's [`ShutdownHandle`]. Handlers
//! are registered before `install` returns.

use tracing::warn;

use crate::lifecycle::{ShutdownHandle, ShutdownReason};

/// Register signal handlers that request shutdown through `handle`.
///
/// A handler that cannot be registered is logged and skipped. The signal
/// registry always rejects SIGILL, so that refusal is logged at debug and
/// only SIGINT and SIGTERM are routed.
pub fn install(handle: ShutdownHandle) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;

        // Not exposed by SignalKind; 4 on every POSIX platform
        const SIGILL: i32 = 4;

        route(handle.clone(), SignalKind::interrupt(), ShutdownReason::Interrupt);
        route(handle.clone(), SignalKind::terminate(), ShutdownReason::Terminate);
        route(handle, SignalKind::from_raw(SIGILL), ShutdownReason::IllegalInstruction);
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => handle.trigger(ShutdownReason::Interrupt),
                Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
            }
        });
    }
}

#[cfg(unix)]
fn route(handle: ShutdownHandle, kind: tokio::signal::unix::SignalKind, reason: ShutdownReason) {
    match tokio::signal::unix::signal(kind) {
        Ok(mut stream) => {
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    handle.trigger(reason);
                }
            });
        }
        Err(e) if refusal_expected(reason) => {
            tracing::debug!(?reason, error = %e, "Signal handler not installed");
        }
        Err(e) => {
            warn!(?reason, error = %e, "Signal handler not installed");
        }
    }
}

/// SIGILL is on tokio's forbidden list, so its registration always fails.
#[cfg(unix)]
fn refusal_expected(reason: ShutdownReason) -> bool {
    matches!(reason, ShutdownReason::IllegalInstruction)
}
