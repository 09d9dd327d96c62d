//! # OS termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT, SIGTERM or SIGQUIT
//! (unix) or Ctrl-C (elsewhere). Used by
//! [`Runtime::run_until_signal`](crate::Runtime::run_until_signal).

/// Waits for a termination signal.
///
/// Returns `Err` if signal handlers cannot be installed.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
