//! Cooperative shutdown: a process-wide atomic flag set by a signal task,
//! polled at every suspension point in the pipeline (§4.6, §5, §9).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;

/// Spawns a task that waits for SIGINT (and, on unix, SIGTERM) and flips
/// `running` to false. This is the only thing the signal path touches; no
/// direct call into handler state, per the re-architected signal-handler
/// design note in §9.
pub fn install(running: Arc<AtomicBool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        running.store(false, Ordering::Relaxed);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

pub fn new_running_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(true))
}
