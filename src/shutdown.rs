//! # Shutdown — Two-Tier Cooperative Cancellation
//!
//! State machine shared by the scheduler loops, the queue worker and the
//! signal listener:
//!
//! ```text
//! Running ──1st request──▶ WarmShutdownRequested ──loops drained──▶ Stopped
//!                                   │
//!                              2nd request
//!                                   ▼
//!                               ForceExit
//! ```
//!
//! A warm shutdown stops new cycles from starting; cycles already running
//! finish and persist normally. The second request escalates to
//! `ForceExit`, which the signal listener turns into immediate process
//! termination regardless of what is still in flight.
//!
//! Loops check the state at every cycle boundary and sleep through
//! [`Shutdown::sleep`], which wakes early as soon as shutdown is requested.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownState {
    Running,
    WarmShutdownRequested,
    Stopped,
    ForceExit,
}

#[derive(Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<ShutdownState>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ShutdownState::Running);
        Shutdown { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> ShutdownState {
        *self.tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShutdownState::Running
    }

    /// Register one shutdown request and return the resulting state.
    pub fn request(&self) -> ShutdownState {
        self.tx.send_if_modified(|state| {
            let next = match *state {
                ShutdownState::Running => ShutdownState::WarmShutdownRequested,
                ShutdownState::WarmShutdownRequested => ShutdownState::ForceExit,
                other => other,
            };
            let changed = next != *state;
            *state = next;
            changed
        });
        self.state()
    }

    /// Record that every loop has drained. Never downgrades `ForceExit`.
    pub fn mark_stopped(&self) {
        self.tx.send_if_modified(|state| {
            if *state == ShutdownState::ForceExit || *state == ShutdownState::Stopped {
                return false;
            }
            *state = ShutdownState::Stopped;
            true
        });
    }

    /// Resolves once the state leaves `Running`.
    pub async fn requested(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|s| *s != ShutdownState::Running).await;
    }

    /// Sleep for `duration` unless shutdown is requested first.
    /// Returns `true` if the full duration elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_running(),
            _ = self.requested() => false,
        }
    }
}

/// Wait for SIGINT/SIGTERM.
#[cfg(unix)]
pub async fn wait_for_signal() -> std::io::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Translate process signals into shutdown requests. The first signal asks
/// for a warm shutdown; the second terminates the process immediately.
pub async fn listen_for_signals(shutdown: Shutdown) {
    loop {
        if let Err(e) = wait_for_signal().await {
            warn!(error = %e, "Failed to install signal handler");
            return;
        }
        match shutdown.request() {
            ShutdownState::WarmShutdownRequested => {
                info!("Warm shutdown requested; in-flight cycles will finish. Signal again to force exit")
            }
            ShutdownState::ForceExit => {
                warn!("Forced exit requested; abandoning in-flight cycles");
                std::process::exit(1);
            }
            state => info!(?state, "Shutdown already in progress"),
        }
    }
}
