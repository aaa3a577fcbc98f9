//! Wake and terminate requests delivered asynchronously to the daemon
//!
//! Both requests are edge-triggered flags: any number of wake signals that
//! arrive before the scheduler looks collapse into one wake.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct SignalState {
    wake: AtomicBool,
    terminate: AtomicBool,
    notify: Notify,
}

/// Shared handle on the daemon's wake/terminate flags
#[derive(Debug, Clone, Default)]
pub struct DaemonSignals {
    state: Arc<SignalState>,
}

impl DaemonSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a cycle to run now instead of at the end of the interval
    pub fn request_wake(&self) {
        self.state.wake.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
    }

    /// Ask the daemon to stop at its next checkpoint
    pub fn request_terminate(&self) {
        self.state.terminate.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
    }

    pub fn wake_requested(&self) -> bool {
        self.state.wake.load(Ordering::SeqCst)
    }

    pub fn terminate_requested(&self) -> bool {
        self.state.terminate.load(Ordering::SeqCst)
    }

    /// Clear the wake flag, returning whether it was set
    pub fn take_wake(&self) -> bool {
        self.state.wake.swap(false, Ordering::SeqCst)
    }

    /// Resolves after the next request (or a stored one that nobody consumed)
    pub async fn notified(&self) {
        self.state.notify.notified().await;
    }

    /// Interrupt a waiting scheduler without setting any flag
    #[cfg(test)]
    pub fn interrupt(&self) {
        self.state.notify.notify_one();
    }
}

/// Route process signals into `signals`.
///
/// SIGUSR1 requests a wake; SIGTERM and SIGINT request termination.
#[cfg(unix)]
pub fn install_handlers(signals: DaemonSignals) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut wake = signal(SignalKind::user_defined1())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;

    debug!("Installed SIGUSR1, SIGTERM and SIGINT handlers");

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = wake.recv() => {
                    debug!("Received SIGUSR1");
                    signals.request_wake();
                }
                Some(()) = terminate.recv() => {
                    info!("Received SIGTERM");
                    signals.request_terminate();
                }
                Some(()) = interrupt.recv() => {
                    info!("Received SIGINT");
                    signals.request_terminate();
                }
                else => break,
            }
        }
    }))
}

#[cfg(not(unix))]
pub fn install_handlers(signals: DaemonSignals) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received");
            signals.request_terminate();
        }
    }))
}
