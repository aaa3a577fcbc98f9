//! The daemon's control loop: sleep, run a cycle, repeat until terminated

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use dirsync::SyncMetrics;

use crate::signals::DaemonSignals;

/// One unit of scheduled work
pub trait CycleRunner {
    fn run_cycle(&mut self) -> impl Future<Output = SyncMetrics> + Send;
}

/// Why a sleep ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// A wake request cut the interval short
    Signal,
    /// The full interval elapsed
    Timer,
    Terminate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    pub cycles: u64,
}

/// Runs `runner` once per interval, or early on a wake request
pub struct CycleScheduler<R> {
    runner: R,
    signals: DaemonSignals,
    interval: Duration,
}

impl<R: CycleRunner> CycleScheduler<R> {
    pub fn new(runner: R, signals: DaemonSignals, interval: Duration) -> Self {
        Self {
            runner,
            signals,
            interval,
        }
    }

    /// Loop until a terminate request is seen at a checkpoint.
    ///
    /// Checkpoints are the start of each sleep and every interruption of it.
    /// A cycle that has started always runs to completion.
    pub async fn run(mut self) -> SchedulerReport {
        let mut report = SchedulerReport::default();

        loop {
            match self.sleep().await {
                WakeReason::Terminate => break,
                WakeReason::Signal => info!("Daemon woke up by signal"),
                WakeReason::Timer => info!("Daemon woke up naturally"),
            }

            self.signals.take_wake();
            let metrics = self.runner.run_cycle().await;
            report.cycles += 1;

            if metrics.is_successful() {
                info!(cycle_id = %metrics.cycle_id, "Cycle finished: {}", metrics.summary());
            } else {
                warn!(cycle_id = %metrics.cycle_id, "Cycle finished with failures: {}", metrics.summary());
            }
        }

        info!("Daemon shutting down");
        report
    }

    /// Wait out the interval against a fixed deadline.
    ///
    /// An interruption with no request behind it re-enters the wait for the
    /// time that is left.
    async fn sleep(&self) -> WakeReason {
        if self.signals.terminate_requested() {
            return WakeReason::Terminate;
        }

        info!("Daemon sleeping for {} seconds", self.interval.as_secs());
        let deadline = Instant::now() + self.interval;

        loop {
            if self.signals.terminate_requested() {
                return WakeReason::Terminate;
            }
            if self.signals.wake_requested() {
                return WakeReason::Signal;
            }

            tokio::select! {
                _ = sleep_until(deadline) => return WakeReason::Timer,
                _ = self.signals.notified() => {
                    debug!(
                        remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Sleep interrupted"
                    );
                }
            }
        }
    }
}
