use anyhow::{Context, Result};
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use dirsync::{RootPair, SyncEngine, SyncMetrics};

use crate::config::DaemonConfig;
use crate::scheduler::{CycleRunner, CycleScheduler, SchedulerReport};
use crate::signals::{self, DaemonSignals};

/// The mirror daemon: one root pair, one engine, one control loop
pub struct SyncDaemon {
    config: DaemonConfig,
    roots: RootPair,
    engine: SyncEngine,
    signals: DaemonSignals,
}

/// Runs one sync-then-purge cycle over the configured roots
struct MirrorCycle {
    engine: SyncEngine,
    roots: RootPair,
}

impl CycleRunner for MirrorCycle {
    fn run_cycle(&mut self) -> impl Future<Output = SyncMetrics> + Send {
        self.engine.run_cycle(&self.roots)
    }
}

impl SyncDaemon {
    /// `roots` must already be validated; startup fails before backgrounding
    /// if they are not.
    pub fn new(config: DaemonConfig, roots: RootPair) -> Self {
        let engine = SyncEngine::new(config.sync_options());

        Self {
            config,
            roots,
            engine,
            signals: DaemonSignals::new(),
        }
    }

    /// Handle for raising wake/terminate requests from inside the process
    #[cfg(test)]
    pub fn signals(&self) -> DaemonSignals {
        self.signals.clone()
    }

    /// Route SIGUSR1/SIGTERM/SIGINT into this daemon's signal state.
    ///
    /// Call before anything else once the runtime is up: until then SIGUSR1
    /// still has its default action and kills the process.
    pub fn install_signal_handlers(&self) -> Result<JoinHandle<()>> {
        signals::install_handlers(self.signals.clone()).context("failed to install signal handlers")
    }

    #[instrument(skip(self), fields(source = %self.roots.source().display(), destination = %self.roots.destination().display()))]
    pub async fn run(self) -> SchedulerReport {
        info!(
            recursive = self.config.recursive,
            interval_secs = self.config.interval.as_secs(),
            size_threshold = self.config.size_threshold,
            "Starting mirror daemon"
        );

        let runner = MirrorCycle {
            engine: self.engine,
            roots: self.roots,
        };
        let report = CycleScheduler::new(runner, self.signals, self.config.interval)
            .run()
            .await;

        info!(cycles = report.cycles, "Mirror daemon stopped");
        report
    }
}
