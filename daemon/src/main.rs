use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

mod config;
mod daemon;
mod scheduler;
mod signals;
#[cfg(unix)]
mod syslog;
mod telemetry;

use config::{DaemonConfig, FileConfig, Overrides};
use daemon::SyncDaemon;
use dirsync::RootPair;
use telemetry::LogTarget;

#[derive(Parser, Debug)]
#[command(name = "dirsyncd")]
#[command(about = "Keep a destination directory a one-way mirror of a source directory")]
#[command(version)]
struct Cli {
    /// Directory to mirror from
    source: PathBuf,

    /// Directory to mirror into
    destination: PathBuf,

    /// Mirror subdirectories too
    #[arg(short = 'R', long)]
    recursive: bool,

    /// Seconds between cycles [default: 300]
    #[arg(short = 's', long, value_name = "SECONDS")]
    interval: Option<u64>,

    /// Copy files of at least this many bytes through a memory map (0 disables)
    #[arg(short = 't', long, value_name = "BYTES")]
    threshold: Option<u64>,

    /// Stay attached to the terminal and log to stderr
    #[arg(short, long)]
    foreground: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level [default: info]
    #[arg(short, long)]
    log_level: Option<String>,

    /// Write the daemon's pid here after backgrounding
    #[arg(short, long)]
    pid_file: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<DaemonConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let overrides = Overrides {
            recursive: self.recursive,
            interval_secs: self.interval,
            size_threshold: self.threshold,
            log_level: self.log_level,
            pid_file: self.pid_file,
            foreground: self.foreground,
        };

        Ok(DaemonConfig::resolve(self.source, self.destination, file, overrides)?)
    }
}

fn main() -> Result<()> {
    let config = Cli::parse()
        .into_config()
        .context("invalid configuration")?;

    // Bad roots must fail while we still have a terminal to report to.
    let roots = RootPair::new(&config.source, &config.destination)
        .context("invalid source or destination")?;

    if !config.foreground {
        detach(&config)?;
    }

    // The runtime's threads must be created after the fork.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let daemon = SyncDaemon::new(config.clone(), roots.clone());
        let handler = daemon.install_signal_handlers()?;

        let _logging = telemetry::init_logging(
            &config.log_level,
            LogTarget::for_foreground(config.foreground),
        )?;

        info!(
            source = %roots.source().display(),
            destination = %roots.destination().display(),
            "dirsyncd {} starting",
            env!("CARGO_PKG_VERSION")
        );

        daemon.run().await;
        handler.abort();
        Ok::<_, anyhow::Error>(())
    })
}

#[cfg(unix)]
fn detach(config: &DaemonConfig) -> Result<()> {
    use daemonize::Daemonize;

    let mut daemonize = Daemonize::new().working_directory("/").umask(0);
    if let Some(pid_file) = &config.pid_file {
        daemonize = daemonize.pid_file(pid_file);
    }

    daemonize.start().context("failed to daemonize")?;
    Ok(())
}

#[cfg(not(unix))]
fn detach(_config: &DaemonConfig) -> Result<()> {
    // No fork on this platform; keep running attached.
    Ok(())
}
