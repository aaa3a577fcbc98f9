//! Logging setup for the daemon
//!
//! Foreground runs log to stderr through the tracing fmt layer. Background
//! runs send the same events to syslog(3) under the daemon facility.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log records end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    Syslog,
}

impl LogTarget {
    pub fn for_foreground(foreground: bool) -> Self {
        if foreground || cfg!(not(unix)) {
            LogTarget::Stderr
        } else {
            LogTarget::Syslog
        }
    }
}

/// Keeps the logging backend alive; closes syslog when dropped
#[derive(Debug)]
pub struct LoggingGuard {
    #[cfg(unix)]
    _syslog: Option<crate::syslog::SyslogGuard>,
}

/// Default directive when `RUST_LOG` is not set
pub fn default_directive(level: &str) -> String {
    format!("dirsyncd={level},dirsync={level}")
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Install the global subscriber
pub fn init_logging(level: &str, target: LogTarget) -> Result<LoggingGuard> {
    let filter = build_filter(level);

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .try_init()?;

            Ok(LoggingGuard {
                #[cfg(unix)]
                _syslog: None,
            })
        }
        #[cfg(unix)]
        LogTarget::Syslog => {
            let guard = crate::syslog::open();

            // syslogd stamps time, host and pid itself.
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(crate::syslog::SyslogMakeWriter)
                        .without_time()
                        .with_ansi(false)
                        .with_level(false)
                        .with_target(false),
                )
                .try_init()?;

            Ok(LoggingGuard {
                _syslog: Some(guard),
            })
        }
        #[cfg(not(unix))]
        LogTarget::Syslog => init_logging(level, LogTarget::Stderr),
    }
}
