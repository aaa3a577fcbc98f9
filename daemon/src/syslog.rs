//! syslog(3) sink for tracing events in daemon mode.
//!
//! Calls `openlog`/`syslog`/`closelog` through libc. Each formatted tracing
//! event becomes one syslog record with a priority derived from its level.

use std::ffi::CString;
use std::io;
use std::sync::OnceLock;
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::MakeWriter;

/// Ident passed to openlog(3)
pub const SYSLOG_IDENT: &str = "dirsyncd";

/// Map a tracing level onto a syslog(3) priority
pub fn priority_for(level: &Level) -> libc::c_int {
    match *level {
        Level::ERROR => libc::LOG_ERR,
        Level::WARN => libc::LOG_WARNING,
        Level::INFO => libc::LOG_INFO,
        Level::DEBUG | Level::TRACE => libc::LOG_DEBUG,
    }
}

/// Open the syslog connection on the daemon facility. Call once.
pub fn open() -> SyslogGuard {
    // syslog(3) keeps the ident pointer, so it has to live for the process.
    static IDENT: OnceLock<CString> = OnceLock::new();
    let ident = IDENT.get_or_init(|| {
        CString::new(SYSLOG_IDENT).unwrap_or_default()
    });

    // SAFETY: ident is a valid NUL-terminated string stored in a static.
    unsafe {
        libc::openlog(ident.as_ptr(), libc::LOG_PID, libc::LOG_DAEMON);
    }

    SyslogGuard { _private: () }
}

/// Send one record at `priority`
pub fn send(priority: libc::c_int, message: &str) {
    let message = match CString::new(message.replace('\0', "")) {
        Ok(message) => message,
        Err(_) => return,
    };

    // SAFETY: both arguments are valid C strings; "%s" keeps `%` in the
    // message from being read as a format directive.
    unsafe {
        libc::syslog(priority, b"%s\0".as_ptr().cast(), message.as_ptr());
    }
}

/// Closes the syslog connection when dropped
#[derive(Debug)]
pub struct SyslogGuard {
    _private: (),
}

impl Drop for SyslogGuard {
    fn drop(&mut self) {
        // SAFETY: closelog has no preconditions.
        unsafe {
            libc::closelog();
        }
    }
}

/// `MakeWriter` that hands the fmt layer one [`SyslogWriter`] per event
#[derive(Debug, Clone, Copy, Default)]
pub struct SyslogMakeWriter;

impl<'a> MakeWriter<'a> for SyslogMakeWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter::new(libc::LOG_INFO)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        SyslogWriter::new(priority_for(meta.level()))
    }
}

/// Buffers one formatted event and emits it as a single record on drop
#[derive(Debug)]
pub struct SyslogWriter {
    priority: libc::c_int,
    buffer: Vec<u8>,
}

impl SyslogWriter {
    fn new(priority: libc::c_int) -> Self {
        Self {
            priority,
            buffer: Vec::with_capacity(256),
        }
    }

    fn message(&self) -> String {
        String::from_utf8_lossy(&self.buffer).trim_end().to_string()
    }
}

impl io::Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for SyslogWriter {
    fn drop(&mut self) {
        let message = self.message();
        if !message.is_empty() {
            send(self.priority, &message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn levels_map_to_syslog_priorities() {
        assert_eq!(priority_for(&Level::ERROR), libc::LOG_ERR);
        assert_eq!(priority_for(&Level::WARN), libc::LOG_WARNING);
        assert_eq!(priority_for(&Level::INFO), libc::LOG_INFO);
        assert_eq!(priority_for(&Level::DEBUG), libc::LOG_DEBUG);
        assert_eq!(priority_for(&Level::TRACE), libc::LOG_DEBUG);
    }

    #[test]
    fn writer_collects_one_trimmed_record() {
        let mut writer = SyslogWriter::new(libc::LOG_INFO);
        write!(writer, "Copying /a -> /b").unwrap();
        writer.write_all(b" size=3\n").unwrap();

        assert_eq!(writer.message(), "Copying /a -> /b size=3");

        // Keep the test out of the system log.
        writer.buffer.clear();
    }
}
