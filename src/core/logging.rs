//! Logging initialization and the diagnostics ring buffer
//!
//! Records go to `env_logger` as usual and are also copied into a bounded
//! [`LogRing`] that a UI layer can read for a diagnostics panel. The ring is
//! handed out as an explicit `Arc` and injected into the session controller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Lines kept by the ring returned from [`init`]
pub const DEFAULT_RING_CAPACITY: usize = 256;

/// One formatted log record
#[derive(Clone, Debug)]
pub struct LogLine {
    pub level: log::Level,
    pub target: String,
    pub message: String,
}

/// Bounded, thread-safe buffer of the most recent log lines
pub struct LogRing {
    capacity: usize,
    lines: Mutex<VecDeque<LogLine>>,
}

impl LogRing {
    /// Create a ring holding at most `capacity` lines
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            lines: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    /// Append a line, evicting the oldest one when full
    pub fn push(&self, line: LogLine) {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Copy of the buffered lines, oldest first
    pub fn snapshot(&self) -> Vec<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().cloned().collect()
    }

    /// Most recent line at `level` or more severe
    pub fn latest_at_least(&self, level: log::Level) -> Option<LogLine> {
        let lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.iter().rev().find(|l| l.level <= level).cloned()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// Forwards to env_logger and mirrors every emitted record into the ring
struct TeeLogger {
    inner: env_logger::Logger,
    ring: Arc<LogRing>,
}

impl log::Log for TeeLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if !self.inner.matches(record) {
            return;
        }
        self.inner.log(record);
        self.ring.push(LogLine {
            level: record.level(),
            target: record.target().to_string(),
            message: record.args().to_string(),
        });
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable.
/// Returns the diagnostics ring that receives a copy of every record.
/// Calling it twice keeps the first logger; the second ring stays empty.
///
/// # Example
/// ```
/// let ring = svoview::core::logging::init();
/// log::info!("Viewer started");
/// # let _ = ring;
/// ```
pub fn init() -> Arc<LogRing> {
    let ring = Arc::new(LogRing::new(DEFAULT_RING_CAPACITY));
    let inner = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).build();
    let max_level = inner.filter();

    let logger: &'static TeeLogger = Box::leak(Box::new(TeeLogger {
        inner,
        ring: ring.clone(),
    }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(max_level);
    }
    ring
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(level: log::Level, message: &str) -> LogLine {
        LogLine { level, target: "test".into(), message: message.into() }
    }

    #[test]
    fn test_ring_evicts_oldest() {
        let ring = LogRing::new(2);
        ring.push(line(log::Level::Info, "a"));
        ring.push(line(log::Level::Info, "b"));
        ring.push(line(log::Level::Info, "c"));

        let lines = ring.snapshot();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message, "b");
        assert_eq!(lines[1].message, "c");
    }

    #[test]
    fn test_latest_at_least() {
        let ring = LogRing::new(8);
        ring.push(line(log::Level::Warn, "warned"));
        ring.push(line(log::Level::Info, "chatty"));

        assert_eq!(ring.latest_at_least(log::Level::Warn).unwrap().message, "warned");
        assert_eq!(ring.latest_at_least(log::Level::Info).unwrap().message, "chatty");
        assert!(ring.latest_at_least(log::Level::Error).is_none());
    }
}
