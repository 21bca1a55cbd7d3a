//! Worker thread ownership and shutdown

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::core::error::Error;
use crate::core::types::Result;

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Named worker thread that can be joined with a deadline
pub struct WorkerThread {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl WorkerThread {
    pub fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(body)?;
        log::debug!("Spawned worker thread '{}'", name);
        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True once the thread has returned (or was already joined or detached)
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Join within `timeout`, detaching the thread if it is still running.
    /// Returns whether the thread was joined.
    pub fn join_timeout(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.handle.take() else {
            return true;
        };

        let deadline = Instant::now() + timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "Worker '{}' did not stop within {:?}, detaching",
                    self.name,
                    timeout
                );
                return false;
            }
            thread::sleep(JOIN_POLL_INTERVAL);
        }

        if handle.join().is_err() {
            log::error!("Worker '{}' panicked", self.name);
        }
        true
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        if self.handle.is_some() && !self.is_finished() {
            log::debug!("Detaching worker '{}'", self.name);
        }
    }
}

/// Error for a worker whose channel closed under us
pub(crate) fn gone(name: &'static str) -> Error {
    Error::WorkerGone(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_join_finished_thread() {
        let mut worker = WorkerThread::spawn("quick", || {}).unwrap();
        assert!(worker.join_timeout(Duration::from_secs(5)));
        assert!(worker.is_finished());
        // joining twice is a no-op
        assert!(worker.join_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_join_times_out_and_detaches() {
        let (tx, rx) = mpsc::channel::<()>();
        let mut worker = WorkerThread::spawn("blocked", move || {
            let _ = rx.recv();
        })
        .unwrap();

        assert!(!worker.join_timeout(Duration::from_millis(20)));
        assert_eq!(worker.name(), "blocked");
        // release the detached thread
        drop(tx);
    }
}
