//! Error types for the viewer

use thiserror::Error;

/// Main error type for the viewer.
///
/// Worker threads never unwind across thread boundaries; every failure they hit
/// is turned into one of these values and carried to the controller through its
/// handoff channel.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad input file, unsupported format, or invalid build parameters
    #[error("Load error: {0}")]
    Load(String),

    /// A GPU allocation could not be satisfied
    #[error("GPU resource error: {0}")]
    DeviceResource(String),

    /// The GPU device or driver failed; the session cannot continue
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    #[error("Path tracer is already running")]
    AlreadyRunning,

    #[error("No octree is loaded")]
    NoOctree,

    #[error("Window error: {0}")]
    Window(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export error: {0}")]
    Export(String),

    /// A worker thread exited or dropped its end of a channel
    #[error("Worker thread gone: {0}")]
    WorkerGone(&'static str),
}

impl Error {
    /// Whether the session has to shut down after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::DeviceLost(_) | Error::WorkerGone(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::DeviceLost("driver reset".into()).is_fatal());
        assert!(Error::WorkerGone("loader").is_fatal());
        assert!(!Error::DeviceResource("oom".into()).is_fatal());
        assert!(!Error::Load("bad face".into()).is_fatal());
        assert!(!Error::AlreadyRunning.is_fatal());
    }
}
