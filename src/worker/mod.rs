//! Background workers: scene loading and progressive path tracing
//!
//! Each worker owns one thread. Requests go in over a command channel and
//! results come back as owned handoff messages that the controller drains
//! without blocking.

pub mod handoff;
pub mod loader;
pub mod path_tracer;

pub use handoff::WorkerThread;
pub use loader::{LoadCompletion, LoadRequest, LoadStage, LoadedScene, SceneLoader};
pub use path_tracer::{PathTracer, TraceEvent, TraceResult};

#[cfg(test)]
pub(crate) mod testing;
