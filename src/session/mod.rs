//! Viewer session: state machine, resource retirement and the controller

pub mod controller;
pub mod notice;
pub mod retire;
pub mod state;

pub use controller::{Controller, Progress};
pub use notice::{Notice, Notices, Severity};
pub use retire::RetireQueue;
pub use state::{Action, SessionEvent, SessionState, Transition, transition};
