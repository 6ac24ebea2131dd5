pub mod controller;
pub mod phase;
pub mod runner;

pub use controller::{
    DEFAULT_STATUS_LABEL, FAILURE_NOTICE, IgnoreReason, Progress, SessionController, Submission,
};
pub use phase::{Phase, SessionSnapshot};
pub use runner::{SessionCommand, SessionHandle, SessionRunner};
