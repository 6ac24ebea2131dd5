pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod logging;
pub mod session;
pub mod transport;

pub use error::{ChatError, Result};
