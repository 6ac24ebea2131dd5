pub mod args;
pub mod ask;
pub mod render;
pub mod repl;

pub use args::{Cli, Commands, ConfigSubcommands};
pub use render::TranscriptPrinter;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::session::SessionController;
use crate::transport::HttpTransport;

/// Builds a controller talking to the configured answer service.
pub fn create_session(config: &AppConfig) -> Result<SessionController> {
    let transport = HttpTransport::with_config(config.endpoint.clone(), config.http_config())?;
    tracing::info!(endpoint = %transport.endpoint(), "Using answer service");

    Ok(SessionController::new(Arc::new(transport)).with_status_label(config.status_label()))
}
