use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TransportError {
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Builds a status error, preferring the `detail` field of a JSON error body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("detail")?.as_str().map(String::from))
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && trimmed.len() <= 200).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| format!("HTTP {status}"));

        Self::Status { status, message }
    }
}

/// Why a fragment stream ended early.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Request cancelled")]
    Cancelled,
}

impl StreamError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
