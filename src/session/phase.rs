use serde::{Deserialize, Serialize};
use std::fmt;

use crate::conversation::{ConversationId, Turn};

/// Where the controller is in the request lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    /// Request sent, nothing received yet.
    AwaitingFirstByte { status: Option<String> },
    Streaming,
}

impl Phase {
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        !self.is_idle()
    }

    #[must_use]
    pub fn status_label(&self) -> Option<&str> {
        match self {
            Self::AwaitingFirstByte { status } => status.as_deref(),
            Self::Idle | Self::Streaming => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::AwaitingFirstByte { .. } => write!(f, "awaiting first byte"),
            Self::Streaming => write!(f, "streaming"),
        }
    }
}

/// Read-only view handed to presentation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub conversation_id: ConversationId,
    pub turns: Vec<Turn>,
    pub phase: Phase,
}

impl SessionSnapshot {
    #[must_use]
    pub fn empty(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            turns: Vec::new(),
            phase: Phase::Idle,
        }
    }

    #[must_use]
    pub fn open_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.is_open())
    }

    #[must_use]
    pub fn last_assistant(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.is_assistant())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
