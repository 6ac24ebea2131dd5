use thiserror::Error;

use super::turn::{Role, Turn, TurnId, TurnOutcome, TurnState};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{id} is not the open assistant turn")]
    InvalidTurn { id: TurnId },

    #[error("{id} is still open")]
    TurnAlreadyOpen { id: TurnId },
}

/// Ordered log of conversation turns.
///
/// Only the last assistant turn may be open; every other turn is immutable.
#[derive(Debug, Default)]
pub struct MessageStore {
    turns: Vec<Turn>,
    open: Option<TurnId>,
    next_id: u64,
}

impl MessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mint_id(&mut self) -> TurnId {
        self.next_id += 1;
        TurnId::new(self.next_id)
    }

    pub fn append(&mut self, role: Role, text: impl Into<String>) -> TurnId {
        let id = self.mint_id();
        self.turns.push(Turn::closed(id, role, text));
        id
    }

    pub fn open_assistant_turn(&mut self) -> Result<TurnId, StoreError> {
        if let Some(id) = self.open {
            return Err(StoreError::TurnAlreadyOpen { id });
        }

        let id = self.mint_id();
        self.turns.push(Turn::open_assistant(id));
        self.open = Some(id);
        Ok(id)
    }

    pub fn append_to_open_turn(&mut self, id: TurnId, fragment: &str) -> Result<(), StoreError> {
        if self.open != Some(id) {
            return Err(StoreError::InvalidTurn { id });
        }

        // The open turn is always the most recent one.
        match self.turns.last_mut() {
            Some(turn) if turn.id == id => {
                turn.text.push_str(fragment);
                Ok(())
            }
            _ => Err(StoreError::InvalidTurn { id }),
        }
    }

    /// Returns `false` when the turn was already closed or is unknown.
    pub fn close_turn(&mut self, id: TurnId, outcome: TurnOutcome) -> bool {
        if self.open != Some(id) {
            return false;
        }

        self.open = None;
        if let Some(turn) = self.turns.iter_mut().rev().find(|t| t.id == id) {
            turn.state = TurnState::Closed;
            turn.outcome = Some(outcome);
        }
        true
    }

    pub fn reset(&mut self) {
        self.turns.clear();
        self.open = None;
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    #[must_use]
    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn open_turn(&self) -> Option<&Turn> {
        self.open.and_then(|id| self.get(id))
    }

    #[must_use]
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
