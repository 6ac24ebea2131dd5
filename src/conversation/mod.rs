pub mod store;
pub mod turn;

pub use store::{MessageStore, StoreError};
pub use turn::{ConversationId, Role, Turn, TurnId, TurnOutcome, TurnState};
