use std::io;

use crate::conversation::TurnOutcome;
use crate::error::{ChatError, Result};
use crate::session::SessionHandle;

use super::render::TranscriptPrinter;

/// Sends one question and streams its answer to stdout. Ctrl-C cancels.
pub async fn run(handle: &SessionHandle, question: &str) -> Result<Option<TurnOutcome>> {
    if question.trim().is_empty() {
        return Err(ChatError::InvalidInput("question must not be empty".into()));
    }

    let mut view = handle.subscribe();
    let mut printer = TranscriptPrinter::new(false);
    let before = view.borrow_and_update().turns.len();

    handle.submit(question)?;

    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    return Ok(None);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                handle.cancel()?;
            }
        }

        let snapshot = view.borrow_and_update().clone();
        printer.render(&snapshot, &mut io::stdout())?;

        if snapshot.phase.is_idle() && snapshot.turns.len() > before {
            return Ok(snapshot.last_assistant().and_then(|t| t.outcome));
        }
    }
}
