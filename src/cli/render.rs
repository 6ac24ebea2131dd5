use std::io::{self, Write};

use crate::conversation::{ConversationId, TurnId, TurnOutcome};
use crate::session::SessionSnapshot;

/// Prints assistant output incrementally from successive snapshots.
///
/// Turn text only ever grows while open, so each call writes just the
/// suffix not yet printed.
#[derive(Debug)]
pub struct TranscriptPrinter {
    show_status: bool,
    conversation: Option<ConversationId>,
    current: Option<TurnId>,
    printed: usize,
    finished: Option<TurnId>,
    status_shown: Option<TurnId>,
}

impl TranscriptPrinter {
    #[must_use]
    pub const fn new(show_status: bool) -> Self {
        Self {
            show_status,
            conversation: None,
            current: None,
            printed: 0,
            finished: None,
            status_shown: None,
        }
    }

    pub fn render<W: Write>(&mut self, snapshot: &SessionSnapshot, out: &mut W) -> io::Result<()> {
        if self.conversation != Some(snapshot.conversation_id) {
            if self.conversation.is_some() {
                writeln!(out, "--- new conversation ---")?;
            }
            *self = Self {
                conversation: Some(snapshot.conversation_id),
                ..Self::new(self.show_status)
            };
        }

        for turn in snapshot.turns.iter().filter(|t| t.is_assistant()) {
            if self.finished.is_some_and(|done| turn.id <= done) {
                continue;
            }
            if self.current != Some(turn.id) {
                self.current = Some(turn.id);
                self.printed = 0;
            }

            if self.show_status
                && turn.is_open()
                && self.status_shown != Some(turn.id)
                && let Some(label) = snapshot.phase.status_label()
            {
                writeln!(out, "… {label}")?;
                self.status_shown = Some(turn.id);
            }

            let fresh = turn.text.get(self.printed..).unwrap_or_default();
            out.write_all(fresh.as_bytes())?;
            self.printed = turn.text.len();

            if !turn.is_open() {
                if turn.outcome == Some(TurnOutcome::Cancelled) {
                    writeln!(out, "\n[cancelled]")?;
                } else {
                    writeln!(out)?;
                }
                self.finished = Some(turn.id);
            }
        }

        out.flush()
    }
}

impl Default for TranscriptPrinter {
    fn default() -> Self {
        Self::new(true)
    }
}
