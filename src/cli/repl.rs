use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

use crate::error::Result;
use crate::session::{SessionHandle, SessionSnapshot};

use super::render::TranscriptPrinter;

const BUSY: &str = "Still answering the previous question, use /cancel to stop it.";

const HELP: &str = "Type a question and press Enter.\n  /new     start a new conversation\n  /cancel  stop the current answer (or press Ctrl-C)\n  /quit    exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplInput {
    Question(String),
    NewConversation,
    Cancel,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ReplInput {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        match trimmed {
            "/new" => Self::NewConversation,
            "/cancel" => Self::Cancel,
            "/help" | "/?" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            cmd if cmd.starts_with('/') => Self::Unknown(cmd.to_string()),
            _ => Self::Question(trimmed.to_string()),
        }
    }
}

/// Interactive loop: reads questions from stdin and prints answers as they
/// stream in. Exits on `/quit`, Ctrl-C while idle, or end of input once the
/// last answer is done.
pub async fn run(handle: &SessionHandle) -> Result<()> {
    let mut view = handle.subscribe();
    let mut printer = TranscriptPrinter::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut input_closed = false;

    println!("{HELP}\n");

    loop {
        tokio::select! {
            line = lines.next_line(), if !input_closed => {
                match line? {
                    Some(line) => {
                        if !handle_line(handle, &mut view, &line).await? {
                            break;
                        }
                    }
                    None => input_closed = true,
                }
            }
            changed = view.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if handle.snapshot().phase.is_active() {
                    handle.cancel()?;
                } else {
                    break;
                }
            }
        }

        let snapshot = view.borrow_and_update().clone();
        printer.render(&snapshot, &mut io::stdout())?;

        if input_closed && snapshot.phase.is_idle() {
            break;
        }
    }

    io::stdout().flush()?;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn handle_line(
    handle: &SessionHandle,
    view: &mut watch::Receiver<SessionSnapshot>,
    line: &str,
) -> Result<bool> {
    match ReplInput::parse(line) {
        ReplInput::Question(_) if is_busy(&view.borrow()) => eprintln!("{BUSY}"),
        ReplInput::Question(question) => {
            let before = view.borrow().turns.len();
            handle.submit(question)?;
            // Wait until the runner has taken the question so a closing
            // stdin cannot race ahead of it.
            let _ = view
                .wait_for(|s| s.phase.is_active() || s.turns.len() != before)
                .await;
        }
        ReplInput::NewConversation => handle.new_conversation()?,
        ReplInput::Cancel => handle.cancel()?,
        ReplInput::Help => println!("{HELP}"),
        ReplInput::Quit => return Ok(false),
        ReplInput::Empty => {}
        ReplInput::Unknown(cmd) => eprintln!("Unknown command {cmd}, try /help"),
    }
    Ok(true)
}

/// A new question would be ignored while an answer is in flight.
fn is_busy(snapshot: &SessionSnapshot) -> bool {
    snapshot.phase.is_active()
}
