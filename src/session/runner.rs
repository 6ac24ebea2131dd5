use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{ChatError, Result};

use super::controller::{SessionController, Submission};
use super::phase::SessionSnapshot;

#[derive(Debug)]
pub enum SessionCommand {
    Submit { question: String },
    Cancel,
    NewConversation,
    Shutdown,
}

/// Runs a [`SessionController`] on one task, taking commands from a channel
/// and publishing a fresh snapshot after every step.
pub struct SessionRunner {
    controller: SessionController,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    view_tx: watch::Sender<SessionSnapshot>,
}

#[derive(Clone, Debug)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    view_rx: watch::Receiver<SessionSnapshot>,
}

impl SessionRunner {
    #[must_use]
    pub fn new(controller: SessionController) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(controller.snapshot());

        let runner = Self {
            controller,
            cmd_rx,
            view_tx,
        };
        (runner, SessionHandle { cmd_tx, view_rx })
    }

    #[must_use]
    pub fn spawn(controller: SessionController) -> (JoinHandle<()>, SessionHandle) {
        let (runner, handle) = Self::new(controller);
        (tokio::spawn(runner.run()), handle)
    }

    pub async fn run(mut self) {
        loop {
            let streaming = self.controller.is_active();

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(cmd) = cmd else {
                        tracing::debug!("All session handles dropped");
                        self.shutdown();
                        break;
                    };
                    if !self.handle_command(cmd) {
                        self.shutdown();
                        break;
                    }
                }
                _ = self.controller.advance(), if streaming => {}
            }

            self.publish();
        }
    }

    fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Submit { question } => {
                if let Submission::Ignored(reason) = self.controller.submit(&question) {
                    tracing::debug!(?reason, "Submission ignored");
                }
            }
            SessionCommand::Cancel => {
                self.controller.cancel_active();
            }
            SessionCommand::NewConversation => self.controller.start_new_conversation(),
            SessionCommand::Shutdown => return false,
        }
        true
    }

    fn shutdown(&mut self) {
        self.controller.cancel_active();
        self.publish();
        tracing::info!("Session runner shutting down");
    }

    fn publish(&self) {
        self.view_tx.send_replace(self.controller.snapshot());
    }
}

impl SessionHandle {
    pub fn submit(&self, question: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::Submit {
            question: question.into(),
        })
    }

    pub fn cancel(&self) -> Result<()> {
        self.send(SessionCommand::Cancel)
    }

    pub fn new_conversation(&self) -> Result<()> {
        self.send(SessionCommand::NewConversation)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown)
    }

    fn send(&self, cmd: SessionCommand) -> Result<()> {
        self.cmd_tx.send(cmd).map_err(|_| ChatError::RunnerClosed)
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.view_rx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.view_rx.clone()
    }
}
