use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::conversation::{ConversationId, MessageStore, Role, TurnId, TurnOutcome};
use crate::transport::{FragmentStream, StreamError, StreamTransport};

use super::phase::{Phase, SessionSnapshot};

/// Appended to an assistant turn whose request failed.
pub const FAILURE_NOTICE: &str = "\n\n❌ Connection failed: the answer service could not be reached. Check that the backend is running.";

pub const DEFAULT_STATUS_LABEL: &str = "Connecting to the campus knowledge base...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Accepted { turn: TurnId },
    Ignored(IgnoreReason),
}

impl Submission {
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Blank,
    Busy,
}

/// Result of one [`SessionController::advance`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Fragment { turn: TurnId, bytes: usize },
    /// A fragment arrived for a turn that is no longer open and was dropped.
    /// Guard only: `active` is cleared whenever its turn is closed or the
    /// store is reset, so no stale fragment reaches the store this way.
    Rejected { turn: TurnId },
    Finished { turn: TurnId, outcome: TurnOutcome },
}

struct ActiveRequest {
    turn: TurnId,
    cancel: CancellationToken,
    fragments: FragmentStream,
}

/// Owns the conversation and at most one in-flight answer stream.
pub struct SessionController {
    transport: Arc<dyn StreamTransport>,
    store: MessageStore,
    phase: Phase,
    active: Option<ActiveRequest>,
    conversation_id: ConversationId,
    status_label: Option<String>,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("transport", &self.transport.name())
            .field("conversation_id", &self.conversation_id)
            .field("phase", &self.phase)
            .field("turns", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    #[must_use]
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            store: MessageStore::new(),
            phase: Phase::Idle,
            active: None,
            conversation_id: ConversationId::new(),
            status_label: Some(DEFAULT_STATUS_LABEL.to_string()),
        }
    }

    #[must_use]
    pub fn with_status_label(mut self, label: Option<String>) -> Self {
        self.status_label = label;
        self
    }

    pub fn submit(&mut self, question: &str) -> Submission {
        if question.trim().is_empty() {
            tracing::debug!("Ignoring blank question");
            return Submission::Ignored(IgnoreReason::Blank);
        }
        if self.phase.is_active() || self.store.open_turn().is_some() {
            tracing::debug!(phase = %self.phase, "Ignoring question while a request is active");
            return Submission::Ignored(IgnoreReason::Busy);
        }

        self.store.append(Role::User, question);
        let turn = match self.store.open_assistant_turn() {
            Ok(turn) => turn,
            Err(e) => {
                tracing::error!(error = %e, "Could not open assistant turn");
                return Submission::Ignored(IgnoreReason::Busy);
            }
        };

        let cancel = CancellationToken::new();
        let fragments = self.transport.open(question, cancel.clone());

        self.phase = Phase::AwaitingFirstByte {
            status: self.status_label.clone(),
        };
        self.active = Some(ActiveRequest {
            turn,
            cancel,
            fragments,
        });

        tracing::info!(
            conversation = %self.conversation_id,
            %turn,
            transport = self.transport.name(),
            "Question submitted"
        );

        Submission::Accepted { turn }
    }

    /// Pulls the next fragment of the active request and folds it into the
    /// conversation. Returns `None` when idle.
    ///
    /// Cancel-safe: dropping the returned future loses no fragment.
    pub async fn advance(&mut self) -> Option<Progress> {
        let active = self.active.as_mut()?;

        let item = tokio::select! {
            biased;
            () = active.cancel.cancelled() => Some(Err(StreamError::Cancelled)),
            item = active.fragments.next() => item,
        };

        // Nothing is appended once the token has fired, even if the
        // transport ignored it.
        let item = if active.cancel.is_cancelled() {
            Some(Err(StreamError::Cancelled))
        } else {
            item
        };
        let turn = active.turn;

        let progress = match item {
            Some(Ok(fragment)) => self.apply_fragment(turn, &fragment),
            None => self.finish(turn, TurnOutcome::Completed),
            Some(Err(StreamError::Cancelled)) => self.finish(turn, TurnOutcome::Cancelled),
            Some(Err(StreamError::Transport(e))) => {
                tracing::warn!(
                    conversation = %self.conversation_id,
                    %turn,
                    error = %e,
                    "Answer stream failed"
                );
                if let Err(e) = self.store.append_to_open_turn(turn, FAILURE_NOTICE) {
                    tracing::error!(error = %e, "Could not attach failure notice");
                }
                self.finish(turn, TurnOutcome::Failed)
            }
        };

        Some(progress)
    }

    /// Drives the active request until it ends.
    pub async fn run_to_completion(&mut self) -> Option<TurnOutcome> {
        let mut outcome = None;
        while let Some(progress) = self.advance().await {
            if let Progress::Finished { outcome: o, .. } = progress {
                outcome = Some(o);
            }
        }
        outcome
    }

    /// Returns `false` when no request was active.
    pub fn cancel_active(&mut self) -> bool {
        let Some(active) = self.active.as_ref() else {
            return false;
        };

        active.cancel.cancel();
        let turn = active.turn;
        self.finish(turn, TurnOutcome::Cancelled);
        true
    }

    /// Token of the active request, for cancelling from outside the
    /// controller. The controller notices on its next `advance`.
    #[must_use]
    pub fn cancel_handle(&self) -> Option<CancellationToken> {
        self.active.as_ref().map(|a| a.cancel.clone())
    }

    pub fn start_new_conversation(&mut self) {
        self.cancel_active();
        self.store.reset();
        self.phase = Phase::Idle;

        let previous = std::mem::take(&mut self.conversation_id);
        tracing::info!(
            previous = %previous,
            conversation = %self.conversation_id,
            "Started new conversation"
        );
    }

    fn apply_fragment(&mut self, turn: TurnId, fragment: &str) -> Progress {
        if let Err(e) = self.store.append_to_open_turn(turn, fragment) {
            tracing::error!(%turn, error = %e, "Dropping fragment for a closed turn");
            return Progress::Rejected { turn };
        }

        if matches!(self.phase, Phase::AwaitingFirstByte { .. }) {
            tracing::debug!(%turn, "First fragment received");
            self.phase = Phase::Streaming;
        }

        tracing::trace!(%turn, bytes = fragment.len(), "Fragment appended");
        Progress::Fragment {
            turn,
            bytes: fragment.len(),
        }
    }

    fn finish(&mut self, turn: TurnId, outcome: TurnOutcome) -> Progress {
        self.active = None;
        self.store.close_turn(turn, outcome);
        self.phase = Phase::Idle;

        tracing::info!(
            conversation = %self.conversation_id,
            %turn,
            ?outcome,
            "Answer finished"
        );

        Progress::Finished { turn, outcome }
    }

    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub const fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    #[must_use]
    pub const fn store(&self) -> &MessageStore {
        &self.store
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            conversation_id: self.conversation_id,
            turns: self.store.snapshot(),
            phase: self.phase.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockScript, MockTransport, TransportError};
    use futures::stream;

    /// Plays fixed fragments and never looks at the cancellation token.
    struct DeafTransport(Vec<&'static str>);

    impl StreamTransport for DeafTransport {
        fn name(&self) -> &'static str {
            "deaf"
        }

        fn open(&self, _question: &str, _cancel: CancellationToken) -> FragmentStream {
            stream::iter(self.0.clone().into_iter().map(|f| Ok(f.to_string()))).boxed()
        }
    }

    fn controller(script: MockScript) -> SessionController {
        SessionController::new(Arc::new(MockTransport::new().with_script(script)))
    }

    #[tokio::test]
    async fn test_phase_moves_to_streaming_on_first_fragment() {
        let mut session = controller(MockScript::fragments(["He", "llo"]));
        let Submission::Accepted { turn } = session.submit("A") else {
            panic!("submission should be accepted");
        };

        assert_eq!(
            session.phase(),
            &Phase::AwaitingFirstByte {
                status: Some(DEFAULT_STATUS_LABEL.to_string())
            }
        );

        let progress = session.advance().await;
        assert_eq!(progress, Some(Progress::Fragment { turn, bytes: 2 }));
        assert_eq!(session.phase(), &Phase::Streaming);
        assert_eq!(session.phase().status_label(), None);
    }

    #[tokio::test]
    async fn test_blank_question_ignored() {
        let mut session = controller(MockScript::fragments(["x"]));

        assert_eq!(
            session.submit("   \n"),
            Submission::Ignored(IgnoreReason::Blank)
        );
        assert!(session.store().is_empty());
        assert!(session.phase().is_idle());
    }

    #[tokio::test]
    async fn test_custom_status_label() {
        let mut session =
            controller(MockScript::hang()).with_status_label(Some("Searching...".to_string()));
        session.submit("q");
        assert_eq!(session.phase().status_label(), Some("Searching..."));

        let mut quiet = controller(MockScript::hang()).with_status_label(None);
        quiet.submit("q");
        assert_eq!(quiet.phase(), &Phase::AwaitingFirstByte { status: None });
    }

    #[tokio::test]
    async fn test_advance_when_idle_returns_none() {
        let mut session = controller(MockScript::fragments(["x"]));
        assert_eq!(session.advance().await, None);
    }

    #[tokio::test]
    async fn test_external_cancel_ignored_by_transport() {
        let mut session = SessionController::new(Arc::new(DeafTransport(vec!["a", "b", "c"])));
        session.submit("q");

        assert!(matches!(
            session.advance().await,
            Some(Progress::Fragment { .. })
        ));

        let token = session.cancel_handle().expect("active request");
        token.cancel();

        let progress = session.advance().await;
        assert!(matches!(
            progress,
            Some(Progress::Finished {
                outcome: TurnOutcome::Cancelled,
                ..
            })
        ));
        assert_eq!(session.store().last().unwrap().text, "a");
        assert!(session.phase().is_idle());
        assert!(session.cancel_handle().is_none());
    }

    #[tokio::test]
    async fn test_failure_mid_stream_keeps_partial_text() {
        let mut session = controller(
            MockScript::fragments(["partial"]).then_fail(TransportError::Body("reset".into())),
        );
        session.submit("q");

        assert_eq!(
            session.run_to_completion().await,
            Some(TurnOutcome::Failed)
        );
        let answer = session.store().last().unwrap();
        assert_eq!(answer.text, format!("partial{FAILURE_NOTICE}"));
        assert_eq!(answer.outcome, Some(TurnOutcome::Failed));
    }

    #[tokio::test]
    async fn test_cancel_then_advance_is_idle() {
        let mut session = controller(MockScript::hang());
        session.submit("q");

        assert!(session.cancel_active());
        assert!(!session.cancel_active());
        assert_eq!(session.advance().await, None);
    }

    #[tokio::test]
    async fn test_new_conversation_mints_new_id() {
        let mut session = controller(MockScript::fragments(["x"]));
        let before = session.conversation_id();
        session.submit("q");
        session.start_new_conversation();

        assert_ne!(session.conversation_id(), before);
        assert!(session.snapshot().is_empty());
    }
}
