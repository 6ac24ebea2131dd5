use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::decoder::Utf8StreamDecoder;
use super::error::{StreamError, TransportError};
use super::{FragmentStream, StreamTransport};

#[derive(Debug, Clone)]
enum Ending {
    Close,
    Fail(TransportError),
    Hang,
}

/// One scripted reply: raw body chunks followed by an ending.
#[derive(Debug, Clone)]
pub struct MockScript {
    chunks: Vec<Vec<u8>>,
    ending: Ending,
}

impl MockScript {
    #[must_use]
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: fragments
                .into_iter()
                .map(|f| f.into().into_bytes())
                .collect(),
            ending: Ending::Close,
        }
    }

    /// Raw body chunks, decoded the same way a network body is.
    #[must_use]
    pub fn bytes(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            ending: Ending::Close,
        }
    }

    /// Fails before the first byte.
    #[must_use]
    pub fn fail(error: TransportError) -> Self {
        Self::bytes(Vec::new()).then_fail(error)
    }

    /// Never answers; only cancellation ends it.
    #[must_use]
    pub fn hang() -> Self {
        Self::bytes(Vec::new()).then_hang()
    }

    #[must_use]
    pub fn then_fail(mut self, error: TransportError) -> Self {
        self.ending = Ending::Fail(error);
        self
    }

    #[must_use]
    pub fn then_hang(mut self) -> Self {
        self.ending = Ending::Hang;
        self
    }
}

#[derive(Clone, Default)]
pub struct MockTransport {
    scripts: Arc<Mutex<VecDeque<MockScript>>>,
    requests: Arc<Mutex<Vec<String>>>,
    chunk_delay: Option<Duration>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("queued", &self.scripts.lock().len())
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_script(self, script: MockScript) -> Self {
        self.push_script(script);
        self
    }

    #[must_use]
    pub const fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    pub fn push_script(&self, script: MockScript) {
        self.scripts.lock().push_back(script);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

impl StreamTransport for MockTransport {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(&self, question: &str, cancel: CancellationToken) -> FragmentStream {
        self.requests.lock().push(question.to_string());

        let script = self.scripts.lock().pop_front().unwrap_or_else(|| {
            MockScript::fail(TransportError::Connection(
                "MockTransport: no scripted reply".to_string(),
            ))
        });

        let playback = Playback {
            chunks: script.chunks.into(),
            ending: Some(script.ending),
            decoder: Utf8StreamDecoder::new(),
            delay: self.chunk_delay,
            cancel,
        };

        stream::unfold(playback, Playback::next).boxed()
    }
}

struct Playback {
    chunks: VecDeque<Vec<u8>>,
    ending: Option<Ending>,
    decoder: Utf8StreamDecoder,
    delay: Option<Duration>,
    cancel: CancellationToken,
}

impl Playback {
    fn cancelled(mut self) -> Option<(Result<String, StreamError>, Self)> {
        self.chunks.clear();
        self.ending = None;
        Some((Err(StreamError::Cancelled), self))
    }

    async fn next(mut self) -> Option<(Result<String, StreamError>, Self)> {
        loop {
            if self.ending.is_none() {
                return None;
            }
            if self.cancel.is_cancelled() {
                return self.cancelled();
            }

            if let Some(delay) = self.delay {
                let cancel = self.cancel.clone();
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return self.cancelled(),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            if let Some(chunk) = self.chunks.pop_front() {
                let text = self.decoder.decode(&chunk);
                if text.is_empty() {
                    continue;
                }
                return Some((Ok(text), self));
            }

            if let Some(tail) = self.decoder.finish() {
                return Some((Ok(tail), self));
            }

            match self.ending.take() {
                Some(Ending::Fail(error)) => return Some((Err(error.into()), self)),
                Some(Ending::Hang) => {
                    let cancel = self.cancel.clone();
                    cancel.cancelled().await;
                    return self.cancelled();
                }
                Some(Ending::Close) | None => return None,
            }
        }
    }
}
