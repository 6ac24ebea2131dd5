use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::decoder::Utf8StreamDecoder;
use super::error::{StreamError, TransportError};
use super::types::BaseUrl;
use super::{FragmentStream, StreamTransport};

const CHAT_PATH: &str = "/chat";
/// Upper bound on how much of a rejected response is read for its message.
const ERROR_BODY_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            user_agent: Some(concat!("campus-chat/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

impl HttpConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Streams answers from `GET {endpoint}/chat?query=...`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: BaseUrl,
    config: HttpConfig,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<BaseUrl>) -> Result<Self, TransportError> {
        Self::with_config(endpoint, HttpConfig::default())
    }

    pub fn with_config(
        endpoint: impl Into<BaseUrl>,
        config: HttpConfig,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(TransportError::Configuration(
                "Answer service endpoint is empty".to_string(),
            ));
        }

        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        }

        let client = builder.build().map_err(|e| {
            TransportError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &BaseUrl {
        &self.endpoint
    }

    fn chat_url(&self) -> String {
        self.endpoint.join(CHAT_PATH)
    }
}

impl StreamTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    fn open(&self, question: &str, cancel: CancellationToken) -> FragmentStream {
        let url = self.chat_url();
        tracing::debug!(%url, "Opening answer stream");

        let request = self.client.get(url).query(&[("query", question)]);

        stream::unfold(
            (ReadState::Connect(request), cancel),
            |(state, cancel)| async move {
                let (item, next) = read_next(state, &cancel).await;
                item.map(|item| (item, (next, cancel)))
            },
        )
        .boxed()
    }
}

enum ReadState {
    Connect(RequestBuilder),
    Body {
        body: BoxStream<'static, reqwest::Result<Bytes>>,
        decoder: Utf8StreamDecoder,
    },
    /// Text already yielded; the error goes out on the next poll.
    Failed(TransportError),
    Done,
}

type Step = (Option<Result<String, StreamError>>, ReadState);

fn finish_with(error: impl Into<StreamError>) -> Step {
    (Some(Err(error.into())), ReadState::Done)
}

async fn read_next(mut state: ReadState, cancel: &CancellationToken) -> Step {
    loop {
        if matches!(state, ReadState::Done) {
            return (None, ReadState::Done);
        }
        if cancel.is_cancelled() {
            return finish_with(StreamError::Cancelled);
        }

        state = match state {
            ReadState::Connect(request) => {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return finish_with(StreamError::Cancelled),
                    result = request.send() => result,
                };

                let response = match result {
                    Ok(response) => response,
                    Err(e) => return finish_with(TransportError::Connection(e.to_string())),
                };

                let status = response.status();
                if !status.is_success() {
                    let body = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return finish_with(StreamError::Cancelled),
                        body = read_error_body(response) => body,
                    };
                    tracing::warn!(status = status.as_u16(), "Answer service rejected request");
                    return finish_with(TransportError::from_status(status.as_u16(), &body));
                }

                ReadState::Body {
                    body: response.bytes_stream().boxed(),
                    decoder: Utf8StreamDecoder::new(),
                }
            }
            ReadState::Body {
                mut body,
                mut decoder,
            } => {
                let chunk = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return finish_with(StreamError::Cancelled),
                    chunk = body.next() => chunk,
                };

                match chunk {
                    Some(Ok(bytes)) => {
                        let text = decoder.decode(&bytes);
                        let next = ReadState::Body { body, decoder };
                        if !text.is_empty() {
                            return (Some(Ok(text)), next);
                        }
                        next
                    }
                    Some(Err(e)) => {
                        let error = TransportError::Body(e.to_string());
                        return match decoder.finish() {
                            Some(tail) => (Some(Ok(tail)), ReadState::Failed(error)),
                            None => finish_with(error),
                        };
                    }
                    None => return (decoder.finish().map(Ok), ReadState::Done),
                }
            }
            ReadState::Failed(error) => return finish_with(error),
            ReadState::Done => ReadState::Done,
        };
    }
}

async fn read_error_body(response: Response) -> String {
    let mut body = response.bytes_stream().boxed();
    let mut buf = Vec::new();

    while buf.len() < ERROR_BODY_LIMIT {
        match body.next().await {
            Some(Ok(chunk)) => buf.extend_from_slice(&chunk),
            Some(Err(_)) | None => break,
        }
    }

    buf.truncate(ERROR_BODY_LIMIT);
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_defaults() {
        let config = HttpConfig::default();
        assert!(config.connect_timeout.is_none());
        assert!(
            config
                .user_agent
                .as_deref()
                .is_some_and(|ua| ua.starts_with("campus-chat/"))
        );
    }

    #[test]
    fn test_http_config_builder() {
        let config = HttpConfig::new()
            .with_connect_timeout(Duration::from_secs(5))
            .with_user_agent("campus-test");

        assert_eq!(config.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.user_agent.as_deref(), Some("campus-test"));
    }

    #[test]
    fn test_chat_url() {
        let transport = HttpTransport::new("http://localhost:8000/").expect("transport");
        assert_eq!(transport.chat_url(), "http://localhost:8000/chat");
        assert_eq!(transport.name(), "http");
    }

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = HttpTransport::new("");
        assert!(matches!(result, Err(TransportError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_cancelled_before_poll_reads_nothing() {
        let transport = HttpTransport::new("http://127.0.0.1:9").expect("transport");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut stream = transport.open("anything", cancel);
        assert_eq!(stream.next().await, Some(Err(StreamError::Cancelled)));
        assert_eq!(stream.next().await, None);
    }
}
