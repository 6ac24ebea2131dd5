pub mod decoder;
pub mod error;
pub mod http;
pub mod mock;
pub mod types;

pub use decoder::Utf8StreamDecoder;
pub use error::{StreamError, TransportError};
pub use http::{HttpConfig, HttpTransport};
pub use mock::{MockScript, MockTransport};
pub use types::BaseUrl;

use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

/// Lazily produced answer text. Ends normally when the remote closes the body.
pub type FragmentStream = BoxStream<'static, Result<String, StreamError>>;

pub trait StreamTransport: Send + Sync {
    fn name(&self) -> &str;

    /// Opens a fresh stream for `question`. No I/O happens until the
    /// returned stream is first polled. Once `cancel` fires, the stream
    /// yields [`StreamError::Cancelled`] and reads nothing further.
    fn open(&self, question: &str, cancel: CancellationToken) -> FragmentStream;
}
