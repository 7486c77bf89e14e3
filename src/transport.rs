//! Code-generation stream transport
//!
//! The transport opens a server-push response for one message and hands
//! back the raw bytes; the parser turns those bytes into typed events.

mod error;
mod http;
pub mod parser;

#[cfg(test)]
mod proptests;

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpStreamSource;
pub use parser::{EventParser, StreamEvent};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

/// Raw body of a streaming response. Dropping it closes the connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Something that can open a code-generation stream for a message
#[async_trait]
pub trait CodeStreamSource: Send + Sync {
    /// Open the stream for `message_id`.
    ///
    /// Fails with a connection-class error on a non-success status or when
    /// the request cannot be made at all.
    async fn open(&self, message_id: &str) -> Result<ByteStream, TransportError>;
}

#[async_trait]
impl<T: CodeStreamSource + ?Sized> CodeStreamSource for std::sync::Arc<T> {
    async fn open(&self, message_id: &str) -> Result<ByteStream, TransportError> {
        (**self).open(message_id).await
    }
}
