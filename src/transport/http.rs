//! HTTP implementation of the code-generation stream

use super::{ByteStream, CodeStreamSource, TransportError};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;

/// Opens `GET {base}/api/v1/{message_id}/stream-code` as a server-push stream
pub struct HttpStreamSource {
    client: Client,
    base_url: String,
}

impl HttpStreamSource {
    /// No overall request timeout is installed: a generation stream stays
    /// open until the backend finishes or the caller cancels.
    pub fn new(base_url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn stream_url(&self, message_id: &str) -> String {
        format!("{}/api/v1/{message_id}/stream-code", self.base_url)
    }
}

#[async_trait]
impl CodeStreamSource for HttpStreamSource {
    async fn open(&self, message_id: &str) -> Result<ByteStream, TransportError> {
        if message_id.trim().is_empty() {
            return Err(TransportError::invalid_request(
                "Cannot open a stream without a message id",
            ));
        }

        let url = self.stream_url(message_id);
        tracing::debug!(%url, "Opening code stream");

        let response = self
            .client
            .get(&url)
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::status(status.as_u16()));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed())
    }
}
