use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;

use crate::error::ClientError;

/// A streaming response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send + 'static>>;

/// HTTP response returned by a [`Transport`](crate::Transport).
///
/// The body is read lazily. Dropping the response (or the stream/reader it
/// was turned into) closes the body.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Response {
    /// Create a new response from components
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a response from buffered bytes
    #[must_use]
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(status, headers, Box::pin(stream::once(async move { Ok(bytes) })))
    }

    /// Get the HTTP status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the response and return the entire body as bytes
    ///
    /// # Errors
    /// Returns the first I/O error produced by the body stream.
    pub async fn bytes(self) -> Result<Bytes, io::Error> {
        let mut body = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(buf))
    }

    /// Consume the response and decode the first JSON value of the body.
    ///
    /// Anything after the first complete value is ignored.
    ///
    /// # Errors
    /// [`ClientError::Read`] if the body cannot be read,
    /// [`ClientError::Unmarshal`] if it does not start with a valid `T`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        let bytes = self.bytes().await?;
        let first = serde_json::Deserializer::from_slice(&bytes)
            .into_iter::<T>()
            .next();
        match first {
            Some(value) => value.map_err(ClientError::Unmarshal),
            // Empty or whitespace-only body: let serde report the EOF.
            None => serde_json::from_slice(&bytes).map_err(ClientError::Unmarshal),
        }
    }

    /// Convert the response into its raw byte stream
    #[must_use]
    pub fn into_stream(self) -> BodyStream {
        self.body
    }

    /// Convert the response body into a buffered async reader.
    #[must_use]
    pub fn into_reader(self) -> impl AsyncBufRead + Send + Unpin + 'static {
        StreamReader::new(self.body)
    }
}
