use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt as _};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::config::IngestClientConfig;
use crate::errors::IngestError;

/// Response body as a stream of raw byte segments.
pub type ByteStream =
    Pin<Box<dyn Stream<Item = Result<bytes::Bytes, IngestError>> + Send + 'static>>;

/// JSON request body sent to the backend.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct PromptRequest {
    pub prompt: String,
}

impl PromptRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

/// Opens a response body stream for a prompt.
///
/// `HttpTransport` is the production implementation; tests plug in fakes that
/// replay scripted byte segments.
#[async_trait::async_trait]
pub trait ChunkTransport: Send + Sync {
    /// Sends `request` and returns the response body once headers are in.
    ///
    /// Non-success statuses must be reported as `IngestError::HttpStatus` and
    /// a missing body as `IngestError::NoBody`.
    async fn open(&self, request: &PromptRequest) -> Result<ByteStream, IngestError>;
}

/// reqwest-backed transport that POSTs the prompt as JSON.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds the HTTP client. The client timeout covers the whole exchange,
    /// body included.
    pub fn new(config: &IngestClientConfig) -> Result<Self, IngestError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim().to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ChunkTransport for HttpTransport {
    async fn open(&self, request: &PromptRequest) -> Result<ByteStream, IngestError> {
        debug!(endpoint = %self.endpoint, prompt_len = request.prompt.len(), "posting prompt");
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/plain")
            .json(request)
            .send()
            .await
            .map_err(IngestError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::HttpStatus {
                status: status.as_u16(),
            });
        }
        if status == reqwest::StatusCode::NO_CONTENT {
            return Err(IngestError::NoBody);
        }

        let body = response
            .bytes_stream()
            .map(|segment| segment.map_err(IngestError::from_reqwest));
        Ok(Box::pin(body))
    }
}

/// Exclusive owner of one response body for the duration of a call.
///
/// The body is released when the reader is dropped, which happens exactly once
/// on every exit path of the read loop.
pub(crate) struct StreamReader {
    inner: ByteStream,
}

impl StreamReader {
    pub(crate) fn new(inner: ByteStream) -> Self {
        Self { inner }
    }
}

impl Stream for StreamReader {
    type Item = Result<bytes::Bytes, IngestError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        debug!("stream reader released");
    }
}
