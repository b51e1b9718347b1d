use std::sync::Arc;

use futures::StreamExt as _;
use tokio::time::{Instant, timeout_at};
use tracing::{Instrument as _, debug, error, info_span, warn};

use crate::chunk::{Chunk, ChunkKind};
use crate::config::IngestClientConfig;
use crate::decoder::StreamState;
use crate::errors::IngestError;
use crate::record::parse_record;
use crate::transport::{ChunkTransport, HttpTransport, PromptRequest, StreamReader};

/// Sends prompts to the chat backend and delivers the streamed reply chunk by
/// chunk.
///
/// One transport attempt is made per call; there are no retries.
#[derive(Clone)]
pub struct StreamIngestClient {
    transport: Arc<dyn ChunkTransport>,
    config: IngestClientConfig,
}

impl StreamIngestClient {
    /// Creates a client that talks HTTP to `config.endpoint`.
    pub fn new(config: IngestClientConfig) -> Result<Self, IngestError> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self {
            transport: Arc::new(transport),
            config,
        })
    }

    /// Creates an HTTP client from `STREAM_INGEST_*` environment variables.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::new(IngestClientConfig::from_env()?)
    }

    /// Creates a client over a custom transport.
    pub fn with_transport(config: IngestClientConfig, transport: Arc<dyn ChunkTransport>) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &IngestClientConfig {
        &self.config
    }

    /// Sends `prompt` and calls `on_chunk` once per chunk, in arrival order.
    ///
    /// Returns after a `completed` chunk or once the body ends. When the body
    /// ends without an explicit terminator a `completed` chunk with zero
    /// token usage is synthesized, or an `error` chunk if nothing at all was
    /// received.
    ///
    /// HTTP status failures and a missing body are returned as errors without
    /// any chunk. Other failures (timeout, network, transport) are reported
    /// according to `FailureReporting`. With the default (`Both`) the caller
    /// receives an `error` chunk *and* an `Err` for the same failure.
    pub async fn send<F>(&self, prompt: &str, on_chunk: F) -> Result<(), IngestError>
    where
        F: FnMut(Chunk),
    {
        let call_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "stream_ingest.send",
            %call_id,
            endpoint = %self.config.endpoint,
            prompt_len = prompt.len(),
        );
        let mut state = StreamState::new();
        let mut sink = ChunkSink::new(on_chunk);

        let result = self
            .stream_into(prompt, &mut state, &mut sink)
            .instrument(span.clone())
            .await;
        let _entered = span.enter();
        let elapsed_ms = millis(state.elapsed());
        match result {
            Ok(()) => {
                debug!(elapsed_ms, chunks = sink.delivered, "stream finished");
                Ok(())
            }
            Err(err) => self.report_failure(err, elapsed_ms, &mut sink),
        }
    }

    /// Sends `prompt` and returns the concatenated `delta` text.
    ///
    /// An `error` chunk, from the backend or synthesized, becomes
    /// `IngestError::Backend` carrying its content.
    pub async fn collect_text(&self, prompt: &str) -> Result<String, IngestError> {
        let mut text = String::new();
        let mut backend_error: Option<String> = None;
        self.send(prompt, |chunk| match chunk.kind {
            ChunkKind::Delta => text.push_str(chunk.text()),
            ChunkKind::Error => {
                backend_error.get_or_insert_with(|| chunk.text().to_string());
            }
            ChunkKind::Completed => {}
        })
        .await?;
        match backend_error {
            Some(message) => Err(IngestError::Backend(message)),
            None => Ok(text),
        }
    }

    async fn stream_into<F>(
        &self,
        prompt: &str,
        state: &mut StreamState,
        sink: &mut ChunkSink<F>,
    ) -> Result<(), IngestError>
    where
        F: FnMut(Chunk),
    {
        let deadline = Instant::now() + self.config.timeout;
        let request = PromptRequest::new(prompt);
        debug!(timeout_ms = millis(self.config.timeout), "opening stream");

        let body = timeout_at(deadline, self.transport.open(&request))
            .await
            .map_err(|_| IngestError::Timeout)??;
        let mut reader = StreamReader::new(body);

        loop {
            let next = timeout_at(deadline, reader.next())
                .await
                .map_err(|_| IngestError::Timeout)?;
            let Some(segment) = next else {
                break;
            };
            let segment = segment?;
            for record in state.push_bytes(&segment) {
                let Some(chunk) = parse_record(&record) else {
                    continue;
                };
                state.mark_valid_data();
                if sink.deliver(chunk) == ChunkKind::Completed {
                    return Ok(());
                }
            }
        }
        drop(reader);

        self.finish_stream(state, sink);
        Ok(())
    }

    fn finish_stream<F>(&self, state: &mut StreamState, sink: &mut ChunkSink<F>)
    where
        F: FnMut(Chunk),
    {
        let trailing = state.finish();
        if let Some(chunk) = parse_record(&trailing) {
            state.mark_valid_data();
            if sink.deliver(chunk) == ChunkKind::Completed {
                return;
            }
        }

        if state.received_valid_data() {
            debug!("stream ended without terminator, synthesizing completion");
            sink.deliver(Chunk::completed(0));
        } else {
            sink.deliver(Chunk::error(self.config.locale.no_valid_data_message()));
        }
    }

    fn report_failure<F>(
        &self,
        err: IngestError,
        elapsed_ms: u64,
        sink: &mut ChunkSink<F>,
    ) -> Result<(), IngestError>
    where
        F: FnMut(Chunk),
    {
        error!(elapsed_ms, error = %err, "streaming request failed");
        if err.is_pre_body() {
            return Err(err);
        }

        let reporting = self.config.failure_reporting;
        if reporting.delivers_chunk() {
            let locale = self.config.locale;
            let content = locale.failure_report(&err.user_detail(locale), &self.config.endpoint);
            sink.deliver(Chunk::error(content).with_trace(err.to_string()));
        }
        if reporting.returns_error() {
            Err(err)
        } else {
            Ok(())
        }
    }
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Wraps the caller's callback and counts deliveries.
struct ChunkSink<F> {
    on_chunk: F,
    delivered: u64,
}

impl<F> ChunkSink<F>
where
    F: FnMut(Chunk),
{
    fn new(on_chunk: F) -> Self {
        Self {
            on_chunk,
            delivered: 0,
        }
    }

    fn deliver(&mut self, chunk: Chunk) -> ChunkKind {
        let kind = chunk.kind;
        if kind == ChunkKind::Error {
            warn!(seq = self.delivered, content = chunk.text(), "delivering error chunk");
        } else {
            debug!(seq = self.delivered, %kind, terminal = kind.is_terminal(), "delivering chunk");
        }
        (self.on_chunk)(chunk);
        self.delivered = self.delivered.saturating_add(1);
        kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailureReporting;
    use crate::messages::Locale;
    use crate::transport::ByteStream;
    use futures::{Stream, stream};
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    enum FakeBehavior {
        Segments(Vec<Result<Vec<u8>, IngestError>>),
        OpenError(IngestError),
        Pending,
    }

    struct FakeTransport {
        behavior: FakeBehavior,
        releases: Arc<AtomicUsize>,
        prompts: Mutex<Vec<String>>,
    }

    struct CountedStream {
        inner: ByteStream,
        releases: Arc<AtomicUsize>,
    }

    impl Stream for CountedStream {
        type Item = Result<bytes::Bytes, IngestError>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.inner.as_mut().poll_next(cx)
        }
    }

    impl Drop for CountedStream {
        fn drop(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl ChunkTransport for FakeTransport {
        async fn open(&self, request: &PromptRequest) -> Result<ByteStream, IngestError> {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(request.prompt.clone());
            let inner: ByteStream = match &self.behavior {
                FakeBehavior::OpenError(err) => return Err(err.clone()),
                FakeBehavior::Segments(segments) => Box::pin(stream::iter(
                    segments
                        .clone()
                        .into_iter()
                        .map(|s| s.map(bytes::Bytes::from)),
                )),
                FakeBehavior::Pending => {
                    Box::pin(stream::pending::<Result<bytes::Bytes, IngestError>>())
                }
            };
            Ok(Box::pin(CountedStream {
                inner,
                releases: self.releases.clone(),
            }))
        }
    }

    fn fake(behavior: FakeBehavior) -> Arc<FakeTransport> {
        Arc::new(FakeTransport {
            behavior,
            releases: Arc::new(AtomicUsize::new(0)),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn segments(parts: &[&[u8]]) -> FakeBehavior {
        FakeBehavior::Segments(parts.iter().map(|p| Ok(p.to_vec())).collect())
    }

    fn client_for(transport: Arc<FakeTransport>, config: IngestClientConfig) -> StreamIngestClient {
        StreamIngestClient::with_transport(config, transport)
    }

    async fn run(
        client: &StreamIngestClient,
        prompt: &str,
    ) -> (Vec<Chunk>, Result<(), IngestError>) {
        let mut chunks = Vec::new();
        let result = client.send(prompt, |chunk| chunks.push(chunk)).await;
        (chunks, result)
    }

    fn test_config() -> IngestClientConfig {
        IngestClientConfig::new("http://localhost:3000/coze")
    }

    #[tokio::test]
    async fn delivers_records_in_order_and_stops_at_completed() {
        let transport = fake(segments(&[
            b"{\"type\":\"delta\",\"content\":\"a\"}\n{\"type\":\"delta\",\"content\":\"b\"}\n",
            b"{\"type\":\"completed\",\"token_usage\":5}\n{\"type\":\"delta\",\"content\":\"late\"}\n",
            b"{\"type\":\"delta\",\"content\":\"never read\"}\n",
        ]));
        let client = client_for(transport.clone(), test_config());

        let (chunks, result) = run(&client, "hi").await;
        assert!(result.is_ok());
        assert_eq!(
            chunks,
            vec![Chunk::delta("a"), Chunk::delta("b"), Chunk::completed(5)]
        );
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
        assert_eq!(*transport.prompts.lock().expect("lock"), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn record_split_across_reads_is_one_chunk() {
        let transport = fake(segments(&[b"{\"typ", b"e\":\"delta\",\"content\":\"hi\"}\n"]));
        let client = client_for(transport, test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(result.is_ok());
        assert_eq!(chunks, vec![Chunk::delta("hi"), Chunk::completed(0)]);
    }

    #[tokio::test]
    async fn multibyte_text_split_across_reads_is_preserved() {
        let body = "{\"type\":\"delta\",\"content\":\"你好\"}\n".as_bytes();
        let split = body.len() - 4;
        let transport = fake(segments(&[&body[..split], &body[split..]]));
        let client = client_for(transport, test_config());

        let (chunks, _) = run(&client, "p").await;
        assert_eq!(chunks[0], Chunk::delta("你好"));
    }

    #[tokio::test]
    async fn plain_text_body_becomes_delta_then_synthesized_completion() {
        let transport = fake(segments(&[b"  hello ", b"world  "]));
        let client = client_for(transport, test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(result.is_ok());
        assert_eq!(
            chunks,
            vec![Chunk::delta("hello world"), Chunk::completed(0)]
        );
    }

    #[tokio::test]
    async fn empty_body_yields_single_error_chunk() {
        let transport = fake(segments(&[]));
        let client = client_for(transport.clone(), test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(result.is_ok());
        assert_eq!(
            chunks,
            vec![Chunk::error(Locale::ZhCn.no_valid_data_message())]
        );
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blank_lines_only_count_as_no_data() {
        let transport = fake(segments(&[b"\n  \n\r\n"]));
        let client = client_for(transport, test_config().locale(Locale::En));

        let (chunks, _) = run(&client, "p").await;
        assert_eq!(chunks, vec![Chunk::error(Locale::En.no_valid_data_message())]);
    }

    #[tokio::test]
    async fn trailing_completed_record_is_not_followed_by_synthesized_one() {
        let transport = fake(segments(&[
            b"{\"type\":\"delta\",\"content\":\"x\"}\n{\"type\":\"completed\",\"token_usage\":9}",
        ]));
        let client = client_for(transport, test_config());

        let (chunks, _) = run(&client, "p").await;
        assert_eq!(chunks, vec![Chunk::delta("x"), Chunk::completed(9)]);
    }

    #[tokio::test]
    async fn backend_error_record_keeps_reading_and_stream_ends_completed() {
        let transport = fake(segments(&[
            b"{\"type\":\"error\",\"content\":\"quota\",\"trace\":\"t1\"}\n",
            b"late text\n",
        ]));
        let client = client_for(transport, test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(result.is_ok());
        assert_eq!(
            chunks,
            vec![
                Chunk::error("quota").with_trace("t1"),
                Chunk::delta("late text"),
                Chunk::completed(0),
            ]
        );
        assert!(chunks.last().expect("last").kind.is_terminal());
    }

    #[tokio::test]
    async fn completed_with_float_token_usage_stops_the_stream() {
        let transport = fake(segments(&[
            b"{\"type\":\"delta\",\"content\":\"a\"}\n{\"type\":\"completed\",\"token_usage\":12.0}\n",
            b"{\"type\":\"delta\",\"content\":\"late\"}\n",
        ]));
        let client = client_for(transport.clone(), test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(result.is_ok());
        assert_eq!(chunks, vec![Chunk::delta("a"), Chunk::completed(12)]);
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_during_body_delivers_error_chunk_and_returns_error() {
        let transport = FakeBehavior::Segments(vec![
            Ok(b"{\"type\":\"delta\",\"content\":\"partial\"}\n".to_vec()),
            Err(IngestError::Timeout),
        ]);
        let transport = fake(transport);
        let client = client_for(transport.clone(), test_config());

        let (chunks, result) = run(&client, "p").await;
        assert_eq!(result, Err(IngestError::Timeout));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk::delta("partial"));
        assert_eq!(chunks[1].kind, ChunkKind::Error);
        assert!(chunks[1].text().contains(Locale::ZhCn.timeout_message()));
        assert!(chunks[1].text().contains("http://localhost:3000/coze"));
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_while_opening_is_reported_twice() {
        let transport = fake(FakeBehavior::OpenError(IngestError::Timeout));
        let client = client_for(transport.clone(), test_config().locale(Locale::En));

        let (chunks, result) = run(&client, "p").await;
        assert_eq!(result, Err(IngestError::Timeout));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text().contains(Locale::En.timeout_message()));
        assert_eq!(transport.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn deadline_elapses_on_stalled_body() {
        let transport = fake(FakeBehavior::Pending);
        let client = client_for(
            transport.clone(),
            test_config().timeout(Duration::from_millis(50)),
        );

        let (chunks, result) = run(&client, "p").await;
        assert_eq!(result, Err(IngestError::Timeout));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text().contains(Locale::ZhCn.timeout_message()));
        assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn network_failure_is_localized() {
        let transport = fake(FakeBehavior::OpenError(IngestError::Network(
            "connection refused".into(),
        )));
        let client = client_for(transport, test_config().locale(Locale::En));

        let (chunks, result) = run(&client, "p").await;
        assert!(matches!(result, Err(IngestError::Network(_))));
        assert!(chunks[0].text().contains(Locale::En.network_message()));
        assert_eq!(chunks[0].trace.as_deref(), Some("network error: connection refused"));
    }

    #[tokio::test]
    async fn other_failures_keep_their_message_in_the_report() {
        let transport = fake(FakeBehavior::OpenError(IngestError::Transport(
            "tls handshake".into(),
        )));
        let client = client_for(transport, test_config().locale(Locale::En));

        let (chunks, _) = run(&client, "p").await;
        assert!(chunks[0]
            .text()
            .starts_with("Streaming request failed:\ntransport error: tls handshake\n"));
    }

    #[tokio::test]
    async fn http_status_and_missing_body_return_errors_without_chunks() {
        for err in [IngestError::HttpStatus { status: 503 }, IngestError::NoBody] {
            let transport = fake(FakeBehavior::OpenError(err.clone()));
            let client = client_for(transport, test_config());

            let (chunks, result) = run(&client, "p").await;
            assert_eq!(result, Err(err));
            assert!(chunks.is_empty());
        }
    }

    #[tokio::test]
    async fn failure_reporting_can_pick_one_channel() {
        let chunk_only = client_for(
            fake(FakeBehavior::OpenError(IngestError::Timeout)),
            test_config().failure_reporting(FailureReporting::ChunkOnly),
        );
        let (chunks, result) = run(&chunk_only, "p").await;
        assert!(result.is_ok());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Error);

        let error_only = client_for(
            fake(FakeBehavior::OpenError(IngestError::Timeout)),
            test_config().failure_reporting(FailureReporting::ErrorOnly),
        );
        let (chunks, result) = run(&error_only, "p").await;
        assert_eq!(result, Err(IngestError::Timeout));
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn failure_after_backend_error_still_reports_the_failure() {
        let transport = fake(FakeBehavior::Segments(vec![
            Ok(b"{\"type\":\"error\",\"content\":\"upstream\"}\n".to_vec()),
            Err(IngestError::Network("reset".into())),
        ]));
        let client = client_for(transport, test_config());

        let (chunks, result) = run(&client, "p").await;
        assert!(matches!(result, Err(IngestError::Network(_))));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], Chunk::error("upstream"));
        assert_eq!(chunks[1].kind, ChunkKind::Error);
        assert!(chunks[1].text().contains(Locale::ZhCn.network_message()));
    }

    #[tokio::test]
    async fn collect_text_concatenates_deltas() {
        let transport = fake(segments(&[
            b"{\"type\":\"delta\",\"content\":\"Hel\"}\nlo\n{\"type\":\"completed\",\"token_usage\":3}\n",
        ]));
        let client = client_for(transport, test_config());

        assert_eq!(client.collect_text("p").await.expect("text"), "Hello");
    }

    #[tokio::test]
    async fn collect_text_surfaces_backend_error_chunks() {
        let transport = fake(segments(&[b"{\"type\":\"error\",\"content\":\"denied\"}\n"]));
        let client = client_for(transport, test_config());

        assert_eq!(
            client.collect_text("p").await,
            Err(IngestError::Backend("denied".into()))
        );
    }

    #[test]
    fn http_client_rejects_invalid_config() {
        let err = StreamIngestClient::new(IngestClientConfig::new("not a url"));
        assert!(matches!(err, Err(IngestError::Config(_))));
    }
}
