//! Streaming client for a chat backend that answers with newline-delimited
//! JSON chunks.
//!
//! A prompt is POSTed as `{"prompt": ...}` and the response body is decoded
//! incrementally. Each line becomes a [`Chunk`] (`delta`, `completed` or
//! `error`), and lines that are not JSON are delivered as plain-text deltas.
//!
//! ```no_run
//! use stream_ingest::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), IngestError> {
//! let client = StreamIngestClient::new(
//!     IngestClientConfig::new("http://localhost:3000/coze").locale(Locale::En),
//! )?;
//!
//! client
//!     .send("Say hello", |chunk| match chunk.kind {
//!         ChunkKind::Delta => print!("{}", chunk.text()),
//!         ChunkKind::Completed => println!(),
//!         ChunkKind::Error => eprintln!("{}", chunk.text()),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Chunk data model shared with the backend.
pub mod chunk;
/// Client entry point.
pub mod client;
/// Client configuration.
pub mod config;
/// Incremental UTF-8 decoding and line framing.
pub mod decoder;
/// Public error type.
pub mod errors;
/// Localized user-facing messages.
pub mod messages;
/// Tracing subscriber setup for binaries.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Record parsing with plain-text fallback.
pub mod record;
/// Transport seam and the HTTP implementation.
pub mod transport;

pub use chunk::{Chunk, ChunkKind};
pub use client::StreamIngestClient;
pub use config::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, FailureReporting, IngestClientConfig};
pub use decoder::{IncrementalUtf8Decoder, LineBuffer, StreamState};
pub use errors::IngestError;
pub use messages::Locale;
pub use observability::{ObservabilityConfig, init_observability, init_with};
pub use record::parse_record;
pub use transport::{ByteStream, ChunkTransport, HttpTransport, PromptRequest};
