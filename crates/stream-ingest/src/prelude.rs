//! Common imports for streaming a prompt.
pub use crate::{
    Chunk, ChunkKind, FailureReporting, IngestClientConfig, IngestError, Locale,
    StreamIngestClient,
};
