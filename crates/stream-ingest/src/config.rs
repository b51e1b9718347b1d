use std::time::Duration;

use crate::errors::IngestError;
use crate::messages::Locale;

/// Backend endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "https://workspace.jeffisalone.site/coze";
/// Absolute per-call timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a failure during a call is reported to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailureReporting {
    /// Deliver a synthesized `error` chunk and also return the error.
    #[default]
    Both,
    /// Deliver a synthesized `error` chunk and return `Ok(())`.
    ChunkOnly,
    /// Return the error without delivering a chunk.
    ErrorOnly,
}

impl FailureReporting {
    /// Parses `both`, `chunk` or `error` (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "both" => Some(Self::Both),
            "chunk" | "chunk_only" | "chunk-only" => Some(Self::ChunkOnly),
            "error" | "error_only" | "error-only" => Some(Self::ErrorOnly),
            _ => None,
        }
    }

    pub(crate) fn delivers_chunk(self) -> bool {
        !matches!(self, Self::ErrorOnly)
    }

    pub(crate) fn returns_error(self) -> bool {
        !matches!(self, Self::ChunkOnly)
    }
}

/// Configuration for `StreamIngestClient`.
#[derive(Clone, Debug)]
pub struct IngestClientConfig {
    /// URL the prompt is POSTed to.
    pub endpoint: String,
    /// Absolute timeout for a whole call, measured from request start.
    pub timeout: Duration,
    /// Language of synthesized error messages.
    pub locale: Locale,
    pub failure_reporting: FailureReporting,
}

impl Default for IngestClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            locale: Locale::default(),
            failure_reporting: FailureReporting::default(),
        }
    }
}

impl IngestClientConfig {
    /// Creates a config for `endpoint` with default timeout and reporting.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Builds a config from `STREAM_INGEST_*` environment variables.
    ///
    /// - `STREAM_INGEST_ENDPOINT`: backend URL.
    /// - `STREAM_INGEST_TIMEOUT_MS`: timeout in milliseconds.
    /// - `STREAM_INGEST_LOCALE`: `zh-CN` or `en`.
    /// - `STREAM_INGEST_FAILURE_REPORTING`: `both`, `chunk` or `error`.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, IngestError> {
        let mut config = Self::default();
        if let Some(endpoint) = lookup("STREAM_INGEST_ENDPOINT").filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(raw) = lookup("STREAM_INGEST_TIMEOUT_MS") {
            let millis: u64 = raw.trim().parse().map_err(|e| {
                IngestError::Config(format!("invalid STREAM_INGEST_TIMEOUT_MS {raw:?}: {e}"))
            })?;
            config.timeout = Duration::from_millis(millis);
        }
        if let Some(raw) = lookup("STREAM_INGEST_LOCALE") {
            config.locale = Locale::parse(&raw).ok_or_else(|| {
                IngestError::Config(format!("unsupported STREAM_INGEST_LOCALE {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup("STREAM_INGEST_FAILURE_REPORTING") {
            config.failure_reporting = FailureReporting::parse(&raw).ok_or_else(|| {
                IngestError::Config(format!(
                    "unsupported STREAM_INGEST_FAILURE_REPORTING {raw:?}"
                ))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Overrides the backend endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Overrides the absolute call timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn failure_reporting(mut self, reporting: FailureReporting) -> Self {
        self.failure_reporting = reporting;
        self
    }

    /// Checks that the endpoint is an http(s) URL and the timeout is non-zero.
    pub fn validate(&self) -> Result<(), IngestError> {
        let url = reqwest::Url::parse(self.endpoint.trim()).map_err(|e| {
            IngestError::Config(format!("invalid endpoint {:?}: {e}", self.endpoint))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(IngestError::Config(format!(
                "endpoint must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.timeout.is_zero() {
            return Err(IngestError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }
}
