use crate::messages::Locale;

/// Errors returned by `StreamIngestClient` and its transports.
///
/// Record-level decode failures never show up here; such records are
/// delivered as plain-text `delta` chunks instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Backend answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    HttpStatus { status: u16 },
    /// Response carried no readable body.
    #[error("response body is not available")]
    NoBody,
    /// The request did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,
    /// Connection or transfer failed at the network level.
    #[error("network error: {0}")]
    Network(String),
    /// Any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The backend reported an error chunk (only produced by `collect_text`).
    #[error("backend error: {0}")]
    Backend(String),
}

impl IngestError {
    /// Returns `true` for failures raised before any body was read, which
    /// are returned without a synthesized `error` chunk.
    pub(crate) fn is_pre_body(&self) -> bool {
        matches!(self, Self::HttpStatus { .. } | Self::NoBody | Self::Config(_))
    }

    /// Short user-facing description: localized for timeouts and network
    /// failures, the error text otherwise.
    pub fn user_detail(&self, locale: Locale) -> String {
        match self {
            Self::Timeout => locale.timeout_message().to_string(),
            Self::Network(_) => locale.network_message().to_string(),
            other => other.to_string(),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Network(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}
