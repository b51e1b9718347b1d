use serde::{Deserialize, Serialize};

/// Kind of a streamed chunk, carried on the wire under the `type` key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Incremental content.
    Delta,
    /// Terminal success marker.
    Completed,
    /// Terminal failure marker.
    Error,
}

impl ChunkKind {
    /// Returns `true` for `Completed` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delta => "delta",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of the streaming response protocol.
///
/// Wire shape: `{"type": "delta"|"completed"|"error", "content"?: string,
/// "token_usage"?: number, "trace"?: string}`. Unknown keys are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    /// Text payload for `delta` and `error` chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Token count, only set on `completed` chunks.
    #[serde(
        default,
        deserialize_with = "deserialize_token_usage",
        skip_serializing_if = "Option::is_none"
    )]
    pub token_usage: Option<u64>,
    /// Diagnostic detail, only set on `error` chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

impl Chunk {
    /// Creates a `delta` chunk carrying `text`.
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Delta,
            content: Some(text.into()),
            token_usage: None,
            trace: None,
        }
    }

    /// Creates a `completed` chunk with the given token usage.
    pub fn completed(token_usage: u64) -> Self {
        Self {
            kind: ChunkKind::Completed,
            content: None,
            token_usage: Some(token_usage),
            trace: None,
        }
    }

    /// Creates an `error` chunk carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ChunkKind::Error,
            content: Some(message.into()),
            token_usage: None,
            trace: None,
        }
    }

    /// Attaches diagnostic trace text.
    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    /// Returns the content text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// Accepts any JSON number. Negative values clamp to 0, fractional values
/// round to the nearest integer and values past `u64::MAX` saturate.
fn deserialize_token_usage<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let Some(number) = Option::<serde_json::Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(value) = number.as_u64() {
        return Ok(Some(value));
    }
    let value = number.as_f64().unwrap_or(0.0);
    if !value.is_finite() || value <= 0.0 {
        return Ok(Some(0));
    }
    // float-to-int `as` saturates at u64::MAX
    Ok(Some(value.round() as u64))
}
