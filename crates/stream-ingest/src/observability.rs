use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const DEFAULT_FILTER: &str = "stream_ingest=info";

static INIT: OnceCell<()> = OnceCell::new();

/// Log output settings for binaries embedding the client.
///
/// Every `StreamIngestClient::send` runs inside a `stream_ingest.send` span
/// carrying `call_id`, `endpoint` and `prompt_len`; both outputs log the span
/// on close so each call gets one timing line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    /// `EnvFilter` directives.
    pub filter: String,
    /// When set, events are written as JSON lines to this file instead of stderr.
    pub json_log_path: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: DEFAULT_FILTER.to_string(),
            json_log_path: None,
        }
    }
}

impl ObservabilityConfig {
    /// Reads `STREAM_INGEST_LOG` (`off` disables logging, anything else is a
    /// filter, falling back to `RUST_LOG`) and `STREAM_INGEST_JSON_LOG_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        match lookup("STREAM_INGEST_LOG").map(|v| v.trim().to_string()) {
            Some(value) if value.eq_ignore_ascii_case("off") => config.enabled = false,
            Some(value) if !value.is_empty() => config.filter = value,
            _ => {
                if let Some(rust_log) = lookup("RUST_LOG").filter(|v| !v.trim().is_empty()) {
                    config.filter = rust_log;
                }
            }
        }
        config.json_log_path = lookup("STREAM_INGEST_JSON_LOG_PATH")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        config
    }
}

/// Installs the global subscriber from the environment, once per process.
pub fn init_observability() {
    init_with(ObservabilityConfig::from_env());
}

/// Installs the global subscriber from `config`. Later calls are no-ops.
pub fn init_with(config: ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let filter = tracing_subscriber::EnvFilter::try_new(&config.filter)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));

        match config.json_log_path.as_deref() {
            Some(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(&dir);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(tracing_appender::rolling::never(dir, file_name));
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
            None => {
                // stdout is left to the streamed text
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}

fn split_log_path(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stream-ingest.jsonl")
        .to_string();
    (dir, file_name)
}
