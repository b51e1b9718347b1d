use tracing::warn;

use crate::chunk::Chunk;

/// Parses one newline-delimited record.
///
/// Returns `None` for blank records. A record that is not a JSON chunk is
/// delivered as a `delta` carrying the trimmed text.
pub fn parse_record(raw: &str) -> Option<Chunk> {
    let record = raw.trim();
    if record.is_empty() {
        return None;
    }
    match serde_json::from_str::<Chunk>(record) {
        Ok(chunk) => Some(chunk),
        Err(err) => {
            warn!(error = %err, record, "record is not a JSON chunk, delivering as text");
            Some(Chunk::delta(record))
        }
    }
}
