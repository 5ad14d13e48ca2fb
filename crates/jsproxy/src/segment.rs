//! Splitting of large serialized payloads into ordered text fragments.
//!
//! Sizes are counted in characters, not bytes, so a fragment never ends in
//! the middle of a UTF-8 sequence.

use crate::error::ProxyError;
use serde_json::Value;

/// One outbound fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub is_final: bool,
    pub chunk: String,
}

/// Slices `payload` left to right into chunks of `chunk_size` characters.
///
/// Always yields at least one chunk; the last one is flagged final.
pub fn split_for_send(payload: &str, chunk_size: usize) -> Result<Vec<Segment>, ProxyError> {
    if chunk_size == 0 {
        return Err(ProxyError::InvalidSegmentSize);
    }
    let mut segments = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (pos, _) in payload.char_indices() {
        if count == chunk_size {
            segments.push(Segment {
                is_final: false,
                chunk: payload[start..pos].to_string(),
            });
            start = pos;
            count = 0;
        }
        count += 1;
    }
    segments.push(Segment {
        is_final: true,
        chunk: payload[start..].to_string(),
    });
    Ok(segments)
}

/// Concatenates fragments and parses the result as JSON.
pub fn reassemble<I, S>(chunks: I) -> Result<Value, ProxyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for chunk in chunks {
        text.push_str(chunk.as_ref());
    }
    Ok(serde_json::from_str(&text)?)
}

/// Accumulator for a single in-flight fragmented payload.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffer: String,
    fragments: usize,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        self.fragments += 1;
    }

    /// Appends the final fragment and parses the whole payload.
    ///
    /// The accumulator is empty afterwards, whether or not parsing succeeds.
    pub fn finish(&mut self, fragment: &str) -> Result<Value, ProxyError> {
        self.buffer.push_str(fragment);
        let text = std::mem::take(&mut self.buffer);
        self.fragments = 0;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn is_empty(&self) -> bool {
        self.fragments == 0
    }

    /// Number of non-final fragments accumulated so far.
    pub fn len(&self) -> usize {
        self.fragments
    }
}
