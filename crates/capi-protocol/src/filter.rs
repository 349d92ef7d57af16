//! Recovery of visible text from raw upstream chunks.
//!
//! The upstream interleaves answer text with length prefixes, keep-alive
//! frames and padding at byte granularity. There is no known grammar for
//! the response stream, so the filter works from byte patterns observed in
//! captured traffic:
//!
//! | pattern | meaning |
//! |---|---|
//! | first byte `0x01` / `0x02` | control frame |
//! | first bytes `0x60 0x0C` | ping frame |
//! | bytes up to the first `0x0A` | frame header |
//! | `00 00 00 00` then bytes `<= 0x0F` | padding with an embedded sub-length |
//! | `0x0C` then a run of `0x0A` | frame boundary with line markers |
//!
//! The rules are applied in this order by a small state machine; later
//! states assume earlier ones already consumed what they match.

use tracing::trace;

const CONTROL_MARKERS: [u8; 2] = [0x01, 0x02];
const PING_MARKER: [u8; 2] = [0x60, 0x0C];
const FIELD_SEPARATOR: u8 = 0x0A;
const FRAME_BOUNDARY: u8 = 0x0C;
const PADDING: [u8; 4] = [0x00; 4];
const MAX_SUB_LENGTH_BYTE: u8 = 0x0F;
const LINE_MARKER: u8 = 0x0A;

/// Scanner position within a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Dropping the frame header up to and including the field separator.
    AwaitingSeparator,
    /// Copying content bytes and watching for structural markers.
    Scanning,
    /// Inside a padding block, dropping sub-length bytes.
    SkippingPadding,
    /// After a frame boundary, dropping inserted line markers.
    SkippingLineMarkers,
}

/// Turns one raw chunk into the text it carries.
///
/// Chunks are filtered independently; the filter keeps no state between
/// calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkFilter;

impl ChunkFilter {
    pub fn new() -> Self {
        Self
    }

    /// Filter a chunk. Never fails; unrecognised bytes either pass through
    /// or are dropped, and an empty string means "no visible content".
    pub fn filter(&self, chunk: &[u8]) -> String {
        if chunk.len() < 2 || is_control_frame(chunk) {
            return String::new();
        }

        let content = self.scan(chunk);
        // invalid sequences are dropped rather than replaced
        let decoded: String = content.utf8_chunks().map(|c| c.valid()).collect();
        let text = decoded.trim().to_string();
        trace!(chunk_bytes = chunk.len(), text_len = text.len(), "filtered chunk");
        text
    }

    fn scan(&self, chunk: &[u8]) -> Vec<u8> {
        // Without a separator the whole chunk is treated as content.
        let mut state = if chunk.contains(&FIELD_SEPARATOR) {
            FilterState::AwaitingSeparator
        } else {
            FilterState::Scanning
        };

        let mut out = Vec::with_capacity(chunk.len());
        let mut i = 0;
        while i < chunk.len() {
            let byte = chunk[i];
            state = match state {
                FilterState::AwaitingSeparator => {
                    i += 1;
                    if byte == FIELD_SEPARATOR {
                        FilterState::Scanning
                    } else {
                        FilterState::AwaitingSeparator
                    }
                }
                FilterState::Scanning => {
                    if chunk[i..].starts_with(&PADDING) {
                        i += PADDING.len();
                        FilterState::SkippingPadding
                    } else if byte == FRAME_BOUNDARY {
                        i += 1;
                        FilterState::SkippingLineMarkers
                    } else {
                        out.push(byte);
                        i += 1;
                        FilterState::Scanning
                    }
                }
                FilterState::SkippingPadding => {
                    if byte <= MAX_SUB_LENGTH_BYTE {
                        i += 1;
                        FilterState::SkippingPadding
                    } else {
                        FilterState::Scanning
                    }
                }
                FilterState::SkippingLineMarkers => {
                    if byte == LINE_MARKER {
                        i += 1;
                        FilterState::SkippingLineMarkers
                    } else {
                        FilterState::Scanning
                    }
                }
            };
        }

        // Stray structural bytes that survived the scan.
        out.retain(|&b| b != 0x00 && b != FRAME_BOUNDARY);
        out
    }
}

/// Whether the chunk is protocol signalling with no visible content.
pub fn is_control_frame(chunk: &[u8]) -> bool {
    match chunk {
        [first, ..] if CONTROL_MARKERS.contains(first) => true,
        _ => chunk.starts_with(&PING_MARKER),
    }
}

/// Filter a single chunk with a default [`ChunkFilter`].
pub fn filter_chunk(chunk: &[u8]) -> String {
    ChunkFilter::new().filter(chunk)
}
