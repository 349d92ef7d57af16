//! Outbound request frame.
//!
//! A request frame is a 5-byte big-endian length prefix followed by a
//! protobuf-like message body. Only the transcript and the model name vary
//! between requests; everything else is a template whose field semantics are
//! unknown beyond the identifiers carried in [`SessionIdentifiers`].
//!
//! ```text
//! ┌──────────────┬─────┬──────────┬─────┬──────────┬────────────┬──────────────────┐
//! │ total (5B BE)│ 12  │ base len │ 0A  │ text len │ transcript │ template + model │
//! └──────────────┴─────┴──────────┴─────┴──────────┴────────────┴──────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::varint;

/// Width of the big-endian total length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 5;

/// Overhead the upstream expects on top of the transcript length in the
/// outer field length.
pub const BASE_LENGTH_OVERHEAD: usize = 0x2A;

const TAG_MESSAGE: u8 = 0x12;
const TAG_TEXT: u8 = 0x0A;
const TAG_SESSION_ID: u8 = 0x6A;
const TAG_WORKSPACE_PATH: u8 = 0x2A;
const TAG_MODEL_BLOCK: u8 = 0x3A;
const TAG_MODEL_NAME: u8 = 0x0A;
const TAG_CONVERSATION_ID: u8 = 0x4A;
const TAG_REQUEST_ID: u8 = 0x7A;

/// Declared length of the model block. The upstream accepts it regardless of
/// the model name actually carried.
const MODEL_BLOCK_LEN: u8 = 0x1E;

const FLAG_AFTER_TEXT: [u8; 2] = [0x10, 0x01];
const EMPTY_STRING_FIELD: [u8; 2] = [0x22, 0x00];
const ZERO_FLAGS: [u8; 4] = [0x68, 0x00, 0x70, 0x00];
const TRAILING_FLAGS: [u8; 15] = [
    0x80, 0x01, 0x01, 0xB0, 0x01, 0x00, 0xC0, 0x01, 0x00, 0xE0, 0x01, 0x00, 0xE8, 0x01, 0x00,
];

const DEFAULT_SESSION_ID: &str = "241ccd5f-91ba-4118-929a-96bc0161bd2a";
const DEFAULT_WORKSPACE_PATH: &str = "/d:/ideaPro/eduboss";
const DEFAULT_CONVERSATION_ID: &str = "a87a9a34-21dd-48c7-b44f-af6c3ece6f7e";
const DEFAULT_REQUEST_ID: &str = "69377e5a-8c2d-4854-b5d9-e0bb223ac00a";

/// Opaque identifiers embedded in every request frame.
///
/// The defaults are the values observed in captured traffic. Whether the
/// upstream requires them to be unique per conversation is unknown, so
/// callers can either keep the defaults, inject their own, or use
/// [`SessionIdentifiers::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionIdentifiers {
    pub session_id: String,
    pub workspace_path: String,
    pub conversation_id: String,
    pub request_id: String,
}

impl Default for SessionIdentifiers {
    fn default() -> Self {
        Self {
            session_id: DEFAULT_SESSION_ID.to_string(),
            workspace_path: DEFAULT_WORKSPACE_PATH.to_string(),
            conversation_id: DEFAULT_CONVERSATION_ID.to_string(),
            request_id: DEFAULT_REQUEST_ID.to_string(),
        }
    }
}

impl SessionIdentifiers {
    /// Fresh random UUIDs, keeping the default workspace path.
    pub fn generate() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            conversation_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }
}

/// Builds request frames for a fixed set of session identifiers.
#[derive(Debug, Clone, Default)]
pub struct FrameEncoder {
    identifiers: SessionIdentifiers,
}

impl FrameEncoder {
    pub fn new(identifiers: SessionIdentifiers) -> Self {
        Self { identifiers }
    }

    pub fn identifiers(&self) -> &SessionIdentifiers {
        &self.identifiers
    }

    /// Encode a flattened transcript and model name into a request frame.
    pub fn encode(&self, transcript: &str, model_name: &str) -> Result<Bytes> {
        let text = transcript.as_bytes();
        let base_length = text.len() + BASE_LENGTH_OVERHEAD;

        let mut body = BytesMut::with_capacity(text.len() + 256);
        body.put_u8(TAG_MESSAGE);
        varint::encode_field(&mut body, "base", base_length)?;
        body.put_u8(TAG_TEXT);
        varint::encode_field(&mut body, "transcript", text.len())?;
        body.put_slice(text);
        self.put_template(&mut body, model_name)?;

        // Every variable field is capped by the varint range, so the body
        // always fits the 5-byte prefix.
        let total = body.len();
        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + total);
        frame.put_uint(total as u64, LENGTH_PREFIX_SIZE);
        frame.put_slice(&body);

        debug!(
            transcript_bytes = text.len(),
            model = model_name,
            frame_bytes = frame.len(),
            "encoded request frame"
        );

        Ok(frame.freeze())
    }

    fn put_template(&self, dst: &mut BytesMut, model_name: &str) -> Result<()> {
        let ids = &self.identifiers;

        dst.put_slice(&FLAG_AFTER_TEXT);
        put_string_field(dst, TAG_SESSION_ID, "session_id", &ids.session_id)?;
        dst.put_slice(&EMPTY_STRING_FIELD);
        put_string_field(dst, TAG_WORKSPACE_PATH, "workspace_path", &ids.workspace_path)?;

        dst.put_u8(TAG_MODEL_BLOCK);
        dst.put_u8(MODEL_BLOCK_LEN);
        put_string_field(dst, TAG_MODEL_NAME, "model_name", model_name)?;
        dst.put_slice(&EMPTY_STRING_FIELD);
        put_string_field(dst, TAG_CONVERSATION_ID, "conversation_id", &ids.conversation_id)?;

        dst.put_slice(&ZERO_FLAGS);
        put_string_field(dst, TAG_REQUEST_ID, "request_id", &ids.request_id)?;
        dst.put_slice(&TRAILING_FLAGS);
        Ok(())
    }
}

fn put_string_field(
    dst: &mut BytesMut,
    tag: u8,
    field: &'static str,
    value: &str,
) -> Result<()> {
    dst.put_u8(tag);
    varint::encode_field(dst, field, value.len())?;
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Encode with the default session identifiers.
pub fn encode_request(transcript: &str, model_name: &str) -> Result<Bytes> {
    FrameEncoder::default().encode(transcript, model_name)
}

/// Read the big-endian total length from the front of a frame.
pub fn declared_length(frame: &[u8]) -> Option<usize> {
    let prefix = frame.get(..LENGTH_PREFIX_SIZE)?;
    Some(prefix.iter().fold(0usize, |acc, &b| (acc << 8) | b as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;

    /// Length contributed by the fixed template for the default identifiers,
    /// excluding the model name bytes.
    const DEFAULT_SUFFIX_OVERHEAD: usize = 163;

    fn expected_total(text_len: usize, model_len: usize) -> usize {
        let size0 = varint::encoded_len(text_len + BASE_LENGTH_OVERHEAD).unwrap();
        let size1 = varint::encoded_len(text_len).unwrap();
        2 + size0 + 1 + size1 + text_len + DEFAULT_SUFFIX_OVERHEAD + model_len
    }

    #[test]
    fn test_prefix_matches_length_formula() {
        let frame = encode_request("user:Hello", "gpt-4o").unwrap();
        assert_eq!(declared_length(&frame), Some(expected_total(10, 6)));
        assert_eq!(declared_length(&frame), Some(184));
        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + 184);
    }

    #[test]
    fn test_prefix_formula_with_two_byte_lengths() {
        let transcript = "x".repeat(200);
        let frame = encode_request(&transcript, "claude-3.5-sonnet").unwrap();
        assert_eq!(declared_length(&frame), Some(expected_total(200, 17)));
        assert_eq!(frame.len(), LENGTH_PREFIX_SIZE + expected_total(200, 17));
    }

    #[test]
    fn test_header_fields() {
        let frame = encode_request("user:Hello", "gpt-4o").unwrap();
        assert_eq!(&frame[..5], &[0x00, 0x00, 0x00, 0x00, 0xB8]);
        assert_eq!(frame[5], TAG_MESSAGE);
        assert_eq!(frame[6], 10 + 42);
        assert_eq!(frame[7], TAG_TEXT);
        assert_eq!(frame[8], 10);
        assert_eq!(&frame[9..19], b"user:Hello");
    }

    #[test]
    fn test_lengths_count_utf8_bytes() {
        // 4 characters, 12 bytes
        let frame = encode_request("你好世界", "gpt-4o").unwrap();
        assert_eq!(frame[8], 12);
        assert_eq!(frame[6], 12 + 42);
    }

    #[test]
    fn test_model_name_is_embedded() {
        let frame = encode_request("user:Hi", "gpt-4o-mini").unwrap();
        let needle = [&[TAG_MODEL_NAME, 11][..], b"gpt-4o-mini"].concat();
        assert!(frame.windows(needle.len()).any(|w| w == needle.as_slice()));
    }

    #[test]
    fn test_deterministic() {
        let a = encode_request("user:same", "gpt-4").unwrap();
        let b = encode_request("user:same", "gpt-4").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_injected_identifiers_change_body() {
        let ids = SessionIdentifiers::generate();
        let custom = FrameEncoder::new(ids.clone()).encode("user:Hi", "gpt-4").unwrap();
        let default = encode_request("user:Hi", "gpt-4").unwrap();
        assert_ne!(custom, default);
        assert!(custom
            .windows(ids.conversation_id.len())
            .any(|w| w == ids.conversation_id.as_bytes()));
    }

    #[test]
    fn test_transcript_too_long() {
        // base length crosses the varint limit before the transcript does
        let transcript = "a".repeat(varint::VARINT_LIMIT - BASE_LENGTH_OVERHEAD);
        let err = encode_request(&transcript, "gpt-4").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::EncodingRange { field: "base", .. }
        ));
    }

    #[test]
    fn test_longest_accepted_transcript() {
        let transcript = "a".repeat(varint::VARINT_LIMIT - BASE_LENGTH_OVERHEAD - 1);
        assert!(encode_request(&transcript, "gpt-4").is_ok());
    }

    #[test]
    fn test_declared_length_short_input() {
        assert_eq!(declared_length(&[0, 0, 1]), None);
    }
}
