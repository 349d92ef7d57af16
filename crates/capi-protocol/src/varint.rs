//! Two-byte variable-length integers.
//!
//! The upstream embeds field lengths with a truncated varint: values below
//! 128 take one byte, values below 16384 take two. The second byte never
//! carries a continuation bit, so anything larger cannot be represented.
//!
//! ```text
//! n < 128          [ n ]
//! n < 16384        [ (n & 0x7F) | 0x80 ][ (n >> 7) & 0xFF ]
//! ```

use bytes::BufMut;

use crate::error::{ProtocolError, Result};

/// Largest value (exclusive) a two-byte varint can carry.
pub const VARINT_LIMIT: usize = 1 << 14;

const CONTINUATION: u8 = 0x80;

/// Number of bytes `value` occupies once encoded.
pub fn encoded_len(value: usize) -> Result<usize> {
    match value {
        0..=0x7F => Ok(1),
        v if v < VARINT_LIMIT => Ok(2),
        v => Err(out_of_range("varint", v)),
    }
}

/// Encode `value` into a fresh buffer.
pub fn encode(value: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(2);
    encode_field(&mut out, "varint", value)?;
    Ok(out)
}

/// Append `value` to `dst`, naming `field` in the error when it does not fit.
pub fn encode_field<B: BufMut>(dst: &mut B, field: &'static str, value: usize) -> Result<()> {
    if value >= VARINT_LIMIT {
        return Err(out_of_range(field, value));
    }
    if value < 0x80 {
        dst.put_u8(value as u8);
    } else {
        dst.put_u8((value & 0x7F) as u8 | CONTINUATION);
        dst.put_u8(((value >> 7) & 0xFF) as u8);
    }
    Ok(())
}

/// Decode a varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `None` if `src`
/// is empty or ends in the middle of a two-byte value.
pub fn decode(src: &[u8]) -> Option<(usize, usize)> {
    let first = *src.first()?;
    if first & CONTINUATION == 0 {
        return Some((first as usize, 1));
    }
    let second = *src.get(1)?;
    let value = (first & 0x7F) as usize | ((second as usize) << 7);
    Some((value, 2))
}

fn out_of_range(field: &'static str, value: usize) -> ProtocolError {
    ProtocolError::EncodingRange {
        field,
        value,
        max: VARINT_LIMIT - 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_values() {
        assert_eq!(encode(0).unwrap(), vec![0x00]);
        assert_eq!(encode(10).unwrap(), vec![0x0A]);
        assert_eq!(encode(127).unwrap(), vec![0x7F]);
        assert_eq!(encoded_len(127).unwrap(), 1);
    }

    #[test]
    fn test_two_byte_values() {
        assert_eq!(encode(128).unwrap(), vec![0x80, 0x01]);
        assert_eq!(encode(300).unwrap(), vec![0xAC, 0x02]);
        assert_eq!(encode(16383).unwrap(), vec![0xFF, 0x7F]);
        assert_eq!(encoded_len(16383).unwrap(), 2);
    }

    #[test]
    fn test_two_byte_reconstruction() {
        for n in [128usize, 129, 255, 1000, 4096, 9999, 16383] {
            let bytes = encode(n).unwrap();
            assert_eq!(bytes.len(), 2);
            assert_ne!(bytes[0] & 0x80, 0, "low byte must carry continuation bit");
            assert_eq!(bytes[1] & 0x80, 0, "high byte must not carry continuation bit");
            let rebuilt = (bytes[0] & 0x7F) as usize | ((bytes[1] as usize) << 7);
            assert_eq!(rebuilt, n);
            assert_eq!(decode(&bytes), Some((n, 2)));
        }
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let err = encode(16384).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::EncodingRange {
                field: "varint",
                value: 16384,
                max: 16383,
            }
        );
        assert!(encoded_len(usize::MAX).is_err());
    }

    #[test]
    fn test_failed_encode_writes_nothing() {
        let mut buf = Vec::new();
        assert!(encode_field(&mut buf, "text", 20_000).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode(&[]), None);
        assert_eq!(decode(&[0x80]), None);
        assert_eq!(decode(&[0x05, 0xFF]), Some((5, 1)));
    }
}
