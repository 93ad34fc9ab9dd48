//! Opaque column codecs used by the minimizer section.
//!
//! Two codecs are exposed, both treated as black boxes by the section code:
//!
//! - an **integer-column codec** packing a `u64` column into a compact byte
//!   stream (LEB128 varints: 7 value bits per byte, high bit set on
//!   continuation bytes);
//! - a **byte-stream codec** compressing an arbitrary byte column with zstd.

use zstd::stream::{copy_decode, copy_encode};

use crate::error::{Result, SectionError};

/// zstd level for byte columns; 0 selects the library default
const COMPRESSION_LEVEL: i32 = 0;

/// Encodes a `u64` column as a concatenation of LEB128 varints.
#[must_use]
pub fn encode_u64s(values: &[u64]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(values.len());
    for &value in values {
        encode_varint(value, &mut bytes);
    }
    bytes
}

/// Decodes `count` LEB128 varints from `bytes` back into a `u64` column.
///
/// The stream must hold exactly `count` varints; truncation, trailing bytes
/// and over-long varints are format errors.
pub fn decode_u64s(bytes: &[u8], count: usize) -> Result<Vec<u64>> {
    let mut values = Vec::with_capacity(count);
    let mut offset = 0;
    for _ in 0..count {
        let (value, consumed) = decode_varint(&bytes[offset..])?;
        values.push(value);
        offset += consumed;
    }
    if offset != bytes.len() {
        return Err(SectionError::Codec("trailing bytes after the last varint").into());
    }
    Ok(values)
}

#[inline]
fn encode_varint(mut value: u64, bytes: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            bytes.push(byte);
            return;
        }
        bytes.push(byte | 0x80);
    }
}

#[inline]
fn decode_varint(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= 64 {
            return Err(SectionError::Codec("varint longer than 10 bytes").into());
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(SectionError::Codec("truncated varint").into())
}

/// Compresses a byte column into a zstd frame.
pub fn compress_bytes(raw: &[u8]) -> Result<Vec<u8>> {
    let mut compressed = Vec::new();
    copy_encode(raw, &mut compressed, COMPRESSION_LEVEL)?;
    Ok(compressed)
}

/// Decompresses a zstd frame, validating the advertised byte count.
pub fn decompress_bytes(compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut raw = Vec::with_capacity(expected_len);
    copy_decode(compressed, &mut raw)?;
    if raw.len() != expected_len {
        return Err(SectionError::LengthMismatch {
            expected: expected_len,
            found: raw.len(),
        }
        .into());
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_single_byte() {
        assert_eq!(encode_u64s(&[0]), vec![0x00]);
        assert_eq!(encode_u64s(&[127]), vec![0x7F]);
    }

    #[test]
    fn test_varint_multi_byte() {
        assert_eq!(encode_u64s(&[128]), vec![0x80, 0x01]);
        assert_eq!(encode_u64s(&[300]), vec![0xAC, 0x02]);
    }

    #[test]
    fn test_u64s_roundtrip() {
        let values = [0, 1, 127, 128, 300, 16_383, 16_384, u64::MAX];
        let encoded = encode_u64s(&values);
        let decoded = decode_u64s(&encoded, values.len()).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_empty_column() {
        let encoded = encode_u64s(&[]);
        assert!(encoded.is_empty());
        assert_eq!(decode_u64s(&encoded, 0).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_truncated_varint() {
        // continuation bit set with nothing following
        let result = decode_u64s(&[0x80], 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_trailing_bytes() {
        let mut encoded = encode_u64s(&[5]);
        encoded.push(0x00);
        assert!(decode_u64s(&encoded, 1).is_err());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let raw: Vec<u8> = (0..=255).cycle().take(4096).collect();
        let compressed = compress_bytes(&raw).unwrap();
        assert!(compressed.len() < raw.len());
        assert_eq!(decompress_bytes(&compressed, raw.len()).unwrap(), raw);
    }

    #[test]
    fn test_bytes_empty() {
        let compressed = compress_bytes(&[]).unwrap();
        assert!(decompress_bytes(&compressed, 0).unwrap().is_empty());
    }

    #[test]
    fn test_bytes_length_mismatch() {
        let compressed = compress_bytes(b"hello").unwrap();
        assert!(decompress_bytes(&compressed, 4).is_err());
    }
}
