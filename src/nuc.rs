//! Nucleotide packing and unpacking.
//!
//! KERO files choose a per-file permutation of `{0, 1, 2, 3}` as the 2-bit
//! codes for `A`, `C`, `G`, `T` (the encoding table carried in the header).
//! This module converts between ASCII sequences and the left-padded packed
//! form used everywhere on the wire.

use crate::bitpack::bit_bytes;
use crate::error::{Result, SectionError};

/// Encodes an ASCII nucleotide sequence into the 2-bit packed wire form.
///
/// The output occupies `ceil(len / 4)` bytes with the pad bits in the high
/// bits of byte 0. Lowercase symbols are accepted; anything outside
/// `ACGTacgt` is an error.
///
/// # Example
///
/// ```
/// // A=0, C=1, G=3, T=2
/// let packed = kero::nuc::encode(b"ACG", &[0, 1, 3, 2]).unwrap();
/// assert_eq!(packed, vec![0b00_00_01_11]);
/// ```
pub fn encode(seq: &[u8], encoding: &[u8; 4]) -> Result<Vec<u8>> {
    let nb_bytes = bit_bytes(2, seq.len() as u64);
    let mut packed = vec![0u8; nb_bytes];
    let pad = (4 - seq.len() % 4) % 4;
    for (i, &symbol) in seq.iter().enumerate() {
        let code = match symbol {
            b'A' | b'a' => encoding[0],
            b'C' | b'c' => encoding[1],
            b'G' | b'g' => encoding[2],
            b'T' | b't' => encoding[3],
            _ => return Err(SectionError::InvalidNucleotide(symbol).into()),
        };
        let nucl = pad + i;
        packed[nucl / 4] |= code << (2 * (3 - nucl % 4));
    }
    Ok(packed)
}

/// Decodes `len` nucleotides from a 2-bit packed, left-padded byte array
/// back into ASCII using the file's encoding table.
pub fn decode(packed: &[u8], len: usize, encoding: &[u8; 4]) -> Vec<u8> {
    let mut table = [b'A'; 4];
    table[encoding[0] as usize & 0b11] = b'A';
    table[encoding[1] as usize & 0b11] = b'C';
    table[encoding[2] as usize & 0b11] = b'G';
    table[encoding[3] as usize & 0b11] = b'T';

    let pad = (4 - len % 4) % 4;
    let mut seq = Vec::with_capacity(len);
    for i in 0..len {
        let nucl = pad + i;
        let code = (packed[nucl / 4] >> (2 * (3 - nucl % 4))) & 0b11;
        seq.push(table[code as usize]);
    }
    seq
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENCODING: [u8; 4] = [0, 1, 3, 2];

    #[test]
    fn test_encode_left_pad() {
        // 3 nucleotides -> one byte with the top two bits zeroed
        let packed = encode(b"ACG", &ENCODING).unwrap();
        assert_eq!(packed, vec![0b00_00_01_11]);
    }

    #[test]
    fn test_encode_full_byte() {
        let packed = encode(b"ACGT", &ENCODING).unwrap();
        assert_eq!(packed, vec![0b00_01_11_10]);
    }

    #[test]
    fn test_roundtrip() {
        let seq = b"TTACGGATCCGTAGCAT";
        let packed = encode(seq, &ENCODING).unwrap();
        assert_eq!(packed.len(), 5);
        assert_eq!(decode(&packed, seq.len(), &ENCODING), seq);
    }

    #[test]
    fn test_lowercase_accepted() {
        let upper = encode(b"ACGT", &ENCODING).unwrap();
        let lower = encode(b"acgt", &ENCODING).unwrap();
        assert_eq!(upper, lower);
    }

    #[test]
    fn test_invalid_symbol() {
        let result = encode(b"ACGN", &ENCODING);
        assert!(result.is_err());
    }

    #[test]
    fn test_alternate_encoding() {
        let packed = encode(b"ACGT", &[3, 2, 1, 0]).unwrap();
        assert_eq!(packed, vec![0b11_10_01_00]);
        assert_eq!(decode(&packed, 4, &[3, 2, 1, 0]), b"ACGT");
    }
}
