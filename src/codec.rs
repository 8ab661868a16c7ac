//! 7-bit data codec
//!
//! Sysex payloads may only carry bytes in 0x00-0x7F. Korg devices pack 8-bit
//! host data in blocks of up to 7 bytes: a leading byte collects bit 7 of each
//! data byte (bit `i` for data byte `i`), followed by the low 7 bits of each
//! data byte. A full block of 7 bytes therefore becomes 8 wire bytes and a
//! trailing partial block of `k` bytes becomes `k + 1`.

use crate::error::CodecError;

/// Host bytes per packed block
pub const BLOCK_DATA: usize = 7;

/// Wire bytes per full packed block
pub const BLOCK_WIRE: usize = BLOCK_DATA + 1;

/// Width of fixed-size name fields
pub const NAME_WIDTH: usize = 20;

/// Number of wire bytes needed to carry `len` host bytes
pub fn packed_len(len: usize) -> usize {
    len + len.div_ceil(BLOCK_DATA)
}

/// Largest number of host bytes that fit into `wire_len` packed bytes
pub fn max_unpacked_len(wire_len: usize) -> usize {
    let full = wire_len / BLOCK_WIRE;
    let rest = wire_len % BLOCK_WIRE;
    full * BLOCK_DATA + rest.saturating_sub(1)
}

/// Convert host 8-bit data into the 7-bit wire representation
pub fn pack7(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packed_len(data.len()));

    for block in data.chunks(BLOCK_DATA) {
        let msbs = block
            .iter()
            .enumerate()
            .fold(0u8, |acc, (i, b)| acc | ((b >> 7) << i));
        out.push(msbs);
        out.extend(block.iter().map(|b| b & 0x7F));
    }

    out
}

/// Convert 7-bit wire data back into host 8-bit data.
///
/// Exact inverse of [`pack7`].
pub fn unpack7(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if let Some(offset) = data.iter().position(|&b| b > 0x7F) {
        return Err(CodecError::HighBitSet {
            offset,
            value: data[offset],
        });
    }

    let mut out = Vec::with_capacity(max_unpacked_len(data.len()));

    for (n, block) in data.chunks(BLOCK_WIRE).enumerate() {
        let (msbs, rest) = match block.split_first() {
            Some((msbs, rest)) if !rest.is_empty() => (*msbs, rest),
            _ => {
                return Err(CodecError::DanglingBlock {
                    offset: n * BLOCK_WIRE,
                })
            }
        };

        out.extend(
            rest.iter()
                .enumerate()
                .map(|(i, b)| b | (((msbs >> i) & 0x01) << 7)),
        );
    }

    Ok(out)
}

/// Read a big-endian u32 at `offset` of already unpacked data
pub fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Split a 14-bit value into LSB/MSB 7-bit bytes
pub fn split14(value: u16) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Join LSB/MSB 7-bit bytes into a 14-bit value
pub fn join14(lsb: u8, msb: u8) -> u16 {
    ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F)
}

/// Encode a name into a fixed-width, NUL-padded ASCII field
pub fn encode_name(name: &str) -> [u8; NAME_WIDTH] {
    let mut field = [0u8; NAME_WIDTH];
    for (slot, c) in field.iter_mut().zip(name.chars().filter(char::is_ascii)) {
        *slot = c as u8;
    }
    field
}

/// Decode a fixed-width name field, trimming NUL and space padding
pub fn decode_name(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0 && b != b' ')
        .map(|i| i + 1)
        .unwrap_or(0);

    field[..end]
        .iter()
        .map(|&b| if b.is_ascii() && b != 0 { b as char } else { '?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_pack_simple_block() {
        let host = [0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        let wire = [0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(pack7(&host), wire);
        assert_eq!(unpack7(&wire).unwrap(), host);
    }

    #[test]
    fn test_pack_all_bits_set() {
        let host = [0xFF; 7];
        let wire = [0x7F; 8];
        assert_eq!(pack7(&host), wire);
        assert_eq!(unpack7(&wire).unwrap(), host);
    }

    #[test]
    fn test_pack_partial_block() {
        let host = [0xFF; 4];
        let wire = [0x0F, 0x7F, 0x7F, 0x7F, 0x7F];
        assert_eq!(pack7(&host), wire);
        assert_eq!(unpack7(&wire).unwrap(), host);
    }

    #[test]
    fn test_pack_empty() {
        assert!(pack7(&[]).is_empty());
        assert!(unpack7(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unpack_rejects_high_bit() {
        let err = unpack7(&[0x00, 0x01, 0x80]).unwrap_err();
        assert_eq!(err, CodecError::HighBitSet { offset: 2, value: 0x80 });
    }

    #[test]
    fn test_unpack_rejects_dangling_block() {
        let mut wire = pack7(&[1, 2, 3, 4, 5, 6, 7]);
        wire.push(0x00);
        assert_eq!(unpack7(&wire).unwrap_err(), CodecError::DanglingBlock { offset: 8 });
    }

    #[test]
    fn test_lengths() {
        assert_eq!(packed_len(0), 0);
        assert_eq!(packed_len(1), 2);
        assert_eq!(packed_len(7), 8);
        assert_eq!(packed_len(8), 10);
        assert_eq!(packed_len(3573), 4084);
        assert_eq!(max_unpacked_len(4084), 3573);
        assert_eq!(max_unpacked_len(1), 0);
    }

    #[test]
    fn test_name_field() {
        let field = encode_name("waves");
        assert_eq!(&field[..5], b"waves");
        assert!(field[5..].iter().all(|&b| b == 0));
        assert_eq!(decode_name(&field), "waves");
        assert_eq!(decode_name(b"dly   \0\0"), "dly");
        assert_eq!(decode_name(&[0u8; NAME_WIDTH]), "");
    }

    #[test]
    fn test_name_truncates() {
        let long = "a".repeat(NAME_WIDTH + 5);
        assert_eq!(decode_name(&encode_name(&long)).len(), NAME_WIDTH);
    }

    #[test]
    fn test_14bit_split() {
        assert_eq!(split14(200), [0x48, 0x01]);
        assert_eq!(join14(0x48, 0x01), 200);
    }

    proptest! {
        #[test]
        fn prop_pack_round_trip(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let wire = pack7(&data);
            prop_assert_eq!(wire.len(), packed_len(data.len()));
            prop_assert!(wire.iter().all(|&b| b <= 0x7F));
            prop_assert_eq!(unpack7(&wire).unwrap(), data);
        }

        #[test]
        fn prop_max_unpacked_is_tight(wire_len in 0usize..5000) {
            let n = max_unpacked_len(wire_len);
            prop_assert!(packed_len(n) <= wire_len);
            prop_assert!(packed_len(n + 1) > wire_len);
        }
    }
}
