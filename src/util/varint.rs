//! Variable-length integer encoding utilities.
//!
//! Values are written seven bits at a time, least significant group first,
//! with the high bit of each byte set when more bytes follow. This is the
//! vInt/vLong encoding used throughout the postings and term-dictionary
//! formats.

use std::io::{Read, Write};

use crate::error::{Result, TesseraError};

/// Maximum encoded length of a 32-bit value.
pub const MAX_VINT_BYTES: usize = 5;

/// Maximum encoded length of a 64-bit value.
pub const MAX_VLONG_BYTES: usize = 10;

/// Write a u64 value using variable-length encoding.
pub fn write_u64<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<()> {
    let mut buf = [0u8; MAX_VLONG_BYTES];
    let len = encode_u64_into(value, &mut buf);
    writer.write_all(&buf[..len])?;
    Ok(())
}

/// Write a u32 value using variable-length encoding.
pub fn write_u32<W: Write + ?Sized>(writer: &mut W, value: u32) -> Result<()> {
    write_u64(writer, u64::from(value))
}

/// Read a variable-length u64 from a byte stream.
pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut byte = [0u8; 1];

    for _ in 0..MAX_VLONG_BYTES {
        reader.read_exact(&mut byte)?;
        let b = byte[0];

        result |= u64::from(b & 0x7F) << shift;

        if (b & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }

    Err(TesseraError::corrupt("varint", "VarInt overflow"))
}

/// Read a variable-length u32 from a byte stream.
pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    let mut result = 0u32;
    let mut shift = 0;
    let mut byte = [0u8; 1];

    for i in 0..MAX_VINT_BYTES {
        reader.read_exact(&mut byte)?;
        let b = byte[0];

        // The fifth byte may only contribute the top four bits.
        if i == MAX_VINT_BYTES - 1 && (b & 0xF0) != 0 {
            return Err(TesseraError::corrupt("varint", "VarInt overflow"));
        }

        result |= u32::from(b & 0x7F) << shift;

        if (b & 0x80) == 0 {
            return Ok(result);
        }

        shift += 7;
    }

    Err(TesseraError::corrupt("varint", "VarInt overflow"))
}

/// Encode `value` into `buf`, returning the number of bytes used.
fn encode_u64_into(value: u64, buf: &mut [u8; MAX_VLONG_BYTES]) -> usize {
    let mut val = value;
    let mut len = 0;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // Set continuation bit
        }

        buf[len] = byte;
        len += 1;

        if val == 0 {
            break;
        }
    }

    len
}

/// Number of bytes needed to encode `value`.
pub fn encoded_len(value: u64) -> usize {
    let mut buf = [0u8; MAX_VLONG_BYTES];
    encode_u64_into(value, &mut buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_u64() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for &value in &test_values {
            let mut encoded = Vec::new();
            write_u64(&mut encoded, value).unwrap();
            let mut cursor = Cursor::new(&encoded);
            let decoded = read_u64(&mut cursor).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len() as u64, cursor.position());
            assert_eq!(encoded.len(), encoded_len(value));
        }
    }

    #[test]
    fn test_vint_layout() {
        let mut encoded = Vec::new();
        write_u32(&mut encoded, 300).unwrap();
        // 300 = 0b10_0101100 -> low group with continuation, then 2
        assert_eq!(encoded, vec![0xAC, 0x02]);

        let mut encoded = Vec::new();
        write_u32(&mut encoded, u32::MAX).unwrap();
        assert_eq!(encoded.len(), MAX_VINT_BYTES);
        assert_eq!(read_u32(&mut Cursor::new(&encoded)).unwrap(), u32::MAX);
    }

    #[test]
    fn test_incomplete_varint() {
        // Continuation bit set but no more data
        let incomplete = vec![0x80];
        assert!(read_u64(&mut Cursor::new(&incomplete)).is_err());
    }

    #[test]
    fn test_overflow() {
        let overflow_data = vec![0xFF; 20];
        assert!(read_u64(&mut Cursor::new(&overflow_data)).is_err());

        // A sixth vInt byte would be needed
        let too_wide = vec![0xFF, 0xFF, 0xFF, 0xFF, 0x1F];
        assert!(read_u32(&mut Cursor::new(&too_wide)).is_err());
    }
}
