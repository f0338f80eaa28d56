//! Frame-of-reference encoding of fixed-size integer blocks.
//!
//! A block of [`BLOCK_SIZE`] values is written as one token byte followed by
//! its payload:
//!
//! - `0` means every value in the block is equal; the value follows as a vInt.
//! - `1..=32` is the bit width `b`; `b * BLOCK_SIZE / 8` bytes of values packed
//!   most-significant-bit first follow.
//!
//! Streams carry a setup table at the start recording, for each bit width,
//! the packed format used. Only the plain packed format (id 0) is produced
//! and accepted.

use std::io::{Read, Seek, Write};

use crate::codec::BLOCK_SIZE;
use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};

/// Largest encoded block payload, reached at 32 bits per value.
pub const MAX_ENCODED_SIZE: usize = BLOCK_SIZE * 4;

const ALL_VALUES_EQUAL: u8 = 0;
const PACKED_FORMAT_ID: u32 = 0;
const MAX_BITS_PER_VALUE: u32 = 32;

/// Block encoder/decoder shared by the postings writer and reader.
#[derive(Debug, Clone)]
pub struct ForUtil {
    encoded_sizes: [usize; MAX_BITS_PER_VALUE as usize + 1],
}

impl Default for ForUtil {
    fn default() -> Self {
        Self::new()
    }
}

impl ForUtil {
    pub fn new() -> Self {
        let mut encoded_sizes = [0usize; MAX_BITS_PER_VALUE as usize + 1];
        for (bits, size) in encoded_sizes.iter_mut().enumerate() {
            *size = encoded_size(bits as u32);
        }
        ForUtil { encoded_sizes }
    }

    /// Write the per-bit-width format table.
    pub fn write_setup<W: Write>(&self, out: &mut StructWriter<W>) -> Result<()> {
        for bits in 1..=MAX_BITS_PER_VALUE {
            out.write_vint((PACKED_FORMAT_ID << 5) | (bits - 1))?;
        }
        Ok(())
    }

    /// Read and validate the per-bit-width format table.
    pub fn read_setup<R: Read>(input: &mut StructReader<R>, resource: &str) -> Result<Self> {
        for bits in 1..=MAX_BITS_PER_VALUE {
            let code = input.read_vint()?;
            let format_id = code >> 5;
            let bits_per_value = (code & 31) + 1;
            if format_id != PACKED_FORMAT_ID {
                return Err(TesseraError::format_mismatch(
                    resource,
                    format!("unsupported packed format id {format_id} for {bits} bits per value"),
                ));
            }
            if bits_per_value != bits {
                return Err(TesseraError::corrupt(
                    resource,
                    format!("packed setup lists {bits_per_value} bits per value at entry {bits}"),
                ));
            }
        }
        Ok(Self::new())
    }

    /// Encode one block of exactly [`BLOCK_SIZE`] values.
    ///
    /// `encoded` is scratch space of at least [`MAX_ENCODED_SIZE`] bytes.
    pub fn write_block<W: Write>(
        &self,
        data: &[u32],
        encoded: &mut [u8],
        out: &mut StructWriter<W>,
    ) -> Result<()> {
        let data = &data[..BLOCK_SIZE];
        if is_all_equal(data) {
            out.write_u8(ALL_VALUES_EQUAL)?;
            return out.write_vint(data[0]);
        }

        let bits = bits_required(data);
        let size = self.encoded_sizes[bits as usize];
        pack(data, bits, &mut encoded[..size]);
        out.write_u8(bits as u8)?;
        out.write_bytes(&encoded[..size])
    }

    /// Decode one block into the first [`BLOCK_SIZE`] slots of `decoded`.
    pub fn read_block<R: Read>(
        &self,
        input: &mut StructReader<R>,
        encoded: &mut [u8],
        decoded: &mut [u32],
    ) -> Result<()> {
        let bits = u32::from(input.read_u8()?);
        if bits == u32::from(ALL_VALUES_EQUAL) {
            let value = input.read_vint()?;
            decoded[..BLOCK_SIZE].fill(value);
            return Ok(());
        }
        if bits > MAX_BITS_PER_VALUE {
            return Err(TesseraError::corrupt(
                "packed block",
                format!("bits per value out of range: {bits}"),
            ));
        }

        let size = self.encoded_sizes[bits as usize];
        input.read_exact(&mut encoded[..size])?;
        unpack(&encoded[..size], bits, &mut decoded[..BLOCK_SIZE]);
        Ok(())
    }

    /// Advance past one block without decoding it.
    pub fn skip_block<R: Read + Seek>(&self, input: &mut StructReader<R>) -> Result<()> {
        let bits = u32::from(input.read_u8()?);
        if bits == u32::from(ALL_VALUES_EQUAL) {
            input.read_vint()?;
            return Ok(());
        }
        if bits > MAX_BITS_PER_VALUE {
            return Err(TesseraError::corrupt(
                "packed block",
                format!("bits per value out of range: {bits}"),
            ));
        }
        input.skip_bytes(self.encoded_sizes[bits as usize] as u64)
    }
}

fn encoded_size(bits: u32) -> usize {
    (bits as usize * BLOCK_SIZE).div_ceil(8)
}

fn is_all_equal(data: &[u32]) -> bool {
    data.iter().all(|&v| v == data[0])
}

/// Smallest bit width that can hold every value; at least 1.
pub fn bits_required(data: &[u32]) -> u32 {
    let or = data.iter().fold(0u32, |acc, &v| acc | v);
    (u32::BITS - or.leading_zeros()).max(1)
}

fn pack(values: &[u32], bits: u32, out: &mut [u8]) {
    let mut acc: u64 = 0;
    let mut acc_bits = 0u32;
    let mut idx = 0;
    for &value in values {
        acc = (acc << bits) | u64::from(value);
        acc_bits += bits;
        while acc_bits >= 8 {
            acc_bits -= 8;
            out[idx] = (acc >> acc_bits) as u8;
            idx += 1;
        }
        acc &= (1u64 << acc_bits) - 1;
    }
    if acc_bits > 0 {
        out[idx] = (acc << (8 - acc_bits)) as u8;
    }
}

fn unpack(encoded: &[u8], bits: u32, values: &mut [u32]) {
    let mask = (1u64 << bits) - 1;
    let mut acc: u64 = 0;
    let mut acc_bits = 0u32;
    let mut idx = 0;
    for value in values.iter_mut() {
        while acc_bits < bits {
            acc = (acc << 8) | u64::from(encoded[idx]);
            idx += 1;
            acc_bits += 8;
        }
        acc_bits -= bits;
        *value = ((acc >> acc_bits) & mask) as u32;
        acc &= (1u64 << acc_bits) - 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::Cursor;

    fn roundtrip(data: &[u32]) -> (Vec<u8>, Vec<u32>) {
        let for_util = ForUtil::new();
        let mut encoded = vec![0u8; MAX_ENCODED_SIZE];
        let mut out = StructWriter::new(Vec::new());
        for_util.write_block(data, &mut encoded, &mut out).unwrap();
        let bytes = out.into_inner();

        let mut input = StructReader::new(Cursor::new(bytes.clone()));
        let mut decoded = vec![0u32; BLOCK_SIZE];
        for_util
            .read_block(&mut input, &mut encoded, &mut decoded)
            .unwrap();
        (bytes, decoded)
    }

    #[test]
    fn test_random_blocks_every_width() {
        let mut rng = rand::rng();
        for bits in 1..=32u32 {
            let max = if bits == 32 { u32::MAX } else { (1u32 << bits) - 1 };
            let mut data: Vec<u32> = (0..BLOCK_SIZE).map(|_| rng.random_range(0..=max)).collect();
            // Force the top bit so the block really needs `bits`.
            data[0] = max;
            data[1] = 0;
            let (bytes, decoded) = roundtrip(&data);
            assert_eq!(decoded, data, "bits={bits}");
            assert_eq!(bytes[0] as u32, bits);
            assert_eq!(bytes.len(), 1 + encoded_size(bits));
        }
    }

    #[test]
    fn test_all_equal_block() {
        let data = vec![7u32; BLOCK_SIZE];
        let (bytes, decoded) = roundtrip(&data);
        assert_eq!(bytes, vec![0, 7]);
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_msb_first_layout() {
        let mut data = vec![0u32; BLOCK_SIZE];
        data[0] = 1;
        let (bytes, _) = roundtrip(&data);
        // One bit per value, first value in the highest bit of the first byte.
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 0x80);
        assert!(bytes[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_skip_block() {
        let for_util = ForUtil::new();
        let mut encoded = vec![0u8; MAX_ENCODED_SIZE];
        let mut out = StructWriter::new(Vec::new());
        let first: Vec<u32> = (0..BLOCK_SIZE as u32).collect();
        let second = vec![3u32; BLOCK_SIZE];
        let third: Vec<u32> = (0..BLOCK_SIZE as u32).map(|v| v * 1000).collect();
        for block in [&first, &second, &third] {
            for_util.write_block(block, &mut encoded, &mut out).unwrap();
        }

        let mut input = StructReader::new(Cursor::new(out.into_inner()));
        for_util.skip_block(&mut input).unwrap();
        for_util.skip_block(&mut input).unwrap();
        let mut decoded = vec![0u32; BLOCK_SIZE];
        for_util
            .read_block(&mut input, &mut encoded, &mut decoded)
            .unwrap();
        assert_eq!(decoded, third);
    }

    #[test]
    fn test_setup_validation() {
        let for_util = ForUtil::new();
        let mut out = StructWriter::new(Vec::new());
        for_util.write_setup(&mut out).unwrap();
        let bytes = out.into_inner();
        assert_eq!(bytes.len(), 32);

        let mut input = StructReader::new(Cursor::new(bytes.clone()));
        ForUtil::read_setup(&mut input, "test").unwrap();

        let mut bad_format = bytes.clone();
        bad_format[3] |= 1 << 5;
        let mut input = StructReader::new(Cursor::new(bad_format));
        let err = ForUtil::read_setup(&mut input, "test").unwrap_err();
        assert!(matches!(err, TesseraError::FormatMismatch { .. }));

        let mut bad_bits = bytes;
        bad_bits[5] = 0;
        let mut input = StructReader::new(Cursor::new(bad_bits));
        let err = ForUtil::read_setup(&mut input, "test").unwrap_err();
        assert!(matches!(err, TesseraError::Corrupt { .. }));
    }

    #[test]
    fn test_bits_required() {
        assert_eq!(bits_required(&[0, 0]), 1);
        assert_eq!(bits_required(&[1, 2]), 2);
        assert_eq!(bits_required(&[255]), 8);
        assert_eq!(bits_required(&[u32::MAX]), 32);
    }
}
