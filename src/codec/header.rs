//! Codec headers and checksum footers.
//!
//! Every codec stream starts with a header identifying the writer:
//!
//! ```text
//! [i32: CODEC_MAGIC][string: codec name][i32: version]
//! ```
//!
//! and, from [`VERSION_META_CHECKSUM`](crate::codec::postings::VERSION_META_CHECKSUM)
//! on, ends with a footer carrying the CRC32 of everything before it:
//!
//! ```text
//! [i32: FOOTER_MAGIC][i32: algorithm id = 0][i64: checksum]
//! ```

use std::io::{Read, Write};

use crate::error::{Result, TesseraError};
use crate::storage::IndexInput;
use crate::storage::structured::{ChecksumOutput, StructReader, StructWriter};

/// Magic number opening every codec header.
pub const CODEC_MAGIC: i32 = 0x3fd7_6c17;

/// Magic number opening every checksum footer.
pub const FOOTER_MAGIC: i32 = !CODEC_MAGIC;

/// Footer size in bytes.
pub const FOOTER_LENGTH: u64 = 16;

/// Length of a header written for `codec`.
pub fn header_length(codec: &str) -> u64 {
    9 + codec.len() as u64
}

/// Write a codec header.
pub fn write_header<W: Write>(out: &mut StructWriter<W>, codec: &str, version: i32) -> Result<()> {
    if !codec.is_ascii() || codec.len() >= 128 {
        return Err(TesseraError::invalid_argument(format!(
            "codec name must be simple ASCII shorter than 128 bytes: {codec:?}"
        )));
    }
    out.write_i32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_i32(version)
}

/// Read and validate a codec header, returning the stream's version.
///
/// A wrong magic or codec name is a [`TesseraError::FormatMismatch`]; a
/// version outside `min_version..=max_version` is a
/// [`TesseraError::VersionMismatch`].
pub fn check_header<R: Read>(
    input: &mut StructReader<R>,
    resource: &str,
    codec: &str,
    min_version: i32,
    max_version: i32,
) -> Result<i32> {
    let magic = input.read_i32()?;
    if magic != CODEC_MAGIC {
        return Err(TesseraError::format_mismatch(
            resource,
            format!("codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"),
        ));
    }
    check_header_no_magic(input, resource, codec, min_version, max_version)
}

/// Like [`check_header`] for callers that already consumed the magic.
pub fn check_header_no_magic<R: Read>(
    input: &mut StructReader<R>,
    resource: &str,
    codec: &str,
    min_version: i32,
    max_version: i32,
) -> Result<i32> {
    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(TesseraError::format_mismatch(
            resource,
            format!("codec mismatch: actual codec={actual_codec} vs expected codec={codec}"),
        ));
    }

    let actual = input.read_i32()?;
    if actual < min_version || actual > max_version {
        return Err(TesseraError::VersionMismatch {
            resource: resource.to_string(),
            actual,
            min: min_version,
            max: max_version,
        });
    }
    Ok(actual)
}

/// Write the checksum footer. Must be the last thing written to `out`.
pub fn write_footer<W: Write>(out: &mut StructWriter<ChecksumOutput<W>>) -> Result<()> {
    out.write_i32(FOOTER_MAGIC)?;
    out.write_i32(0)?;
    let checksum = out.get_ref().checksum();
    out.write_u64(checksum)
}

/// Validate the footer structure and return the stored checksum.
///
/// Leaves the input positioned at the end of the file.
pub fn retrieve_checksum(input: &mut IndexInput, resource: &str) -> Result<u64> {
    let length = input.length();
    if length < FOOTER_LENGTH {
        return Err(TesseraError::corrupt(
            resource,
            format!("misplaced codec footer (file truncated?): length={length}"),
        ));
    }
    input.seek(length - FOOTER_LENGTH)?;
    validate_footer(input, resource)
}

fn validate_footer<R: Read>(input: &mut StructReader<R>, resource: &str) -> Result<u64> {
    let magic = input.read_i32()?;
    if magic != FOOTER_MAGIC {
        return Err(TesseraError::corrupt(
            resource,
            format!("codec footer mismatch: actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"),
        ));
    }
    let algorithm_id = input.read_i32()?;
    if algorithm_id != 0 {
        return Err(TesseraError::corrupt(
            resource,
            format!("codec footer mismatch: unknown algorithmID: {algorithm_id}"),
        ));
    }
    let checksum = input.read_u64()?;
    if checksum >> 32 != 0 {
        return Err(TesseraError::corrupt(
            resource,
            format!("illegal CRC-32 checksum: {checksum}"),
        ));
    }
    Ok(checksum)
}

/// Read the whole file through a fresh cursor and verify its CRC32 footer.
pub fn checksum_entire_file(input: &IndexInput, resource: &str) -> Result<()> {
    let mut clone = input.try_clone()?;
    let length = clone.length();
    if length < FOOTER_LENGTH {
        return Err(TesseraError::corrupt(
            resource,
            format!("misplaced codec footer (file truncated?): length={length}"),
        ));
    }

    clone.seek(0)?;
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = length - 8;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let n = remaining.min(buf.len() as u64) as usize;
        clone.read_exact(&mut buf[..n])?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    let actual = u64::from(hasher.finalize());

    clone.seek(length - FOOTER_LENGTH)?;
    let expected = validate_footer(&mut clone, resource)?;
    if actual != expected {
        return Err(TesseraError::corrupt(
            resource,
            format!("checksum failed (hardware problem?) : expected={expected:#x} actual={actual:#x}"),
        ));
    }
    Ok(())
}
