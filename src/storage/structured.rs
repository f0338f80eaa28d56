//! Structured binary readers and writers.
//!
//! Fixed-width integers are big-endian. Variable-length integers use the
//! seven-bits-per-byte encoding from [`crate::util::varint`]. Strings are a
//! vInt byte length followed by UTF-8 bytes.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, TesseraError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint;

/// Reader for structured binary data.
#[derive(Debug)]
pub struct StructReader<R> {
    reader: R,
}

impl<R: Read> StructReader<R> {
    /// Wrap a byte source.
    pub fn new(reader: R) -> Self {
        StructReader { reader }
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.reader.read_u8()?)
    }

    /// Read a big-endian i32.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.reader.read_i32::<BigEndian>()?)
    }

    /// Read a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(self.reader.read_u32::<BigEndian>()?)
    }

    /// Read a big-endian i64.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.reader.read_i64::<BigEndian>()?)
    }

    /// Read a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(self.reader.read_u64::<BigEndian>()?)
    }

    /// Read a variable-length u32.
    pub fn read_vint(&mut self) -> Result<u32> {
        varint::read_u32(&mut self.reader)
    }

    /// Read a variable-length u64.
    pub fn read_vlong(&mut self) -> Result<u64> {
        varint::read_u64(&mut self.reader)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_vint()? as usize;
        let mut bytes = vec![0u8; len];
        self.reader.read_exact(&mut bytes)?;
        String::from_utf8(bytes)
            .map_err(|e| TesseraError::corrupt("string", format!("invalid UTF-8: {e}")))
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        Ok(())
    }

    /// Borrow the underlying reader.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Mutably borrow the underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Seek> StructReader<R> {
    /// Move to an absolute position.
    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    /// Move forward by `count` bytes without reading them.
    pub fn skip_bytes(&mut self, count: u64) -> Result<()> {
        let delta = i64::try_from(count)
            .map_err(|_| TesseraError::invalid_argument(format!("cannot skip {count} bytes")))?;
        self.reader.seek(SeekFrom::Current(delta))?;
        Ok(())
    }
}

impl StructReader<Box<dyn StorageInput>> {
    /// Current read position.
    pub fn file_pointer(&self) -> u64 {
        self.reader.file_pointer()
    }

    /// Total length of the underlying file.
    pub fn length(&self) -> u64 {
        self.reader.size()
    }

    /// Independent reader over the same file, starting at the same position.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(StructReader::new(self.reader.clone_input()?))
    }

    /// Release the underlying handle.
    pub fn close(&mut self) -> Result<()> {
        self.reader.close()
    }
}

/// Writer for structured binary data.
#[derive(Debug)]
pub struct StructWriter<W> {
    writer: W,
}

impl<W: Write> StructWriter<W> {
    /// Wrap a byte sink.
    pub fn new(writer: W) -> Self {
        StructWriter { writer }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.writer.write_u8(value)?)
    }

    /// Write a big-endian i32.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.writer.write_i32::<BigEndian>(value)?)
    }

    /// Write a big-endian u32.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.writer.write_u32::<BigEndian>(value)?)
    }

    /// Write a big-endian i64.
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.writer.write_i64::<BigEndian>(value)?)
    }

    /// Write a big-endian u64.
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.writer.write_u64::<BigEndian>(value)?)
    }

    /// Write a variable-length u32.
    pub fn write_vint(&mut self, value: u32) -> Result<()> {
        varint::write_u32(&mut self.writer, value)
    }

    /// Write a variable-length u64.
    pub fn write_vlong(&mut self, value: u64) -> Result<()> {
        varint::write_u64(&mut self.writer, value)
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len())
            .map_err(|_| TesseraError::invalid_argument("string too long"))?;
        self.write_vint(len)?;
        self.write_bytes(value.as_bytes())
    }

    /// Write raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        Ok(())
    }

    /// Borrow the underlying writer.
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Mutably borrow the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Unwrap the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: StorageOutput> StructWriter<W> {
    /// Bytes written so far.
    pub fn file_pointer(&self) -> u64 {
        self.writer.file_pointer()
    }

    /// Flush and close the underlying output.
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()
    }
}

/// Output wrapper that tracks a running CRC32 of every byte written.
pub struct ChecksumOutput<W> {
    inner: W,
    hasher: crc32fast::Hasher,
    written: u64,
}

impl<W: std::fmt::Debug> std::fmt::Debug for ChecksumOutput<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChecksumOutput")
            .field("inner", &self.inner)
            .field("written", &self.written)
            .finish()
    }
}

impl<W: Write> ChecksumOutput<W> {
    pub fn new(inner: W) -> Self {
        ChecksumOutput {
            inner,
            hasher: crc32fast::Hasher::new(),
            written: 0,
        }
    }

    /// CRC32 of all bytes written so far.
    pub fn checksum(&self) -> u64 {
        u64::from(self.hasher.clone().finalize())
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ChecksumOutput<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: StorageOutput> StorageOutput for ChecksumOutput<W> {
    fn file_pointer(&self) -> u64 {
        self.written
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        self.inner.flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_checksum_output() {
        let mut out = ChecksumOutput::new(Vec::new());
        out.write_all(b"123456789").unwrap();
        // CRC-32/ISO-HDLC check value
        assert_eq!(out.checksum(), 0xCBF4_3926);
        assert_eq!(out.bytes_written(), 9);
        assert_eq!(out.into_inner(), b"123456789".to_vec());
    }

    #[test]
    fn test_struct_roundtrip() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_u8(7).unwrap();
        writer.write_i32(-2).unwrap();
        writer.write_u64(1 << 40).unwrap();
        writer.write_vint(300).unwrap();
        writer.write_vlong(u64::MAX >> 1).unwrap();
        writer.write_string("Lucene41PostingsWriterDoc").unwrap();
        let bytes = writer.into_inner();

        let mut reader = StructReader::new(Cursor::new(bytes));
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.read_i32().unwrap(), -2);
        assert_eq!(reader.read_u64().unwrap(), 1 << 40);
        assert_eq!(reader.read_vint().unwrap(), 300);
        assert_eq!(reader.read_vlong().unwrap(), u64::MAX >> 1);
        assert_eq!(reader.read_string().unwrap(), "Lucene41PostingsWriterDoc");
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn test_big_endian_layout() {
        let mut writer = StructWriter::new(Vec::new());
        writer.write_i32(0x3fd76c17).unwrap();
        assert_eq!(writer.into_inner(), vec![0x3f, 0xd7, 0x6c, 0x17]);
    }

    #[test]
    fn test_skip_bytes() {
        let mut reader = StructReader::new(Cursor::new(vec![1u8, 2, 3, 4, 5]));
        reader.skip_bytes(3).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 4);
        reader.seek(0).unwrap();
        assert_eq!(reader.read_u8().unwrap(), 1);
    }
}
