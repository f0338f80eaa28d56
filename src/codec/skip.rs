//! Multi-level skip lists over postings blocks.
//!
//! Level 0 holds one entry per full block of [`BLOCK_SIZE`] documents; level
//! `i` holds one entry per `BLOCK_SIZE * SKIP_MULTIPLIER^i` documents. Each
//! entry stores the last document of the block it closes and the stream
//! pointers at which the following block starts. Entries on upper levels also
//! carry a pointer to the matching entry one level below.
//!
//! The skip data is written after the term's document blocks, levels from
//! highest to lowest; every level except level 0 is prefixed with its byte
//! length.

use log::trace;

use crate::codec::{BLOCK_SIZE, DocId};
use crate::error::{Result, TesseraError};
use crate::storage::structured::StructWriter;
use crate::storage::{IndexInput, StorageOutput};

/// Fan-out between skip levels.
pub const SKIP_MULTIPLIER: u64 = 8;

/// Cap on the number of skip levels.
pub const MAX_SKIP_LEVELS: usize = 10;

fn log_floor(mut x: u64, base: u64) -> usize {
    let mut ret = 0;
    while x >= base {
        x /= base;
        ret += 1;
    }
    ret
}

/// Number of levels used for a list of `doc_count` documents.
fn level_count(doc_count: u64, max_levels: usize) -> usize {
    let levels = if doc_count <= BLOCK_SIZE as u64 {
        1
    } else {
        1 + log_floor(doc_count / BLOCK_SIZE as u64, SKIP_MULTIPLIER)
    };
    levels.min(max_levels)
}

/// Buffers skip entries for one term at a time.
#[derive(Debug)]
pub struct SkipWriter {
    number_of_skip_levels: usize,
    skip_buffers: Vec<StructWriter<Vec<u8>>>,

    last_skip_doc: Vec<DocId>,
    last_skip_doc_pointer: Vec<u64>,
    last_skip_pos_pointer: Vec<u64>,
    last_skip_pay_pointer: Vec<u64>,

    cur_doc: DocId,
    cur_doc_pointer: u64,
    cur_pos_pointer: u64,
    cur_pay_pointer: u64,
    cur_pos_buffer_upto: u32,
    cur_payload_byte_upto: u32,

    field_has_positions: bool,
    field_has_offsets: bool,
    field_has_payloads: bool,
}

impl SkipWriter {
    /// Create a writer sized for a segment of `max_doc` documents.
    pub fn new(max_doc: u32) -> Self {
        let number_of_skip_levels = level_count(u64::from(max_doc), MAX_SKIP_LEVELS);
        SkipWriter {
            number_of_skip_levels,
            skip_buffers: (0..number_of_skip_levels)
                .map(|_| StructWriter::new(Vec::new()))
                .collect(),
            last_skip_doc: vec![0; number_of_skip_levels],
            last_skip_doc_pointer: vec![0; number_of_skip_levels],
            last_skip_pos_pointer: vec![0; number_of_skip_levels],
            last_skip_pay_pointer: vec![0; number_of_skip_levels],
            cur_doc: 0,
            cur_doc_pointer: 0,
            cur_pos_pointer: 0,
            cur_pay_pointer: 0,
            cur_pos_buffer_upto: 0,
            cur_payload_byte_upto: 0,
            field_has_positions: false,
            field_has_offsets: false,
            field_has_payloads: false,
        }
    }

    pub fn set_field(&mut self, has_positions: bool, has_offsets: bool, has_payloads: bool) {
        self.field_has_positions = has_positions;
        self.field_has_offsets = has_offsets;
        self.field_has_payloads = has_payloads;
    }

    /// Start a new term whose streams begin at the given pointers.
    pub fn reset_skip(&mut self, doc_start_fp: u64, pos_start_fp: u64, pay_start_fp: u64) {
        for buffer in &mut self.skip_buffers {
            buffer.get_mut().clear();
        }
        self.last_skip_doc.fill(0);
        self.last_skip_doc_pointer.fill(doc_start_fp);
        self.last_skip_pos_pointer.fill(pos_start_fp);
        self.last_skip_pay_pointer.fill(pay_start_fp);
    }

    /// Record the state after a full block whose last document is `doc`.
    ///
    /// `num_docs` is the number of documents of the term written so far and
    /// must be a multiple of [`BLOCK_SIZE`].
    #[allow(clippy::too_many_arguments)]
    pub fn buffer_skip(
        &mut self,
        doc: DocId,
        num_docs: u32,
        doc_pointer: u64,
        pos_pointer: u64,
        pay_pointer: u64,
        pos_buffer_upto: u32,
        payload_byte_upto: u32,
    ) -> Result<()> {
        debug_assert_eq!(num_docs as usize % BLOCK_SIZE, 0);
        self.cur_doc = doc;
        self.cur_doc_pointer = doc_pointer;
        self.cur_pos_pointer = pos_pointer;
        self.cur_pay_pointer = pay_pointer;
        self.cur_pos_buffer_upto = pos_buffer_upto;
        self.cur_payload_byte_upto = payload_byte_upto;

        // An entry lands on level i when num_docs is a multiple of
        // BLOCK_SIZE * SKIP_MULTIPLIER^i.
        let mut num_levels = 1;
        let mut remaining = u64::from(num_docs) / BLOCK_SIZE as u64;
        while remaining % SKIP_MULTIPLIER == 0 && num_levels < self.number_of_skip_levels {
            num_levels += 1;
            remaining /= SKIP_MULTIPLIER;
        }

        let mut child_pointer = 0u64;
        for level in 0..num_levels {
            self.write_skip_data(level)?;
            let new_child_pointer = self.skip_buffers[level].get_ref().len() as u64;
            if level != 0 {
                self.skip_buffers[level].write_vlong(child_pointer)?;
            }
            child_pointer = new_child_pointer;
        }
        Ok(())
    }

    fn write_skip_data(&mut self, level: usize) -> Result<()> {
        let buffer = &mut self.skip_buffers[level];

        buffer.write_vint(self.cur_doc - self.last_skip_doc[level])?;
        self.last_skip_doc[level] = self.cur_doc;

        buffer.write_vlong(self.cur_doc_pointer - self.last_skip_doc_pointer[level])?;
        self.last_skip_doc_pointer[level] = self.cur_doc_pointer;

        if self.field_has_positions {
            buffer.write_vlong(self.cur_pos_pointer - self.last_skip_pos_pointer[level])?;
            self.last_skip_pos_pointer[level] = self.cur_pos_pointer;
            buffer.write_vint(self.cur_pos_buffer_upto)?;

            if self.field_has_payloads {
                buffer.write_vint(self.cur_payload_byte_upto)?;
            }
            if self.field_has_offsets || self.field_has_payloads {
                buffer.write_vlong(self.cur_pay_pointer - self.last_skip_pay_pointer[level])?;
                self.last_skip_pay_pointer[level] = self.cur_pay_pointer;
            }
        }
        Ok(())
    }

    /// Append the buffered levels to `out` and return the pointer at which
    /// the skip data starts.
    pub fn write_skip<W: StorageOutput>(&self, out: &mut StructWriter<W>) -> Result<u64> {
        let skip_pointer = out.file_pointer();
        if self.skip_buffers.is_empty() {
            return Ok(skip_pointer);
        }

        for level in (1..self.number_of_skip_levels).rev() {
            let bytes = self.skip_buffers[level].get_ref();
            if !bytes.is_empty() {
                out.write_vlong(bytes.len() as u64)?;
                out.write_bytes(bytes)?;
            }
        }
        out.write_bytes(self.skip_buffers[0].get_ref())?;
        trace!(
            "wrote skip data at fp={} levels={}",
            skip_pointer, self.number_of_skip_levels
        );
        Ok(skip_pointer)
    }
}

/// Reads a term's skip list, lazily walking levels as targets advance.
#[derive(Debug)]
pub struct SkipReader {
    max_levels: usize,
    number_of_skip_levels: usize,
    doc_count: u64,

    skip_stream: Vec<Option<IndexInput>>,
    skip_pointer: Vec<u64>,
    skip_interval: Vec<u64>,
    num_skipped: Vec<u64>,
    skip_doc: Vec<DocId>,
    child_pointer: Vec<u64>,
    last_doc: DocId,
    last_child_pointer: u64,

    doc_pointer: Vec<u64>,
    pos_pointer: Vec<u64>,
    pay_pointer: Vec<u64>,
    pos_buffer_upto: Vec<u32>,
    payload_byte_upto: Vec<u32>,

    last_doc_pointer: u64,
    last_pos_pointer: u64,
    last_pay_pointer: u64,
    last_pos_buffer_upto: u32,
    last_payload_byte_upto: u32,

    has_positions: bool,
    has_offsets: bool,
    has_payloads: bool,
}

impl SkipReader {
    /// `skip_stream` is a private cursor over the doc stream.
    pub fn new(
        skip_stream: IndexInput,
        has_positions: bool,
        has_offsets: bool,
        has_payloads: bool,
    ) -> Self {
        let max_levels = MAX_SKIP_LEVELS;
        let mut streams: Vec<Option<IndexInput>> = (0..max_levels).map(|_| None).collect();
        streams[0] = Some(skip_stream);

        let mut skip_interval = vec![0u64; max_levels];
        skip_interval[0] = BLOCK_SIZE as u64;
        for i in 1..max_levels {
            skip_interval[i] = skip_interval[i - 1] * SKIP_MULTIPLIER;
        }

        SkipReader {
            max_levels,
            number_of_skip_levels: 0,
            doc_count: 0,
            skip_stream: streams,
            skip_pointer: vec![0; max_levels],
            skip_interval,
            num_skipped: vec![0; max_levels],
            skip_doc: vec![0; max_levels],
            child_pointer: vec![0; max_levels],
            last_doc: 0,
            last_child_pointer: 0,
            doc_pointer: vec![0; max_levels],
            pos_pointer: vec![0; max_levels],
            pay_pointer: vec![0; max_levels],
            pos_buffer_upto: vec![0; max_levels],
            payload_byte_upto: vec![0; max_levels],
            last_doc_pointer: 0,
            last_pos_pointer: 0,
            last_pay_pointer: 0,
            last_pos_buffer_upto: 0,
            last_payload_byte_upto: 0,
            has_positions,
            has_offsets,
            has_payloads,
        }
    }

    /// Trim `doc_freq` so a list ending exactly on a block boundary does not
    /// expect an entry for its final block; the writer never emits one.
    fn trim(doc_freq: u32) -> u64 {
        let df = u64::from(doc_freq);
        if df % BLOCK_SIZE as u64 == 0 { df - 1 } else { df }
    }

    /// Position the reader on a new term.
    pub fn init(
        &mut self,
        skip_pointer: u64,
        doc_base_pointer: u64,
        pos_base_pointer: u64,
        pay_base_pointer: u64,
        doc_freq: u32,
    ) -> Result<()> {
        self.skip_pointer[0] = skip_pointer;
        self.doc_count = Self::trim(doc_freq);
        self.skip_doc.fill(0);
        self.num_skipped.fill(0);
        self.child_pointer.fill(0);
        self.last_doc = 0;
        self.last_child_pointer = 0;
        for stream in self.skip_stream.iter_mut().skip(1) {
            *stream = None;
        }
        self.load_skip_levels()?;

        self.last_doc_pointer = doc_base_pointer;
        self.last_pos_pointer = pos_base_pointer;
        self.last_pay_pointer = pay_base_pointer;
        self.last_pos_buffer_upto = 0;
        self.last_payload_byte_upto = 0;
        self.doc_pointer.fill(doc_base_pointer);
        self.pos_pointer.fill(pos_base_pointer);
        self.pay_pointer.fill(pay_base_pointer);
        self.pos_buffer_upto.fill(0);
        self.payload_byte_upto.fill(0);
        Ok(())
    }

    fn load_skip_levels(&mut self) -> Result<()> {
        self.number_of_skip_levels = level_count(self.doc_count, self.max_levels);

        let mut stream0 = match self.skip_stream[0].take() {
            Some(stream) => stream,
            None => return Err(TesseraError::other("skip stream is closed")),
        };
        let result = (|| -> Result<()> {
            stream0.seek(self.skip_pointer[0])?;
            for level in (1..self.number_of_skip_levels).rev() {
                let length = stream0.read_vlong()?;
                self.skip_pointer[level] = stream0.file_pointer();
                self.skip_stream[level] = Some(stream0.try_clone()?);
                stream0.skip_bytes(length)?;
            }
            self.skip_pointer[0] = stream0.file_pointer();
            Ok(())
        })();
        self.skip_stream[0] = Some(stream0);
        result
    }

    /// Walk the levels until the entry covering `target` is found.
    ///
    /// Returns the number of documents that precede the block the reader now
    /// points at; callers only move when this exceeds their own position.
    pub fn skip_to(&mut self, target: DocId) -> Result<u32> {
        // Walk up the levels until the highest level whose next entry is
        // still below the target.
        let mut level = 0;
        while level + 1 < self.number_of_skip_levels && target > self.skip_doc[level + 1] {
            level += 1;
        }

        loop {
            if target > self.skip_doc[level] {
                if !self.load_next_skip(level)? {
                    continue;
                }
            } else {
                // No more entries on this level below the target: descend.
                if level > 0 && self.last_child_pointer > self.stream_file_pointer(level - 1) {
                    self.seek_child(level - 1)?;
                }
                if level == 0 {
                    break;
                }
                level -= 1;
            }
        }

        let skipped = self.num_skipped[0].saturating_sub(self.skip_interval[0]);
        trace!("skip_to target={} skipped={}", target, skipped);
        Ok(skipped as u32)
    }

    fn stream_file_pointer(&self, level: usize) -> u64 {
        self.skip_stream[level]
            .as_ref()
            .map_or(0, |stream| stream.file_pointer())
    }

    fn stream(&mut self, level: usize) -> Result<&mut IndexInput> {
        self.skip_stream[level].as_mut().ok_or_else(|| {
            TesseraError::corrupt(
                "skip list",
                format!("no skip stream for level {level}"),
            )
        })
    }

    fn load_next_skip(&mut self, level: usize) -> Result<bool> {
        // Remember the previous entry so the lower level can be positioned
        // at it later.
        self.set_last_skip_data(level);

        self.num_skipped[level] += self.skip_interval[level];
        if self.num_skipped[level] > self.doc_count {
            // This level is exhausted.
            self.skip_doc[level] = DocId::MAX;
            if self.number_of_skip_levels > level {
                self.number_of_skip_levels = level;
            }
            return Ok(false);
        }

        let delta = self.read_skip_data(level)?;
        self.skip_doc[level] += delta;

        if level != 0 {
            let child = self.stream(level)?.read_vlong()?;
            self.child_pointer[level] = child + self.skip_pointer[level - 1];
        }
        Ok(true)
    }

    fn seek_child(&mut self, level: usize) -> Result<()> {
        let last_child_pointer = self.last_child_pointer;
        self.stream(level)?.seek(last_child_pointer)?;
        self.num_skipped[level] = self.num_skipped[level + 1] - self.skip_interval[level + 1];
        self.skip_doc[level] = self.last_doc;
        if level > 0 {
            let child = self.stream(level)?.read_vlong()?;
            self.child_pointer[level] = child + self.skip_pointer[level - 1];
        }

        self.doc_pointer[level] = self.last_doc_pointer;
        self.pos_pointer[level] = self.last_pos_pointer;
        self.pos_buffer_upto[level] = self.last_pos_buffer_upto;
        self.payload_byte_upto[level] = self.last_payload_byte_upto;
        self.pay_pointer[level] = self.last_pay_pointer;
        Ok(())
    }

    fn set_last_skip_data(&mut self, level: usize) {
        self.last_doc = self.skip_doc[level];
        self.last_child_pointer = self.child_pointer[level];
        self.last_doc_pointer = self.doc_pointer[level];
        self.last_pos_pointer = self.pos_pointer[level];
        self.last_pay_pointer = self.pay_pointer[level];
        self.last_pos_buffer_upto = self.pos_buffer_upto[level];
        self.last_payload_byte_upto = self.payload_byte_upto[level];
    }

    fn read_skip_data(&mut self, level: usize) -> Result<DocId> {
        let has_positions = self.has_positions;
        let has_payloads = self.has_payloads;
        let has_offsets = self.has_offsets;
        let stream = self.stream(level)?;

        let delta = stream.read_vint()?;
        let doc_delta = stream.read_vlong()?;
        let mut pos_delta = 0;
        let mut pos_buffer_upto = None;
        let mut payload_byte_upto = None;
        let mut pay_delta = 0;
        if has_positions {
            pos_delta = stream.read_vlong()?;
            pos_buffer_upto = Some(stream.read_vint()?);
            if has_payloads {
                payload_byte_upto = Some(stream.read_vint()?);
            }
            if has_offsets || has_payloads {
                pay_delta = stream.read_vlong()?;
            }
        }

        self.doc_pointer[level] += doc_delta;
        if has_positions {
            self.pos_pointer[level] += pos_delta;
            if let Some(upto) = pos_buffer_upto {
                self.pos_buffer_upto[level] = upto;
            }
            if let Some(upto) = payload_byte_upto {
                self.payload_byte_upto[level] = upto;
            }
            self.pay_pointer[level] += pay_delta;
        }
        Ok(delta)
    }

    /// Last document of the block preceding the current position.
    pub fn doc(&self) -> DocId {
        self.last_doc
    }

    /// Doc stream pointer of the block the reader points at.
    pub fn doc_pointer(&self) -> u64 {
        self.last_doc_pointer
    }

    pub fn pos_pointer(&self) -> u64 {
        self.last_pos_pointer
    }

    pub fn pos_buffer_upto(&self) -> u32 {
        self.last_pos_buffer_upto
    }

    pub fn pay_pointer(&self) -> u64 {
        self.last_pay_pointer
    }

    pub fn payload_byte_upto(&self) -> u32 {
        self.last_payload_byte_upto
    }

    /// Last document of the next unread level-0 entry, [`DocId::MAX`] when
    /// level 0 is exhausted.
    pub fn next_skip_doc(&self) -> DocId {
        self.skip_doc[0]
    }
}
