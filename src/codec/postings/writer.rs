//! Writes the `.doc` and `.pos` streams of a segment.
//!
//! Usage per field: [`PostingsWriter::set_field`], then for every term in
//! order [`start_term`](PostingsWriter::start_term), per document
//! [`start_doc`](PostingsWriter::start_doc) / positions /
//! [`finish_doc`](PostingsWriter::finish_doc), and finally
//! [`finish_term`](PostingsWriter::finish_term), which returns the
//! [`BlockTermState`] to hand to the terms dictionary.

use std::io::Write;

use log::{debug, trace};

use crate::codec::field_infos::{FieldInfo, FieldInfos};
use crate::codec::for_util::{ForUtil, MAX_ENCODED_SIZE};
use crate::codec::header::{write_footer, write_header};
use crate::codec::postings::term_state::{self, BlockTermState};
use crate::codec::postings::{
    DOC_CODEC, DOC_EXTENSION, PAY_CODEC, PAY_EXTENSION, POS_CODEC, POS_EXTENSION, TERMS_CODEC,
    VERSION_CURRENT,
};
use crate::codec::skip::SkipWriter;
use crate::codec::{BLOCK_SIZE, DocId, NO_MORE_DOCS, segment_file_name};
use crate::error::{Result, TesseraError};
use crate::index::segment::SegmentInfo;
use crate::storage::structured::StructWriter;
use crate::storage::{IndexOutput, Storage, create_index_output};

#[derive(Debug)]
struct OpenDoc {
    doc_id: DocId,
    freq: u32,
    positions: u32,
}

/// Postings writer for one segment.
#[derive(Debug)]
pub struct PostingsWriter {
    segment: String,
    doc_out: IndexOutput,
    pos_out: Option<IndexOutput>,
    pay_out: Option<IndexOutput>,

    for_util: ForUtil,
    skip_writer: SkipWriter,
    encoded: Box<[u8; MAX_ENCODED_SIZE]>,

    field_has_freqs: bool,
    field_has_positions: bool,

    doc_start_fp: u64,
    pos_start_fp: u64,
    pay_start_fp: u64,

    doc_delta_buffer: [u32; BLOCK_SIZE],
    freq_buffer: [u32; BLOCK_SIZE],
    doc_buffer_upto: usize,

    pos_delta_buffer: [u32; BLOCK_SIZE],
    pos_buffer_upto: usize,

    doc_count: u32,
    total_term_freq: u64,
    last_doc_id: DocId,
    last_block_doc_id: Option<DocId>,
    last_position: u32,
    last_block_pos_fp: u64,
    last_block_pos_buffer_upto: u32,

    in_term: bool,
    open_doc: Option<OpenDoc>,
}

impl PostingsWriter {
    /// Create the segment's postings streams and write their headers.
    pub fn open(
        storage: &dyn Storage,
        segment: &SegmentInfo,
        segment_suffix: &str,
        field_infos: &FieldInfos,
    ) -> Result<Self> {
        let for_util = ForUtil::new();

        let doc_name = segment_file_name(&segment.name, segment_suffix, DOC_EXTENSION);
        let mut doc_out = create_index_output(storage, &doc_name)?;
        write_header(&mut doc_out, DOC_CODEC, VERSION_CURRENT)?;
        for_util.write_setup(&mut doc_out)?;

        let mut pos_out = None;
        let mut pay_out = None;
        if field_infos.has_prox() {
            let pos_name = segment_file_name(&segment.name, segment_suffix, POS_EXTENSION);
            let mut out = create_index_output(storage, &pos_name)?;
            write_header(&mut out, POS_CODEC, VERSION_CURRENT)?;
            pos_out = Some(out);

            if field_infos.has_payloads() || field_infos.has_offsets() {
                let pay_name = segment_file_name(&segment.name, segment_suffix, PAY_EXTENSION);
                let mut out = create_index_output(storage, &pay_name)?;
                write_header(&mut out, PAY_CODEC, VERSION_CURRENT)?;
                pay_out = Some(out);
            }
        }

        debug!(
            "opened postings writer for segment {} (pos={}, pay={})",
            segment.name,
            pos_out.is_some(),
            pay_out.is_some()
        );

        Ok(PostingsWriter {
            segment: segment.name.clone(),
            doc_out,
            pos_out,
            pay_out,
            for_util,
            skip_writer: SkipWriter::new(segment.doc_count),
            encoded: Box::new([0u8; MAX_ENCODED_SIZE]),
            field_has_freqs: false,
            field_has_positions: false,
            doc_start_fp: 0,
            pos_start_fp: 0,
            pay_start_fp: 0,
            doc_delta_buffer: [0; BLOCK_SIZE],
            freq_buffer: [0; BLOCK_SIZE],
            doc_buffer_upto: 0,
            pos_delta_buffer: [0; BLOCK_SIZE],
            pos_buffer_upto: 0,
            doc_count: 0,
            total_term_freq: 0,
            last_doc_id: 0,
            last_block_doc_id: None,
            last_position: 0,
            last_block_pos_fp: 0,
            last_block_pos_buffer_upto: 0,
            in_term: false,
            open_doc: None,
        })
    }

    /// Write the terms dictionary header for this format, including the
    /// block size the reader must match.
    pub fn init<W: Write>(terms_out: &mut StructWriter<W>) -> Result<()> {
        write_header(terms_out, TERMS_CODEC, VERSION_CURRENT)?;
        terms_out.write_vint(BLOCK_SIZE as u32)
    }

    /// Switch to a new field. Payloads and offsets are not supported.
    pub fn set_field(&mut self, field: &FieldInfo) -> Result<()> {
        if self.in_term {
            return Err(TesseraError::invalid_argument(
                "cannot switch fields while a term is open",
            ));
        }
        if field.has_payloads || field.has_offsets() {
            return Err(TesseraError::invalid_argument(format!(
                "field \"{}\": payloads and offsets are not supported by this postings writer",
                field.name
            )));
        }
        if field.has_positions() && self.pos_out.is_none() {
            return Err(TesseraError::invalid_argument(format!(
                "field \"{}\" indexes positions but the segment has no positions stream",
                field.name
            )));
        }
        self.field_has_freqs = field.has_freqs();
        self.field_has_positions = field.has_positions();
        self.skip_writer
            .set_field(self.field_has_positions, false, false);
        Ok(())
    }

    pub fn start_term(&mut self) -> Result<()> {
        if self.in_term {
            return Err(TesseraError::invalid_argument(
                "previous term was not finished",
            ));
        }
        self.doc_start_fp = self.doc_out.file_pointer();
        if let Some(pos_out) = &self.pos_out {
            self.pos_start_fp = pos_out.file_pointer();
        }
        if let Some(pay_out) = &self.pay_out {
            self.pay_start_fp = pay_out.file_pointer();
        }
        self.last_doc_id = 0;
        self.last_block_doc_id = None;
        self.doc_count = 0;
        self.total_term_freq = 0;
        self.doc_buffer_upto = 0;
        self.pos_buffer_upto = 0;
        self.skip_writer
            .reset_skip(self.doc_start_fp, self.pos_start_fp, self.pay_start_fp);
        self.in_term = true;
        Ok(())
    }

    /// Add a document to the current term. `freq` is ignored for fields
    /// without frequencies.
    pub fn start_doc(&mut self, doc_id: DocId, freq: u32) -> Result<()> {
        if !self.in_term {
            return Err(TesseraError::invalid_argument("start_doc outside of a term"));
        }
        if self.open_doc.is_some() {
            return Err(TesseraError::invalid_argument(
                "previous document was not finished",
            ));
        }
        if doc_id >= NO_MORE_DOCS {
            return Err(TesseraError::invalid_argument(format!(
                "doc id {doc_id} is out of range"
            )));
        }
        if self.doc_count > 0 && doc_id <= self.last_doc_id {
            return Err(TesseraError::invalid_argument(format!(
                "docs out of order: {doc_id} after {}",
                self.last_doc_id
            )));
        }
        let freq = if self.field_has_freqs { freq } else { 1 };
        if freq == 0 {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc_id} has frequency 0"
            )));
        }

        // A full block was flushed by the previous document; record a skip
        // entry now that we know more documents follow.
        if let Some(last_block_doc_id) = self.last_block_doc_id {
            if self.doc_buffer_upto == 0 {
                self.skip_writer.buffer_skip(
                    last_block_doc_id,
                    self.doc_count,
                    self.doc_out.file_pointer(),
                    self.last_block_pos_fp,
                    self.pay_start_fp,
                    self.last_block_pos_buffer_upto,
                    0,
                )?;
            }
        }

        let doc_delta = doc_id - self.last_doc_id;
        self.doc_delta_buffer[self.doc_buffer_upto] = doc_delta;
        if self.field_has_freqs {
            self.freq_buffer[self.doc_buffer_upto] = freq;
        }
        self.doc_buffer_upto += 1;
        self.doc_count += 1;

        if self.doc_buffer_upto == BLOCK_SIZE {
            trace!(
                "write doc block at fp={} ending at doc={}",
                self.doc_out.file_pointer(),
                doc_id
            );
            self.for_util.write_block(
                &self.doc_delta_buffer,
                &mut self.encoded[..],
                &mut self.doc_out,
            )?;
            if self.field_has_freqs {
                self.for_util.write_block(
                    &self.freq_buffer,
                    &mut self.encoded[..],
                    &mut self.doc_out,
                )?;
            }
            // doc_buffer_upto is reset in finish_doc.
        }

        self.last_doc_id = doc_id;
        self.last_position = 0;
        self.total_term_freq += u64::from(freq);
        self.open_doc = Some(OpenDoc {
            doc_id,
            freq,
            positions: 0,
        });
        Ok(())
    }

    /// Add the next position of the current document.
    pub fn add_position(&mut self, position: u32) -> Result<()> {
        if !self.field_has_positions {
            return Err(TesseraError::invalid_argument(
                "field does not index positions",
            ));
        }
        let last_position = self.last_position;
        let open_doc = self
            .open_doc
            .as_mut()
            .ok_or_else(|| TesseraError::invalid_argument("add_position outside of a document"))?;
        if open_doc.positions >= open_doc.freq {
            return Err(TesseraError::invalid_argument(format!(
                "doc {} has more positions than its frequency {}",
                open_doc.doc_id, open_doc.freq
            )));
        }
        if open_doc.positions > 0 && position < last_position {
            return Err(TesseraError::invalid_argument(format!(
                "positions out of order in doc {}: {position} after {last_position}",
                open_doc.doc_id
            )));
        }
        open_doc.positions += 1;

        self.pos_delta_buffer[self.pos_buffer_upto] = position - last_position;
        self.pos_buffer_upto += 1;
        self.last_position = position;

        if self.pos_buffer_upto == BLOCK_SIZE {
            let pos_out = self.pos_out.as_mut().ok_or_else(|| {
                TesseraError::invalid_argument("segment has no positions stream")
            })?;
            trace!("write pos block at fp={}", pos_out.file_pointer());
            self.for_util
                .write_block(&self.pos_delta_buffer, &mut self.encoded[..], pos_out)?;
            self.pos_buffer_upto = 0;
        }
        Ok(())
    }

    pub fn finish_doc(&mut self) -> Result<()> {
        let open_doc = self
            .open_doc
            .take()
            .ok_or_else(|| TesseraError::invalid_argument("finish_doc without start_doc"))?;
        if self.field_has_positions && open_doc.positions != open_doc.freq {
            return Err(TesseraError::invalid_argument(format!(
                "doc {} declared frequency {} but added {} positions",
                open_doc.doc_id, open_doc.freq, open_doc.positions
            )));
        }

        // Remember where the next block starts for the skip entry written
        // once another document arrives.
        if self.doc_buffer_upto == BLOCK_SIZE {
            self.last_block_doc_id = Some(self.last_doc_id);
            if let Some(pos_out) = &self.pos_out {
                self.last_block_pos_fp = pos_out.file_pointer();
                self.last_block_pos_buffer_upto = self.pos_buffer_upto as u32;
            }
            self.doc_buffer_upto = 0;
        }
        Ok(())
    }

    /// Finish the current term and return its metadata.
    pub fn finish_term(&mut self) -> Result<BlockTermState> {
        if !self.in_term {
            return Err(TesseraError::invalid_argument("finish_term without start_term"));
        }
        if self.open_doc.is_some() {
            return Err(TesseraError::invalid_argument(
                "last document of the term was not finished",
            ));
        }
        if self.doc_count == 0 {
            return Err(TesseraError::invalid_argument("term has no documents"));
        }

        // A singleton term is written entirely into its metadata.
        let singleton_doc_id = if self.doc_count == 1 {
            Some(self.doc_delta_buffer[0])
        } else {
            for i in 0..self.doc_buffer_upto {
                let doc_delta = self.doc_delta_buffer[i];
                if self.field_has_freqs {
                    let freq = self.freq_buffer[i];
                    if freq == 1 {
                        self.doc_out.write_vint((doc_delta << 1) | 1)?;
                    } else {
                        self.doc_out.write_vint(doc_delta << 1)?;
                        self.doc_out.write_vint(freq)?;
                    }
                } else {
                    self.doc_out.write_vint(doc_delta)?;
                }
            }
            None
        };

        let mut last_pos_block_offset = None;
        if self.field_has_positions {
            let pos_out = self.pos_out.as_mut().ok_or_else(|| {
                TesseraError::invalid_argument("segment has no positions stream")
            })?;
            if self.total_term_freq > BLOCK_SIZE as u64 {
                last_pos_block_offset = Some(pos_out.file_pointer() - self.pos_start_fp);
            }
            for i in 0..self.pos_buffer_upto {
                pos_out.write_vint(self.pos_delta_buffer[i])?;
            }
        }

        let skip_offset = if self.doc_count as usize > BLOCK_SIZE {
            Some(self.skip_writer.write_skip(&mut self.doc_out)? - self.doc_start_fp)
        } else {
            None
        };

        let total_term_freq = if self.field_has_freqs {
            self.total_term_freq
        } else {
            u64::from(self.doc_count)
        };

        trace!(
            "finished term docFreq={} totalTermFreq={} docStartFP={}",
            self.doc_count, total_term_freq, self.doc_start_fp
        );

        let state = BlockTermState {
            doc_freq: self.doc_count,
            total_term_freq,
            doc_start_fp: self.doc_start_fp,
            pos_start_fp: self.pos_start_fp,
            pay_start_fp: self.pay_start_fp,
            skip_offset,
            last_pos_block_offset,
            singleton_doc_id,
        };

        self.doc_buffer_upto = 0;
        self.pos_buffer_upto = 0;
        self.in_term = false;
        Ok(state)
    }

    /// Encode term metadata for the terms dictionary.
    pub fn encode_term(
        &self,
        state: &BlockTermState,
        field: &FieldInfo,
        previous: Option<&BlockTermState>,
    ) -> Result<Vec<u8>> {
        term_state::encode_term(state, field, previous)
    }

    /// Write footers and close every stream.
    pub fn close(mut self) -> Result<()> {
        if self.in_term {
            return Err(TesseraError::invalid_argument(
                "cannot close the postings writer with an open term",
            ));
        }
        write_footer(&mut self.doc_out)?;
        self.doc_out.close()?;
        if let Some(mut pos_out) = self.pos_out.take() {
            write_footer(&mut pos_out)?;
            pos_out.close()?;
        }
        if let Some(mut pay_out) = self.pay_out.take() {
            write_footer(&mut pay_out)?;
            pay_out.close()?;
        }
        debug!("closed postings writer for segment {}", self.segment);
        Ok(())
    }
}
