//! Document/frequency enumeration over one term's postings.

use std::sync::Arc;

use log::trace;

use crate::codec::field_infos::FieldInfo;
use crate::codec::for_util::MAX_ENCODED_SIZE;
use crate::codec::postings::reader::ReaderShared;
use crate::codec::postings::term_state::BlockTermState;
use crate::codec::postings::{DocIterator, DocsFlags};
use crate::codec::skip::SkipReader;
use crate::codec::{BLOCK_SIZE, DocId};
use crate::error::{Result, TesseraError};
use crate::storage::IndexInput;
use crate::util::bits::Bits;

/// Buffer state of an enumerator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumState {
    /// The buffer is empty; the next step refills it.
    Fresh,
    /// Documents remain in the decoded buffer.
    Buffered,
    /// Every document of the term has been consumed.
    Exhausted,
}

/// Decode the vInt tail of a term's doc stream.
pub(crate) fn read_vint_block(
    doc_in: &mut IndexInput,
    doc_buffer: &mut [u32],
    freq_buffer: &mut [u32],
    num: usize,
    index_has_freq: bool,
) -> Result<()> {
    if index_has_freq {
        for i in 0..num {
            let code = doc_in.read_vint()?;
            doc_buffer[i] = code >> 1;
            freq_buffer[i] = if code & 1 != 0 { 1 } else { doc_in.read_vint()? };
        }
    } else {
        for slot in doc_buffer.iter_mut().take(num) {
            *slot = doc_in.read_vint()?;
        }
    }
    Ok(())
}

pub(crate) fn add_delta(accum: DocId, delta: u32) -> Result<DocId> {
    accum.checked_add(delta).ok_or_else(|| {
        TesseraError::corrupt("postings", format!("doc id overflow: {accum} + {delta}"))
    })
}

fn missing_doc_in() -> TesseraError {
    TesseraError::corrupt("postings", "doc stream is not positioned for this term")
}

/// Enumerator over the documents (and optionally frequencies) of a term.
#[derive(Debug)]
pub struct BlockDocsEnum {
    shared: Arc<ReaderShared>,
    doc_in: Option<IndexInput>,
    encoded: Box<[u8; MAX_ENCODED_SIZE]>,

    doc_delta_buffer: [u32; BLOCK_SIZE],
    freq_buffer: [u32; BLOCK_SIZE],
    doc_buffer_upto: usize,

    skipper: Option<SkipReader>,
    skipped: bool,

    index_has_freq: bool,
    index_has_pos: bool,
    index_has_offsets: bool,
    index_has_payloads: bool,

    doc_freq: u32,
    total_term_freq: u64,
    doc_upto: u32,
    doc: Option<DocId>,
    exhausted: bool,
    accum: DocId,
    freq: u32,

    doc_term_start_fp: u64,
    skip_offset: Option<u64>,
    next_skip_doc: DocId,
    singleton_doc_id: Option<DocId>,

    live_docs: Option<Arc<dyn Bits>>,
    needs_freq: bool,
}

impl BlockDocsEnum {
    pub(crate) fn new(shared: Arc<ReaderShared>, field: &FieldInfo) -> Self {
        BlockDocsEnum {
            shared,
            doc_in: None,
            encoded: Box::new([0u8; MAX_ENCODED_SIZE]),
            doc_delta_buffer: [0; BLOCK_SIZE],
            freq_buffer: [0; BLOCK_SIZE],
            doc_buffer_upto: BLOCK_SIZE,
            skipper: None,
            skipped: false,
            index_has_freq: field.has_freqs(),
            index_has_pos: field.has_positions(),
            index_has_offsets: field.has_offsets(),
            index_has_payloads: field.has_payloads,
            doc_freq: 0,
            total_term_freq: 0,
            doc_upto: 0,
            doc: None,
            exhausted: true,
            accum: 0,
            freq: 0,
            doc_term_start_fp: 0,
            skip_offset: None,
            next_skip_doc: 0,
            singleton_doc_id: None,
            live_docs: None,
            needs_freq: false,
        }
    }

    /// Whether this enumerator can be reset for `field` of the reader owning
    /// `shared`.
    pub(crate) fn can_reuse(&self, shared: &Arc<ReaderShared>, field: &FieldInfo) -> bool {
        Arc::ptr_eq(&self.shared, shared)
            && self.index_has_freq == field.has_freqs()
            && self.index_has_pos == field.has_positions()
            && self.index_has_offsets == field.has_offsets()
            && self.index_has_payloads == field.has_payloads
    }

    /// Position on a new term. Singleton terms touch no stream.
    pub(crate) fn reset(
        &mut self,
        live_docs: Option<Arc<dyn Bits>>,
        state: &BlockTermState,
        flags: DocsFlags,
    ) -> Result<()> {
        if state.doc_freq == 0 {
            return Err(TesseraError::invalid_argument("term state has docFreq 0"));
        }
        self.live_docs = live_docs;
        self.doc_freq = state.doc_freq;
        self.total_term_freq = if self.index_has_freq {
            state.total_term_freq
        } else {
            u64::from(state.doc_freq)
        };
        self.doc_term_start_fp = state.doc_start_fp;
        self.skip_offset = state.skip_offset;
        self.singleton_doc_id = state.singleton_doc_id;

        if self.doc_freq > 1 {
            if self.doc_in.is_none() {
                self.doc_in = Some(self.shared.clone_doc_in()?);
            }
            if let Some(doc_in) = self.doc_in.as_mut() {
                doc_in.seek(self.doc_term_start_fp)?;
            }
        }

        self.needs_freq = flags.contains(DocsFlags::FREQS);
        if !self.index_has_freq || !self.needs_freq {
            self.freq_buffer.fill(1);
        }
        self.doc = None;
        self.exhausted = false;
        self.accum = 0;
        self.freq = 1;
        self.doc_upto = 0;
        // We won't skip if the target is found in the first block.
        self.next_skip_doc = BLOCK_SIZE as DocId - 1;
        self.doc_buffer_upto = BLOCK_SIZE;
        self.skipped = false;
        Ok(())
    }

    pub fn state(&self) -> EnumState {
        if self.exhausted || self.doc_upto == self.doc_freq {
            EnumState::Exhausted
        } else if self.doc_buffer_upto == BLOCK_SIZE {
            EnumState::Fresh
        } else {
            EnumState::Buffered
        }
    }

    fn refill_docs(&mut self) -> Result<()> {
        let left = self.doc_freq - self.doc_upto;
        debug_assert!(left > 0);

        if left as usize >= BLOCK_SIZE {
            let doc_in = self.doc_in.as_mut().ok_or_else(missing_doc_in)?;
            trace!("fill doc block from fp={}", doc_in.file_pointer());
            self.shared
                .for_util
                .read_block(doc_in, &mut self.encoded[..], &mut self.doc_delta_buffer)?;
            if self.index_has_freq {
                if self.needs_freq {
                    self.shared
                        .for_util
                        .read_block(doc_in, &mut self.encoded[..], &mut self.freq_buffer)?;
                } else {
                    self.shared.for_util.skip_block(doc_in)?;
                }
            }
        } else if self.doc_freq == 1 {
            self.doc_delta_buffer[0] = self.singleton_doc_id.ok_or_else(|| {
                TesseraError::corrupt("postings", "singleton term has no doc id")
            })?;
            self.freq_buffer[0] = if self.index_has_freq && self.needs_freq {
                u32::try_from(self.total_term_freq).map_err(|_| {
                    TesseraError::corrupt(
                        "postings",
                        format!("singleton frequency out of range: {}", self.total_term_freq),
                    )
                })?
            } else {
                1
            };
        } else {
            let doc_in = self.doc_in.as_mut().ok_or_else(missing_doc_in)?;
            trace!("fill doc tail from fp={}", doc_in.file_pointer());
            read_vint_block(
                doc_in,
                &mut self.doc_delta_buffer,
                &mut self.freq_buffer,
                left as usize,
                self.index_has_freq,
            )?;
        }
        self.doc_buffer_upto = 0;
        Ok(())
    }

    fn is_live(&self, doc: DocId) -> bool {
        match &self.live_docs {
            Some(live_docs) => live_docs.get(doc as usize),
            None => true,
        }
    }

    fn exhaust(&mut self) -> Option<DocId> {
        self.doc = None;
        self.exhausted = true;
        None
    }

    fn skip_to_block(&mut self, target: DocId) -> Result<()> {
        let mut skipper = match self.skipper.take() {
            Some(skipper) => skipper,
            None => {
                self.skipped = false;
                let doc_in = self.doc_in.as_ref().ok_or_else(missing_doc_in)?;
                SkipReader::new(
                    doc_in.try_clone()?,
                    self.index_has_pos,
                    self.index_has_offsets,
                    self.index_has_payloads,
                )
            }
        };

        if !self.skipped {
            let skip_offset = self.skip_offset.ok_or_else(|| {
                TesseraError::corrupt("postings", "term with more than one block has no skip data")
            })?;
            // Skip data is only loaded the first time the term needs it.
            skipper.init(
                self.doc_term_start_fp + skip_offset,
                self.doc_term_start_fp,
                0,
                0,
                self.doc_freq,
            )?;
            self.skipped = true;
        }

        let new_doc_upto = skipper.skip_to(target)?;
        if new_doc_upto > self.doc_upto {
            debug_assert_eq!(new_doc_upto as usize % BLOCK_SIZE, 0);
            trace!(
                "skipper moved to docUpto={} vs current={}; docID={} fp={}",
                new_doc_upto,
                self.doc_upto,
                skipper.doc(),
                skipper.doc_pointer()
            );
            self.doc_upto = new_doc_upto;
            // Force to read the next block.
            self.doc_buffer_upto = BLOCK_SIZE;
            self.accum = skipper.doc();
            let doc_in = self.doc_in.as_mut().ok_or_else(missing_doc_in)?;
            doc_in.seek(skipper.doc_pointer())?;
        }
        self.next_skip_doc = skipper.next_skip_doc();
        self.skipper = Some(skipper);
        Ok(())
    }
}

impl DocIterator for BlockDocsEnum {
    fn doc_id(&self) -> Option<DocId> {
        self.doc
    }

    fn next_doc(&mut self) -> Result<Option<DocId>> {
        if self.exhausted {
            return Ok(None);
        }
        loop {
            if self.doc_upto == self.doc_freq {
                return Ok(self.exhaust());
            }
            if self.doc_buffer_upto == BLOCK_SIZE {
                self.refill_docs()?;
            }

            self.accum = add_delta(self.accum, self.doc_delta_buffer[self.doc_buffer_upto])?;
            self.doc_upto += 1;

            if self.is_live(self.accum) {
                self.freq = self.freq_buffer[self.doc_buffer_upto];
                self.doc_buffer_upto += 1;
                self.doc = Some(self.accum);
                return Ok(self.doc);
            }
            self.doc_buffer_upto += 1;
        }
    }

    fn advance(&mut self, target: DocId) -> Result<Option<DocId>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(current) = self.doc {
            if target <= current {
                return Err(TesseraError::invalid_argument(format!(
                    "advance target {target} must be greater than the current doc {current}"
                )));
            }
        }

        // Only skip when the target lies beyond the current block.
        if self.doc_freq as usize > BLOCK_SIZE && target > self.next_skip_doc {
            self.skip_to_block(target)?;
        }

        loop {
            if self.doc_upto == self.doc_freq {
                return Ok(self.exhaust());
            }
            if self.doc_buffer_upto == BLOCK_SIZE {
                self.refill_docs()?;
            }

            self.accum = add_delta(self.accum, self.doc_delta_buffer[self.doc_buffer_upto])?;
            self.doc_upto += 1;

            if self.accum >= target {
                break;
            }
            self.doc_buffer_upto += 1;
        }

        if self.is_live(self.accum) {
            self.freq = self.freq_buffer[self.doc_buffer_upto];
            self.doc_buffer_upto += 1;
            self.doc = Some(self.accum);
            Ok(self.doc)
        } else {
            self.doc_buffer_upto += 1;
            self.next_doc()
        }
    }

    /// Frequency of the current document; 1 when frequencies were not
    /// requested or not indexed.
    fn freq(&self) -> u32 {
        if self.needs_freq { self.freq } else { 1 }
    }

    fn cost(&self) -> u64 {
        u64::from(self.doc_freq)
    }
}
