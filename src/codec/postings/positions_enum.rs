//! Document, frequency and position enumeration over one term's postings.
//!
//! Positions are decoded lazily: moving between documents only accumulates
//! a count of pending positions, which are skipped in bulk the first time
//! [`next_position`](PositionsIterator::next_position) is called for a
//! document.

use std::sync::Arc;

use log::trace;

use crate::codec::for_util::MAX_ENCODED_SIZE;
use crate::codec::postings::docs_enum::{EnumState, add_delta, read_vint_block};
use crate::codec::postings::reader::ReaderShared;
use crate::codec::postings::term_state::BlockTermState;
use crate::codec::postings::{DocIterator, PositionsIterator};
use crate::codec::skip::SkipReader;
use crate::codec::{BLOCK_SIZE, DocId};
use crate::error::{Result, TesseraError};
use crate::storage::IndexInput;
use crate::util::bits::Bits;

fn missing_doc_in() -> TesseraError {
    TesseraError::corrupt("postings", "doc stream is not positioned for this term")
}

/// Enumerator over documents and positions of a term.
#[derive(Debug)]
pub struct BlockPositionsEnum {
    shared: Arc<ReaderShared>,
    doc_in: Option<IndexInput>,
    pos_in: IndexInput,
    encoded: Box<[u8; MAX_ENCODED_SIZE]>,

    doc_delta_buffer: [u32; BLOCK_SIZE],
    freq_buffer: [u32; BLOCK_SIZE],
    pos_delta_buffer: [u32; BLOCK_SIZE],
    doc_buffer_upto: usize,
    pos_buffer_upto: usize,

    skipper: Option<SkipReader>,
    skipped: bool,

    doc_freq: u32,
    total_term_freq: u64,
    doc_upto: u32,
    doc: Option<DocId>,
    exhausted: bool,
    accum: DocId,
    freq: u32,
    position: u32,
    positions_read: u32,

    // Positions of documents stepped over that still sit in the stream
    // ahead of the current document's positions.
    pos_pending_count: u64,
    // Seek target for the next position read, set after a reset or skip.
    pos_pending_fp: Option<u64>,
    // Start of the vInt tail; None when every block is packed.
    last_pos_block_fp: Option<u64>,

    doc_term_start_fp: u64,
    pos_term_start_fp: u64,
    pay_term_start_fp: u64,
    skip_offset: Option<u64>,
    next_skip_doc: DocId,
    singleton_doc_id: Option<DocId>,

    live_docs: Option<Arc<dyn Bits>>,
}

impl BlockPositionsEnum {
    pub(crate) fn new(shared: Arc<ReaderShared>) -> Result<Self> {
        let pos_in = shared.clone_pos_in()?;
        Ok(BlockPositionsEnum {
            shared,
            doc_in: None,
            pos_in,
            encoded: Box::new([0u8; MAX_ENCODED_SIZE]),
            doc_delta_buffer: [0; BLOCK_SIZE],
            freq_buffer: [0; BLOCK_SIZE],
            pos_delta_buffer: [0; BLOCK_SIZE],
            doc_buffer_upto: BLOCK_SIZE,
            pos_buffer_upto: BLOCK_SIZE,
            skipper: None,
            skipped: false,
            doc_freq: 0,
            total_term_freq: 0,
            doc_upto: 0,
            doc: None,
            exhausted: true,
            accum: 0,
            freq: 0,
            position: 0,
            positions_read: 0,
            pos_pending_count: 0,
            pos_pending_fp: None,
            last_pos_block_fp: None,
            doc_term_start_fp: 0,
            pos_term_start_fp: 0,
            pay_term_start_fp: 0,
            skip_offset: None,
            next_skip_doc: 0,
            singleton_doc_id: None,
            live_docs: None,
        })
    }

    pub(crate) fn can_reuse(&self, shared: &Arc<ReaderShared>) -> bool {
        Arc::ptr_eq(&self.shared, shared)
    }

    pub(crate) fn reset(
        &mut self,
        live_docs: Option<Arc<dyn Bits>>,
        state: &BlockTermState,
    ) -> Result<()> {
        if state.doc_freq == 0 {
            return Err(TesseraError::invalid_argument("term state has docFreq 0"));
        }
        self.live_docs = live_docs;
        self.doc_freq = state.doc_freq;
        self.total_term_freq = state.total_term_freq;
        self.doc_term_start_fp = state.doc_start_fp;
        self.pos_term_start_fp = state.pos_start_fp;
        self.pay_term_start_fp = state.pay_start_fp;
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

        self.pos_pending_fp = Some(self.pos_term_start_fp);
        self.pos_pending_count = 0;
        let block = BLOCK_SIZE as u64;
        self.last_pos_block_fp = if self.total_term_freq < block {
            Some(self.pos_term_start_fp)
        } else if self.total_term_freq == block {
            None
        } else {
            let offset = state.last_pos_block_offset.ok_or_else(|| {
                TesseraError::corrupt("postings", "term has no last position block offset")
            })?;
            Some(self.pos_term_start_fp + offset)
        };

        self.doc = None;
        self.exhausted = false;
        self.accum = 0;
        self.doc_upto = 0;
        self.freq = 0;
        self.position = 0;
        self.positions_read = 0;
        self.next_skip_doc = BLOCK_SIZE as DocId - 1;
        self.doc_buffer_upto = BLOCK_SIZE;
        self.pos_buffer_upto = BLOCK_SIZE;
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
            self.shared
                .for_util
                .read_block(doc_in, &mut self.encoded[..], &mut self.freq_buffer)?;
        } else if self.doc_freq == 1 {
            self.doc_delta_buffer[0] = self.singleton_doc_id.ok_or_else(|| {
                TesseraError::corrupt("postings", "singleton term has no doc id")
            })?;
            self.freq_buffer[0] = u32::try_from(self.total_term_freq).map_err(|_| {
                TesseraError::corrupt("postings", "singleton frequency out of range")
            })?;
        } else {
            let doc_in = self.doc_in.as_mut().ok_or_else(missing_doc_in)?;
            trace!("fill doc tail from fp={}", doc_in.file_pointer());
            read_vint_block(
                doc_in,
                &mut self.doc_delta_buffer,
                &mut self.freq_buffer,
                left as usize,
                true,
            )?;
        }
        self.doc_buffer_upto = 0;
        Ok(())
    }

    fn refill_positions(&mut self) -> Result<()> {
        if Some(self.pos_in.file_pointer()) == self.last_pos_block_fp {
            let count = (self.total_term_freq % BLOCK_SIZE as u64) as usize;
            trace!(
                "fill pos tail of {} from fp={}",
                count,
                self.pos_in.file_pointer()
            );
            for slot in self.pos_delta_buffer.iter_mut().take(count) {
                *slot = self.pos_in.read_vint()?;
            }
        } else {
            trace!("fill pos block from fp={}", self.pos_in.file_pointer());
            self.shared.for_util.read_block(
                &mut self.pos_in,
                &mut self.encoded[..],
                &mut self.pos_delta_buffer,
            )?;
        }
        Ok(())
    }

    /// Skip the positions of documents stepped over, leaving the buffer at
    /// the first position of the current document.
    fn skip_positions(&mut self) -> Result<()> {
        let mut to_skip = self.pos_pending_count - u64::from(self.freq);
        let left_in_block = (BLOCK_SIZE - self.pos_buffer_upto) as u64;
        if to_skip < left_in_block {
            self.pos_buffer_upto += to_skip as usize;
        } else {
            to_skip -= left_in_block;
            while to_skip >= BLOCK_SIZE as u64 {
                debug_assert_ne!(Some(self.pos_in.file_pointer()), self.last_pos_block_fp);
                self.shared.for_util.skip_block(&mut self.pos_in)?;
                to_skip -= BLOCK_SIZE as u64;
            }
            self.refill_positions()?;
            self.pos_buffer_upto = to_skip as usize;
        }
        self.position = 0;
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

    fn land_on(&mut self, doc: DocId) -> Option<DocId> {
        self.doc = Some(doc);
        self.position = 0;
        self.positions_read = 0;
        self.doc
    }

    /// Consume the next buffered document, accounting its positions as
    /// pending.
    fn step(&mut self) -> Result<()> {
        if self.doc_buffer_upto == BLOCK_SIZE {
            self.refill_docs()?;
        }
        self.accum = add_delta(self.accum, self.doc_delta_buffer[self.doc_buffer_upto])?;
        self.freq = self.freq_buffer[self.doc_buffer_upto];
        self.pos_pending_count += u64::from(self.freq);
        self.doc_buffer_upto += 1;
        self.doc_upto += 1;
        Ok(())
    }

    fn skip_to_block(&mut self, target: DocId) -> Result<()> {
        let mut skipper = match self.skipper.take() {
            Some(skipper) => skipper,
            None => {
                self.skipped = false;
                let doc_in = self.doc_in.as_ref().ok_or_else(missing_doc_in)?;
                SkipReader::new(doc_in.try_clone()?, true, false, false)
            }
        };

        if !self.skipped {
            let skip_offset = self.skip_offset.ok_or_else(|| {
                TesseraError::corrupt("postings", "term with more than one block has no skip data")
            })?;
            skipper.init(
                self.doc_term_start_fp + skip_offset,
                self.doc_term_start_fp,
                self.pos_term_start_fp,
                self.pay_term_start_fp,
                self.doc_freq,
            )?;
            self.skipped = true;
        }

        let new_doc_upto = skipper.skip_to(target)?;
        if new_doc_upto > self.doc_upto {
            trace!(
                "skipper moved to docUpto={} vs current={}; docID={} fp={} pos.fp={} pos.bufferUpto={}",
                new_doc_upto,
                self.doc_upto,
                skipper.doc(),
                skipper.doc_pointer(),
                skipper.pos_pointer(),
                skipper.pos_buffer_upto()
            );
            self.doc_upto = new_doc_upto;
            self.doc_buffer_upto = BLOCK_SIZE;
            self.accum = skipper.doc();
            let doc_in = self.doc_in.as_mut().ok_or_else(missing_doc_in)?;
            doc_in.seek(skipper.doc_pointer())?;
            self.pos_pending_fp = Some(skipper.pos_pointer());
            self.pos_pending_count = u64::from(skipper.pos_buffer_upto());
        }
        self.next_skip_doc = skipper.next_skip_doc();
        self.skipper = Some(skipper);
        Ok(())
    }
}

impl DocIterator for BlockPositionsEnum {
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
            self.step()?;
            if self.is_live(self.accum) {
                return Ok(self.land_on(self.accum));
            }
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

        if self.doc_freq as usize > BLOCK_SIZE && target > self.next_skip_doc {
            self.skip_to_block(target)?;
        }

        loop {
            if self.doc_upto == self.doc_freq {
                return Ok(self.exhaust());
            }
            self.step()?;
            if self.accum >= target {
                break;
            }
        }

        if self.is_live(self.accum) {
            Ok(self.land_on(self.accum))
        } else {
            self.next_doc()
        }
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn cost(&self) -> u64 {
        u64::from(self.doc_freq)
    }
}

impl PositionsIterator for BlockPositionsEnum {
    fn next_position(&mut self) -> Result<u32> {
        let doc = self.doc.ok_or_else(|| {
            TesseraError::invalid_argument("next_position called while not on a document")
        })?;
        if self.positions_read >= self.freq {
            return Err(TesseraError::invalid_argument(format!(
                "doc {doc} has only {} positions",
                self.freq
            )));
        }

        if let Some(fp) = self.pos_pending_fp.take() {
            self.pos_in.seek(fp)?;
            // Force buffer refill.
            self.pos_buffer_upto = BLOCK_SIZE;
        }

        if self.pos_pending_count > u64::from(self.freq) {
            self.skip_positions()?;
            self.pos_pending_count = u64::from(self.freq);
        }

        if self.pos_buffer_upto == BLOCK_SIZE {
            self.refill_positions()?;
            self.pos_buffer_upto = 0;
        }

        let delta = self.pos_delta_buffer[self.pos_buffer_upto];
        self.position = self.position.checked_add(delta).ok_or_else(|| {
            TesseraError::corrupt("postings", format!("position overflow in doc {doc}"))
        })?;
        self.pos_buffer_upto += 1;
        self.pos_pending_count -= 1;
        self.positions_read += 1;
        Ok(self.position)
    }
}
