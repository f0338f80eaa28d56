//! Per-term postings metadata and its delta encoding.
//!
//! Entry layout, with stream pointers delta-coded against the previous term
//! of the same field (absolute when there is none):
//!
//! ```text
//! vInt   docFreq
//! vLong  totalTermFreq - docFreq        if the field has freqs
//! vLong  docStartFP delta
//! vLong  posStartFP delta               if the field has positions
//! vLong  payStartFP delta               if the field has payloads or offsets
//! vInt   singletonDocID                 if docFreq == 1
//! vLong  lastPosBlockOffset             if positions and totalTermFreq > BLOCK_SIZE
//! vLong  skipOffset                     if docFreq > BLOCK_SIZE
//! ```

use std::io::Cursor;

use crate::codec::field_infos::FieldInfo;
use crate::codec::{BLOCK_SIZE, DocId};
use crate::error::{Result, TesseraError};
use crate::storage::structured::{StructReader, StructWriter};

/// Where a term's postings live and how large they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTermState {
    pub doc_freq: u32,
    /// Sum of frequencies; equals `doc_freq` for fields without freqs.
    pub total_term_freq: u64,
    pub doc_start_fp: u64,
    pub pos_start_fp: u64,
    pub pay_start_fp: u64,
    /// Offset of the skip data from `doc_start_fp`, only when
    /// `doc_freq > BLOCK_SIZE`.
    pub skip_offset: Option<u64>,
    /// Offset of the positions vInt tail from `pos_start_fp`, only when
    /// `total_term_freq > BLOCK_SIZE`.
    pub last_pos_block_offset: Option<u64>,
    /// The only document of a `doc_freq == 1` term; nothing is written to the
    /// doc stream for such terms.
    pub singleton_doc_id: Option<DocId>,
}

fn delta(current: u64, previous: u64, what: &str) -> Result<u64> {
    current.checked_sub(previous).ok_or_else(|| {
        TesseraError::invalid_argument(format!(
            "{what} went backwards between terms: {previous} -> {current}"
        ))
    })
}

/// Encode `state` relative to `previous`.
pub fn encode_term(
    state: &BlockTermState,
    field: &FieldInfo,
    previous: Option<&BlockTermState>,
) -> Result<Vec<u8>> {
    let base = previous.cloned().unwrap_or_default();
    let mut out = StructWriter::new(Vec::new());

    out.write_vint(state.doc_freq)?;
    if field.has_freqs() {
        let extra = state
            .total_term_freq
            .checked_sub(u64::from(state.doc_freq))
            .ok_or_else(|| {
                TesseraError::invalid_argument(format!(
                    "totalTermFreq {} is below docFreq {}",
                    state.total_term_freq, state.doc_freq
                ))
            })?;
        out.write_vlong(extra)?;
    }
    out.write_vlong(delta(state.doc_start_fp, base.doc_start_fp, "docStartFP")?)?;
    if field.has_positions() {
        out.write_vlong(delta(state.pos_start_fp, base.pos_start_fp, "posStartFP")?)?;
        if field.has_payloads || field.has_offsets() {
            out.write_vlong(delta(state.pay_start_fp, base.pay_start_fp, "payStartFP")?)?;
        }
    }

    if state.doc_freq == 1 {
        let doc = state.singleton_doc_id.ok_or_else(|| {
            TesseraError::invalid_argument("term with docFreq 1 has no singleton doc id")
        })?;
        out.write_vint(doc)?;
    }
    if field.has_positions() && state.total_term_freq > BLOCK_SIZE as u64 {
        let offset = state.last_pos_block_offset.ok_or_else(|| {
            TesseraError::invalid_argument("term is missing its last position block offset")
        })?;
        out.write_vlong(offset)?;
    }
    if state.doc_freq as usize > BLOCK_SIZE {
        let offset = state.skip_offset.ok_or_else(|| {
            TesseraError::invalid_argument("term is missing its skip offset")
        })?;
        out.write_vlong(offset)?;
    }
    Ok(out.into_inner())
}

/// Decode an entry written by [`encode_term`].
pub fn decode_term(
    bytes: &[u8],
    field: &FieldInfo,
    previous: Option<&BlockTermState>,
) -> Result<BlockTermState> {
    let base = previous.cloned().unwrap_or_default();
    let mut input = StructReader::new(Cursor::new(bytes));

    let doc_freq = input.read_vint()?;
    if doc_freq == 0 {
        return Err(TesseraError::corrupt(
            field.name.as_str(),
            "term metadata has docFreq 0",
        ));
    }
    let total_term_freq = if field.has_freqs() {
        u64::from(doc_freq) + input.read_vlong()?
    } else {
        u64::from(doc_freq)
    };

    let doc_start_fp = base.doc_start_fp + input.read_vlong()?;
    let mut pos_start_fp = base.pos_start_fp;
    let mut pay_start_fp = base.pay_start_fp;
    if field.has_positions() {
        pos_start_fp += input.read_vlong()?;
        if field.has_payloads || field.has_offsets() {
            pay_start_fp += input.read_vlong()?;
        }
    }

    let singleton_doc_id = if doc_freq == 1 {
        Some(input.read_vint()?)
    } else {
        None
    };
    let last_pos_block_offset =
        if field.has_positions() && total_term_freq > BLOCK_SIZE as u64 {
            Some(input.read_vlong()?)
        } else {
            None
        };
    let skip_offset = if doc_freq as usize > BLOCK_SIZE {
        Some(input.read_vlong()?)
    } else {
        None
    };

    Ok(BlockTermState {
        doc_freq,
        total_term_freq,
        doc_start_fp,
        pos_start_fp,
        pay_start_fp,
        skip_offset,
        last_pos_block_offset,
        singleton_doc_id,
    })
}
