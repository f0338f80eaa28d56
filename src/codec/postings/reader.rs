//! Opens a segment's postings streams and hands out enumerators.

use std::io::Read;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::codec::field_infos::{FieldInfo, FieldInfos};
use crate::codec::for_util::ForUtil;
use crate::codec::header::{check_header, checksum_entire_file, retrieve_checksum};
use crate::codec::postings::docs_enum::BlockDocsEnum;
use crate::codec::postings::positions_enum::BlockPositionsEnum;
use crate::codec::postings::term_state::{self, BlockTermState};
use crate::codec::postings::{
    DOC_CODEC, DOC_EXTENSION, DocsFlags, PAY_CODEC, PAY_EXTENSION, POS_CODEC, POS_EXTENSION,
    TERMS_CODEC, VERSION_CURRENT, VERSION_META_CHECKSUM, VERSION_START,
};
use crate::codec::{BLOCK_SIZE, segment_file_name};
use crate::error::{Result, TesseraError};
use crate::index::segment::SegmentInfo;
use crate::storage::structured::StructReader;
use crate::storage::{IndexInput, Storage, open_index_input};
use crate::util::bits::Bits;

/// State shared between a reader and the enumerators it creates.
///
/// Enumerators hold an `Arc` to it; reuse is only allowed for enumerators
/// created from the same instance.
#[derive(Debug)]
pub struct ReaderShared {
    pub(crate) for_util: ForUtil,
    pub(crate) version: i32,
    doc_in: Mutex<IndexInput>,
    pos_in: Option<Mutex<IndexInput>>,
}

impl ReaderShared {
    /// Fresh cursor over the doc stream.
    pub(crate) fn clone_doc_in(&self) -> Result<IndexInput> {
        self.doc_in.lock().try_clone()
    }

    /// Fresh cursor over the positions stream.
    pub(crate) fn clone_pos_in(&self) -> Result<IndexInput> {
        match &self.pos_in {
            Some(pos_in) => pos_in.lock().try_clone(),
            None => Err(TesseraError::invalid_argument(
                "segment has no positions stream",
            )),
        }
    }
}

/// Postings reader for one segment.
#[derive(Debug)]
pub struct PostingsReader {
    segment: String,
    doc_name: String,
    pos_name: Option<String>,
    pay_name: Option<String>,
    pay_in: Option<IndexInput>,
    shared: Arc<ReaderShared>,
}

fn close_quietly(input: &mut IndexInput, name: &str) {
    if let Err(err) = input.close() {
        warn!("failed to close {name} after open error: {err}");
    }
}

fn open_stream(storage: &dyn Storage, name: &str, codec: &str, version: i32) -> Result<IndexInput> {
    let mut input = open_index_input(storage, name)?;
    let checked = check_header(&mut input, name, codec, version, version).and_then(|_| {
        if version >= VERSION_META_CHECKSUM {
            retrieve_checksum(&mut input, name)?;
        }
        Ok(())
    });
    match checked {
        Ok(()) => Ok(input),
        Err(err) => {
            close_quietly(&mut input, name);
            Err(err)
        }
    }
}

fn open_doc_stream(input: &mut IndexInput, name: &str) -> Result<(i32, ForUtil)> {
    let version = check_header(input, name, DOC_CODEC, VERSION_START, VERSION_CURRENT)?;
    let for_util = ForUtil::read_setup(input, name)?;
    if version >= VERSION_META_CHECKSUM {
        retrieve_checksum(input, name)?;
    }
    Ok((version, for_util))
}

impl PostingsReader {
    /// Open the streams the segment's fields require and validate their
    /// headers and footers. Streams opened before a failure are closed.
    pub fn open(
        storage: &dyn Storage,
        segment: &SegmentInfo,
        segment_suffix: &str,
        field_infos: &FieldInfos,
    ) -> Result<Self> {
        let doc_name = segment_file_name(&segment.name, segment_suffix, DOC_EXTENSION);
        let mut doc_in = open_index_input(storage, &doc_name)?;
        let (version, for_util) = match open_doc_stream(&mut doc_in, &doc_name) {
            Ok(setup) => setup,
            Err(err) => {
                close_quietly(&mut doc_in, &doc_name);
                return Err(err);
            }
        };

        let mut pos_in = None;
        let mut pos_name = None;
        let mut pay_in = None;
        let mut pay_name = None;
        if field_infos.has_prox() {
            let name = segment_file_name(&segment.name, segment_suffix, POS_EXTENSION);
            match open_stream(storage, &name, POS_CODEC, version) {
                Ok(input) => pos_in = Some(input),
                Err(err) => {
                    close_quietly(&mut doc_in, &doc_name);
                    return Err(err);
                }
            }
            pos_name = Some(name);

            if field_infos.has_payloads() || field_infos.has_offsets() {
                let name = segment_file_name(&segment.name, segment_suffix, PAY_EXTENSION);
                match open_stream(storage, &name, PAY_CODEC, version) {
                    Ok(input) => pay_in = Some(input),
                    Err(err) => {
                        close_quietly(&mut doc_in, &doc_name);
                        if let (Some(input), Some(pos_name)) = (pos_in.as_mut(), pos_name.as_deref()) {
                            close_quietly(input, pos_name);
                        }
                        return Err(err);
                    }
                }
                pay_name = Some(name);
            }
        }

        debug!(
            "opened postings reader for segment {} (version={}, pos={}, pay={})",
            segment.name,
            version,
            pos_in.is_some(),
            pay_in.is_some()
        );

        Ok(PostingsReader {
            segment: segment.name.clone(),
            doc_name,
            pos_name,
            pay_name,
            pay_in,
            shared: Arc::new(ReaderShared {
                for_util,
                version,
                doc_in: Mutex::new(doc_in),
                pos_in: pos_in.map(Mutex::new),
            }),
        })
    }

    /// Validate the terms dictionary header written by
    /// [`PostingsWriter::init`](crate::codec::postings::PostingsWriter::init).
    pub fn init<R: Read>(terms_in: &mut StructReader<R>, resource: &str) -> Result<i32> {
        let version = check_header(terms_in, resource, TERMS_CODEC, VERSION_START, VERSION_CURRENT)?;
        let index_block_size = terms_in.read_vint()?;
        if index_block_size as usize != BLOCK_SIZE {
            return Err(TesseraError::BlockSizeMismatch {
                index_time: index_block_size,
                read_time: BLOCK_SIZE as u32,
            });
        }
        Ok(version)
    }

    pub fn version(&self) -> i32 {
        self.shared.version
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn new_term_state(&self) -> BlockTermState {
        BlockTermState::default()
    }

    /// Decode term metadata produced by the writer's `encode_term`.
    pub fn decode_term(
        &self,
        bytes: &[u8],
        field: &FieldInfo,
        previous: Option<&BlockTermState>,
    ) -> Result<BlockTermState> {
        term_state::decode_term(bytes, field, previous)
    }

    /// Enumerate a term's documents.
    ///
    /// `reuse` is recycled when it was created by this reader for a field
    /// with the same options; otherwise a new enumerator is built.
    pub fn docs(
        &self,
        field: &FieldInfo,
        state: &BlockTermState,
        live_docs: Option<Arc<dyn Bits>>,
        reuse: Option<BlockDocsEnum>,
        flags: DocsFlags,
    ) -> Result<BlockDocsEnum> {
        let mut docs_enum = match reuse {
            Some(docs_enum) if docs_enum.can_reuse(&self.shared, field) => docs_enum,
            _ => BlockDocsEnum::new(self.shared.clone(), field),
        };
        docs_enum.reset(live_docs, state, flags)?;
        Ok(docs_enum)
    }

    /// Enumerate a term's documents and positions.
    ///
    /// The field must index positions; payloads and offsets are not decoded.
    pub fn docs_and_positions(
        &self,
        field: &FieldInfo,
        state: &BlockTermState,
        live_docs: Option<Arc<dyn Bits>>,
        reuse: Option<BlockPositionsEnum>,
    ) -> Result<BlockPositionsEnum> {
        if !field.has_positions() {
            return Err(TesseraError::invalid_argument(format!(
                "field \"{}\" was indexed without positions",
                field.name
            )));
        }
        if field.has_payloads || field.has_offsets() {
            return Err(TesseraError::invalid_argument(format!(
                "field \"{}\": payload and offset decoding is not supported",
                field.name
            )));
        }
        let mut positions_enum = match reuse {
            Some(positions_enum) if positions_enum.can_reuse(&self.shared) => positions_enum,
            _ => BlockPositionsEnum::new(self.shared.clone())?,
        };
        positions_enum.reset(live_docs, state)?;
        Ok(positions_enum)
    }

    /// Verify the checksum of every stream. A no-op for streams written
    /// before checksums were introduced.
    pub fn check_integrity(&self) -> Result<()> {
        if self.shared.version < VERSION_META_CHECKSUM {
            return Ok(());
        }
        checksum_entire_file(&self.shared.doc_in.lock(), &self.doc_name)?;
        if let (Some(pos_in), Some(name)) = (&self.shared.pos_in, &self.pos_name) {
            checksum_entire_file(&pos_in.lock(), name)?;
        }
        if let (Some(pay_in), Some(name)) = (&self.pay_in, &self.pay_name) {
            checksum_entire_file(pay_in, name)?;
        }
        Ok(())
    }

    /// Release every stream. Enumerators already created keep their own
    /// cursors.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        if let Err(err) = self.shared.doc_in.lock().close() {
            first_error.get_or_insert(err);
        }
        if let Some(pos_in) = &self.shared.pos_in {
            if let Err(err) = pos_in.lock().close() {
                first_error.get_or_insert(err);
            }
        }
        if let Some(pay_in) = self.pay_in.as_mut() {
            if let Err(err) = pay_in.close() {
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
