//! Block postings format.
//!
//! A segment's postings live in up to three streams:
//!
//! - `.doc`: per term, packed blocks of doc deltas (and freqs), then a vInt
//!   tail, then the term's skip data.
//! - `.pos`: packed blocks of position deltas, then a vInt tail per term.
//! - `.pay`: payloads and offsets. Created and validated only; no field
//!   written by this crate stores payloads or offsets.
//!
//! Per-term metadata (counts and stream pointers) is handed to the terms
//! dictionary through [`BlockTermState`] and its compact byte encoding.

pub mod docs_enum;
pub mod positions_enum;
pub mod reader;
pub mod term_state;
pub mod writer;

pub use docs_enum::BlockDocsEnum;
pub use positions_enum::BlockPositionsEnum;
pub use reader::PostingsReader;
pub use term_state::BlockTermState;
pub use writer::PostingsWriter;

use crate::codec::DocId;
use crate::error::Result;

/// Extension of the doc stream.
pub const DOC_EXTENSION: &str = "doc";
/// Extension of the positions stream.
pub const POS_EXTENSION: &str = "pos";
/// Extension of the payloads and offsets stream.
pub const PAY_EXTENSION: &str = "pay";

pub const TERMS_CODEC: &str = "Lucene41PostingsWriterTerms";
pub const DOC_CODEC: &str = "Lucene41PostingsWriterDoc";
pub const POS_CODEC: &str = "Lucene41PostingsWriterPos";
pub const PAY_CODEC: &str = "Lucene41PostingsWriterPay";

/// Initial format.
pub const VERSION_START: i32 = 0;
/// Term metadata written as arrays of longs.
pub const VERSION_META_ARRAY: i32 = 1;
/// Streams end with a checksum footer.
pub const VERSION_META_CHECKSUM: i32 = 2;
pub const VERSION_CURRENT: i32 = VERSION_META_CHECKSUM;

/// What a docs enumerator must decode beyond document ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocsFlags(u8);

impl DocsFlags {
    /// Document ids only; [`DocIterator::freq`] reports 1.
    pub const NONE: DocsFlags = DocsFlags(0);
    /// Decode term frequencies.
    pub const FREQS: DocsFlags = DocsFlags(1);

    pub fn contains(self, other: DocsFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Forward-only cursor over the documents of one term.
///
/// A fresh cursor is unpositioned; [`doc_id`](Self::doc_id) returns `None`
/// until the first successful [`next_doc`](Self::next_doc) or
/// [`advance`](Self::advance). Once either returns `Ok(None)` the cursor is
/// exhausted and keeps returning `None`.
pub trait DocIterator {
    /// Current document, `None` when unpositioned or exhausted.
    fn doc_id(&self) -> Option<DocId>;

    /// Move to the next live document.
    fn next_doc(&mut self) -> Result<Option<DocId>>;

    /// Move to the first live document `>= target`.
    ///
    /// `target` must be greater than the current document.
    fn advance(&mut self, target: DocId) -> Result<Option<DocId>>;

    /// Term frequency in the current document.
    fn freq(&self) -> u32;

    /// Upper bound on the number of documents this cursor visits.
    fn cost(&self) -> u64;
}

/// A [`DocIterator`] that also walks positions within each document.
pub trait PositionsIterator: DocIterator {
    /// Next position in the current document. May be called at most
    /// [`freq`](DocIterator::freq) times per document.
    fn next_position(&mut self) -> Result<u32>;
}
