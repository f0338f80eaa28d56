//! On-disk codec for inverted-index postings.
//!
//! The layout follows the Lucene 4.1 block postings format: document deltas
//! and frequencies are bit-packed in blocks of [`BLOCK_SIZE`] values, the
//! remainder of each term is written as vInts, and long posting lists carry a
//! multi-level skip list so readers can jump over whole blocks.

pub mod field_infos;
pub mod for_util;
pub mod header;
pub mod postings;
pub mod skip;

/// Document identifier within a segment.
pub type DocId = u32;

/// Wire-level "no more documents" marker. Valid document ids are strictly
/// below this value; the enumerators report exhaustion as `None` instead.
pub const NO_MORE_DOCS: DocId = i32::MAX as DocId;

/// Number of values in one packed block. Writer and reader must agree on it.
pub const BLOCK_SIZE: usize = 128;

/// Build a per-segment file name: `<segment>[_<suffix>][.<ext>]`.
pub fn segment_file_name(segment_name: &str, segment_suffix: &str, ext: &str) -> String {
    let mut name = String::from(segment_name);
    if !segment_suffix.is_empty() {
        name.push('_');
        name.push_str(segment_suffix);
    }
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}
