//! Segment descriptors.

use serde::{Deserialize, Serialize};

use crate::index::deletes::FrozenDeletes;

/// Identity and size of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    /// Segment name, the prefix of all its files.
    pub name: String,

    /// Number of documents in the segment.
    pub doc_count: u32,

    /// Delete generation assigned when the segment was published. Delete
    /// packets with a higher generation apply to this segment.
    #[serde(default)]
    pub buffered_deletes_gen: Option<u64>,
}

impl SegmentInfo {
    pub fn new(name: impl Into<String>, doc_count: u32) -> Self {
        SegmentInfo {
            name: name.into(),
            doc_count,
            buffered_deletes_gen: None,
        }
    }
}

/// Result of flushing one in-memory segment.
#[derive(Debug, Clone)]
pub struct FlushedSegment {
    pub segment_info: SegmentInfo,

    /// Deletes buffered against this segment's own documents while it was
    /// being built.
    pub segment_deletes: Option<FrozenDeletes>,
}

impl FlushedSegment {
    pub fn new(segment_info: SegmentInfo, segment_deletes: Option<FrozenDeletes>) -> Self {
        FlushedSegment {
            segment_info,
            segment_deletes,
        }
    }

    pub fn name(&self) -> &str {
        &self.segment_info.name
    }
}
