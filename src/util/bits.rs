//! Per-document liveness masks.

use bit_vec::BitVec;

use crate::codec::DocId;

/// Random-access view over a set of per-document bits.
///
/// Postings enumerators consult a `Bits` to skip documents that were deleted
/// after the segment was written: a document is yielded only when `get`
/// returns `true` for it.
pub trait Bits: Send + Sync + std::fmt::Debug {
    /// Returns the bit for `index`. Out-of-range indexes read as `false`.
    fn get(&self, index: usize) -> bool;

    /// Number of addressable bits.
    fn len(&self) -> usize;

    /// Whether the mask addresses no documents at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fixed-size liveness mask where a set bit means "document is live".
#[derive(Debug, Clone)]
pub struct LiveDocs {
    bits: BitVec,
    deleted: usize,
}

impl LiveDocs {
    /// Create a mask for `max_doc` documents, all of them live.
    pub fn all_live(max_doc: usize) -> Self {
        LiveDocs {
            bits: BitVec::from_elem(max_doc, true),
            deleted: 0,
        }
    }

    /// Mark `doc` as deleted. Returns `true` if it was live before.
    pub fn delete(&mut self, doc: DocId) -> bool {
        let index = doc as usize;
        match self.bits.get(index) {
            Some(true) => {
                self.bits.set(index, false);
                self.deleted += 1;
                true
            }
            _ => false,
        }
    }

    /// Number of deleted documents.
    pub fn deleted_count(&self) -> usize {
        self.deleted
    }

    /// Number of live documents.
    pub fn live_count(&self) -> usize {
        self.bits.len() - self.deleted
    }
}

impl Bits for LiveDocs {
    fn get(&self, index: usize) -> bool {
        self.bits.get(index).unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.bits.len()
    }
}
