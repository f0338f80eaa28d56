//! Buffered and frozen delete packets.
//!
//! Deletes are collected in a mutable [`BufferedDeletes`] and frozen into an
//! immutable, cheaply clonable [`FrozenDeletes`] packet when a flush starts.
//! The global [`DeleteQueue`] collects deletes that apply to every segment
//! already in the index.

use std::sync::Arc;

use ahash::AHashSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::DocId;

/// A delete-by-term: every document containing `term` in `field`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeleteTerm {
    pub field: String,
    pub term: Vec<u8>,
}

impl DeleteTerm {
    pub fn new(field: impl Into<String>, term: impl Into<Vec<u8>>) -> Self {
        DeleteTerm {
            field: field.into(),
            term: term.into(),
        }
    }
}

/// Mutable delete buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferedDeletes {
    terms: AHashSet<DeleteTerm>,
    doc_ids: Vec<DocId>,
}

impl BufferedDeletes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, term: DeleteTerm) {
        self.terms.insert(term);
    }

    /// Delete a document by its segment-local id.
    pub fn add_doc_id(&mut self, doc_id: DocId) {
        self.doc_ids.push(doc_id);
    }

    pub fn any(&self) -> bool {
        !self.terms.is_empty() || !self.doc_ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len() + self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.any()
    }

    /// Drain the buffer into an immutable packet.
    pub fn freeze(&mut self, segment_private: bool) -> FrozenDeletes {
        let mut terms: Vec<DeleteTerm> = self.terms.drain().collect();
        terms.sort();
        let mut doc_ids = std::mem::take(&mut self.doc_ids);
        doc_ids.sort_unstable();
        doc_ids.dedup();
        FrozenDeletes {
            inner: Arc::new(FrozenInner {
                terms,
                doc_ids,
                segment_private,
            }),
        }
    }
}

#[derive(Debug)]
struct FrozenInner {
    terms: Vec<DeleteTerm>,
    doc_ids: Vec<DocId>,
    segment_private: bool,
}

/// Immutable delete packet. Clones share the same data.
#[derive(Debug, Clone)]
pub struct FrozenDeletes {
    inner: Arc<FrozenInner>,
}

impl FrozenDeletes {
    /// A packet that deletes nothing.
    pub fn empty() -> Self {
        BufferedDeletes::default().freeze(false)
    }

    /// Whether the packet deletes anything.
    pub fn any(&self) -> bool {
        !self.inner.terms.is_empty() || !self.inner.doc_ids.is_empty()
    }

    /// Delete terms, sorted.
    pub fn terms(&self) -> &[DeleteTerm] {
        &self.inner.terms
    }

    /// Segment-local doc ids, sorted and deduplicated.
    pub fn doc_ids(&self) -> &[DocId] {
        &self.inner.doc_ids
    }

    /// Whether the packet only applies to the segment it was frozen with.
    pub fn is_segment_private(&self) -> bool {
        self.inner.segment_private
    }

    /// Whether two handles share the same packet.
    pub fn ptr_eq(&self, other: &FrozenDeletes) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Global delete buffer shared by all writer threads.
#[derive(Debug, Default)]
pub struct DeleteQueue {
    buffered: Mutex<BufferedDeletes>,
}

impl DeleteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete_term(&self, term: DeleteTerm) {
        self.buffered.lock().add_term(term);
    }

    pub fn pending(&self) -> usize {
        self.buffered.lock().len()
    }

    /// Freeze everything buffered since the last call.
    pub fn freeze_global_buffer(&self) -> FrozenDeletes {
        self.buffered.lock().freeze(false)
    }
}
