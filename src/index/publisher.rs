//! The index-side contract the flush queue publishes into.

use std::io::{Read, Write};
use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::DocId;
use crate::error::{Result, TesseraError};
use crate::index::deletes::{DeleteTerm, FrozenDeletes};
use crate::index::segment::{FlushedSegment, SegmentInfo};
use crate::storage::Storage;

/// Receives flushed segments and delete packets in publication order.
///
/// Implementations must make each call atomic with respect to the others;
/// the queue guarantees calls arrive one at a time and in ticket order.
pub trait SegmentPublisher: Send + Sync {
    /// Publish a flushed segment together with the global delete packet
    /// frozen when its flush was registered. Returns the segment's delete
    /// generation.
    fn publish_flushed_segment(
        &self,
        segment: &FlushedSegment,
        global_packet: &FrozenDeletes,
    ) -> Result<u64>;

    /// Publish a delete packet on its own. Returns its generation.
    fn publish_frozen_deletes(&self, packet: &FrozenDeletes) -> Result<u64>;
}

/// A delete packet with its assigned generation.
#[derive(Debug, Clone)]
pub struct PublishedDeletes {
    pub generation: u64,
    pub deletes: FrozenDeletes,
}

/// Serialized form of the published index state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub commit: u64,
    pub next_delete_gen: u64,
    pub segments: Vec<SegmentInfo>,
    pub delete_packets: Vec<SnapshotDeletes>,
}

/// Delete packet entry of an [`IndexSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDeletes {
    pub generation: u64,
    pub terms: Vec<DeleteTerm>,
    #[serde(default)]
    pub doc_ids: Vec<DocId>,
    pub segment_private: bool,
}

#[derive(Debug)]
struct StateInner {
    next_gen: u64,
    segments: Vec<SegmentInfo>,
    packets: Vec<PublishedDeletes>,
    commits: u64,
    closed: bool,
}

impl StateInner {
    fn push(&mut self, packet: &FrozenDeletes) -> u64 {
        let generation = self.next_gen;
        self.next_gen += 1;
        self.packets.push(PublishedDeletes {
            generation,
            deletes: packet.clone(),
        });
        generation
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(TesseraError::other("index state is closed"));
        }
        Ok(())
    }
}

/// In-process index state: the ordered list of published segments and the
/// stream of delete packets, each stamped with a strictly increasing
/// generation.
#[derive(Debug)]
pub struct IndexState {
    inner: Mutex<StateInner>,
}

impl Default for IndexState {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexState {
    pub fn new() -> Self {
        IndexState {
            inner: Mutex::new(StateInner {
                next_gen: 1,
                segments: Vec::new(),
                packets: Vec::new(),
                commits: 0,
                closed: false,
            }),
        }
    }

    /// Published segments in publication order.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.inner.lock().segments.clone()
    }

    /// Names of published segments in publication order.
    pub fn segment_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .segments
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    /// Published delete packets in generation order.
    pub fn delete_packets(&self) -> Vec<PublishedDeletes> {
        self.inner.lock().packets.clone()
    }

    /// Generation the next published item will receive.
    pub fn next_generation(&self) -> u64 {
        self.inner.lock().next_gen
    }

    /// Reject every further publication.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let inner = self.inner.lock();
        Self::snapshot_locked(&inner)
    }

    fn snapshot_locked(inner: &StateInner) -> IndexSnapshot {
        IndexSnapshot {
            commit: inner.commits,
            next_delete_gen: inner.next_gen,
            segments: inner.segments.clone(),
            delete_packets: inner
                .packets
                .iter()
                .map(|p| SnapshotDeletes {
                    generation: p.generation,
                    terms: p.deletes.terms().to_vec(),
                    doc_ids: p.deletes.doc_ids().to_vec(),
                    segment_private: p.deletes.is_segment_private(),
                })
                .collect(),
        }
    }

    /// Write the current state as `segments_<n>.json` and return the file
    /// name.
    pub fn commit(&self, storage: &Arc<dyn Storage>) -> Result<String> {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.commits += 1;
            Self::snapshot_locked(&inner)
        };
        // Serialization and I/O run without the state lock.
        let name = format!("segments_{}.json", snapshot.commit);

        let bytes = serde_json::to_vec_pretty(&snapshot)?;
        let mut output = storage.create_output(&name)?;
        output.write_all(&bytes)?;
        output.flush_and_sync()?;
        output.close()?;

        info!(
            "committed {} with {} segments (next delete gen {})",
            name,
            snapshot.segments.len(),
            snapshot.next_delete_gen
        );
        Ok(name)
    }

    /// Read a snapshot written by [`commit`](Self::commit).
    pub fn read_snapshot(storage: &Arc<dyn Storage>, name: &str) -> Result<IndexSnapshot> {
        let mut input = storage.open_input(name)?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl SegmentPublisher for IndexState {
    fn publish_flushed_segment(
        &self,
        segment: &FlushedSegment,
        global_packet: &FrozenDeletes,
    ) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        if inner.segments.iter().any(|s| s.name == segment.name()) {
            return Err(TesseraError::protocol(format!(
                "segment {} was already published",
                segment.name()
            )));
        }

        // Global deletes apply to the segments published before this one,
        // so they take the lower generation.
        if global_packet.any() {
            let generation = inner.push(global_packet);
            debug!("published global deletes gen={generation}");
        }

        let generation = match &segment.segment_deletes {
            Some(packet) if packet.any() => inner.push(packet),
            _ => {
                let generation = inner.next_gen;
                inner.next_gen += 1;
                generation
            }
        };

        let mut info = segment.segment_info.clone();
        info.buffered_deletes_gen = Some(generation);
        inner.segments.push(info);
        debug!(
            "published segment {} docs={} gen={}",
            segment.name(),
            segment.segment_info.doc_count,
            generation
        );
        Ok(generation)
    }

    fn publish_frozen_deletes(&self, packet: &FrozenDeletes) -> Result<u64> {
        let mut inner = self.inner.lock();
        inner.ensure_open()?;
        let generation = inner.push(packet);
        debug!("published frozen deletes gen={generation}");
        Ok(generation)
    }
}
