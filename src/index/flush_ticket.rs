//! A reservation for one publication slot in the flush queue.

use log::debug;
use parking_lot::Mutex;

use crate::error::{Result, TesseraError};
use crate::index::deletes::FrozenDeletes;
use crate::index::publisher::SegmentPublisher;
use crate::index::segment::FlushedSegment;

#[derive(Debug)]
enum TicketState {
    /// Flush still running.
    Pending,
    /// Flush finished with a segment.
    Flushed(Box<FlushedSegment>),
    /// Flush failed; only the frozen deletes remain to publish.
    Failed,
    /// Deletes-only ticket, ready from registration.
    GlobalDeletes,
    Published,
}

/// Coarse lifecycle of a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Pending,
    Ready,
    Published,
}

/// What publishing a ticket produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A segment was published with this delete generation.
    Segment { name: String, delete_gen: u64 },
    /// Only a delete packet was published.
    Deletes { delete_gen: u64 },
    /// A failed flush with no deletes; nothing reached the index.
    Nothing,
}

/// Ticket for one flush (or one global delete packet).
///
/// The frozen deletes are fixed at registration. The outcome is set exactly
/// once, through the owning queue, and the ticket is published at most once.
#[derive(Debug)]
pub struct FlushTicket {
    seq: u64,
    frozen_deletes: FrozenDeletes,
    state: Mutex<TicketState>,
}

impl FlushTicket {
    pub(crate) fn for_segment(seq: u64, frozen_deletes: FrozenDeletes) -> Self {
        FlushTicket {
            seq,
            frozen_deletes,
            state: Mutex::new(TicketState::Pending),
        }
    }

    pub(crate) fn for_global_deletes(seq: u64, frozen_deletes: FrozenDeletes) -> Self {
        FlushTicket {
            seq,
            frozen_deletes,
            state: Mutex::new(TicketState::GlobalDeletes),
        }
    }

    /// Registration order within the queue.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn frozen_deletes(&self) -> &FrozenDeletes {
        &self.frozen_deletes
    }

    pub fn status(&self) -> TicketStatus {
        match &*self.state.lock() {
            TicketState::Pending => TicketStatus::Pending,
            TicketState::Published => TicketStatus::Published,
            _ => TicketStatus::Ready,
        }
    }

    /// Ready to publish and not yet published.
    pub fn can_publish(&self) -> bool {
        self.status() == TicketStatus::Ready
    }

    pub fn is_published(&self) -> bool {
        self.status() == TicketStatus::Published
    }

    pub fn is_failed(&self) -> bool {
        matches!(&*self.state.lock(), TicketState::Failed)
    }

    pub(crate) fn set_segment(&self, segment: FlushedSegment) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            TicketState::Pending => {
                *state = TicketState::Flushed(Box::new(segment));
                Ok(())
            }
            TicketState::Failed => Err(TesseraError::protocol(format!(
                "ticket {} already failed; cannot attach segment {}",
                self.seq,
                segment.name()
            ))),
            _ => Err(TesseraError::protocol(format!(
                "ticket {} already has an outcome; cannot attach segment {}",
                self.seq,
                segment.name()
            ))),
        }
    }

    /// Mark the flush failed. Failing an already failed ticket is a no-op.
    pub(crate) fn fail(&self) -> Result<()> {
        let mut state = self.state.lock();
        match &*state {
            TicketState::Pending => {
                *state = TicketState::Failed;
                Ok(())
            }
            TicketState::Failed => Ok(()),
            _ => Err(TesseraError::protocol(format!(
                "ticket {} already has an outcome; cannot mark it failed",
                self.seq
            ))),
        }
    }

    /// Publish the ticket's outcome.
    ///
    /// The ticket lock is held while the publisher runs. On error the ticket
    /// stays ready so a later purge retries it.
    pub fn publish(&self, publisher: &dyn SegmentPublisher) -> Result<PublishOutcome> {
        let mut state = self.state.lock();
        let outcome = match &*state {
            TicketState::Published => {
                return Err(TesseraError::protocol(format!(
                    "ticket {} was already published - can not publish twice",
                    self.seq
                )));
            }
            TicketState::Pending => {
                return Err(TesseraError::protocol(format!(
                    "ticket {} is not ready: its flush has neither completed nor failed",
                    self.seq
                )));
            }
            TicketState::Flushed(segment) => {
                let delete_gen =
                    publisher.publish_flushed_segment(segment, &self.frozen_deletes)?;
                debug!(
                    "ticket {} published segment {} gen={}",
                    self.seq,
                    segment.name(),
                    delete_gen
                );
                PublishOutcome::Segment {
                    name: segment.name().to_string(),
                    delete_gen,
                }
            }
            TicketState::Failed | TicketState::GlobalDeletes => {
                if self.frozen_deletes.any() {
                    let delete_gen = publisher.publish_frozen_deletes(&self.frozen_deletes)?;
                    debug!("ticket {} published deletes gen={}", self.seq, delete_gen);
                    PublishOutcome::Deletes { delete_gen }
                } else {
                    debug!("ticket {} had nothing to publish", self.seq);
                    PublishOutcome::Nothing
                }
            }
        };
        *state = TicketState::Published;
        Ok(outcome)
    }
}
