//! Ordered publication of concurrently flushed segments.
//!
//! Tickets are handed out in the order flushes register and published in
//! that same order. A flush that finishes early waits in the queue until
//! every ticket ahead of it is ready; a flush that fails still holds its slot
//! so the deletes frozen with it are published in order.
//!
//! Locking: the primary lock guards the ticket deque and is only held
//! briefly. Purging runs under a separate purge lock so registration is
//! never blocked by a slow publisher. The primary lock is always taken
//! before a ticket's own lock.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::error::{Result, TesseraError};
use crate::index::deletes::{DeleteQueue, FrozenDeletes};
use crate::index::flush_ticket::FlushTicket;
use crate::index::publisher::SegmentPublisher;
use crate::index::segment::FlushedSegment;

/// A per-thread writer about to flush.
pub trait FlushProducer {
    /// Freeze the deletes that must be published with this flush. Called
    /// under the queue's primary lock so freeze order equals ticket order.
    fn prepare_flush(&mut self) -> Result<FrozenDeletes>;
}

#[derive(Debug, Default)]
struct QueueInner {
    tickets: VecDeque<Arc<FlushTicket>>,
    next_seq: u64,
}

/// FIFO of flush tickets.
#[derive(Debug, Default)]
pub struct FlushQueue {
    inner: Mutex<QueueInner>,
    purge_lock: Mutex<()>,
    ticket_count: AtomicUsize,
}

impl FlushQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn inc_tickets(&self) {
        let previous = self.ticket_count.fetch_add(1, Ordering::SeqCst);
        debug_assert!(previous < usize::MAX);
    }

    fn dec_tickets(&self) {
        let previous = self.ticket_count.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0);
    }

    /// Register a flush. The producer's deletes are frozen while the queue
    /// is locked.
    pub fn add_flush_ticket(&self, producer: &mut dyn FlushProducer) -> Result<Arc<FlushTicket>> {
        let mut inner = self.inner.lock();
        // Counted before freezing so has_tickets never misses a registration
        // in progress.
        self.inc_tickets();
        let frozen = match producer.prepare_flush() {
            Ok(frozen) => frozen,
            Err(err) => {
                self.dec_tickets();
                return Err(err);
            }
        };
        let ticket = Arc::new(FlushTicket::for_segment(inner.next_seq, frozen));
        inner.next_seq += 1;
        inner.tickets.push_back(ticket.clone());
        debug!("registered flush ticket {}", ticket.seq());
        Ok(ticket)
    }

    /// Register a deletes-only ticket carrying the global delete buffer.
    pub fn add_deletes(&self, delete_queue: &DeleteQueue) -> Result<Arc<FlushTicket>> {
        let mut inner = self.inner.lock();
        self.inc_tickets();
        let frozen = delete_queue.freeze_global_buffer();
        let ticket = Arc::new(FlushTicket::for_global_deletes(inner.next_seq, frozen));
        inner.next_seq += 1;
        inner.tickets.push_back(ticket.clone());
        debug!("registered global deletes ticket {}", ticket.seq());
        Ok(ticket)
    }

    /// Record the segment produced by a ticket's flush.
    pub fn add_segment(&self, ticket: &FlushTicket, segment: FlushedSegment) -> Result<()> {
        let _inner = self.inner.lock();
        ticket.set_segment(segment)
    }

    /// Record that a ticket's flush failed.
    pub fn mark_ticket_failed(&self, ticket: &FlushTicket) -> Result<()> {
        let _inner = self.inner.lock();
        ticket.fail()
    }

    /// Whether any registered ticket has not been published yet.
    pub fn has_tickets(&self) -> bool {
        self.ticket_count.load(Ordering::SeqCst) != 0
    }

    pub fn ticket_count(&self) -> usize {
        self.ticket_count.load(Ordering::SeqCst)
    }

    /// Publish ready tickets from the head, waiting for any concurrent purge
    /// to finish first. Returns how many tickets were published.
    pub fn force_purge(&self, publisher: &dyn SegmentPublisher) -> Result<usize> {
        let _purge = self.purge_lock.lock();
        self.inner_purge(publisher)
    }

    /// Like [`force_purge`](Self::force_purge) but returns `Ok(0)` at once
    /// when another thread is already purging.
    pub fn try_purge(&self, publisher: &dyn SegmentPublisher) -> Result<usize> {
        match self.purge_lock.try_lock() {
            Some(_purge) => self.inner_purge(publisher),
            None => Ok(0),
        }
    }

    fn inner_purge(&self, publisher: &dyn SegmentPublisher) -> Result<usize> {
        let mut published = 0;
        loop {
            let head = {
                let inner = self.inner.lock();
                match inner.tickets.front() {
                    Some(ticket) if ticket.can_publish() => ticket.clone(),
                    _ => break,
                }
            };

            // Publish without the primary lock so flushes can keep
            // registering.
            if let Err(err) = head.publish(publisher) {
                warn!(
                    "publishing flush ticket {} failed after {} published: {}",
                    head.seq(),
                    published,
                    err
                );
                return Err(TesseraError::PurgeAborted {
                    published,
                    source: Box::new(err),
                });
            }

            let mut inner = self.inner.lock();
            match inner.tickets.pop_front() {
                Some(removed) if Arc::ptr_eq(&removed, &head) => self.dec_tickets(),
                other => {
                    if let Some(removed) = other {
                        inner.tickets.push_front(removed);
                    }
                    return Err(TesseraError::protocol(format!(
                        "queue head changed while ticket {} was being published",
                        head.seq()
                    )));
                }
            }
            published += 1;
        }

        if published > 0 {
            debug!("purged {published} flush ticket(s)");
        }
        Ok(published)
    }
}
