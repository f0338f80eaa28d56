//! Segment flushing and ordered publication.
//!
//! Several writer threads may flush in-memory segments concurrently. Each
//! flush registers a [`FlushTicket`](flush_ticket::FlushTicket) in the
//! [`FlushQueue`](flush_queue::FlushQueue) before it starts, and the queue
//! publishes tickets into the index strictly in registration order, whatever
//! order the flushes finish in.

pub mod deletes;
pub mod flush_queue;
pub mod flush_ticket;
pub mod publisher;
pub mod segment;

pub use deletes::{BufferedDeletes, DeleteQueue, DeleteTerm, FrozenDeletes};
pub use flush_queue::{FlushProducer, FlushQueue};
pub use flush_ticket::{FlushTicket, PublishOutcome, TicketStatus};
pub use publisher::{IndexSnapshot, IndexState, SegmentPublisher};
pub use segment::{FlushedSegment, SegmentInfo};
