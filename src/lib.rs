//! # Tessera
//!
//! Building blocks for the write path of an inverted index.
//!
//! ## Features
//!
//! - Block-compressed postings codec: packed doc/freq/position blocks with
//!   multi-level skip lists and checksummed streams
//! - Forward-only docs and positions enumerators with live-docs filtering
//! - Ordered publication of concurrently flushed segments and delete packets
//! - Pluggable storage backends (memory and file system)
// Core modules
pub mod codec;
pub mod error;
pub mod index;
pub mod storage;
pub mod util;

// Re-exports for the public API
pub use codec::field_infos::{FieldInfo, FieldInfos, IndexOptions};
pub use codec::postings::{
    BlockDocsEnum, BlockPositionsEnum, BlockTermState, DocIterator, DocsFlags, PositionsIterator,
    PostingsReader, PostingsWriter,
};
pub use codec::{BLOCK_SIZE, DocId, NO_MORE_DOCS};
pub use error::{Result, TesseraError};
pub use index::{
    DeleteQueue, DeleteTerm, FlushProducer, FlushQueue, FlushTicket, FlushedSegment, FrozenDeletes,
    IndexState, PublishOutcome, SegmentInfo, SegmentPublisher,
};
pub use storage::{Storage, StorageConfig, StorageFactory};
pub use util::bits::{Bits, LiveDocs};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
