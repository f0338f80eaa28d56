//! Error types for Tessera.
//!
//! All fallible operations in the crate return [`Result`], whose error type
//! distinguishes storage failures from on-disk format disagreements and from
//! programming errors in the flush protocol.

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// Underlying storage read, write or seek failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A codec header name or magic did not match what the reader expects.
    #[error("Format mismatch in {resource}: {message}")]
    FormatMismatch { resource: String, message: String },

    /// A stream was written by an incompatible codec version.
    #[error("Version mismatch in {resource}: got {actual}, expected {min}..={max}")]
    VersionMismatch {
        resource: String,
        actual: i32,
        min: i32,
        max: i32,
    },

    /// The writer and reader disagree on the postings block size.
    #[error("index-time BLOCK_SIZE ({index_time}) != read-time BLOCK_SIZE ({read_time})")]
    BlockSizeMismatch { index_time: u32, read_time: u32 },

    /// The on-disk data is structurally impossible or fails its checksum.
    #[error("Corrupt index in {resource}: {message}")]
    Corrupt { resource: String, message: String },

    /// A flush protocol rule was broken by the caller.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// A caller supplied an argument outside the operation's contract.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A purge pass stopped because publishing the head ticket failed.
    #[error("Purge aborted after publishing {published} ticket(s): {source}")]
    PurgeAborted {
        published: usize,
        #[source]
        source: Box<TesseraError>,
    },

    /// JSON serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new format mismatch error.
    pub fn format_mismatch<R: Into<String>, S: Into<String>>(resource: R, msg: S) -> Self {
        TesseraError::FormatMismatch {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a new corrupt index error.
    pub fn corrupt<R: Into<String>, S: Into<String>>(resource: R, msg: S) -> Self {
        TesseraError::Corrupt {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a new protocol violation error.
    pub fn protocol<S: Into<String>>(msg: S) -> Self {
        TesseraError::ProtocolViolation(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }

    /// Whether this error reports a broken caller contract rather than bad data or I/O.
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            TesseraError::ProtocolViolation(_) | TesseraError::InvalidArgument(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::format_mismatch("_0.doc", "codec mismatch");
        assert_eq!(
            error.to_string(),
            "Format mismatch in _0.doc: codec mismatch"
        );

        let error = TesseraError::protocol("ticket was already published");
        assert!(error.is_programming_error());

        let error = TesseraError::BlockSizeMismatch {
            index_time: 64,
            read_time: 128,
        };
        assert_eq!(
            error.to_string(),
            "index-time BLOCK_SIZE (64) != read-time BLOCK_SIZE (128)"
        );
        assert!(!error.is_programming_error());
    }

    #[test]
    fn test_error_from_io() {
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let error: TesseraError = io_error.into();

        match error {
            TesseraError::Io(_) => {} // Expected
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_purge_aborted_keeps_source() {
        let error = TesseraError::PurgeAborted {
            published: 2,
            source: Box::new(TesseraError::other("writer closed")),
        };
        assert_eq!(
            error.to_string(),
            "Purge aborted after publishing 2 ticket(s): Error: writer closed"
        );
        assert!(std::error::Error::source(&error).is_some());
    }
}
