//! Storage abstraction for index files.
//!
//! A [`Storage`] is a flat namespace of named byte files. Readers obtain
//! [`StorageInput`] cursors that can be cloned into independent cursors over
//! the same bytes; writers obtain append-only [`StorageOutput`] streams.
//!
//! Two backends are provided: [`memory::MemoryStorage`] keeps files in a
//! shared map, [`file::FileStorage`] maps them onto a directory.

pub mod file;
pub mod memory;
pub mod structured;

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::file::{FileStorage, FileStorageConfig};
use crate::storage::memory::{MemoryStorage, MemoryStorageConfig};
use crate::storage::structured::{ChecksumOutput, StructReader, StructWriter};

/// A readable, seekable file handle.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Total length of the file in bytes.
    fn size(&self) -> u64;

    /// Current read position.
    fn file_pointer(&self) -> u64;

    /// Open an independent cursor over the same file at the same position.
    ///
    /// The clone has its own position; seeking one never moves the other.
    fn clone_input(&self) -> Result<Box<dyn StorageInput>>;

    /// Release the handle. Further reads fail.
    fn close(&mut self) -> Result<()>;
}

/// An append-only file handle.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Number of bytes written so far.
    fn file_pointer(&self) -> u64;

    /// Flush buffered bytes and make them durable.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Flush and release the handle. Further writes fail.
    fn close(&mut self) -> Result<()>;
}

impl<T: StorageOutput + ?Sized> StorageOutput for Box<T> {
    fn file_pointer(&self) -> u64 {
        (**self).file_pointer()
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        (**self).flush_and_sync()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// A flat namespace of named files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open an existing file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check whether a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Length of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Remove a file.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all file names.
    fn list_files(&self) -> Result<Vec<String>>;
}

/// Structured reader over a storage file, the input type used by the codecs.
pub type IndexInput = StructReader<Box<dyn StorageInput>>;

/// Structured, checksummed writer over a storage file, the output type used
/// by the codecs.
pub type IndexOutput = StructWriter<ChecksumOutput<Box<dyn StorageOutput>>>;

/// Configuration for creating a storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StorageConfig {
    /// In-memory storage.
    Memory(MemoryStorageConfig),
    /// Directory-backed storage.
    File(FileStorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Memory(MemoryStorageConfig::default())
    }
}

/// Factory for storage backends.
pub struct StorageFactory;

impl StorageFactory {
    /// Create a storage backend from its configuration.
    pub fn create(config: StorageConfig) -> Result<Arc<dyn Storage>> {
        match config {
            StorageConfig::Memory(memory_config) => {
                Ok(Arc::new(MemoryStorage::new(memory_config)))
            }
            StorageConfig::File(file_config) => {
                let directory = file_config.path.clone();
                Ok(Arc::new(FileStorage::new(directory, file_config)?))
            }
        }
    }
}

/// Open `name` as a structured [`IndexInput`].
pub fn open_index_input(storage: &dyn Storage, name: &str) -> Result<IndexInput> {
    Ok(StructReader::new(storage.open_input(name)?))
}

/// Create `name` as a checksummed [`IndexOutput`].
pub fn create_index_output(storage: &dyn Storage, name: &str) -> Result<IndexOutput> {
    Ok(StructWriter::new(ChecksumOutput::new(
        storage.create_output(name)?,
    )))
}
