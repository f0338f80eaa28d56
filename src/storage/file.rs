//! Directory-backed storage backend.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};
use crate::storage::{Storage, StorageInput, StorageOutput};

/// Configuration for [`FileStorage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    /// Directory holding the index files.
    pub path: PathBuf,

    /// Buffer size for readers and writers, in bytes.
    pub buffer_size: usize,

    /// Call `fsync` when an output is closed.
    pub sync_on_close: bool,
}

impl FileStorageConfig {
    /// Create a configuration rooted at `path` with default buffering.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStorageConfig {
            path: path.as_ref().to_path_buf(),
            buffer_size: 64 * 1024,
            sync_on_close: true,
        }
    }
}

/// Storage mapping each file onto a file inside one directory.
#[derive(Debug)]
pub struct FileStorage {
    directory: PathBuf,
    config: FileStorageConfig,
}

impl FileStorage {
    /// Open (creating if necessary) a directory-backed storage.
    pub fn new<P: AsRef<Path>>(directory: P, config: FileStorageConfig) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(FileStorage { directory, config })
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(TesseraError::invalid_argument(format!(
                "Invalid file name: {name:?}"
            )));
        }
        Ok(self.directory.join(name))
    }
}

impl Storage for FileStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        let path = self.path_of(name)?;
        Ok(Box::new(FileInput::open(path, 0, self.config.buffer_size)?))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        let path = self.path_of(name)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Box::new(FileOutput {
            path,
            writer: Some(BufWriter::with_capacity(self.config.buffer_size, file)),
            position: 0,
            sync_on_close: self.config.sync_on_close,
        }))
    }

    fn file_exists(&self, name: &str) -> bool {
        self.path_of(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        Ok(fs::metadata(self.path_of(name)?)?.len())
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        fs::remove_file(self.path_of(name)?)?;
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

/// Buffered read cursor over a file.
#[derive(Debug)]
pub struct FileInput {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    position: u64,
    size: u64,
    buffer_size: usize,
}

impl FileInput {
    fn open(path: PathBuf, position: u64, buffer_size: usize) -> Result<Self> {
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::with_capacity(buffer_size, file);
        if position != 0 {
            reader.seek(SeekFrom::Start(position))?;
        }
        Ok(FileInput {
            path,
            reader: Some(reader),
            position,
            size,
            buffer_size,
        })
    }

    fn reader(&mut self) -> io::Result<&mut BufReader<File>> {
        let path = &self.path;
        self.reader
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} is closed", path.display())))
    }
}

impl Read for FileInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader()?.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for FileInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        // BufReader keeps its buffer when the relative seek stays inside it.
        let position = match pos {
            SeekFrom::Start(offset) => {
                let delta = offset as i64 - self.position as i64;
                self.reader()?.seek_relative(delta)?;
                offset
            }
            other => self.reader()?.seek(other)?,
        };
        self.position = position;
        Ok(position)
    }
}

impl StorageInput for FileInput {
    fn size(&self) -> u64 {
        self.size
    }

    fn file_pointer(&self) -> u64 {
        self.position
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(FileInput::open(
            self.path.clone(),
            self.position,
            self.buffer_size,
        )?))
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }
}

/// Buffered append-only file writer.
#[derive(Debug)]
pub struct FileOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    position: u64,
    sync_on_close: bool,
}

impl FileOutput {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} is closed", path.display())))
    }
}

impl Write for FileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer()?.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl StorageOutput for FileOutput {
    fn file_pointer(&self) -> u64 {
        self.position
    }

    fn flush_and_sync(&mut self) -> Result<()> {
        let writer = self.writer()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            if self.sync_on_close {
                writer.get_ref().sync_all()?;
            }
        }
        Ok(())
    }
}
