//! Random-access block stores that receive the image.

use crate::error::{Result, RustDumpError};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Random-access destination of dumped data.
pub trait Sink {
    /// Position the write cursor at `block * block_size`.
    fn seek(&mut self, block: u64, block_size: u32) -> Result<()>;

    /// Write at the cursor and advance it.
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn write_at_offset(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    fn write_at(&mut self, buf: &[u8], block: u64, block_size: u32) -> Result<()> {
        self.write_at_offset(buf, block * block_size as u64)
    }

    /// Read up to `buf.len()` bytes at `offset`, returns the byte count read.
    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize>;

    /// Current length in bytes.
    fn len(&mut self) -> Result<u64>;

    fn is_empty(&mut self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn close(&mut self) -> Result<()>;

    /// Fill `buf` completely from `offset` or fail.
    fn read_exact_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.read(&mut buf[done..], offset + done as u64)?;
            if n == 0 {
                return Err(RustDumpError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!(
                        "sink ended at offset {} while reading {} bytes",
                        offset + done as u64,
                        buf.len()
                    ),
                )));
            }
            done += n;
        }
        Ok(())
    }
}

/// Image file on disk. Opened without truncation so a resumed dump keeps
/// whatever earlier runs already wrote.
pub struct FileSink {
    file: File,
    path: PathBuf,
    closed: bool,
}

impl FileSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| {
                RustDumpError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Cannot open output {:?}: {}", path, e),
                ))
            })?;
        debug!("Opened sink {:?}", path);
        Ok(Self {
            file,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    /// Read-only view of a finished image, for re-checksumming.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            RustDumpError::Io(std::io::Error::new(
                e.kind(),
                format!("Cannot open image {:?}: {}", path, e),
            ))
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(RustDumpError::device(format!(
                "sink {:?} is already closed",
                self.path
            )));
        }
        Ok(())
    }
}

impl Sink for FileSink {
    fn seek(&mut self, block: u64, block_size: u32) -> Result<()> {
        self.ensure_open()?;
        self.file
            .seek(SeekFrom::Start(block * block_size as u64))?;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn write_at_offset(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.ensure_open()?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        self.ensure_open()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let n = self.file.read(buf)?;
        Ok(n)
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.file.flush()?;
            self.file.sync_all()?;
            self.closed = true;
            debug!("Closed sink {:?}", self.path);
        }
        Ok(())
    }
}

/// In-memory sink, grows on demand like a sparse file.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Vec<u8>,
    position: u64,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Sink for MemorySink {
    fn seek(&mut self, block: u64, block_size: u32) -> Result<()> {
        self.position = block * block_size as u64;
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let position = self.position;
        self.write_at_offset(buf, position)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_at_offset(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let start = offset as usize;
        if start >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn len(&mut self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}
