//! File and block-node backed device
//!
//! Reads a raw block device node (`/dev/sdb`, `/dev/mmcblk0`) or an existing
//! image file with ordinary positioned reads. There is no mode page support,
//! so persistent recovery is unavailable for this device.

use super::{BlockDevice, DeviceIdentity, ErrorRecoveryPage, ReadOutcome};
use crate::error::{Result, RustDumpError};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_FILE_BLOCK_SIZE: u32 = 512;

pub struct FileDevice {
    file: File,
    path: PathBuf,
    block_size: u32,
    size_bytes: u64,
    removable: bool,
}

impl FileDevice {
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(RustDumpError::block_size("block size must be non-zero"));
        }

        let mut file = File::open(path).map_err(|e| {
            RustDumpError::device(format!("Cannot open device {:?}: {}", path, e))
        })?;

        // metadata().len() is zero for block nodes, seeking to the end is not
        let size_bytes = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;

        if size_bytes % block_size as u64 != 0 {
            warn!(
                "Device size {} is not a multiple of block size {}, trailing {} bytes are ignored",
                size_bytes,
                block_size,
                size_bytes % block_size as u64
            );
        }

        debug!(
            "Opened file device {:?}: {} bytes, {} byte blocks",
            path, size_bytes, block_size
        );

        Ok(Self {
            file,
            path: path.to_path_buf(),
            block_size,
            size_bytes,
            removable: false,
        })
    }

    pub fn with_removable(mut self, removable: bool) -> Self {
        self.removable = removable;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileDevice {
    fn block_count(&mut self) -> Result<u64> {
        Ok(self.size_bytes / self.block_size as u64)
    }

    fn block_size(&mut self) -> Result<u32> {
        Ok(self.block_size)
    }

    fn identity(&self) -> DeviceIdentity {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        DeviceIdentity::new("", &name, "")
    }

    fn is_removable(&self) -> bool {
        self.removable
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome {
        let started = Instant::now();
        let length = count as usize * self.block_size as usize;
        let mut buffer = vec![0u8; length];

        let result = self
            .file
            .seek(SeekFrom::Start(start * self.block_size as u64))
            .and_then(|_| self.file.read_exact(&mut buffer));

        match result {
            Ok(()) => ReadOutcome::success(buffer, started.elapsed()),
            Err(e) => {
                debug!("Read of {} blocks at {} failed: {}", count, start, e);
                ReadOutcome::failure(Vec::new(), None, started.elapsed())
            }
        }
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        Err(RustDumpError::unsupported(
            "file devices have no error recovery mode page",
        ))
    }

    fn set_error_recovery_mode(&mut self, _page: &ErrorRecoveryPage) -> Result<()> {
        Err(RustDumpError::unsupported(
            "file devices have no error recovery mode page",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_blocks_from_image_file() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..2048u32).map(|i| (i / 512) as u8).collect();
        image.write_all(&data).unwrap();
        image.flush().unwrap();

        let mut device = FileDevice::open(image.path(), 512).unwrap();
        assert_eq!(device.block_count().unwrap(), 4);

        let outcome = device.read_blocks(2, 2);
        assert!(outcome.ok);
        assert_eq!(outcome.data.len(), 1024);
        assert!(outcome.data[..512].iter().all(|&b| b == 2));
        assert!(outcome.data[512..].iter().all(|&b| b == 3));
    }

    #[test]
    fn read_past_end_fails_without_panicking() {
        let mut image = tempfile::NamedTempFile::new().unwrap();
        image.write_all(&[0u8; 1024]).unwrap();
        image.flush().unwrap();

        let mut device = FileDevice::open(image.path(), 512).unwrap();
        let outcome = device.read_blocks(1, 4);
        assert!(!outcome.ok);
        assert!(device.error_recovery_mode().is_err());
    }
}
