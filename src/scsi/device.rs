//! SCSI Device Management
//!
//! This module handles opening and closing the pass-through handle.

use crate::error::Result;
use tracing::debug;

#[cfg(windows)]
use std::ffi::CString;

#[cfg(windows)]
use winapi::{
    shared::ntdef::HANDLE,
    um::{
        errhandlingapi::GetLastError,
        fileapi::{CreateFileA, OPEN_EXISTING},
        handleapi::{CloseHandle, INVALID_HANDLE_VALUE},
        winnt::{FILE_SHARE_READ, FILE_SHARE_WRITE, GENERIC_READ, GENERIC_WRITE},
    },
};

use super::ScsiInterface;

/// Device handle wrapper that ensures proper resource cleanup
pub struct DeviceHandle {
    #[cfg(windows)]
    pub(crate) handle: HANDLE,
    pub(crate) device_path: String,
}

/// Expand short device names into Win32 device paths:
/// `D:` becomes `\\.\D:`, `PhysicalDrive1` and `CdRom0` get the `\\.\` prefix.
pub fn normalize_device_path(device_path: &str) -> String {
    if device_path.starts_with(r"\\.\") {
        return device_path.to_string();
    }
    let trimmed = device_path.trim_end_matches(['\\', '/']);
    let is_drive_letter = trimmed.len() == 2
        && trimmed.ends_with(':')
        && trimmed.chars().next().map_or(false, |c| c.is_ascii_alphabetic());
    let upper = trimmed.to_ascii_uppercase();
    if is_drive_letter || upper.starts_with("PHYSICALDRIVE") || upper.starts_with("CDROM") {
        format!(r"\\.\{}", trimmed)
    } else {
        device_path.to_string()
    }
}

impl ScsiInterface {
    /// Open a disk or optical drive for pass-through
    pub fn open_device(&mut self, device_path: &str) -> Result<()> {
        let full_path = normalize_device_path(device_path);
        debug!("Opening device: {}", full_path);

        #[cfg(windows)]
        {
            let path_cstring = CString::new(full_path.clone()).map_err(|e| {
                crate::error::RustDumpError::device(format!("Device path conversion error: {}", e))
            })?;

            unsafe {
                let handle = CreateFileA(
                    path_cstring.as_ptr(),
                    GENERIC_READ | GENERIC_WRITE,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    std::ptr::null_mut(),
                    OPEN_EXISTING,
                    0,
                    std::ptr::null_mut(),
                );

                if handle == INVALID_HANDLE_VALUE {
                    let error_code = GetLastError();
                    return Err(crate::error::RustDumpError::device(format!(
                        "Cannot open device {}: Windows error code 0x{:08X}",
                        full_path, error_code
                    )));
                }

                self.device_handle = Some(DeviceHandle {
                    handle,
                    device_path: full_path,
                });
            }

            debug!("Device opened successfully: {}", device_path);
            Ok(())
        }

        #[cfg(not(windows))]
        {
            let _ = &self.device_handle;
            Err(crate::error::RustDumpError::unsupported(format!(
                "SCSI pass-through to {} is only available on Windows",
                full_path
            )))
        }
    }
}

/// Implement Drop trait to ensure device handle is properly closed
impl Drop for DeviceHandle {
    fn drop(&mut self) {
        #[cfg(windows)]
        unsafe {
            if self.handle != INVALID_HANDLE_VALUE {
                CloseHandle(self.handle);
            }
        }
        debug!("Device handle closed: {}", self.device_path);
    }
}
