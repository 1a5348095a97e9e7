//! SCSI Core Implementation
//!
//! This module contains the ScsiInterface struct and core IO control logic.

use crate::error::Result;
use std::time::{Duration, Instant};
use tracing::debug;

#[cfg(windows)]
use tracing::warn;

#[cfg(windows)]
use winapi::{
    shared::{
        minwindef::{DWORD, UCHAR, ULONG, USHORT},
        ntdef::PVOID,
    },
    um::{errhandlingapi::GetLastError, ioapiset::DeviceIoControl},
};

use super::device::DeviceHandle;
use super::sense::SenseInfo;

#[cfg(windows)]
use super::constants::*;
#[cfg(windows)]
use super::ffi::ScsiPassThroughDirect;

/// Outcome of one pass-through command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Transport succeeded and the target answered GOOD
    pub ok: bool,
    pub scsi_status: u8,
    pub sense: Option<SenseInfo>,
    pub duration: Duration,
}

impl CommandResult {
    pub fn failure_reason(&self) -> String {
        match &self.sense {
            Some(sense) => sense.to_string(),
            None => format!("SCSI status 0x{:02X} without sense data", self.scsi_status),
        }
    }
}

/// SCSI operation structure that encapsulates low-level SCSI commands
pub struct ScsiInterface {
    pub(crate) device_handle: Option<DeviceHandle>,
}

impl Default for ScsiInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl ScsiInterface {
    /// Create new SCSI interface instance
    pub fn new() -> Self {
        Self {
            device_handle: None,
        }
    }

    /// Send one CDB through SCSI_PASS_THROUGH_DIRECT. Transport problems are
    /// errors; a CHECK CONDITION comes back as a result with `ok == false`.
    pub fn scsi_io_control(
        &self,
        cdb: &[u8],
        mut data_buffer: Option<&mut [u8]>,
        data_in: u8,
        timeout: u32,
    ) -> Result<CommandResult> {
        let started = Instant::now();

        #[cfg(windows)]
        {
            let device = self
                .device_handle
                .as_ref()
                .ok_or_else(|| crate::error::RustDumpError::scsi("Device not opened"))?;

            let buffer_length = data_buffer.as_ref().map_or(0, |buf| buf.len()) as ULONG;
            let data_ptr = data_buffer
                .as_mut()
                .map_or(std::ptr::null_mut(), |buf| buf.as_mut_ptr() as PVOID);

            // Create SCSI Pass Through Direct buffer, sense bytes follow the struct
            let mut scsi_buffer =
                vec![0u8; std::mem::size_of::<ScsiPassThroughDirect>() + SENSE_INFO_LEN];

            let (transport_ok, scsi_status, sense_bytes) = unsafe {
                let scsi_direct = scsi_buffer.as_mut_ptr() as *mut ScsiPassThroughDirect;
                std::ptr::write_bytes(scsi_direct, 0, 1);

                (*scsi_direct).length = std::mem::size_of::<ScsiPassThroughDirect>() as USHORT;
                (*scsi_direct).cdb_length = cdb.len() as UCHAR;
                (*scsi_direct).data_buffer = data_ptr;
                (*scsi_direct).sense_info_length = SENSE_INFO_LEN as UCHAR;
                (*scsi_direct).sense_info_offset =
                    std::mem::size_of::<ScsiPassThroughDirect>() as ULONG;
                (*scsi_direct).data_transfer_length = buffer_length;
                (*scsi_direct).timeout_value = timeout;
                (*scsi_direct).data_in = data_in;

                std::ptr::copy_nonoverlapping(
                    cdb.as_ptr(),
                    (*scsi_direct).cdb.as_mut_ptr(),
                    cdb.len().min(16),
                );

                let mut bytes_returned: DWORD = 0;
                let transport_ok = DeviceIoControl(
                    device.handle,
                    IOCTL_SCSI_PASS_THROUGH_DIRECT,
                    scsi_buffer.as_mut_ptr() as PVOID,
                    scsi_buffer.len() as DWORD,
                    scsi_buffer.as_mut_ptr() as PVOID,
                    scsi_buffer.len() as DWORD,
                    &mut bytes_returned,
                    std::ptr::null_mut(),
                ) != 0;

                if !transport_ok {
                    let error_code = GetLastError();
                    warn!(
                        "SCSI command failed: Windows error code 0x{:08X}, CDB: {:02X?}",
                        error_code, cdb
                    );
                }

                let status = (*scsi_direct).scsi_status;
                let mut sense = [0u8; SENSE_INFO_LEN];
                std::ptr::copy_nonoverlapping(
                    scsi_buffer
                        .as_ptr()
                        .add(std::mem::size_of::<ScsiPassThroughDirect>()),
                    sense.as_mut_ptr(),
                    SENSE_INFO_LEN,
                );
                (transport_ok, status, sense)
            };

            let result = CommandResult {
                ok: transport_ok && scsi_status == SCSI_STATUS_GOOD,
                scsi_status,
                sense: SenseInfo::parse(&sense_bytes),
                duration: started.elapsed(),
            };
            if !result.ok {
                debug!(
                    "CDB {:02X?} failed: {}",
                    cdb,
                    result.failure_reason()
                );
            }
            Ok(result)
        }

        #[cfg(not(windows))]
        {
            // Use parameters on non-Windows platforms to avoid warnings
            let _ = (cdb, data_buffer.take(), data_in, timeout, started);
            debug!("SCSI pass-through requested on a non-Windows platform");
            Err(crate::error::RustDumpError::unsupported(
                "SCSI pass-through is only available on Windows",
            ))
        }
    }

    /// Like `scsi_io_control`, but a failed command becomes an error.
    pub(crate) fn execute(
        &self,
        name: &str,
        cdb: &[u8],
        data_buffer: Option<&mut [u8]>,
        data_in: u8,
        timeout: u32,
    ) -> Result<()> {
        let result = self.scsi_io_control(cdb, data_buffer, data_in, timeout)?;
        if result.ok {
            Ok(())
        } else {
            Err(crate::error::RustDumpError::scsi(format!(
                "{} failed: {}",
                name,
                result.failure_reason()
            )))
        }
    }
}

/// Implement Drop trait to ensure SCSI interface is properly cleaned up
impl Drop for ScsiInterface {
    fn drop(&mut self) {
        debug!("SCSI interface cleanup completed");
    }
}
