//! Win32 pass-through layout
//!
//! Every READ, READ CD, READ TOC, INQUIRY and MODE SENSE/SELECT the dumper
//! issues travels in one `IOCTL_SCSI_PASS_THROUGH_DIRECT` buffer: this
//! struct followed by the sense bytes, with the data transfer going straight
//! into the caller's burst buffer. Off Windows the aliases only keep the
//! layout compiling; no command is sent.

#[cfg(windows)]
use winapi::shared::{
    minwindef::{UCHAR, ULONG, USHORT},
    ntdef::PVOID,
};

// Type aliases for non-Windows platforms
#[cfg(not(windows))]
pub type UCHAR = u8;
#[cfg(not(windows))]
pub type USHORT = u16;
#[cfg(not(windows))]
pub type ULONG = u32;
#[cfg(not(windows))]
pub type PVOID = *mut std::ffi::c_void;

/// SCSI_PASS_THROUGH_DIRECT from ntddscsi.h
#[repr(C)]
#[derive(Debug)]
pub struct ScsiPassThroughDirect {
    pub length: USHORT,
    pub scsi_status: UCHAR,
    pub path_id: UCHAR,
    pub target_id: UCHAR,
    pub lun: UCHAR,
    pub cdb_length: UCHAR,
    pub sense_info_length: UCHAR,
    pub data_in: UCHAR,
    pub data_transfer_length: ULONG,
    pub timeout_value: ULONG,
    pub data_buffer: PVOID,
    pub sense_info_offset: ULONG,
    pub cdb: [UCHAR; 16],
}

#[cfg(all(test, target_pointer_width = "64"))]
mod tests {
    use super::*;

    #[test]
    fn matches_the_x64_driver_layout() {
        // sense bytes are placed right after the struct
        assert_eq!(std::mem::size_of::<ScsiPassThroughDirect>(), 56);
        assert_eq!(std::mem::align_of::<ScsiPassThroughDirect>(), 8);
    }
}
