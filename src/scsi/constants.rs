// SCSI constant definitions
pub const SENSE_INFO_LEN: usize = 64;

// SCSI data direction
pub const SCSI_IOCTL_DATA_IN: u8 = 1;
pub const SCSI_IOCTL_DATA_OUT: u8 = 0;
pub const SCSI_IOCTL_DATA_UNSPECIFIED: u8 = 2;

// Define IOCTL_SCSI_PASS_THROUGH_DIRECT constant
#[cfg(windows)]
pub const IOCTL_SCSI_PASS_THROUGH_DIRECT: u32 = 0x0004D014;

/// GOOD status byte
pub const SCSI_STATUS_GOOD: u8 = 0x00;

// SCSI Commands Module
pub mod scsi_commands {
    pub const TEST_UNIT_READY: u8 = 0x00;
    pub const INQUIRY: u8 = 0x12;
    pub const READ_CAPACITY_10: u8 = 0x25;
    pub const READ_10: u8 = 0x28;
    pub const READ_TOC: u8 = 0x43;
    pub const MODE_SELECT_10: u8 = 0x55;
    pub const MODE_SENSE_10: u8 = 0x5A;
    pub const READ_16: u8 = 0x88;
    pub const SERVICE_ACTION_IN_16: u8 = 0x9E;
    pub const READ_CD: u8 = 0xBE;
}

/// READ CAPACITY (16) service action
pub const SA_READ_CAPACITY_16: u8 = 0x10;

/// Read-write error recovery mode page
pub const MODE_PAGE_ERROR_RECOVERY: u8 = 0x01;
/// Page control: current values
pub const MODE_PC_CURRENT: u8 = 0x00;

/// VPD page carrying the unit serial number
pub const VPD_UNIT_SERIAL_NUMBER: u8 = 0x80;

/// READ TOC/PMA/ATIP format 0010b: full TOC
pub const TOC_FORMAT_FULL: u8 = 0x02;

pub mod timeouts {
    /// Seconds allowed for identification and mode commands
    pub const CONTROL: u32 = 30;
    /// Seconds allowed for a read; persistent retries can take a long time
    pub const READ: u32 = 600;
}
