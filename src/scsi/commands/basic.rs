//! SCSI Basic Commands
//!
//! This module contains identification commands: TEST UNIT READY, INQUIRY
//! and READ CAPACITY.

use crate::error::Result;
use tracing::{debug, info};

use super::super::types::{parse_unit_serial, Capacity, InquiryData};
use super::super::{constants::*, CommandResult, ScsiInterface};

const INQUIRY_LEN: usize = 96;
const VPD_LEN: usize = 255;

pub(crate) fn inquiry_cdb(vpd_page: Option<u8>, allocation: u8) -> [u8; 6] {
    let mut cdb = [0u8; 6];
    cdb[0] = scsi_commands::INQUIRY;
    if let Some(page) = vpd_page {
        cdb[1] = 0x01; // EVPD
        cdb[2] = page;
    }
    cdb[4] = allocation;
    cdb
}

pub(crate) fn read_capacity_16_cdb(allocation: u32) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = scsi_commands::SERVICE_ACTION_IN_16;
    cdb[1] = SA_READ_CAPACITY_16;
    cdb[10..14].copy_from_slice(&allocation.to_be_bytes());
    cdb
}

impl ScsiInterface {
    /// Test Unit Ready command - check if device is ready
    pub fn test_unit_ready(&self) -> Result<CommandResult> {
        debug!("Executing Test Unit Ready command");
        let mut cdb = [0u8; 6];
        cdb[0] = scsi_commands::TEST_UNIT_READY;
        self.scsi_io_control(&cdb, None, SCSI_IOCTL_DATA_UNSPECIFIED, timeouts::CONTROL)
    }

    /// Standard INQUIRY
    pub fn inquiry(&self) -> Result<InquiryData> {
        debug!("Executing INQUIRY command");
        let mut buffer = vec![0u8; INQUIRY_LEN];
        let cdb = inquiry_cdb(None, INQUIRY_LEN as u8);
        self.execute(
            "INQUIRY",
            &cdb,
            Some(&mut buffer),
            SCSI_IOCTL_DATA_IN,
            timeouts::CONTROL,
        )?;
        let data = InquiryData::parse(&buffer)?;
        info!(
            "Device: {} {} rev {} ({})",
            data.vendor,
            data.product,
            data.revision,
            data.peripheral_type.name()
        );
        Ok(data)
    }

    /// Serial number from VPD page 0x80. Drives without the page yield an
    /// empty string rather than an error.
    pub fn unit_serial_number(&self) -> Result<String> {
        let mut buffer = vec![0u8; VPD_LEN];
        let cdb = inquiry_cdb(Some(VPD_UNIT_SERIAL_NUMBER), VPD_LEN as u8);
        let result =
            self.scsi_io_control(&cdb, Some(&mut buffer), SCSI_IOCTL_DATA_IN, timeouts::CONTROL)?;
        if !result.ok {
            debug!("Unit serial number page unavailable: {}", result.failure_reason());
            return Ok(String::new());
        }
        parse_unit_serial(&buffer)
    }

    /// READ CAPACITY (10), falling back to (16) when the device is too large
    pub fn read_capacity(&self) -> Result<Capacity> {
        let mut buffer = [0u8; 8];
        let mut cdb = [0u8; 10];
        cdb[0] = scsi_commands::READ_CAPACITY_10;
        self.execute(
            "READ CAPACITY (10)",
            &cdb,
            Some(&mut buffer),
            SCSI_IOCTL_DATA_IN,
            timeouts::CONTROL,
        )?;
        let capacity = Capacity::parse_10(&buffer)?;
        if !capacity.needs_16() {
            debug!(
                "Capacity: {} blocks of {} bytes",
                capacity.block_count(),
                capacity.block_length
            );
            return Ok(capacity);
        }

        debug!("Capacity exceeds READ CAPACITY (10), retrying with (16)");
        let mut long_buffer = [0u8; 32];
        let cdb = read_capacity_16_cdb(long_buffer.len() as u32);
        self.execute(
            "READ CAPACITY (16)",
            &cdb,
            Some(&mut long_buffer),
            SCSI_IOCTL_DATA_IN,
            timeouts::CONTROL,
        )?;
        Capacity::parse_16(&long_buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vpd_inquiry_sets_evpd() {
        let cdb = inquiry_cdb(Some(0x80), 255);
        assert_eq!(cdb, [0x12, 0x01, 0x80, 0x00, 0xFF, 0x00]);
        assert_eq!(inquiry_cdb(None, 96)[1], 0);
    }

    #[test]
    fn read_capacity_16_uses_service_action() {
        let cdb = read_capacity_16_cdb(32);
        assert_eq!(cdb[0], 0x9E);
        assert_eq!(cdb[1], 0x10);
        assert_eq!(&cdb[10..14], &[0, 0, 0, 32]);
    }
}
