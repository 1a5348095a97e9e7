//! SCSI Read Commands
//!
//! READ (10), READ (16) and READ CD. Read failures are folded into a
//! [`ReadOutcome`] so the imaging engine sees them as bad blocks instead of
//! aborting.

use std::time::Instant;
use tracing::{debug, warn};

use super::super::{constants::*, ScsiInterface};
use crate::device::ReadOutcome;
use crate::optical::{SectorLayout, SubchannelLayout, COOKED_SECTOR_SIZE};

pub(crate) fn read10_cdb(lba: u32, count: u16) -> [u8; 10] {
    let mut cdb = [0u8; 10];
    cdb[0] = scsi_commands::READ_10;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&count.to_be_bytes());
    cdb
}

pub(crate) fn read16_cdb(lba: u64, count: u32) -> [u8; 16] {
    let mut cdb = [0u8; 16];
    cdb[0] = scsi_commands::READ_16;
    cdb[2..10].copy_from_slice(&lba.to_be_bytes());
    cdb[10..14].copy_from_slice(&count.to_be_bytes());
    cdb
}

/// READ CD for any sector type. Negative LBAs address the lead-in and are
/// sent as two's complement.
pub(crate) fn read_cd_cdb(lba: i64, count: u32, layout: &SectorLayout) -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = scsi_commands::READ_CD;
    cdb[2..6].copy_from_slice(&(lba as i32).to_be_bytes());
    cdb[6..9].copy_from_slice(&count.to_be_bytes()[1..]);
    // sync, all headers, user data, EDC/ECC; or user data only
    cdb[9] = if layout.main_size == COOKED_SECTOR_SIZE {
        0x10
    } else {
        0xF8
    };
    cdb[10] = match layout.subchannel {
        SubchannelLayout::None => 0x00,
        SubchannelLayout::Raw => 0x01,
        SubchannelLayout::Q16 => 0x02,
    };
    cdb
}

impl ScsiInterface {
    fn read_command(&self, name: &str, cdb: &[u8], len: usize) -> ReadOutcome {
        let started = Instant::now();
        let mut buffer = vec![0u8; len];
        match self.scsi_io_control(cdb, Some(&mut buffer), SCSI_IOCTL_DATA_IN, timeouts::READ) {
            Ok(result) if result.ok => ReadOutcome::success(buffer, result.duration),
            Ok(result) => {
                debug!("{} failed: {}", name, result.failure_reason());
                ReadOutcome::failure(buffer, result.sense, result.duration)
            }
            Err(e) => {
                warn!("{} could not be issued: {}", name, e);
                ReadOutcome::failure(Vec::new(), None, started.elapsed())
            }
        }
    }

    /// READ (10); callers switch to READ (16) past 32-bit addresses
    pub fn read10(&self, lba: u32, count: u16, block_size: u32) -> ReadOutcome {
        let cdb = read10_cdb(lba, count);
        self.read_command("READ (10)", &cdb, count as usize * block_size as usize)
    }

    pub fn read16(&self, lba: u64, count: u32, block_size: u32) -> ReadOutcome {
        let cdb = read16_cdb(lba, count);
        self.read_command("READ (16)", &cdb, count as usize * block_size as usize)
    }

    /// Whichever READ variant can address the range
    pub fn read_blocks(&self, lba: u64, count: u32, block_size: u32) -> ReadOutcome {
        let end = lba + count as u64;
        if end <= u32::MAX as u64 && count <= u16::MAX as u32 {
            self.read10(lba as u32, count as u16, block_size)
        } else {
            self.read16(lba, count, block_size)
        }
    }

    pub fn read_cd(&self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome {
        let cdb = read_cd_cdb(lba, count, layout);
        self.read_command(
            "READ CD",
            &cdb,
            count as usize * layout.stride() as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read10_packs_address_and_length() {
        let cdb = read10_cdb(0x0102_0304, 0x0506);
        assert_eq!(cdb, [0x28, 0, 1, 2, 3, 4, 0, 5, 6, 0]);
    }

    #[test]
    fn read16_packs_wide_address() {
        let cdb = read16_cdb(0x1_0000_0001, 64);
        assert_eq!(cdb[0], 0x88);
        assert_eq!(&cdb[2..10], &[0, 0, 0, 1, 0, 0, 0, 1]);
        assert_eq!(&cdb[10..14], &[0, 0, 0, 64]);
    }

    #[test]
    fn read_cd_selects_fields_and_subchannel() {
        let raw = SectorLayout::raw(SubchannelLayout::Raw);
        let cdb = read_cd_cdb(16, 2, &raw);
        assert_eq!(cdb[0], 0xBE);
        assert_eq!(&cdb[2..6], &[0, 0, 0, 16]);
        assert_eq!(&cdb[6..9], &[0, 0, 2]);
        assert_eq!(cdb[9], 0xF8);
        assert_eq!(cdb[10], 0x01);

        let q = SectorLayout::raw(SubchannelLayout::Q16);
        assert_eq!(read_cd_cdb(0, 1, &q)[10], 0x02);
    }

    #[test]
    fn read_cd_encodes_lead_in_addresses() {
        let raw = SectorLayout::raw(SubchannelLayout::None);
        let cdb = read_cd_cdb(-150, 1, &raw);
        assert_eq!(&cdb[2..6], &(-150i32).to_be_bytes());
        assert_eq!(cdb[10], 0x00);
    }
}
