//! READ TOC/PMA/ATIP

use crate::error::{Result, RustDumpError};
use crate::optical::TableOfContents;
use tracing::debug;

use super::super::{constants::*, ScsiInterface};

const TOC_ALLOCATION: u16 = 0xFFFE;

pub(crate) fn read_toc_cdb(format: u8, session: u8, allocation: u16) -> [u8; 10] {
    let mut cdb = [0u8; 10];
    cdb[0] = scsi_commands::READ_TOC;
    cdb[1] = 0x02; // MSF
    cdb[2] = format & 0x0F;
    cdb[6] = session;
    cdb[7..9].copy_from_slice(&allocation.to_be_bytes());
    cdb
}

impl ScsiInterface {
    /// Full TOC starting at the first session
    pub fn read_full_toc(&self) -> Result<TableOfContents> {
        debug!("Executing READ TOC format 0010b");
        let mut buffer = vec![0u8; TOC_ALLOCATION as usize];
        let cdb = read_toc_cdb(TOC_FORMAT_FULL, 1, TOC_ALLOCATION);
        self.execute(
            "READ TOC",
            &cdb,
            Some(&mut buffer),
            SCSI_IOCTL_DATA_IN,
            timeouts::CONTROL,
        )?;
        let toc = TableOfContents::parse_full_toc(&buffer)?;
        if toc.descriptors.is_empty() {
            return Err(RustDumpError::parse("drive returned an empty TOC"));
        }
        Ok(toc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_toc_cdb() {
        let cdb = read_toc_cdb(TOC_FORMAT_FULL, 1, 0xFFFE);
        assert_eq!(cdb, [0x43, 0x02, 0x02, 0, 0, 0, 1, 0xFF, 0xFE, 0]);
    }
}
