//! SCSI Configuration Commands
//!
//! MODE SENSE (10) and MODE SELECT (10) for the read-write error recovery
//! page (0x01).

use crate::device::ErrorRecoveryPage;
use crate::error::{Result, RustDumpError};
use tracing::{debug, info};

use super::super::{constants::*, ScsiInterface};

const MODE_HEADER_10_LEN: usize = 8;
const ERROR_RECOVERY_PAGE_LEN: usize = 12;
const MODE_SENSE_ALLOCATION: u16 = 255;

/// Offset of the mode page behind the header and block descriptors.
fn page_offset(buf: &[u8]) -> Result<usize> {
    if buf.len() < MODE_HEADER_10_LEN {
        return Err(RustDumpError::parse("mode parameter header too short"));
    }
    let descriptor_len = u16::from_be_bytes([buf[6], buf[7]]) as usize;
    let offset = MODE_HEADER_10_LEN + descriptor_len;
    if buf.len() < offset + ERROR_RECOVERY_PAGE_LEN {
        return Err(RustDumpError::parse(format!(
            "mode data of {} bytes has no room for the error recovery page",
            buf.len()
        )));
    }
    if buf[offset] & 0x3F != MODE_PAGE_ERROR_RECOVERY {
        return Err(RustDumpError::parse(format!(
            "expected mode page 0x01, found 0x{:02X}",
            buf[offset] & 0x3F
        )));
    }
    Ok(offset)
}

/// Decode page 0x01 from a MODE SENSE (10) response.
pub fn decode_error_recovery(buf: &[u8]) -> Result<ErrorRecoveryPage> {
    let offset = page_offset(buf)?;
    let page = &buf[offset..offset + ERROR_RECOVERY_PAGE_LEN];
    let flags = page[2];
    Ok(ErrorRecoveryPage {
        awre: flags & 0x80 != 0,
        arre: flags & 0x40 != 0,
        tb: flags & 0x20 != 0,
        rc: flags & 0x10 != 0,
        eer: flags & 0x08 != 0,
        per: flags & 0x04 != 0,
        dte: flags & 0x02 != 0,
        dcr: flags & 0x01 != 0,
        read_retry_count: page[3],
        write_retry_count: page[8],
        recovery_time_limit: u16::from_be_bytes([page[10], page[11]]),
    })
}

/// Turn a MODE SENSE (10) response into MODE SELECT (10) parameter data
/// carrying `page`. Bytes the page does not describe are kept as sensed.
pub fn encode_error_recovery(sensed: &[u8], page: &ErrorRecoveryPage) -> Result<Vec<u8>> {
    let offset = page_offset(sensed)?;
    let mut data = sensed[..offset + ERROR_RECOVERY_PAGE_LEN].to_vec();

    // mode data length is reserved for MODE SELECT
    data[0] = 0;
    data[1] = 0;
    // PS is reserved too
    data[offset] &= 0x3F;

    let flags = [
        (page.awre, 0x80u8),
        (page.arre, 0x40),
        (page.tb, 0x20),
        (page.rc, 0x10),
        (page.eer, 0x08),
        (page.per, 0x04),
        (page.dte, 0x02),
        (page.dcr, 0x01),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .fold(0u8, |acc, (_, bit)| acc | bit);

    data[offset + 2] = flags;
    data[offset + 3] = page.read_retry_count;
    data[offset + 8] = page.write_retry_count;
    data[offset + 10..offset + 12].copy_from_slice(&page.recovery_time_limit.to_be_bytes());
    Ok(data)
}

pub(crate) fn mode_sense_10_cdb(page_code: u8, allocation: u16) -> [u8; 10] {
    let mut cdb = [0u8; 10];
    cdb[0] = scsi_commands::MODE_SENSE_10;
    cdb[2] = (MODE_PC_CURRENT << 6) | (page_code & 0x3F);
    cdb[7..9].copy_from_slice(&allocation.to_be_bytes());
    cdb
}

pub(crate) fn mode_select_10_cdb(parameter_len: u16) -> [u8; 10] {
    let mut cdb = [0u8; 10];
    cdb[0] = scsi_commands::MODE_SELECT_10;
    cdb[1] = 0x10; // PF
    cdb[7..9].copy_from_slice(&parameter_len.to_be_bytes());
    cdb
}

impl ScsiInterface {
    /// Raw MODE SENSE (10) response for the error recovery page
    pub fn mode_sense_error_recovery(&self) -> Result<Vec<u8>> {
        debug!("Executing MODE SENSE (10) page 0x01");
        let mut buffer = vec![0u8; MODE_SENSE_ALLOCATION as usize];
        let cdb = mode_sense_10_cdb(MODE_PAGE_ERROR_RECOVERY, MODE_SENSE_ALLOCATION);
        self.execute(
            "MODE SENSE (10)",
            &cdb,
            Some(&mut buffer),
            SCSI_IOCTL_DATA_IN,
            timeouts::CONTROL,
        )?;

        let data_len = u16::from_be_bytes([buffer[0], buffer[1]]) as usize + 2;
        buffer.truncate(data_len.min(buffer.len()));
        Ok(buffer)
    }

    pub fn error_recovery_page(&self) -> Result<ErrorRecoveryPage> {
        let sensed = self.mode_sense_error_recovery()?;
        decode_error_recovery(&sensed)
    }

    /// MODE SELECT (10) with `page`, built on top of the current values
    pub fn set_error_recovery_page(&self, page: &ErrorRecoveryPage) -> Result<()> {
        let sensed = self.mode_sense_error_recovery()?;
        let mut data = encode_error_recovery(&sensed, page)?;
        let cdb = mode_select_10_cdb(data.len() as u16);
        self.execute(
            "MODE SELECT (10)",
            &cdb,
            Some(&mut data),
            SCSI_IOCTL_DATA_OUT,
            timeouts::CONTROL,
        )?;
        info!(
            "Error recovery page set: retries {}, TB {}, DTE {}",
            page.read_retry_count, page.tb, page.dte
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header with one 8-byte block descriptor followed by page 0x01.
    fn sensed() -> Vec<u8> {
        let mut buf = vec![0u8; 8 + 8 + 12];
        buf[1] = (buf.len() - 2) as u8;
        buf[7] = 8;
        buf[16] = 0x81; // PS + page 0x01
        buf[17] = 0x0A;
        buf[18] = 0xC0; // AWRE, ARRE
        buf[19] = 8;
        buf[20] = 0x55; // obsolete byte kept as is
        buf[24] = 4;
        buf[26..28].copy_from_slice(&300u16.to_be_bytes());
        buf
    }

    #[test]
    fn decodes_page_behind_block_descriptor() {
        let page = decode_error_recovery(&sensed()).unwrap();
        assert!(page.awre && page.arre);
        assert!(!page.tb && !page.dte);
        assert_eq!(page.read_retry_count, 8);
        assert_eq!(page.write_retry_count, 4);
        assert_eq!(page.recovery_time_limit, 300);
    }

    #[test]
    fn encode_keeps_unknown_bytes_and_clears_reserved_fields() {
        let current = decode_error_recovery(&sensed()).unwrap();
        let data = encode_error_recovery(&sensed(), &current.persistent(255)).unwrap();

        assert_eq!(&data[..2], &[0, 0]);
        assert_eq!(data[16], 0x01);
        assert_eq!(data[20], 0x55);

        let decoded = decode_error_recovery(&data).unwrap();
        assert_eq!(decoded, current.persistent(255));
    }

    #[test]
    fn rejects_other_pages() {
        let mut buf = sensed();
        buf[16] = 0x08;
        assert!(decode_error_recovery(&buf).is_err());
        assert!(decode_error_recovery(&buf[..10]).is_err());
    }

    #[test]
    fn cdbs_carry_page_and_lengths() {
        assert_eq!(mode_sense_10_cdb(0x01, 255), [0x5A, 0, 0x01, 0, 0, 0, 0, 0, 255, 0]);
        assert_eq!(mode_select_10_cdb(28), [0x55, 0x10, 0, 0, 0, 0, 0, 0, 28, 0]);
    }
}
