//! SCSI Sense Data Parsing
//!
//! This module handles parsing and interpretation of SCSI sense data returned
//! alongside failed read and mode commands.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Decoded sense key / ASC / ASCQ triple with the optional information field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseInfo {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
    /// Usually the LBA of the first failing block on medium errors
    pub information: Option<u64>,
}

impl SenseInfo {
    pub fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self {
            key,
            asc,
            ascq,
            information: None,
        }
    }

    /// Parse fixed (0x70/0x71) or descriptor (0x72/0x73) format sense data.
    /// Returns `None` when the buffer carries no sense at all.
    pub fn parse(sense_data: &[u8]) -> Option<Self> {
        if sense_data.len() < 3 {
            return None;
        }

        let response_code = sense_data[0] & 0x7F;
        let info = match response_code {
            0x70 | 0x71 => {
                let key = sense_data[2] & 0x0F;
                let asc = sense_data.get(12).copied().unwrap_or(0);
                let ascq = sense_data.get(13).copied().unwrap_or(0);
                let valid = sense_data[0] & 0x80 != 0;
                let information = if valid && sense_data.len() >= 7 {
                    let mut bytes = [0u8; 4];
                    bytes.copy_from_slice(&sense_data[3..7]);
                    Some(u32::from_be_bytes(bytes) as u64)
                } else {
                    None
                };
                Self {
                    key,
                    asc,
                    ascq,
                    information,
                }
            }
            0x72 | 0x73 => {
                let key = sense_data[1] & 0x0F;
                let asc = sense_data.get(2).copied().unwrap_or(0);
                let ascq = sense_data.get(3).copied().unwrap_or(0);
                Self {
                    key,
                    asc,
                    ascq,
                    information: parse_information_descriptor(sense_data),
                }
            }
            _ => return None,
        };

        debug!(
            "Sense data - Key: 0x{:02X}, ASC: 0x{:02X}, ASCQ: 0x{:02X}",
            info.key, info.asc, info.ascq
        );

        if info.key == 0 && info.asc == 0 && info.ascq == 0 {
            return None;
        }
        Some(info)
    }

    /// Medium errors and hardware errors are what the recovery passes exist for.
    pub fn is_medium_error(&self) -> bool {
        self.key == 0x03 || self.key == 0x04
    }

    pub fn is_illegal_request(&self) -> bool {
        self.key == 0x05
    }

    pub fn describe(&self) -> String {
        match (self.key, self.asc, self.ascq) {
            (0x00, _, _) => "No sense".to_string(),
            (0x01, _, _) => "Recovered error".to_string(),
            (0x02, 0x3A, _) => "Medium not present".to_string(),
            (0x02, 0x04, _) => "Drive not ready".to_string(),
            (0x03, 0x11, 0x00) => "Unrecovered read error".to_string(),
            (0x03, 0x11, 0x05) => "L-EC uncorrectable error".to_string(),
            (0x03, 0x11, 0x06) => "CIRC unrecovered error".to_string(),
            (0x03, 0x02, 0x00) => "No seek complete".to_string(),
            (0x03, 0x06, 0x00) => "No reference position found".to_string(),
            (0x03, _, _) => "Medium error".to_string(),
            (0x04, _, _) => "Hardware error".to_string(),
            (0x05, 0x21, 0x00) => "Logical block address out of range".to_string(),
            (0x05, 0x24, 0x00) => "Invalid field in CDB".to_string(),
            (0x05, 0x20, 0x00) => "Invalid command operation code".to_string(),
            (0x05, _, _) => "Illegal request".to_string(),
            (0x06, 0x28, 0x00) => "Unit attention - not ready to ready transition".to_string(),
            (0x06, 0x29, _) => "Unit attention - reset occurred".to_string(),
            _ => format!(
                "Sense Key: 0x{:02X}, ASC/ASCQ: 0x{:02X}/0x{:02X}",
                self.key, self.asc, self.ascq
            ),
        }
    }
}

impl fmt::Display for SenseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (key 0x{:02X}, ASC/ASCQ 0x{:02X}/0x{:02X})",
            self.describe(),
            self.key,
            self.asc,
            self.ascq
        )?;
        if let Some(info) = self.information {
            write!(f, " at {}", info)?;
        }
        Ok(())
    }
}

/// Information descriptor (type 0x00) inside descriptor-format sense data.
fn parse_information_descriptor(sense_data: &[u8]) -> Option<u64> {
    if sense_data.len() < 8 {
        return None;
    }
    let additional = sense_data[7] as usize;
    let end = (8 + additional).min(sense_data.len());
    let mut pos = 8;

    while pos + 2 <= end {
        let descriptor_type = sense_data[pos];
        let descriptor_len = sense_data[pos + 1] as usize;
        if descriptor_type == 0x00 && descriptor_len >= 0x0A && pos + 12 <= end {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&sense_data[pos + 4..pos + 12]);
            return Some(u64::from_be_bytes(bytes));
        }
        pos += 2 + descriptor_len;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_format_medium_error() {
        let mut sense = [0u8; 18];
        sense[0] = 0xF0;
        sense[2] = 0x03;
        sense[3..7].copy_from_slice(&1234u32.to_be_bytes());
        sense[7] = 10;
        sense[12] = 0x11;
        sense[13] = 0x00;

        let info = SenseInfo::parse(&sense).expect("sense present");
        assert_eq!(info.key, 0x03);
        assert_eq!(info.asc, 0x11);
        assert_eq!(info.information, Some(1234));
        assert!(info.is_medium_error());
        assert_eq!(info.describe(), "Unrecovered read error");
    }

    #[test]
    fn parses_descriptor_format_with_information() {
        let mut sense = vec![0x72, 0x03, 0x11, 0x00, 0, 0, 0, 12];
        sense.extend_from_slice(&[0x00, 0x0A, 0x80, 0x00]);
        sense.extend_from_slice(&77u64.to_be_bytes());

        let info = SenseInfo::parse(&sense).expect("sense present");
        assert_eq!(info.key, 0x03);
        assert_eq!(info.information, Some(77));
    }

    #[test]
    fn empty_or_no_sense_is_none() {
        assert!(SenseInfo::parse(&[]).is_none());
        assert!(SenseInfo::parse(&[0x70, 0, 0, 0]).is_none());
        assert!(SenseInfo::parse(&[0u8; 18]).is_none());
    }
}
