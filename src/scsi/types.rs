use crate::error::{Result, RustDumpError};

/// Peripheral device type from byte 0 of standard INQUIRY data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralType {
    DirectAccess, // 0x00
    Sequential,   // 0x01
    WriteOnce,    // 0x04
    CdDvd,        // 0x05
    OpticalMemory, // 0x07
    Rbc,          // 0x0E
    Unknown(u8),
}

impl PeripheralType {
    pub fn from_code(code: u8) -> Self {
        match code & 0x1F {
            0x00 => PeripheralType::DirectAccess,
            0x01 => PeripheralType::Sequential,
            0x04 => PeripheralType::WriteOnce,
            0x05 => PeripheralType::CdDvd,
            0x07 => PeripheralType::OpticalMemory,
            0x0E => PeripheralType::Rbc,
            other => PeripheralType::Unknown(other),
        }
    }

    /// Devices that answer READ TOC
    pub fn is_optical(&self) -> bool {
        matches!(self, PeripheralType::CdDvd | PeripheralType::WriteOnce)
    }

    pub fn name(&self) -> &'static str {
        match self {
            PeripheralType::DirectAccess => "Direct access block device",
            PeripheralType::Sequential => "Sequential access device",
            PeripheralType::WriteOnce => "Write-once device",
            PeripheralType::CdDvd => "CD/DVD device",
            PeripheralType::OpticalMemory => "Optical memory device",
            PeripheralType::Rbc => "Simplified direct access device",
            PeripheralType::Unknown(_) => "Unknown device type",
        }
    }
}

/// Standard INQUIRY response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InquiryData {
    pub peripheral_type: PeripheralType,
    pub removable: bool,
    pub vendor: String,
    pub product: String,
    pub revision: String,
}

impl InquiryData {
    /// Parse at least the first 36 bytes of a standard INQUIRY response.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 36 {
            return Err(RustDumpError::parse(format!(
                "INQUIRY data too short: {} bytes",
                buf.len()
            )));
        }

        Ok(Self {
            peripheral_type: PeripheralType::from_code(buf[0]),
            removable: buf[1] & 0x80 != 0,
            vendor: ascii_field(&buf[8..16]),
            product: ascii_field(&buf[16..32]),
            revision: ascii_field(&buf[32..36]),
        })
    }
}

/// Unit serial number from VPD page 0x80
pub fn parse_unit_serial(buf: &[u8]) -> Result<String> {
    if buf.len() < 4 || buf[1] != 0x80 {
        return Err(RustDumpError::parse("not a unit serial number VPD page"));
    }
    let len = buf[3] as usize;
    let end = (4 + len).min(buf.len());
    Ok(ascii_field(&buf[4..end]))
}

/// Last LBA and block length reported by READ CAPACITY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub last_lba: u64,
    pub block_length: u32,
}

impl Capacity {
    pub fn block_count(&self) -> u64 {
        self.last_lba + 1
    }

    /// READ CAPACITY (10): 8 bytes, last LBA then block length
    pub fn parse_10(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(RustDumpError::parse("READ CAPACITY (10) data too short"));
        }
        Ok(Self {
            last_lba: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as u64,
            block_length: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        })
    }

    /// READ CAPACITY (16): 8-byte last LBA then block length
    pub fn parse_16(buf: &[u8]) -> Result<Self> {
        if buf.len() < 12 {
            return Err(RustDumpError::parse("READ CAPACITY (16) data too short"));
        }
        let mut lba = [0u8; 8];
        lba.copy_from_slice(&buf[..8]);
        Ok(Self {
            last_lba: u64::from_be_bytes(lba),
            block_length: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// The 10-byte variant saturates at 0xFFFFFFFF on large devices
    pub fn needs_16(&self) -> bool {
        self.last_lba == u32::MAX as u64
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inquiry_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; 36];
        buf[0] = 0x05;
        buf[1] = 0x80;
        buf[8..16].copy_from_slice(b"PLEXTOR ");
        buf[16..32].copy_from_slice(b"DVDR   PX-760A  ");
        buf[32..36].copy_from_slice(b"1.07");
        buf
    }

    #[test]
    fn parses_standard_inquiry() {
        let inquiry = InquiryData::parse(&inquiry_bytes()).unwrap();
        assert_eq!(inquiry.peripheral_type, PeripheralType::CdDvd);
        assert!(inquiry.peripheral_type.is_optical());
        assert!(inquiry.removable);
        assert_eq!(inquiry.vendor, "PLEXTOR");
        assert_eq!(inquiry.product, "DVDR   PX-760A");
        assert_eq!(inquiry.revision, "1.07");

        assert!(InquiryData::parse(&[0u8; 20]).is_err());
    }

    #[test]
    fn parses_unit_serial_page() {
        let mut buf = vec![0x05, 0x80, 0x00, 0x0A];
        buf.extend_from_slice(b"  SN123456");
        assert_eq!(parse_unit_serial(&buf).unwrap(), "SN123456");
        assert!(parse_unit_serial(&[0x05, 0x83, 0, 0]).is_err());
    }

    #[test]
    fn parses_capacity_variants() {
        let short = [0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00];
        let cap = Capacity::parse_10(&short).unwrap();
        assert_eq!(cap.block_count(), 0x10001);
        assert_eq!(cap.block_length, 512);
        assert!(!cap.needs_16());

        let saturated = Capacity::parse_10(&[0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0x10, 0]).unwrap();
        assert!(saturated.needs_16());

        let mut long = vec![0u8; 32];
        long[..8].copy_from_slice(&0x1_0000_0000u64.to_be_bytes());
        long[8..12].copy_from_slice(&4096u32.to_be_bytes());
        let cap = Capacity::parse_16(&long).unwrap();
        assert_eq!(cap.last_lba, 0x1_0000_0000);
        assert_eq!(cap.block_length, 4096);
    }
}
