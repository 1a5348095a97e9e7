//! Device capability interface
//!
//! The imaging engine only ever talks to a [`BlockDevice`]. Protocol specific
//! modules (SCSI pass-through, plain files and block nodes) implement it; none
//! of the resume, retry or checksum logic lives in them.

pub mod file;

use crate::error::Result;
use crate::scsi::SenseInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub use file::FileDevice;

/// How the device addresses its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    Lba,
    /// Legacy cylinder/head/sector devices; sector numbering starts at 1
    Chs,
}

/// Identity reported by the drive, recorded in every hardware attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware: Option<String>,
}

impl DeviceIdentity {
    pub fn new(manufacturer: &str, model: &str, serial: &str) -> Self {
        Self {
            manufacturer: manufacturer.trim().to_string(),
            model: model.trim().to_string(),
            serial: serial.trim().to_string(),
            firmware: None,
        }
    }

    /// Manufacturer, model and serial must all agree; firmware may differ.
    pub fn same_drive(&self, other: &DeviceIdentity) -> bool {
        self.manufacturer == other.manufacturer
            && self.model == other.model
            && self.serial == other.serial
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.manufacturer, self.model)?;
        if !self.serial.is_empty() {
            write!(f, " (S/N {})", self.serial)?;
        }
        Ok(())
    }
}

/// Result of a single read command.
#[derive(Debug, Clone)]
pub struct ReadOutcome {
    /// Whatever the device returned; may be partial or garbage when `ok` is false
    pub data: Vec<u8>,
    pub ok: bool,
    pub sense: Option<SenseInfo>,
    pub duration: Duration,
}

impl ReadOutcome {
    pub fn success(data: Vec<u8>, duration: Duration) -> Self {
        Self {
            data,
            ok: true,
            sense: None,
            duration,
        }
    }

    pub fn failure(data: Vec<u8>, sense: Option<SenseInfo>, duration: Duration) -> Self {
        Self {
            data,
            ok: false,
            sense,
            duration,
        }
    }

    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    pub fn failure_reason(&self) -> String {
        match &self.sense {
            Some(sense) => sense.to_string(),
            None => "device reported an error without sense data".to_string(),
        }
    }
}

/// Read-write error recovery parameters (SCSI mode page 0x01 semantics).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorRecoveryPage {
    /// Automatic write reallocation enabled
    pub awre: bool,
    /// Automatic read reallocation enabled
    pub arre: bool,
    /// Transfer block: return the failing block's data anyway
    pub tb: bool,
    /// Read continuous
    pub rc: bool,
    /// Enable early recovery
    pub eer: bool,
    /// Post error: report recovered errors
    pub per: bool,
    /// Disable transfer on error: terminate at the first error
    pub dte: bool,
    /// Disable correction
    pub dcr: bool,
    pub read_retry_count: u8,
    pub write_retry_count: u8,
    pub recovery_time_limit: u16,
}

impl ErrorRecoveryPage {
    /// The aggressive configuration installed for persistent recovery passes:
    /// maximum retries, hand back whatever was read and stop at the first
    /// error. Reallocation settings are kept from the current page.
    pub fn persistent(&self, retry_count: u8) -> Self {
        Self {
            awre: self.awre,
            arre: self.arre,
            tb: true,
            rc: false,
            eer: true,
            per: false,
            dte: true,
            dcr: false,
            read_retry_count: retry_count,
            write_retry_count: self.write_retry_count,
            recovery_time_limit: self.recovery_time_limit,
        }
    }
}

/// Capability interface every dumpable device implements.
pub trait BlockDevice {
    /// Number of addressable blocks.
    fn block_count(&mut self) -> Result<u64>;

    /// Size of one block in bytes.
    fn block_size(&mut self) -> Result<u32>;

    fn identity(&self) -> DeviceIdentity;

    fn is_removable(&self) -> bool;

    fn addressing(&self) -> Addressing {
        Addressing::Lba
    }

    /// Read `count` blocks starting at `start`. Failures are reported in the
    /// outcome, never as an `Err`, so the engine can decide what to do.
    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome;

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage>;

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &mut T {
    fn block_count(&mut self) -> Result<u64> {
        (**self).block_count()
    }

    fn block_size(&mut self) -> Result<u32> {
        (**self).block_size()
    }

    fn identity(&self) -> DeviceIdentity {
        (**self).identity()
    }

    fn is_removable(&self) -> bool {
        (**self).is_removable()
    }

    fn addressing(&self) -> Addressing {
        (**self).addressing()
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome {
        (**self).read_blocks(start, count)
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        (**self).error_recovery_mode()
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        (**self).set_error_recovery_mode(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistent_page_keeps_reallocation_flags() {
        let current = ErrorRecoveryPage {
            awre: true,
            arre: false,
            read_retry_count: 8,
            write_retry_count: 4,
            recovery_time_limit: 100,
            ..Default::default()
        };
        let aggressive = current.persistent(255);

        assert!(aggressive.awre);
        assert!(!aggressive.arre);
        assert!(aggressive.tb);
        assert!(aggressive.dte);
        assert_eq!(aggressive.read_retry_count, 255);
        assert_eq!(aggressive.write_retry_count, 4);
        assert_eq!(aggressive.recovery_time_limit, 100);
    }

    #[test]
    fn identity_match_ignores_firmware() {
        let mut a = DeviceIdentity::new("ACME ", "Drive", "123");
        let b = DeviceIdentity::new("ACME", "Drive", "123");
        a.firmware = Some("1.0".into());
        assert!(a.same_drive(&b));
        assert!(!a.same_drive(&DeviceIdentity::new("ACME", "Drive", "124")));
        assert_eq!(b.to_string(), "ACME Drive (S/N 123)");
    }
}
