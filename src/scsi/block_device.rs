//! [`BlockDevice`] over SCSI pass-through

use super::types::{Capacity, InquiryData};
use super::ScsiInterface;
use crate::device::{BlockDevice, DeviceIdentity, ErrorRecoveryPage, ReadOutcome};
use crate::error::{Result, RustDumpError};
use crate::optical::{OpticalDevice, SectorLayout, TableOfContents};
use tracing::{info, warn};

pub struct ScsiBlockDevice {
    scsi: ScsiInterface,
    inquiry: InquiryData,
    identity: DeviceIdentity,
    capacity: Option<Capacity>,
}

impl ScsiBlockDevice {
    /// Open the device and identify it. Capacity is read lazily so an empty
    /// optical tray still identifies.
    pub fn open(device_path: &str) -> Result<Self> {
        let mut scsi = ScsiInterface::new();
        scsi.open_device(device_path)?;

        let ready = scsi.test_unit_ready()?;
        if !ready.ok {
            warn!("Device not ready: {}", ready.failure_reason());
        }

        let inquiry = scsi.inquiry()?;
        let serial = scsi.unit_serial_number()?;
        let mut identity = DeviceIdentity::new(&inquiry.vendor, &inquiry.product, &serial);
        identity.firmware = Some(inquiry.revision.clone()).filter(|r| !r.is_empty());

        info!("Opened {} at {}", identity, device_path);
        Ok(Self {
            scsi,
            inquiry,
            identity,
            capacity: None,
        })
    }

    pub fn inquiry(&self) -> &InquiryData {
        &self.inquiry
    }

    pub fn is_optical(&self) -> bool {
        self.inquiry.peripheral_type.is_optical()
    }

    fn capacity(&mut self) -> Result<Capacity> {
        if let Some(capacity) = self.capacity {
            return Ok(capacity);
        }
        let capacity = self.scsi.read_capacity()?;
        if capacity.block_length == 0 {
            return Err(RustDumpError::block_size(
                "device reports a zero block length",
            ));
        }
        self.capacity = Some(capacity);
        Ok(capacity)
    }
}

impl BlockDevice for ScsiBlockDevice {
    fn block_count(&mut self) -> Result<u64> {
        Ok(self.capacity()?.block_count())
    }

    fn block_size(&mut self) -> Result<u32> {
        Ok(self.capacity()?.block_length)
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    fn is_removable(&self) -> bool {
        self.inquiry.removable
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome {
        match self.capacity() {
            Ok(capacity) => self.scsi.read_blocks(start, count, capacity.block_length),
            Err(e) => {
                warn!("Cannot read without a capacity: {}", e);
                ReadOutcome::failure(Vec::new(), None, Default::default())
            }
        }
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        self.scsi.error_recovery_page()
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        self.scsi.set_error_recovery_page(page)
    }
}

impl OpticalDevice for ScsiBlockDevice {
    fn read_toc(&mut self) -> Result<TableOfContents> {
        self.scsi.read_full_toc()
    }

    fn read_sectors(&mut self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome {
        self.scsi.read_cd(lba, count, layout)
    }
}
