//! Transfer-size probing
//!
//! Many devices reject oversized transfers without advertising a maximum, so
//! the burst size is found by trial: read at the start of the medium and
//! halve the request until the device accepts it. The trial goes through the
//! same [`BurstReader`] the imaging pass uses, so the command and transfer
//! length tested are the ones the dump will issue.

use super::imaging::{BurstReader, DeviceReader};
use crate::device::{Addressing, BlockDevice};
use crate::error::{Result, RustDumpError};
use tracing::{debug, info};

pub const DEFAULT_BURST: u32 = 64;

/// First address a device is probed at.
pub fn probe_address(addressing: Addressing) -> u64 {
    match addressing {
        Addressing::Lba => 0,
        Addressing::Chs => 1,
    }
}

/// Largest burst (in blocks) the device services, starting from `initial_burst`.
pub fn probe<D: BlockDevice + ?Sized>(device: &mut D, initial_burst: u32) -> Result<u32> {
    let address = probe_address(device.addressing());
    probe_reader(&mut DeviceReader::new(device), address, initial_burst)
}

/// Halving search through `reader`, reading at `address`.
pub fn probe_reader<R: BurstReader + ?Sized>(
    reader: &mut R,
    address: u64,
    initial_burst: u32,
) -> Result<u32> {
    let mut burst = initial_burst.max(1);
    loop {
        debug!("Probing burst of {} blocks at {}", burst, address);
        let outcome = reader.read_burst(address, burst);
        if outcome.ok {
            info!("Device accepts bursts of {} blocks", burst);
            return Ok(burst);
        }

        if burst == 1 {
            return Err(RustDumpError::unreadable_medium(format!(
                "single block read at {} failed: {}",
                address,
                outcome.failure_reason()
            )));
        }

        debug!(
            "Burst of {} blocks rejected ({}), halving",
            burst,
            outcome.failure_reason()
        );
        burst = (burst / 2).max(1);
    }
}
