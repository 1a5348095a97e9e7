//! Best-effort lead-in capture
//!
//! LBAs -150..-1 are read one sector at a time. Most drives refuse them; a
//! failure only zero-fills the sector in the lead-in sink. None of these
//! addresses ever enters the bad-block set.

use super::track::SectorLayout;
use super::{OpticalDevice, LEAD_IN_SECTORS};
use crate::dump::CancelToken;
use crate::error::Result;
use crate::sink::Sink;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LeadInReport {
    pub captured: u32,
    pub failed: u32,
    pub cancelled: bool,
}

/// Read the lead-in into `sink`, one `layout.stride()` record per sector,
/// LBA -150 at offset 0.
pub fn capture<D: OpticalDevice + ?Sized>(
    device: &mut D,
    sink: &mut dyn Sink,
    layout: &SectorLayout,
    cancel: &CancelToken,
) -> Result<LeadInReport> {
    let stride = layout.stride() as u64;
    let mut report = LeadInReport::default();
    info!("Capturing lead-in ({} sectors)", LEAD_IN_SECTORS);

    for lba in -LEAD_IN_SECTORS..0 {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let offset = (lba + LEAD_IN_SECTORS) as u64 * stride;
        let outcome = device.read_sectors(lba, 1, layout);
        if outcome.ok && outcome.data.len() as u64 == stride {
            sink.write_at_offset(&outcome.data, offset)?;
            report.captured += 1;
        } else {
            debug!("Lead-in sector {} unreadable: {}", lba, outcome.failure_reason());
            sink.write_at_offset(&vec![0u8; stride as usize], offset)?;
            report.failed += 1;
        }
    }

    info!(
        "Lead-in: {} sectors captured, {} unreadable",
        report.captured, report.failed
    );
    Ok(report)
}
