//! Throughput accounting and the end-of-run summary.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// Running transfer statistics for one run.
#[derive(Debug, Clone, Default)]
pub struct SpeedTracker {
    min: Option<f64>,
    max: Option<f64>,
    bytes: u64,
    busy: Duration,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed transfer, returns the instantaneous rate in MiB/s.
    /// Zero-duration samples carry no rate information and are ignored for
    /// min/max purposes.
    pub fn record(&mut self, bytes: u64, duration: Duration) -> Option<f64> {
        self.bytes += bytes;
        self.busy += duration;

        let secs = duration.as_secs_f64();
        if secs <= 0.0 || bytes == 0 {
            return None;
        }

        let rate = bytes as f64 / MIB / secs;
        self.min = Some(self.min.map_or(rate, |m| m.min(rate)));
        self.max = Some(self.max.map_or(rate, |m| m.max(rate)));
        Some(rate)
    }

    pub fn min_rate(&self) -> Option<f64> {
        self.min
    }

    pub fn max_rate(&self) -> Option<f64> {
        self.max
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Average over time spent inside device reads.
    pub fn average_rate(&self) -> Option<f64> {
        let secs = self.busy.as_secs_f64();
        if secs <= 0.0 {
            None
        } else {
            Some(self.bytes as f64 / MIB / secs)
        }
    }
}

/// What a run achieved, produced even when the run aborted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DumpSummary {
    pub total_blocks: u64,
    /// 0 when sector sizes differ between tracks
    pub block_size: u32,
    /// Bytes the finished image occupies
    pub total_bytes: u64,
    pub burst_size: u32,
    /// Blocks successfully captured so far, across all attempts
    pub blocks_read: u64,
    pub blocks_unrecoverable: u64,
    pub min_rate_mib_s: Option<f64>,
    pub max_rate_mib_s: Option<f64>,
    pub avg_rate_mib_s: Option<f64>,
    pub imaging_time: Duration,
    pub recovery_time: Duration,
    pub checksum_time: Duration,
    pub elapsed: Duration,
    pub cancelled: bool,
    pub aborted: Option<String>,
    pub lead_in_captured: Option<u32>,
    pub digests: BTreeMap<String, String>,
}

impl DumpSummary {
    pub(crate) fn apply_speed(&mut self, speed: &SpeedTracker) {
        self.min_rate_mib_s = speed.min_rate();
        self.max_rate_mib_s = speed.max_rate();
        self.avg_rate_mib_s = speed.average_rate();
    }
}
