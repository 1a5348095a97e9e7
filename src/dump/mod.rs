//! Resumable, fault-tolerant imaging engine
//!
//! Stages run in a fixed order: resume reconciliation, transfer-size probing,
//! the sequential imaging pass, bad-block recovery and finally the checksum
//! pass over the finished sink. Every stage works on the same [`DumpState`].

pub mod core;
pub mod extents;
pub mod hash;
pub mod imaging;
pub mod prober;
pub mod recovery;
pub mod resume;
pub mod speed;

pub use self::core::{DumpOutcome, DumpStatus, Dumper};
pub use extents::ExtentSet;
pub use hash::{checksum, ChecksumAlgorithm, DumpDigest};
pub use imaging::{BurstReader, BurstWriter, DeviceReader, PassOutcome, SinkWriter};
pub use prober::{probe, DEFAULT_BURST};
pub use recovery::{recover, RecoveryReport};
pub use resume::{reconcile, HardwareAttempt, Reconciled, ResumeState, ResumeStore, SoftwareIdentity};
pub use speed::{DumpSummary, SpeedTracker};

use crate::optical::OpticalOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag shared with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What to do with data a drive hands back for a block it failed to read
/// while persistent recovery mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialDataPolicy {
    /// Overwrite the zero placeholder with the unverified data
    WriteUnverified,
    /// Leave the zero placeholder in place
    KeepPlaceholder,
}

/// Checksum stage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumOptions {
    pub enabled: bool,
    /// Bytes folded into the digests per sink read
    pub batch_bytes: u32,
    pub algorithms: Vec<ChecksumAlgorithm>,
}

impl Default for ChecksumOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_bytes: 1024 * 1024,
            algorithms: vec![
                ChecksumAlgorithm::Sha1,
                ChecksumAlgorithm::Md5,
                ChecksumAlgorithm::Sha256,
            ],
        }
    }
}

/// Dump options configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    /// First burst size tried by the prober
    pub initial_burst: u32,
    /// Use exactly this burst size and skip probing
    pub fixed_burst: Option<u32>,
    pub retry_passes: u16,
    pub persistent: bool,
    /// Read retry count installed while persistent mode is active
    pub persistent_retry_count: u8,
    pub partial_data: PartialDataPolicy,
    pub stop_on_error: bool,
    /// Re-read every bad block once before the retry passes
    pub trim: bool,
    /// After a failed burst, pass over at least this many blocks in total
    pub skip_on_error: u32,
    /// Failed reads faster than this are logged as `failure_sentinel_ms`
    pub slow_failure_threshold_ms: f64,
    pub failure_sentinel_ms: f64,
    pub checksum: ChecksumOptions,
    pub optical: OpticalOptions,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            initial_burst: DEFAULT_BURST,
            fixed_burst: None,
            retry_passes: 5,
            persistent: false,
            persistent_retry_count: u8::MAX,
            partial_data: PartialDataPolicy::WriteUnverified,
            stop_on_error: false,
            trim: true,
            skip_on_error: 0,
            slow_failure_threshold_ms: 500.0,
            failure_sentinel_ms: 65535.0,
            checksum: ChecksumOptions::default(),
            optical: OpticalOptions::default(),
        }
    }
}

impl DumpOptions {
    pub fn validate(&self) -> crate::Result<()> {
        if self.initial_burst == 0 {
            return Err(crate::RustDumpError::parameter_validation(
                "initial burst must be at least 1 block",
            ));
        }
        if self.fixed_burst == Some(0) {
            return Err(crate::RustDumpError::parameter_validation(
                "fixed burst must be at least 1 block",
            ));
        }
        if self.checksum.enabled && self.checksum.algorithms.is_empty() {
            return Err(crate::RustDumpError::parameter_validation(
                "checksum stage enabled without any algorithm",
            ));
        }
        if self.slow_failure_threshold_ms < 0.0 || self.failure_sentinel_ms < 0.0 {
            return Err(crate::RustDumpError::parameter_validation(
                "failure timing values must not be negative",
            ));
        }
        Ok(())
    }

    /// Duration to log for a failed read.
    pub(crate) fn failure_timing(&self, duration_ms: f64) -> f64 {
        if duration_ms < self.slow_failure_threshold_ms {
            self.failure_sentinel_ms
        } else {
            duration_ms
        }
    }
}

/// Mutable progress of one dump, owned by the running stage.
///
/// Extents and bad blocks only change through the methods here, which keep
/// them disjoint. A snapshot for persistence is always taken from one value,
/// so the persisted `next_block`, extents and bad blocks agree.
#[derive(Debug, Clone)]
pub struct DumpState {
    resume: ResumeState,
    active: usize,
    extents: ExtentSet,
}

impl DumpState {
    pub fn new(reconciled: Reconciled) -> Self {
        Self {
            resume: reconciled.state,
            active: reconciled.active,
            extents: reconciled.extents,
        }
    }

    pub fn next_block(&self) -> u64 {
        self.resume.next_block
    }

    pub fn total_blocks(&self) -> u64 {
        self.resume.total_blocks()
    }

    pub fn extents(&self) -> &ExtentSet {
        &self.extents
    }

    pub fn bad_blocks(&self) -> &BTreeSet<u64> {
        &self.resume.bad_blocks
    }

    pub fn resume(&self) -> &ResumeState {
        &self.resume
    }

    pub fn active_attempt(&self) -> usize {
        self.active
    }

    /// Captured by any attempt, including earlier drives.
    pub fn captured(&self) -> ExtentSet {
        let mut all = self.resume.captured();
        all.union(&self.extents);
        all
    }

    pub(crate) fn mark_captured(&mut self, range: Range<u64>) {
        for address in range.clone() {
            self.resume.bad_blocks.remove(&address);
        }
        self.extents.insert_range(range);
    }

    pub(crate) fn mark_bad(&mut self, range: Range<u64>) {
        for address in range {
            if !self.extents.contains(address) {
                self.resume.bad_blocks.insert(address);
            }
        }
    }

    pub(crate) fn mark_recovered(&mut self, address: u64) {
        self.resume.bad_blocks.remove(&address);
        self.extents.insert_one(address);
    }

    /// Move the checkpoint forward. Never moves it back.
    pub(crate) fn checkpoint(&mut self, next_block: u64) {
        if next_block > self.resume.next_block {
            self.resume.next_block = next_block;
        }
    }

    /// Consistent copy of everything that must be persisted.
    pub fn snapshot(&self) -> ResumeState {
        let mut state = self.resume.clone();
        if let Some(attempt) = state.tries.get_mut(self.active) {
            attempt.extents = self.extents.clone();
            attempt.last_used = chrono::Utc::now();
        }
        state.updated = chrono::Utc::now();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;

    fn state(total: u64) -> DumpState {
        let reconciled = reconcile(
            None,
            true,
            false,
            total,
            &DeviceIdentity::new("ACME", "Disk", "1"),
            &SoftwareIdentity::current(),
        )
        .unwrap();
        DumpState::new(reconciled)
    }

    #[test]
    fn captured_and_bad_stay_disjoint() {
        let mut s = state(100);
        s.mark_bad(10..20);
        s.mark_captured(0..10);
        assert_eq!(s.bad_blocks().len(), 10);

        s.mark_recovered(15);
        assert!(!s.bad_blocks().contains(&15));
        assert!(s.extents().contains(15));

        // already captured addresses never become bad again
        s.mark_bad(0..5);
        assert_eq!(s.bad_blocks().len(), 9);
    }

    #[test]
    fn checkpoint_never_regresses() {
        let mut s = state(100);
        s.checkpoint(40);
        s.checkpoint(20);
        assert_eq!(s.next_block(), 40);
    }

    #[test]
    fn snapshot_carries_working_extents() {
        let mut s = state(100);
        s.mark_captured(0..64);
        s.checkpoint(64);
        let snap = s.snapshot();
        assert_eq!(snap.next_block, 64);
        assert_eq!(snap.tries[0].extents.block_count(), 64);
    }

    #[test]
    fn options_from_partial_json_keep_defaults() {
        let options: DumpOptions =
            serde_json::from_str(r#"{ "retry_passes": 2, "partial_data": "keep-placeholder" }"#)
                .unwrap();
        assert_eq!(options.retry_passes, 2);
        assert_eq!(options.partial_data, PartialDataPolicy::KeepPlaceholder);
        assert_eq!(options.initial_burst, DEFAULT_BURST);
        assert!(options.trim);
        options.validate().unwrap();
    }

    #[test]
    fn failure_timing_clamps_fast_failures() {
        let options = DumpOptions::default();
        assert_eq!(options.failure_timing(3.0), 65535.0);
        assert_eq!(options.failure_timing(800.0), 800.0);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let handler_side = token.clone();
        assert!(!token.is_cancelled());
        handler_side.cancel();
        assert!(token.is_cancelled());
    }
}
