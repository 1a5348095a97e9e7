//! Dump orchestration
//!
//! [`Dumper`] runs the stages in order over one [`DumpState`]: resume
//! reconciliation, transfer-size probing, the imaging pass, the trim sweep,
//! the retry passes and the checksum pass. A summary and a resume snapshot
//! stay available on the dumper even when a stage fails, so the caller can
//! always persist progress.

use super::hash::{self, DumpDigest};
use super::imaging::{self, BurstReader, BurstWriter, DeviceReader, PassContext, PassOutcome, SinkWriter};
use super::recovery::{self, RecoveryReport};
use super::resume::{reconcile, ResumeState, SoftwareIdentity};
use super::speed::{DumpSummary, SpeedTracker};
use super::{prober, CancelToken, DumpOptions, DumpState};
use crate::device::{Addressing, BlockDevice};
use crate::error::{Result, RustDumpError};
use crate::sink::Sink;
use crate::telemetry::{self, Telemetry};
use serde::Serialize;
use std::ops::Range;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct DumpOutcome {
    pub status: DumpStatus,
    /// State to persist for the next run
    pub resume: ResumeState,
    /// Only computed for completed runs
    pub digest: Option<DumpDigest>,
    pub recovery: RecoveryReport,
    pub summary: DumpSummary,
}

pub struct Dumper<'t> {
    pub(crate) options: DumpOptions,
    pub(crate) cancel: CancelToken,
    pub(crate) telemetry: &'t mut dyn Telemetry,
    pub(crate) speed: SpeedTracker,
    pub(crate) summary: DumpSummary,
    pub(crate) snapshot: Option<ResumeState>,
    pub(crate) recovery: RecoveryReport,
    telemetry_closed: bool,
}

impl<'t> Dumper<'t> {
    pub fn new(
        options: DumpOptions,
        cancel: CancelToken,
        telemetry: &'t mut dyn Telemetry,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            cancel,
            telemetry,
            speed: SpeedTracker::new(),
            summary: DumpSummary::default(),
            snapshot: None,
            recovery: RecoveryReport::default(),
            telemetry_closed: false,
        })
    }

    pub fn options(&self) -> &DumpOptions {
        &self.options
    }

    /// Progress of the last run, also after a fatal abort.
    pub fn summary(&self) -> &DumpSummary {
        &self.summary
    }

    /// Latest consistent resume state, `None` if reconciliation never
    /// succeeded.
    pub fn resume_snapshot(&self) -> Option<&ResumeState> {
        self.snapshot.as_ref()
    }

    /// Image a block device into `sink`.
    pub fn dump<D: BlockDevice + ?Sized>(
        &mut self,
        device: &mut D,
        sink: &mut dyn Sink,
        existing: Option<ResumeState>,
    ) -> Result<DumpOutcome> {
        let started = Instant::now();
        let result = self.dump_blocks(device, sink, existing);
        self.finish(started, result)
    }

    fn dump_blocks<D: BlockDevice + ?Sized>(
        &mut self,
        device: &mut D,
        sink: &mut dyn Sink,
        existing: Option<ResumeState>,
    ) -> Result<(DumpStatus, Option<DumpDigest>)> {
        let block_size = device.block_size()?;
        if block_size == 0 {
            return Err(RustDumpError::block_size("device reports a block size of 0"));
        }
        let total = device.block_count()?;
        self.summary.total_blocks = total;
        self.summary.block_size = block_size;
        self.summary.total_bytes = total * block_size as u64;

        let identity = device.identity();
        info!("Dumping {} ({} blocks of {} bytes)", identity, total, block_size);

        let reconciled = reconcile(
            existing,
            device.addressing() == Addressing::Lba,
            device.is_removable(),
            total,
            &identity,
            &SoftwareIdentity::current(),
        )?;
        let mut state = DumpState::new(reconciled);
        self.snapshot = Some(state.snapshot());
        if state.next_block() > 0 {
            info!(
                "Resuming at block {} with {} bad blocks pending",
                state.next_block(),
                state.bad_blocks().len()
            );
        }

        let probe_at = prober::probe_address(device.addressing());
        let status = {
            let mut reader = DeviceReader::new(device);
            let burst = self.select_burst(&mut reader, probe_at, total)?;
            self.summary.burst_size = burst;

            let mut writer = SinkWriter::new(sink, block_size);
            let result = self.run_stages(&mut reader, &mut writer, &[0..total], burst, &mut state);
            self.record_state(&state);
            result?
        };

        let digest = if status == DumpStatus::Completed && self.options.checksum.enabled {
            let batch_blocks = (self.options.checksum.batch_bytes / block_size).max(1);
            Some(self.run_checksum(|algorithms| {
                hash::checksum(sink, total, block_size, batch_blocks, algorithms)
            })?)
        } else {
            None
        };

        Ok((status, digest))
    }

    /// Probed or operator-forced burst size, never larger than `limit`.
    /// Probing reads through `reader` at `address`.
    pub(crate) fn select_burst<R: BurstReader + ?Sized>(
        &mut self,
        reader: &mut R,
        address: u64,
        limit: u64,
    ) -> Result<u32> {
        let limit = u32::try_from(limit).unwrap_or(u32::MAX).max(1);
        match self.options.fixed_burst {
            Some(fixed) => {
                let burst = fixed.min(limit);
                info!("Using fixed burst of {} blocks", burst);
                Ok(burst)
            }
            None => {
                self.telemetry.stage("probe");
                prober::probe_reader(reader, address, self.options.initial_burst.min(limit))
            }
        }
    }

    /// Imaging over `ranges`, then trim and retry passes.
    pub(crate) fn run_stages<R, W>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        ranges: &[Range<u64>],
        burst: u32,
        state: &mut DumpState,
    ) -> Result<DumpStatus>
    where
        R: BurstReader + ?Sized,
        W: BurstWriter + ?Sized,
    {
        let options = &self.options;
        let mut ctx = PassContext {
            options,
            cancel: &self.cancel,
            telemetry: &mut *self.telemetry,
            speed: &mut self.speed,
        };

        let imaging_started = Instant::now();
        ctx.telemetry.stage("imaging");
        let mut status = DumpStatus::Completed;
        let mut imaging_result = Ok(());
        for range in ranges {
            match imaging::run(reader, writer, range.clone(), burst, state, &mut ctx) {
                Ok(PassOutcome::Completed) => {}
                Ok(PassOutcome::Cancelled) => {
                    status = DumpStatus::Cancelled;
                    break;
                }
                Err(e) => {
                    imaging_result = Err(e);
                    break;
                }
            }
        }
        self.summary.imaging_time = imaging_started.elapsed();
        imaging_result?;

        if status == DumpStatus::Cancelled || state.bad_blocks().is_empty() {
            return Ok(status);
        }

        let recovery_started = Instant::now();
        let mut trimmed = 0;
        if options.trim {
            let (recovered, cancelled) = recovery::trim(reader, writer, state, &mut ctx)?;
            trimmed = recovered;
            if cancelled {
                status = DumpStatus::Cancelled;
            }
        }

        if status == DumpStatus::Completed {
            let mut report = recovery::recover(
                reader,
                writer,
                state,
                options.retry_passes,
                options.persistent,
                &mut ctx,
            )?;
            if report.cancelled {
                status = DumpStatus::Cancelled;
            }
            report.trimmed = trimmed;
            report.recovered += trimmed;
            self.recovery = report;
        } else {
            self.recovery = RecoveryReport {
                trimmed,
                recovered: trimmed,
                remaining: state.bad_blocks().len() as u64,
                cancelled: true,
                ..Default::default()
            };
        }
        self.summary.recovery_time = recovery_started.elapsed();

        if !state.bad_blocks().is_empty() {
            warn!(
                "{} blocks could not be recovered",
                state.bad_blocks().len()
            );
        }
        Ok(status)
    }

    pub(crate) fn run_checksum<F>(&mut self, compute: F) -> Result<DumpDigest>
    where
        F: FnOnce(&[super::ChecksumAlgorithm]) -> Result<DumpDigest>,
    {
        self.telemetry.stage("checksum");
        let started = Instant::now();
        let digest = compute(&self.options.checksum.algorithms)?;
        self.summary.checksum_time = started.elapsed();
        for (name, value) in &digest.values {
            info!("{}: {}", name, value);
        }
        self.summary.digests = digest.values.clone();
        Ok(digest)
    }

    pub(crate) fn record_state(&mut self, state: &DumpState) {
        self.snapshot = Some(state.snapshot());
        self.summary.blocks_read = state.captured().block_count();
        self.summary.blocks_unrecoverable = state.bad_blocks().len() as u64;
    }

    /// Common epilogue: timing, telemetry close, summary, outcome.
    pub(crate) fn finish(
        &mut self,
        started: Instant,
        result: Result<(DumpStatus, Option<DumpDigest>)>,
    ) -> Result<DumpOutcome> {
        self.summary.elapsed = started.elapsed();
        self.summary.apply_speed(&self.speed);

        if !self.telemetry_closed {
            self.telemetry_closed = true;
            telemetry::record(self.telemetry.close());
        }

        let (status, digest) = match result {
            Ok(done) => done,
            Err(e) => {
                error!("Dump aborted: {}", e);
                self.summary.aborted = Some(e.to_string());
                return Err(e);
            }
        };
        self.summary.cancelled = status == DumpStatus::Cancelled;

        let resume = self
            .snapshot
            .clone()
            .ok_or_else(|| RustDumpError::Generic(anyhow::anyhow!("no resume state recorded")))?;

        info!(
            "Dump {}: {} blocks read, {} unrecoverable",
            if self.summary.cancelled { "cancelled" } else { "finished" },
            self.summary.blocks_read,
            self.summary.blocks_unrecoverable
        );

        Ok(DumpOutcome {
            status,
            resume,
            digest,
            recovery: self.recovery.clone(),
            summary: self.summary.clone(),
        })
    }
}
