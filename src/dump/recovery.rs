//! Bad-block recovery
//!
//! Retries every address left in the bad-block set one block at a time. An
//! optional trim sweep goes first, then up to `max_passes` retry passes that
//! alternate direction (ascending, descending, ascending...), optionally with
//! the drive switched into persistent error recovery mode.

use super::imaging::{BurstReader, BurstWriter, PassContext};
use super::{DumpState, PartialDataPolicy};
use crate::device::ErrorRecoveryPage;
use crate::error::Result;
use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Blocks recovered by the trim sweep
    pub trimmed: u64,
    pub passes_run: u16,
    /// Blocks recovered by trim and retry passes together
    pub recovered: u64,
    pub remaining: u64,
    pub cancelled: bool,
    pub persistent_engaged: bool,
    /// Failures reading or installing the persistent page
    pub mode_errors: Vec<String>,
    pub mode_restore_error: Option<String>,
}

/// Keeps the drive in persistent recovery mode for its lifetime and puts the
/// saved page back when dropped, on every exit path.
struct PersistentModeGuard<'r, R: BurstReader + ?Sized> {
    reader: &'r mut R,
    saved: Option<ErrorRecoveryPage>,
}

impl<'r, R: BurstReader + ?Sized> PersistentModeGuard<'r, R> {
    fn inactive(reader: &'r mut R) -> Self {
        Self {
            reader,
            saved: None,
        }
    }

    fn engage(reader: &'r mut R, retry_count: u8, report: &mut RecoveryReport) -> Self {
        let current = match reader.error_recovery_mode() {
            Ok(page) => page,
            Err(e) => {
                warn!("Cannot read error recovery page, persistent mode unavailable: {}", e);
                report
                    .mode_errors
                    .push(format!("reading error recovery page: {}", e));
                return Self::inactive(reader);
            }
        };

        let aggressive = current.persistent(retry_count);
        match reader.set_error_recovery_mode(&aggressive) {
            Ok(()) => {
                info!(
                    "Persistent error recovery enabled ({} read retries)",
                    retry_count
                );
                report.persistent_engaged = true;
                Self {
                    reader,
                    saved: Some(current),
                }
            }
            Err(e) => {
                warn!("Cannot enable persistent error recovery: {}", e);
                report
                    .mode_errors
                    .push(format!("installing persistent page: {}", e));
                Self::inactive(reader)
            }
        }
    }

    fn is_active(&self) -> bool {
        self.saved.is_some()
    }

    fn reader(&mut self) -> &mut R {
        self.reader
    }

    fn restore(&mut self) -> Result<()> {
        match self.saved.take() {
            Some(page) => {
                debug!("Restoring saved error recovery page");
                self.reader.set_error_recovery_mode(&page)
            }
            None => Ok(()),
        }
    }
}

impl<R: BurstReader + ?Sized> Drop for PersistentModeGuard<'_, R> {
    fn drop(&mut self) {
        if self.saved.is_some() {
            if let Err(e) = self.restore() {
                error!("Failed to restore drive error recovery page: {}", e);
            }
        }
    }
}

/// Single-block retry. Returns true when the block was recovered.
fn retry_block<R, W>(
    reader: &mut R,
    writer: &mut W,
    address: u64,
    state: &mut DumpState,
    ctx: &mut PassContext<'_>,
    persistent: bool,
) -> Result<bool>
where
    R: BurstReader + ?Sized,
    W: BurstWriter + ?Sized,
{
    let outcome = reader.read_burst(address, 1);
    let expected = writer.burst_len(address, 1);

    if outcome.ok && outcome.data.len() == expected {
        writer.write_burst(address, 1, &outcome.data)?;
        state.mark_recovered(address);
        ctx.speed.record(outcome.data.len() as u64, outcome.duration);
        debug!("Recovered block {}", address);
        return Ok(true);
    }

    if persistent
        && ctx.options.partial_data == PartialDataPolicy::WriteUnverified
        && outcome.data.len() == expected
    {
        // unverified, the block stays in the bad-block set
        writer.write_burst(address, 1, &outcome.data)?;
        debug!("Stored unverified data for block {}", address);
    }
    Ok(false)
}

/// One ascending single-block sweep over the bad blocks in normal mode.
/// Returns the number of recovered blocks and whether it was cancelled.
pub fn trim<R, W>(
    reader: &mut R,
    writer: &mut W,
    state: &mut DumpState,
    ctx: &mut PassContext<'_>,
) -> Result<(u64, bool)>
where
    R: BurstReader + ?Sized,
    W: BurstWriter + ?Sized,
{
    let snapshot: Vec<u64> = state.bad_blocks().iter().copied().collect();
    if snapshot.is_empty() {
        return Ok((0, false));
    }

    info!("Trimming {} bad blocks", snapshot.len());
    ctx.telemetry.stage("trim");

    let mut recovered = 0;
    for (done, address) in snapshot.iter().copied().enumerate() {
        if ctx.cancel.is_cancelled() {
            info!("Trim cancelled after {} blocks", done);
            return Ok((recovered, true));
        }
        if retry_block(reader, writer, address, state, ctx, false)? {
            recovered += 1;
        }
        ctx.telemetry.progress(done as u64 + 1, snapshot.len() as u64);
    }

    info!(
        "Trim recovered {} of {} blocks",
        recovered,
        snapshot.len()
    );
    Ok((recovered, false))
}

/// Retry passes over the bad-block set.
pub fn recover<R, W>(
    reader: &mut R,
    writer: &mut W,
    state: &mut DumpState,
    max_passes: u16,
    use_persistent_mode: bool,
    ctx: &mut PassContext<'_>,
) -> Result<RecoveryReport>
where
    R: BurstReader + ?Sized,
    W: BurstWriter + ?Sized,
{
    let mut report = RecoveryReport::default();

    if state.bad_blocks().is_empty() || max_passes == 0 {
        report.remaining = state.bad_blocks().len() as u64;
        return Ok(report);
    }
    if ctx.cancel.is_cancelled() {
        report.cancelled = true;
        report.remaining = state.bad_blocks().len() as u64;
        return Ok(report);
    }

    let mut guard = if use_persistent_mode {
        PersistentModeGuard::engage(reader, ctx.options.persistent_retry_count, &mut report)
    } else {
        PersistentModeGuard::inactive(reader)
    };
    let persistent = guard.is_active();

    'passes: for pass in 1..=max_passes {
        if state.bad_blocks().is_empty() {
            break;
        }

        let ascending = pass % 2 == 1;
        let mut snapshot: Vec<u64> = state.bad_blocks().iter().copied().collect();
        if !ascending {
            snapshot.reverse();
        }

        info!(
            "Retry pass {} ({}), {} bad blocks",
            pass,
            if ascending { "forward" } else { "reverse" },
            snapshot.len()
        );
        ctx.telemetry.stage(&format!("retry pass {}", pass));
        report.passes_run = pass;

        let mut recovered_this_pass = 0u64;
        for (done, address) in snapshot.iter().copied().enumerate() {
            if ctx.cancel.is_cancelled() {
                info!("Retry pass {} cancelled", pass);
                report.cancelled = true;
                break 'passes;
            }
            if retry_block(guard.reader(), writer, address, state, ctx, persistent)? {
                recovered_this_pass += 1;
            }
            ctx.telemetry
                .progress(done as u64 + 1, snapshot.len() as u64);
        }

        report.recovered += recovered_this_pass;
        debug!(
            "Pass {} recovered {} blocks, {} remain",
            pass,
            recovered_this_pass,
            state.bad_blocks().len()
        );
    }

    if let Err(e) = guard.restore() {
        error!("Failed to restore drive error recovery page: {}", e);
        report.mode_restore_error = Some(e.to_string());
    }

    report.remaining = state.bad_blocks().len() as u64;
    Ok(report)
}
