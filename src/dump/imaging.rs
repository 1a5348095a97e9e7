//! Sequential imaging pass
//!
//! Reads a block range in bursts and writes every burst to its place in the
//! sink. A failed burst becomes a zero placeholder of the same size and its
//! addresses go to the bad-block set; the pass itself keeps going unless the
//! caller asked to stop on the first error.

use super::speed::SpeedTracker;
use super::{CancelToken, DumpOptions, DumpState};
use crate::device::{BlockDevice, ErrorRecoveryPage, ReadOutcome};
use crate::error::{Result, RustDumpError};
use crate::sink::Sink;
use crate::telemetry::{self, Telemetry};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Source of bursts. Wraps a device together with whatever addressing or
/// layout knowledge a medium needs.
pub trait BurstReader {
    fn read_burst(&mut self, start: u64, count: u32) -> ReadOutcome;

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage>;

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()>;
}

/// Places burst data into one or more sinks.
pub trait BurstWriter {
    /// Number of bytes a successful read of this burst must return.
    fn burst_len(&self, start: u64, count: u32) -> usize;

    fn write_burst(&mut self, start: u64, count: u32, data: &[u8]) -> Result<()>;

    /// Zero-fill the burst's place so offsets stay aligned.
    fn write_placeholder(&mut self, start: u64, count: u32) -> Result<()>;
}

/// Plain block device reader.
pub struct DeviceReader<'a, D: BlockDevice + ?Sized> {
    device: &'a mut D,
}

impl<'a, D: BlockDevice + ?Sized> DeviceReader<'a, D> {
    pub fn new(device: &'a mut D) -> Self {
        Self { device }
    }
}

impl<D: BlockDevice + ?Sized> BurstReader for DeviceReader<'_, D> {
    fn read_burst(&mut self, start: u64, count: u32) -> ReadOutcome {
        self.device.read_blocks(start, count)
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        self.device.error_recovery_mode()
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        self.device.set_error_recovery_mode(page)
    }
}

/// Writes block `n` at byte offset `n * block_size`.
pub struct SinkWriter<'a> {
    sink: &'a mut dyn Sink,
    block_size: u32,
}

impl<'a> SinkWriter<'a> {
    pub fn new(sink: &'a mut dyn Sink, block_size: u32) -> Self {
        Self { sink, block_size }
    }
}

impl BurstWriter for SinkWriter<'_> {
    fn burst_len(&self, _start: u64, count: u32) -> usize {
        count as usize * self.block_size as usize
    }

    fn write_burst(&mut self, start: u64, _count: u32, data: &[u8]) -> Result<()> {
        self.sink.write_at(data, start, self.block_size)
    }

    fn write_placeholder(&mut self, start: u64, count: u32) -> Result<()> {
        let zeros = vec![0u8; self.burst_len(start, count)];
        self.sink.write_at(&zeros, start, self.block_size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed,
    Cancelled,
}

/// Everything a pass needs besides the reader, writer and state.
pub struct PassContext<'a> {
    pub options: &'a DumpOptions,
    pub cancel: &'a CancelToken,
    pub telemetry: &'a mut dyn Telemetry,
    pub speed: &'a mut SpeedTracker,
}

/// Image `range` in bursts of `burst` blocks, starting at the state's
/// checkpoint when that lies inside the range.
pub fn run<R, W>(
    reader: &mut R,
    writer: &mut W,
    range: Range<u64>,
    burst: u32,
    state: &mut DumpState,
    ctx: &mut PassContext<'_>,
) -> Result<PassOutcome>
where
    R: BurstReader + ?Sized,
    W: BurstWriter + ?Sized,
{
    let burst = burst.max(1) as u64;
    let total = state.total_blocks();
    let mut i = range.start.max(state.next_block());

    if i < range.end {
        debug!(
            "Imaging blocks {}..{} in bursts of {}",
            i, range.end, burst
        );
    }

    while i < range.end {
        if ctx.cancel.is_cancelled() {
            state.checkpoint(i);
            info!("Imaging cancelled, checkpoint at block {}", i);
            return Ok(PassOutcome::Cancelled);
        }

        let count = burst.min(range.end - i) as u32;
        let outcome = reader.read_burst(i, count);
        let expected = writer.burst_len(i, count);
        let mut advance = count as u64;

        if outcome.ok && outcome.data.len() == expected {
            writer.write_burst(i, count, &outcome.data)?;
            state.mark_captured(i..i + count as u64);

            if let Some(rate) = ctx.speed.record(outcome.data.len() as u64, outcome.duration) {
                telemetry::record(ctx.telemetry.burst_rate(i, rate));
            }
            telemetry::record(ctx.telemetry.block_timing(i, outcome.duration_ms()));
        } else {
            let reason = if outcome.ok {
                format!(
                    "device returned {} bytes, expected {}",
                    outcome.data.len(),
                    expected
                )
            } else {
                outcome.failure_reason()
            };
            warn!(
                "Read of {} blocks at {} failed: {}",
                count, i, reason
            );

            writer.write_placeholder(i, count)?;
            state.mark_bad(i..i + count as u64);
            ctx.speed.record(0, outcome.duration);
            telemetry::record(
                ctx.telemetry
                    .block_timing(i, ctx.options.failure_timing(outcome.duration_ms())),
            );

            let skip = ctx.options.skip_on_error as u64;
            if skip > advance {
                let extra = (skip - advance).min(range.end - (i + advance));
                if extra > 0 {
                    let skip_start = i + advance;
                    debug!("Skipping {} blocks after error at {}", extra, i);
                    let mut cursor = skip_start;
                    while cursor < skip_start + extra {
                        let chunk = burst.min(skip_start + extra - cursor) as u32;
                        writer.write_placeholder(cursor, chunk)?;
                        cursor += chunk as u64;
                    }
                    state.mark_bad(skip_start..skip_start + extra);
                    advance += extra;
                }
            }

            if ctx.options.stop_on_error {
                state.checkpoint(i + advance);
                return Err(RustDumpError::ReadAborted { address: i, reason });
            }
        }

        i += advance;
        state.checkpoint(i);
        ctx.telemetry.progress(i, total);
    }

    state.checkpoint(range.end);
    Ok(PassOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;
    use crate::dump::{reconcile, SoftwareIdentity};
    use crate::sink::MemorySink;
    use crate::telemetry::NullTelemetry;
    use crate::testing::{block_pattern, SimulatedDevice};

    #[derive(Default)]
    struct Recorder {
        timings: Vec<(u64, f64)>,
        rates: Vec<(u64, f64)>,
        progress: Vec<u64>,
    }

    impl Telemetry for Recorder {
        fn block_timing(&mut self, address: u64, duration_ms: f64) -> Result<()> {
            self.timings.push((address, duration_ms));
            Ok(())
        }

        fn burst_rate(&mut self, address: u64, rate: f64) -> Result<()> {
            self.rates.push((address, rate));
            Ok(())
        }

        fn progress(&mut self, done: u64, _total: u64) {
            self.progress.push(done);
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn fresh_state(device: &mut SimulatedDevice) -> DumpState {
        let total = device.block_count().unwrap();
        DumpState::new(
            reconcile(
                None,
                true,
                false,
                total,
                &DeviceIdentity::new("SIM", "Simulated Disk", "0001"),
                &SoftwareIdentity::current(),
            )
            .unwrap(),
        )
    }

    fn image(
        device: &mut SimulatedDevice,
        sink: &mut MemorySink,
        state: &mut DumpState,
        burst: u32,
        options: &DumpOptions,
        cancel: &CancelToken,
        telemetry: &mut dyn Telemetry,
    ) -> Result<PassOutcome> {
        let total = state.total_blocks();
        let mut speed = SpeedTracker::new();
        let mut ctx = PassContext {
            options,
            cancel,
            telemetry,
            speed: &mut speed,
        };
        let mut reader = DeviceReader::new(device);
        let mut writer = SinkWriter::new(sink, 512);
        run(&mut reader, &mut writer, 0..total, burst, state, &mut ctx)
    }

    #[test]
    fn completed_pass_covers_every_block_exactly_once() {
        let mut device = SimulatedDevice::new(200, 512).with_bad_blocks([50, 51, 52]);
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();
        let mut recorder = Recorder::default();

        let outcome = image(
            &mut device,
            &mut sink,
            &mut state,
            16,
            &DumpOptions::default(),
            &CancelToken::new(),
            &mut recorder,
        )
        .unwrap();
        assert_eq!(outcome, PassOutcome::Completed);

        // the whole failing burst 48..64 is recorded bad
        let bad: Vec<u64> = state.bad_blocks().iter().copied().collect();
        assert_eq!(bad, (48..64).collect::<Vec<_>>());
        for address in 0..200 {
            assert_ne!(
                state.extents().contains(address),
                state.bad_blocks().contains(&address),
                "block {} must be captured xor bad",
                address
            );
        }

        assert_eq!(sink.data().len(), 200 * 512);
        assert_eq!(&sink.data()[..512], block_pattern(0, 512).as_slice());
        assert!(sink.data()[48 * 512..64 * 512].iter().all(|&b| b == 0));

        // checkpoint only ever moves forward
        assert!(recorder.progress.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*recorder.progress.last().unwrap(), 200);
        assert_eq!(state.next_block(), 200);
    }

    #[test]
    fn fast_failures_are_logged_with_the_sentinel() {
        let mut device = SimulatedDevice::new(32, 512).with_bad_blocks([20]);
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();
        let mut recorder = Recorder::default();

        image(
            &mut device,
            &mut sink,
            &mut state,
            8,
            &DumpOptions::default(),
            &CancelToken::new(),
            &mut recorder,
        )
        .unwrap();

        assert_eq!(recorder.timings.len(), 4);
        assert_eq!(recorder.timings[2], (16, 65535.0));
        assert!(recorder.timings[0].1 < 500.0);
        // no rate sample for the failed burst
        assert_eq!(recorder.rates.len(), 3);
        assert!(recorder.rates.iter().all(|&(address, _)| address != 16));
    }

    #[test]
    fn cancellation_checkpoints_and_resume_starts_there() {
        let cancel = CancelToken::new();
        let mut device =
            SimulatedDevice::new(200, 512).cancel_when_reaching(100, cancel.clone());
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();

        let outcome = image(
            &mut device,
            &mut sink,
            &mut state,
            10,
            &DumpOptions::default(),
            &cancel,
            &mut NullTelemetry,
        )
        .unwrap();
        assert_eq!(outcome, PassOutcome::Cancelled);
        assert_eq!(state.next_block(), 100);
        assert_eq!(state.extents().block_count(), 100);

        // second run with the persisted state
        let snapshot = state.snapshot();
        let mut device = SimulatedDevice::new(200, 512);
        let reconciled = reconcile(
            Some(snapshot),
            true,
            false,
            200,
            &DeviceIdentity::new("SIM", "Simulated Disk", "0001"),
            &SoftwareIdentity::current(),
        )
        .unwrap();
        let mut state = DumpState::new(reconciled);

        let outcome = image(
            &mut device,
            &mut sink,
            &mut state,
            10,
            &DumpOptions::default(),
            &CancelToken::new(),
            &mut NullTelemetry,
        )
        .unwrap();
        assert_eq!(outcome, PassOutcome::Completed);
        assert!(device.reads().iter().all(|r| r.start >= 100));
        assert_eq!(state.extents().block_count(), 200);
        assert_eq!(sink.data().len(), 200 * 512);
    }

    #[test]
    fn stop_on_error_aborts_after_recording_the_burst() {
        let mut device = SimulatedDevice::new(100, 512).with_bad_blocks([33]);
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();
        let options = DumpOptions {
            stop_on_error: true,
            ..Default::default()
        };

        let err = image(
            &mut device,
            &mut sink,
            &mut state,
            16,
            &options,
            &CancelToken::new(),
            &mut NullTelemetry,
        )
        .unwrap_err();
        assert!(matches!(err, RustDumpError::ReadAborted { address: 32, .. }));
        assert_eq!(state.next_block(), 48);
        assert_eq!(state.bad_blocks().len(), 16);
        assert_eq!(state.extents().block_count(), 32);
    }

    #[test]
    fn skip_on_error_records_skipped_blocks_as_bad() {
        let mut device = SimulatedDevice::new(100, 512).with_bad_blocks([10]);
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();
        let options = DumpOptions {
            skip_on_error: 20,
            ..Default::default()
        };

        image(
            &mut device,
            &mut sink,
            &mut state,
            8,
            &options,
            &CancelToken::new(),
            &mut NullTelemetry,
        )
        .unwrap();

        // failing burst 8..16 plus 12 skipped blocks
        let bad: Vec<u64> = state.bad_blocks().iter().copied().collect();
        assert_eq!(bad, (8..28).collect::<Vec<_>>());
        assert!(device.reads().iter().all(|r| r.start < 16 || r.start >= 28));
        assert_eq!(state.extents().block_count() + 20, 100);
        assert_eq!(sink.data().len(), 100 * 512);
    }

    #[test]
    fn short_data_is_treated_as_a_failure() {
        struct ShortReader;
        impl BurstReader for ShortReader {
            fn read_burst(&mut self, _start: u64, _count: u32) -> ReadOutcome {
                ReadOutcome::success(vec![1u8; 100], std::time::Duration::from_millis(1))
            }
            fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
                Err(RustDumpError::unsupported("none"))
            }
            fn set_error_recovery_mode(&mut self, _page: &ErrorRecoveryPage) -> Result<()> {
                Err(RustDumpError::unsupported("none"))
            }
        }

        let mut device = SimulatedDevice::new(4, 512);
        let mut state = fresh_state(&mut device);
        let mut sink = MemorySink::new();
        let options = DumpOptions::default();
        let cancel = CancelToken::new();
        let mut telemetry = NullTelemetry;
        let mut speed = SpeedTracker::new();
        let mut ctx = PassContext {
            options: &options,
            cancel: &cancel,
            telemetry: &mut telemetry,
            speed: &mut speed,
        };
        let mut writer = SinkWriter::new(&mut sink, 512);
        run(&mut ShortReader, &mut writer, 0..4, 4, &mut state, &mut ctx).unwrap();

        assert_eq!(state.bad_blocks().len(), 4);
        assert!(sink.data().iter().all(|&b| b == 0));
    }
}
