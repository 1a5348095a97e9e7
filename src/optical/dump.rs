//! Optical dump driver
//!
//! Plans the track table, captures the lead-in and runs the imaging pass
//! once per track through a track-aware reader/writer pair. Recovery reuses
//! the same pair, so single-sector retries land at the right offsets too.

use super::leadin::{self, LeadInReport};
use super::subchannel;
use super::toc::plan_tracks;
use super::track::{SectorLayout, SubchannelLayout, TrackDescriptor};
use super::OpticalDevice;
use crate::device::{ErrorRecoveryPage, ReadOutcome};
use crate::dump::hash::{self, DumpDigest};
use crate::dump::imaging::{BurstReader, BurstWriter};
use crate::dump::{reconcile, DumpOutcome, DumpState, DumpStatus, Dumper, ResumeState, SoftwareIdentity};
use crate::error::{Result, RustDumpError};
use crate::scsi::SenseInfo;
use crate::sink::Sink;
use std::ops::Range;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Destinations of an optical dump.
pub struct OpticalSinks<'a> {
    /// Main channel of every track, track after track
    pub payload: &'a mut dyn Sink,
    /// Required when subchannel is stored separately
    pub subchannel: Option<&'a mut dyn Sink>,
    pub lead_in: Option<&'a mut dyn Sink>,
}

#[derive(Debug, Clone)]
pub struct OpticalOutcome {
    pub dump: DumpOutcome,
    /// Track table, with kinds refined from the sectors read
    pub tracks: Vec<TrackDescriptor>,
    pub lead_in: Option<LeadInReport>,
}

/// Reads bursts with the layout of the track they fall in.
pub struct TrackReader<'a, D: OpticalDevice + ?Sized> {
    device: &'a mut D,
    layouts: Vec<(Range<u64>, SectorLayout)>,
}

impl<'a, D: OpticalDevice + ?Sized> TrackReader<'a, D> {
    pub fn new(device: &'a mut D, tracks: &[TrackDescriptor]) -> Self {
        Self {
            device,
            layouts: tracks.iter().map(|t| (t.range(), t.layout)).collect(),
        }
    }

    fn layout_for(&self, start: u64, count: u32) -> Option<SectorLayout> {
        let end = start + count as u64;
        self.layouts
            .iter()
            .find(|(range, _)| range.contains(&start))
            .filter(|(range, _)| end <= range.end)
            .map(|(_, layout)| *layout)
    }
}

impl<D: OpticalDevice + ?Sized> BurstReader for TrackReader<'_, D> {
    fn read_burst(&mut self, start: u64, count: u32) -> ReadOutcome {
        match self.layout_for(start, count) {
            Some(layout) => self.device.read_sectors(start as i64, count, &layout),
            None => {
                warn!(
                    "Refusing read of {} sectors at {}: not inside a single track",
                    count, start
                );
                ReadOutcome::failure(
                    Vec::new(),
                    Some(SenseInfo::new(0x05, 0x21, 0x00)),
                    Duration::ZERO,
                )
            }
        }
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        self.device.error_recovery_mode()
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        self.device.set_error_recovery_mode(page)
    }
}

/// Splits sector records into payload and subchannel writes at the offsets
/// of their track, and refines ambiguous track kinds on the way.
pub struct TrackWriter<'a> {
    tracks: &'a mut [TrackDescriptor],
    payload: &'a mut dyn Sink,
    subchannel: Option<&'a mut dyn Sink>,
    pack: bool,
}

impl<'a> TrackWriter<'a> {
    pub fn new(
        tracks: &'a mut [TrackDescriptor],
        payload: &'a mut dyn Sink,
        subchannel: Option<&'a mut dyn Sink>,
        pack: bool,
    ) -> Self {
        Self {
            tracks,
            payload,
            subchannel,
            pack,
        }
    }

    fn track_index(&self, start: u64) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.contains(start))
            .ok_or_else(|| RustDumpError::device(format!("LBA {} lies outside every track", start)))
    }
}

impl BurstWriter for TrackWriter<'_> {
    fn burst_len(&self, start: u64, count: u32) -> usize {
        self.tracks
            .iter()
            .find(|t| t.contains(start))
            .map(|t| t.layout.stride() as usize * count as usize)
            .unwrap_or(0)
    }

    fn write_burst(&mut self, start: u64, _count: u32, data: &[u8]) -> Result<()> {
        let index = self.track_index(start)?;
        let track = &mut self.tracks[index];

        if track.kind.is_ambiguous() {
            let main = &data[..(track.layout.main_size as usize).min(data.len())];
            if track.refine(main) {
                info!("Track {} identified as {}", track.sequence, track.kind);
            }
        }

        let pack = self.pack && track.layout.subchannel == SubchannelLayout::Raw;
        if track.separate_subchannel {
            let (main, sub) = subchannel::split(data, &track.layout, pack);
            self.payload
                .write_at_offset(&main, track.payload_offset_of(start))?;
            match self.subchannel.as_deref_mut() {
                Some(sink) => sink.write_at_offset(&sub, track.subchannel_offset_of(start))?,
                None => {
                    return Err(RustDumpError::parameter_validation(
                        "subchannel is stored separately but no subchannel sink was given",
                    ))
                }
            }
        } else if pack {
            let packed = subchannel::pack_records(data, &track.layout);
            self.payload
                .write_at_offset(&packed, track.payload_offset_of(start))?;
        } else {
            self.payload
                .write_at_offset(data, track.payload_offset_of(start))?;
        }
        Ok(())
    }

    fn write_placeholder(&mut self, start: u64, count: u32) -> Result<()> {
        let index = self.track_index(start)?;
        let track = &self.tracks[index];

        let zeros = vec![0u8; (track.payload_stride() * count as u64) as usize];
        self.payload
            .write_at_offset(&zeros, track.payload_offset_of(start))?;

        let sub_len = (track.subchannel_stride() * count as u64) as usize;
        if sub_len > 0 {
            if let Some(sink) = self.subchannel.as_deref_mut() {
                sink.write_at_offset(&vec![0u8; sub_len], track.subchannel_offset_of(start))?;
            }
        }
        Ok(())
    }
}

impl Dumper<'_> {
    /// Image an optical disc track by track.
    pub fn dump_optical<D: OpticalDevice + ?Sized>(
        &mut self,
        device: &mut D,
        sinks: OpticalSinks<'_>,
        existing: Option<ResumeState>,
    ) -> Result<OpticalOutcome> {
        let started = Instant::now();
        let mut tracks = Vec::new();
        let mut lead_in = None;
        let result = self.dump_disc(device, sinks, existing, &mut tracks, &mut lead_in);
        let dump = self.finish(started, result)?;
        Ok(OpticalOutcome {
            dump,
            tracks,
            lead_in,
        })
    }

    fn dump_disc<D: OpticalDevice + ?Sized>(
        &mut self,
        device: &mut D,
        mut sinks: OpticalSinks<'_>,
        existing: Option<ResumeState>,
        tracks_out: &mut Vec<TrackDescriptor>,
        lead_in_out: &mut Option<LeadInReport>,
    ) -> Result<(DumpStatus, Option<DumpDigest>)> {
        let options = self.options.optical.clone();

        let toc = device.read_toc()?;
        let mut tracks = plan_tracks(&toc, &options)?;
        if tracks.iter().any(|t| t.separate_subchannel) && sinks.subchannel.is_none() {
            return Err(RustDumpError::parameter_validation(
                "subchannel is stored separately but no subchannel sink was given",
            ));
        }
        *tracks_out = tracks.clone();

        // tracks are ordered and non-empty after planning
        let total = tracks.last().map(|t| t.end + 1).unwrap_or(0);
        let payload_len: u64 = tracks.iter().map(TrackDescriptor::payload_len).sum();
        self.summary.total_blocks = total;
        self.summary.total_bytes = payload_len;
        self.summary.block_size = uniform_stride(&tracks);

        let identity = device.identity();
        info!("Dumping disc in {} ({} tracks)", identity, tracks.len());

        let reconciled = reconcile(
            existing,
            true,
            device.is_removable(),
            total,
            &identity,
            &SoftwareIdentity::current(),
        )?;
        let mut state = DumpState::new(reconciled);
        self.snapshot = Some(state.snapshot());

        if options.lead_in {
            match sinks.lead_in.as_deref_mut() {
                Some(sink) if state.next_block() == 0 => {
                    self.telemetry.stage("lead-in");
                    let layout = SectorLayout::raw(options.subchannel.into());
                    let report = leadin::capture(device, sink, &layout, &self.cancel)?;
                    self.summary.lead_in_captured = Some(report.captured);
                    *lead_in_out = Some(report);
                }
                Some(_) => info!("Resumed dump, lead-in already attempted"),
                None => {}
            }
        }

        let ranges: Vec<Range<u64>> = tracks.iter().map(TrackDescriptor::range).collect();
        let first = tracks
            .first()
            .map(TrackDescriptor::range)
            .ok_or_else(|| RustDumpError::parse("disc has no tracks"))?;
        let result = {
            let mut reader = TrackReader::new(device, &tracks);
            // search with the first track's READ CD layout, inside that track
            let burst = self.select_burst(&mut reader, first.start, first.end - first.start)?;
            self.summary.burst_size = burst;

            let mut writer = TrackWriter::new(
                &mut tracks,
                &mut *sinks.payload,
                sinks
                    .subchannel
                    .as_mut()
                    .map(|sink| &mut **sink as &mut dyn Sink),
                options.pack_subchannel,
            );
            self.run_stages(&mut reader, &mut writer, &ranges, burst, &mut state)
        };
        self.record_state(&state);
        *tracks_out = tracks;
        let status = result?;

        let digest = if status == DumpStatus::Completed && self.options.checksum.enabled {
            let batch = self.options.checksum.batch_bytes as u64;
            let payload = &mut *sinks.payload;
            Some(self.run_checksum(|algorithms| {
                hash::checksum_bytes(payload, payload_len, batch, algorithms)
            })?)
        } else {
            None
        };

        Ok((status, digest))
    }
}

/// Payload bytes per sector shared by every track, 0 when they differ.
fn uniform_stride(tracks: &[TrackDescriptor]) -> u32 {
    let mut strides = tracks.iter().map(TrackDescriptor::payload_stride);
    match strides.next() {
        Some(first) if strides.all(|s| s == first) => u32::try_from(first).unwrap_or(0),
        _ => 0,
    }
}
