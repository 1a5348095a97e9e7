//! Simulated devices for engine tests: failure injection, read logging,
//! mode page state and cancellation triggers.

use crate::device::{Addressing, BlockDevice, DeviceIdentity, ErrorRecoveryPage, ReadOutcome};
use crate::dump::CancelToken;
use crate::error::{Result, RustDumpError};
use crate::optical::toc::{lba_to_msf, POINT_LEAD_OUT};
use crate::optical::track::SYNC_PATTERN;
use crate::optical::{
    OpticalDevice, SectorLayout, SubchannelLayout, TableOfContents, TocDescriptor,
    COOKED_SECTOR_SIZE, RAW_SECTOR_SIZE,
};
use crate::scsi::SenseInfo;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCall {
    pub start: u64,
    pub count: u32,
}

/// Deterministic content of a block, distinct per address.
pub fn block_pattern(address: u64, block_size: u32) -> Vec<u8> {
    (0..block_size as u64)
        .map(|i| (address.wrapping_mul(31).wrapping_add(i * 7) % 251) as u8 + 1)
        .collect()
}

pub fn original_page() -> ErrorRecoveryPage {
    ErrorRecoveryPage {
        awre: true,
        arre: true,
        read_retry_count: 8,
        write_retry_count: 8,
        recovery_time_limit: 0,
        ..Default::default()
    }
}

pub struct SimulatedDevice {
    blocks: u64,
    block_size: u32,
    max_burst: u32,
    bad: BTreeSet<u64>,
    flaky: HashMap<u64, u32>,
    reads: Vec<ReadCall>,
    chs: bool,
    removable: bool,
    identity: DeviceIdentity,
    mode: ErrorRecoveryPage,
    mode_sets: Vec<ErrorRecoveryPage>,
    mode_supported: bool,
    fail_mode_set: bool,
    fail_mode_restore: bool,
    cancel_at: Option<(u64, CancelToken)>,
    cancel_on_single_reads: Option<(usize, CancelToken)>,
    duration: Duration,
}

impl SimulatedDevice {
    pub fn new(blocks: u64, block_size: u32) -> Self {
        Self {
            blocks,
            block_size,
            max_burst: u32::MAX,
            bad: BTreeSet::new(),
            flaky: HashMap::new(),
            reads: Vec::new(),
            chs: false,
            removable: false,
            identity: DeviceIdentity::new("SIM", "Simulated Disk", "0001"),
            mode: original_page(),
            mode_sets: Vec::new(),
            mode_supported: true,
            fail_mode_set: false,
            fail_mode_restore: false,
            cancel_at: None,
            cancel_on_single_reads: None,
            duration: Duration::from_millis(2),
        }
    }

    pub fn with_max_burst(mut self, max_burst: u32) -> Self {
        self.max_burst = max_burst;
        self
    }

    /// Addresses that never read back.
    pub fn with_bad_blocks<I: IntoIterator<Item = u64>>(mut self, bad: I) -> Self {
        self.bad.extend(bad);
        self
    }

    /// Addresses that fail `failures` times, then read fine.
    pub fn with_flaky_block(mut self, address: u64, failures: u32) -> Self {
        self.flaky.insert(address, failures);
        self
    }

    pub fn with_chs(mut self) -> Self {
        self.chs = true;
        self
    }

    pub fn with_removable(mut self) -> Self {
        self.removable = true;
        self
    }

    pub fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn without_mode_pages(mut self) -> Self {
        self.mode_supported = false;
        self
    }

    pub fn failing_mode_set(mut self) -> Self {
        self.fail_mode_set = true;
        self
    }

    /// The first mode set succeeds, the restore afterwards fails.
    pub fn failing_mode_restore(mut self) -> Self {
        self.fail_mode_restore = true;
        self
    }

    /// Signal `token` once a read covering `address - 1` has been served.
    pub fn cancel_when_reaching(mut self, address: u64, token: CancelToken) -> Self {
        self.cancel_at = Some((address, token));
        self
    }

    /// Signal `token` after this many single-block reads.
    pub fn cancel_after_single_reads(mut self, count: usize, token: CancelToken) -> Self {
        self.cancel_on_single_reads = Some((count, token));
        self
    }

    pub fn with_read_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn reads(&self) -> &[ReadCall] {
        &self.reads
    }

    pub fn clear_reads(&mut self) {
        self.reads.clear();
    }

    pub fn current_mode(&self) -> ErrorRecoveryPage {
        self.mode
    }

    pub fn mode_sets(&self) -> &[ErrorRecoveryPage] {
        &self.mode_sets
    }

    fn persistent_active(&self) -> bool {
        self.mode.tb
    }

    fn after_read(&mut self, start: u64, count: u32) {
        if let Some((address, token)) = &self.cancel_at {
            if start + count as u64 >= *address {
                token.cancel();
            }
        }
        if let Some((limit, token)) = &self.cancel_on_single_reads {
            let singles = self.reads.iter().filter(|r| r.count == 1).count();
            if singles >= *limit {
                token.cancel();
            }
        }
    }
}

impl BlockDevice for SimulatedDevice {
    fn block_count(&mut self) -> Result<u64> {
        Ok(self.blocks)
    }

    fn block_size(&mut self) -> Result<u32> {
        Ok(self.block_size)
    }

    fn identity(&self) -> DeviceIdentity {
        self.identity.clone()
    }

    fn is_removable(&self) -> bool {
        self.removable
    }

    fn addressing(&self) -> Addressing {
        if self.chs {
            Addressing::Chs
        } else {
            Addressing::Lba
        }
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome {
        self.reads.push(ReadCall { start, count });

        let outcome = if count > self.max_burst {
            ReadOutcome::failure(
                Vec::new(),
                Some(SenseInfo::new(0x05, 0x24, 0x00)),
                self.duration,
            )
        } else if start + count as u64 > self.blocks {
            ReadOutcome::failure(
                Vec::new(),
                Some(SenseInfo::new(0x05, 0x21, 0x00)),
                self.duration,
            )
        } else {
            let range = start..start + count as u64;
            let mut failed = self.bad.range(range.clone()).next().is_some();
            for address in range.clone() {
                if let Some(remaining) = self.flaky.get_mut(&address) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        failed = true;
                    }
                }
            }

            if failed {
                let data = if self.persistent_active() {
                    vec![0xEE; count as usize * self.block_size as usize]
                } else {
                    Vec::new()
                };
                ReadOutcome::failure(data, Some(SenseInfo::new(0x03, 0x11, 0x00)), self.duration)
            } else {
                let mut data = Vec::with_capacity(count as usize * self.block_size as usize);
                for address in range {
                    data.extend(block_pattern(address, self.block_size));
                }
                ReadOutcome::success(data, self.duration)
            }
        };

        self.after_read(start, count);
        outcome
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        if !self.mode_supported {
            return Err(RustDumpError::unsupported("no mode pages"));
        }
        Ok(self.mode)
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        if !self.mode_supported || self.fail_mode_set {
            return Err(RustDumpError::scsi("MODE SELECT rejected"));
        }
        if self.fail_mode_restore && !self.mode_sets.is_empty() {
            return Err(RustDumpError::scsi("MODE SELECT failed during restore"));
        }
        self.mode_sets.push(*page);
        self.mode = *page;
        Ok(())
    }
}

/// Sector read issued to a [`SimulatedDisc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRead {
    pub lba: i64,
    pub count: u32,
    pub main_size: u32,
}

/// Track of a simulated disc. `mode` 0 is audio, 1 mode 1, 2 mode 2 form 1.
#[derive(Debug, Clone, Copy)]
struct SimTrack {
    session: u8,
    start: u64,
    control: u8,
    mode: u8,
}

/// Main channel bytes of a simulated sector.
pub fn disc_main(lba: i64, mode: u8, main_size: u32) -> Vec<u8> {
    let mut sector: Vec<u8> = (0..main_size as i64)
        .map(|i| ((lba * 17 + i * 3).rem_euclid(251)) as u8 + 1)
        .collect();
    if main_size == RAW_SECTOR_SIZE && mode != 0 {
        let (m, s, f) = lba_to_msf(lba);
        sector[..12].copy_from_slice(&SYNC_PATTERN);
        sector[12..15].copy_from_slice(&[m, s, f]);
        sector[15] = mode;
        if mode == 2 {
            sector[16..24].copy_from_slice(&[0, 0, 0x08, 0, 0, 0, 0x08, 0]);
        }
    }
    sector
}

/// Subchannel bytes of a simulated sector.
pub fn disc_subchannel(lba: i64, size: u32) -> Vec<u8> {
    (0..size as i64)
        .map(|i| (lba * 5 + i).rem_euclid(256) as u8)
        .collect()
}

pub struct SimulatedDisc {
    tracks: Vec<SimTrack>,
    lead_outs: Vec<(u8, u64)>,
    bad: BTreeSet<i64>,
    lead_in_readable: bool,
    reject_block_reads: bool,
    max_transfer: u32,
    cancel_at: Option<(u64, CancelToken)>,
    reads: Vec<SectorRead>,
    mode: ErrorRecoveryPage,
    mode_sets: Vec<ErrorRecoveryPage>,
}

impl SimulatedDisc {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            lead_outs: Vec::new(),
            bad: BTreeSet::new(),
            lead_in_readable: false,
            reject_block_reads: false,
            max_transfer: u32::MAX,
            cancel_at: None,
            reads: Vec::new(),
            mode: original_page(),
            mode_sets: Vec::new(),
        }
    }

    /// Tracks are numbered in the order they are added.
    pub fn with_track(mut self, session: u8, start: u64, control: u8, mode: u8) -> Self {
        self.tracks.push(SimTrack {
            session,
            start,
            control,
            mode,
        });
        self
    }

    pub fn with_lead_out(mut self, session: u8, lba: u64) -> Self {
        self.lead_outs.push((session, lba));
        self
    }

    pub fn with_bad_sectors<I: IntoIterator<Item = i64>>(mut self, bad: I) -> Self {
        self.bad.extend(bad);
        self
    }

    pub fn with_readable_lead_in(mut self) -> Self {
        self.lead_in_readable = true;
        self
    }

    /// READ(10) fails with an illegal mode for this track, as on CD-DA.
    pub fn rejecting_block_reads(mut self) -> Self {
        self.reject_block_reads = true;
        self
    }

    /// Sector reads longer than `sectors` fail with an invalid field.
    pub fn with_max_transfer(mut self, sectors: u32) -> Self {
        self.max_transfer = sectors;
        self
    }

    /// Signal `token` once a sector read ending at or past `lba` was served.
    pub fn cancel_when_reaching(mut self, lba: u64, token: CancelToken) -> Self {
        self.cancel_at = Some((lba, token));
        self
    }

    pub fn sector_reads(&self) -> &[SectorRead] {
        &self.reads
    }

    pub fn current_mode(&self) -> ErrorRecoveryPage {
        self.mode
    }

    fn track_mode(&self, lba: i64) -> Option<u8> {
        if lba < 0 {
            return self.tracks.first().map(|t| t.mode);
        }
        let lba = lba as u64;
        for (index, track) in self.tracks.iter().enumerate() {
            let end = match self.tracks.get(index + 1) {
                Some(next) if next.session == track.session => next.start,
                _ => self
                    .lead_outs
                    .iter()
                    .find(|(session, _)| *session == track.session)
                    .map(|(_, lba)| *lba)?,
            };
            if lba >= track.start && lba < end {
                return Some(track.mode);
            }
        }
        None
    }
}

impl BlockDevice for SimulatedDisc {
    fn block_count(&mut self) -> Result<u64> {
        Ok(self.lead_outs.iter().map(|(_, lba)| *lba).max().unwrap_or(0))
    }

    fn block_size(&mut self) -> Result<u32> {
        Ok(COOKED_SECTOR_SIZE)
    }

    fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new("SIM", "Simulated Optical", "0002")
    }

    fn is_removable(&self) -> bool {
        true
    }

    fn read_blocks(&mut self, start: u64, count: u32) -> ReadOutcome {
        if self.reject_block_reads {
            return ReadOutcome::failure(
                Vec::new(),
                Some(SenseInfo::new(0x05, 0x64, 0x00)),
                Duration::from_millis(1),
            );
        }
        let layout = SectorLayout {
            main_size: COOKED_SECTOR_SIZE,
            subchannel: SubchannelLayout::None,
        };
        self.read_sectors(start as i64, count, &layout)
    }

    fn error_recovery_mode(&mut self) -> Result<ErrorRecoveryPage> {
        Ok(self.mode)
    }

    fn set_error_recovery_mode(&mut self, page: &ErrorRecoveryPage) -> Result<()> {
        self.mode_sets.push(*page);
        self.mode = *page;
        Ok(())
    }
}

impl OpticalDevice for SimulatedDisc {
    fn read_toc(&mut self) -> Result<TableOfContents> {
        let mut descriptors = Vec::new();
        for (index, track) in self.tracks.iter().enumerate() {
            let (pmin, psec, pframe) = lba_to_msf(track.start as i64);
            descriptors.push(TocDescriptor {
                session: track.session,
                adr: 1,
                control: track.control,
                point: index as u8 + 1,
                pmin,
                psec,
                pframe,
            });
        }
        for (session, lba) in &self.lead_outs {
            let (pmin, psec, pframe) = lba_to_msf(*lba as i64);
            descriptors.push(TocDescriptor {
                session: *session,
                adr: 1,
                control: 0,
                point: POINT_LEAD_OUT,
                pmin,
                psec,
                pframe,
            });
        }
        Ok(TableOfContents {
            first_session: 1,
            last_session: self.lead_outs.iter().map(|(s, _)| *s).max().unwrap_or(1),
            descriptors,
        })
    }

    fn read_sectors(&mut self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome {
        self.reads.push(SectorRead {
            lba,
            count,
            main_size: layout.main_size,
        });
        let outcome = self.serve_sectors(lba, count, layout);
        if let Some((target, token)) = &self.cancel_at {
            if lba + count as i64 >= *target as i64 {
                token.cancel();
            }
        }
        outcome
    }
}

impl SimulatedDisc {
    fn serve_sectors(&self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome {
        let duration = Duration::from_millis(1);
        if count > self.max_transfer {
            return ReadOutcome::failure(
                Vec::new(),
                Some(SenseInfo::new(0x05, 0x24, 0x00)),
                duration,
            );
        }
        let stride = layout.stride() as usize;

        let mut data = Vec::with_capacity(count as usize * stride);
        for sector in lba..lba + count as i64 {
            if sector < 0 && !self.lead_in_readable {
                return ReadOutcome::failure(
                    Vec::new(),
                    Some(SenseInfo::new(0x05, 0x21, 0x00)),
                    duration,
                );
            }
            let mode = match self.track_mode(sector) {
                Some(mode) => mode,
                None => {
                    return ReadOutcome::failure(
                        Vec::new(),
                        Some(SenseInfo::new(0x05, 0x21, 0x00)),
                        duration,
                    )
                }
            };
            if self.bad.contains(&sector) {
                let garbage = if self.mode.tb {
                    vec![0xEE; count as usize * stride]
                } else {
                    Vec::new()
                };
                return ReadOutcome::failure(
                    garbage,
                    Some(SenseInfo::new(0x03, 0x11, 0x05)),
                    duration,
                );
            }
            data.extend(disc_main(sector, mode, layout.main_size));
            data.extend(disc_subchannel(sector, layout.subchannel_size()));
        }
        ReadOutcome::success(data, duration)
    }
}
