//! Track-aware optical extension
//!
//! Compact discs carry per-track geometry: sector sizes and subchannel
//! layouts differ between tracks, sessions leave unaddressed gaps and the
//! lead-in lives at negative addresses. This module plans the track table
//! from the TOC and drives the generic imaging engine once per track.

pub mod dump;
pub mod leadin;
pub mod subchannel;
pub mod toc;
pub mod track;

pub use self::dump::{OpticalOutcome, OpticalSinks};
pub use leadin::LeadInReport;
pub use toc::{msf_to_lba, plan_tracks, TableOfContents, TocDescriptor};
pub use track::{SectorLayout, SubchannelLayout, TrackDescriptor, TrackKind};

use crate::device::{BlockDevice, ReadOutcome};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Full raw CD sector: sync, header and user data with EDC/ECC.
pub const RAW_SECTOR_SIZE: u32 = 2352;
/// User data of a mode 1 / mode 2 form 1 sector.
pub const COOKED_SECTOR_SIZE: u32 = 2048;
/// Raw P-W subchannel bytes per sector.
pub const RAW_SUBCHANNEL_SIZE: u32 = 96;
/// Formatted Q subchannel bytes per sector.
pub const Q16_SUBCHANNEL_SIZE: u32 = 16;
/// Sectors of lead-in reachable before LBA 0 (two seconds of pregap).
pub const LEAD_IN_SECTORS: i64 = 150;

/// What the drive returns for every sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// 2352-byte sectors on every track, plus subchannel
    Raw,
    /// 2048 bytes of user data on data tracks, 2352 on audio tracks
    Cooked,
}

/// Subchannel requested alongside raw sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SubchannelMode {
    None,
    /// Formatted Q, 16 bytes
    Q16,
    /// Interleaved P-W, 96 bytes
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalOptions {
    /// Try to capture LBAs -150..-1 before the first track
    pub lead_in: bool,
    pub read_mode: ReadMode,
    pub subchannel: SubchannelMode,
    /// Store subchannel in its own sink instead of after every sector
    pub separate_subchannel: bool,
    /// Convert raw interleaved P-W into channel order before storing
    pub pack_subchannel: bool,
}

impl Default for OpticalOptions {
    fn default() -> Self {
        Self {
            lead_in: true,
            read_mode: ReadMode::Raw,
            subchannel: SubchannelMode::Raw,
            separate_subchannel: true,
            pack_subchannel: false,
        }
    }
}

/// A device that can read the disc TOC and whole CD sectors.
pub trait OpticalDevice: BlockDevice {
    fn read_toc(&mut self) -> Result<TableOfContents>;

    /// Read `count` sectors at `lba` (negative inside the lead-in). The data
    /// holds `count` records of `layout.stride()` bytes: main channel first,
    /// subchannel after it.
    fn read_sectors(&mut self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome;
}

impl<T: OpticalDevice + ?Sized> OpticalDevice for &mut T {
    fn read_toc(&mut self) -> Result<TableOfContents> {
        (**self).read_toc()
    }

    fn read_sectors(&mut self, lba: i64, count: u32, layout: &SectorLayout) -> ReadOutcome {
        (**self).read_sectors(lba, count, layout)
    }
}
