//! Track descriptors and sector layouts.

use super::{
    ReadMode, SubchannelMode, COOKED_SECTOR_SIZE, Q16_SUBCHANNEL_SIZE, RAW_SECTOR_SIZE,
    RAW_SUBCHANNEL_SIZE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Sync pattern opening every raw data sector.
pub const SYNC_PATTERN: [u8; 12] = [
    0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];

/// Control field bit marking a data track.
pub const CONTROL_DATA_TRACK: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrackKind {
    Audio,
    /// Data track whose mode is not known yet
    Data,
    Mode1,
    Mode2Formless,
    Mode2Form1,
    Mode2Form2,
}

impl TrackKind {
    pub fn from_control(control: u8) -> Self {
        if control & CONTROL_DATA_TRACK != 0 {
            Self::Data
        } else {
            Self::Audio
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Data)
    }

    /// Classify a raw 2352-byte sector by its sync pattern, mode byte and,
    /// for mode 2, the duplicated subheader. `None` when the sector carries
    /// no recognisable header.
    pub fn from_raw_sector(sector: &[u8]) -> Option<Self> {
        if sector.len() < 24 || sector[..12] != SYNC_PATTERN {
            return None;
        }
        match sector[15] & 0x03 {
            1 => Some(Self::Mode1),
            2 => {
                let subheader = &sector[16..20];
                if subheader != &sector[20..24] {
                    return Some(Self::Mode2Formless);
                }
                if subheader[2] & 0x20 != 0 {
                    Some(Self::Mode2Form2)
                } else {
                    Some(Self::Mode2Form1)
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Audio => "audio",
            Self::Data => "data",
            Self::Mode1 => "mode 1",
            Self::Mode2Formless => "mode 2",
            Self::Mode2Form1 => "mode 2 form 1",
            Self::Mode2Form2 => "mode 2 form 2",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubchannelLayout {
    None,
    Q16,
    /// Interleaved P-W as returned by the drive
    Raw,
}

impl SubchannelLayout {
    pub fn size(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Q16 => Q16_SUBCHANNEL_SIZE,
            Self::Raw => RAW_SUBCHANNEL_SIZE,
        }
    }
}

impl From<SubchannelMode> for SubchannelLayout {
    fn from(mode: SubchannelMode) -> Self {
        match mode {
            SubchannelMode::None => Self::None,
            SubchannelMode::Q16 => Self::Q16,
            SubchannelMode::Raw => Self::Raw,
        }
    }
}

/// Shape of one sector record returned by the drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorLayout {
    pub main_size: u32,
    pub subchannel: SubchannelLayout,
}

impl SectorLayout {
    pub fn raw(subchannel: SubchannelLayout) -> Self {
        Self {
            main_size: RAW_SECTOR_SIZE,
            subchannel,
        }
    }

    pub fn cooked(kind: TrackKind) -> Self {
        Self {
            main_size: if kind.is_audio() {
                RAW_SECTOR_SIZE
            } else {
                COOKED_SECTOR_SIZE
            },
            subchannel: SubchannelLayout::None,
        }
    }

    pub fn for_track(kind: TrackKind, mode: ReadMode, subchannel: SubchannelMode) -> Self {
        match mode {
            ReadMode::Raw => Self::raw(subchannel.into()),
            ReadMode::Cooked => Self::cooked(kind),
        }
    }

    pub fn subchannel_size(&self) -> u32 {
        self.subchannel.size()
    }

    /// Bytes per sector record.
    pub fn stride(&self) -> u32 {
        self.main_size + self.subchannel_size()
    }
}

/// One track of the disc. `start..=end` are LBAs; the offsets locate the
/// track inside the payload and subchannel sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub sequence: u8,
    pub session: u8,
    pub start: u64,
    pub end: u64,
    pub control: u8,
    pub kind: TrackKind,
    pub layout: SectorLayout,
    /// User data bytes per sector
    pub logical_sector_size: u32,
    pub raw_sector_size: u32,
    /// Subchannel goes to its own sink
    pub separate_subchannel: bool,
    pub payload_offset: u64,
    pub subchannel_offset: u64,
}

impl TrackDescriptor {
    pub fn sector_count(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn range(&self) -> Range<u64> {
        self.start..self.end + 1
    }

    pub fn contains(&self, lba: u64) -> bool {
        lba >= self.start && lba <= self.end
    }

    /// Bytes per sector stored in the payload sink.
    pub fn payload_stride(&self) -> u64 {
        if self.separate_subchannel {
            self.layout.main_size as u64
        } else {
            self.layout.stride() as u64
        }
    }

    /// Bytes per sector stored in the subchannel sink.
    pub fn subchannel_stride(&self) -> u64 {
        if self.separate_subchannel {
            self.layout.subchannel_size() as u64
        } else {
            0
        }
    }

    pub fn payload_len(&self) -> u64 {
        self.sector_count() * self.payload_stride()
    }

    pub fn subchannel_len(&self) -> u64 {
        self.sector_count() * self.subchannel_stride()
    }

    pub fn payload_offset_of(&self, lba: u64) -> u64 {
        self.payload_offset + (lba - self.start) * self.payload_stride()
    }

    pub fn subchannel_offset_of(&self, lba: u64) -> u64 {
        self.subchannel_offset + (lba - self.start) * self.subchannel_stride()
    }

    /// Replace an ambiguous data kind with what a raw sector says. Returns
    /// true when the kind changed.
    pub fn refine(&mut self, raw_sector: &[u8]) -> bool {
        if !self.kind.is_ambiguous() || self.layout.main_size != super::RAW_SECTOR_SIZE {
            return false;
        }
        match TrackKind::from_raw_sector(raw_sector) {
            Some(kind) => {
                self.kind = kind;
                self.logical_sector_size = match kind {
                    TrackKind::Mode1 | TrackKind::Mode2Form1 => COOKED_SECTOR_SIZE,
                    TrackKind::Mode2Formless => 2336,
                    TrackKind::Mode2Form2 => 2324,
                    TrackKind::Audio | TrackKind::Data => self.logical_sector_size,
                };
                true
            }
            None => false,
        }
    }
}
