//! Disc table of contents and track planning
//!
//! The raw TOC (READ TOC/PMA/ATIP format 0010b) is a list of 11-byte
//! descriptors. Descriptors with ADR 1 and POINT 1..=99 give track starts;
//! POINT 0xA2 gives the lead-out of their session.

use super::track::{SectorLayout, TrackDescriptor, TrackKind};
use super::{OpticalOptions, RAW_SECTOR_SIZE};
use crate::error::{Result, RustDumpError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const POINT_FIRST_TRACK: u8 = 0xA0;
pub const POINT_LAST_TRACK: u8 = 0xA1;
pub const POINT_LEAD_OUT: u8 = 0xA2;

const DESCRIPTOR_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocDescriptor {
    pub session: u8,
    pub adr: u8,
    pub control: u8,
    pub point: u8,
    pub pmin: u8,
    pub psec: u8,
    pub pframe: u8,
}

impl TocDescriptor {
    /// LBA of the PMIN/PSEC/PFRAME position.
    pub fn lba(&self) -> i64 {
        msf_to_lba(self.pmin, self.psec, self.pframe)
    }

    fn is_track(&self) -> bool {
        self.adr == 1 && (1..=99).contains(&self.point)
    }
}

/// (m * 60 + s) * 75 + f - 150
pub fn msf_to_lba(minute: u8, second: u8, frame: u8) -> i64 {
    (minute as i64 * 60 + second as i64) * 75 + frame as i64 - 150
}

pub fn lba_to_msf(lba: i64) -> (u8, u8, u8) {
    let absolute = (lba + 150).max(0);
    let minute = absolute / (60 * 75);
    let second = (absolute / 75) % 60;
    let frame = absolute % 75;
    (minute as u8, second as u8, frame as u8)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOfContents {
    pub first_session: u8,
    pub last_session: u8,
    pub descriptors: Vec<TocDescriptor>,
}

impl TableOfContents {
    /// Parse a raw full TOC response, header included.
    pub fn parse_full_toc(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(RustDumpError::parse("full TOC shorter than its header"));
        }
        let data_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
        // the length field does not count itself
        let end = (data_len + 2).min(buf.len());
        if end < 4 {
            return Err(RustDumpError::parse(format!(
                "full TOC data length {} too small",
                data_len
            )));
        }

        let body = &buf[4..end];
        if body.len() % DESCRIPTOR_LEN != 0 {
            debug!(
                "Full TOC body of {} bytes is not a multiple of {}, ignoring the tail",
                body.len(),
                DESCRIPTOR_LEN
            );
        }

        let descriptors = body
            .chunks_exact(DESCRIPTOR_LEN)
            .map(|d| TocDescriptor {
                session: d[0],
                adr: d[1] >> 4,
                control: d[1] & 0x0F,
                point: d[3],
                pmin: d[8],
                psec: d[9],
                pframe: d[10],
            })
            .collect();

        Ok(Self {
            first_session: buf[2],
            last_session: buf[3],
            descriptors,
        })
    }

    /// Lead-out LBA of a session.
    pub fn lead_out(&self, session: u8) -> Option<i64> {
        self.descriptors
            .iter()
            .find(|d| d.session == session && d.adr == 1 && d.point == POINT_LEAD_OUT)
            .map(TocDescriptor::lba)
    }
}

/// Ordered, non-overlapping track table with sink offsets assigned.
pub fn plan_tracks(toc: &TableOfContents, options: &OpticalOptions) -> Result<Vec<TrackDescriptor>> {
    let mut starts: BTreeMap<u8, &TocDescriptor> = BTreeMap::new();
    for descriptor in toc.descriptors.iter().filter(|d| d.is_track()) {
        if starts.insert(descriptor.point, descriptor).is_some() {
            return Err(RustDumpError::parse(format!(
                "track {} listed twice in TOC",
                descriptor.point
            )));
        }
    }
    if starts.is_empty() {
        return Err(RustDumpError::parse("TOC lists no tracks"));
    }

    let entries: Vec<&TocDescriptor> = starts.values().copied().collect();
    let mut tracks: Vec<TrackDescriptor> = Vec::with_capacity(entries.len());
    let mut payload_offset = 0u64;
    let mut subchannel_offset = 0u64;

    for (index, entry) in entries.iter().enumerate() {
        let start = entry.lba();
        if start < 0 {
            return Err(RustDumpError::parse(format!(
                "track {} starts at negative LBA {}",
                entry.point, start
            )));
        }

        let next_in_session = entries
            .get(index + 1)
            .filter(|next| next.session == entry.session);
        let end_exclusive = match next_in_session {
            Some(next) => next.lba(),
            None => toc.lead_out(entry.session).ok_or_else(|| {
                RustDumpError::parse(format!("session {} has no lead-out", entry.session))
            })?,
        };
        if end_exclusive <= start {
            return Err(RustDumpError::parse(format!(
                "track {} is empty or overlaps the next one ({}..{})",
                entry.point, start, end_exclusive
            )));
        }

        let kind = TrackKind::from_control(entry.control);
        let layout = SectorLayout::for_track(kind, options.read_mode, options.subchannel);
        let separate = options.separate_subchannel && layout.subchannel_size() > 0;
        let track = TrackDescriptor {
            sequence: entry.point,
            session: entry.session,
            start: start as u64,
            end: end_exclusive as u64 - 1,
            control: entry.control,
            kind,
            layout,
            logical_sector_size: if kind.is_audio() {
                RAW_SECTOR_SIZE
            } else {
                super::COOKED_SECTOR_SIZE
            },
            raw_sector_size: RAW_SECTOR_SIZE,
            separate_subchannel: separate,
            payload_offset,
            subchannel_offset,
        };

        if let Some(previous) = tracks.last() {
            if track.start <= previous.end {
                return Err(RustDumpError::parse(format!(
                    "track {} overlaps track {}",
                    track.sequence, previous.sequence
                )));
            }
        }

        payload_offset += track.payload_len();
        subchannel_offset += track.subchannel_len();
        debug!(
            "Track {} session {}: {}..={} {} ({} bytes per sector)",
            track.sequence,
            track.session,
            track.start,
            track.end,
            track.kind,
            track.layout.stride()
        );
        tracks.push(track);
    }

    info!(
        "Planned {} tracks over {} sessions",
        tracks.len(),
        toc.last_session.max(1)
    );
    Ok(tracks)
}
