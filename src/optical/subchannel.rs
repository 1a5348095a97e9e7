//! Subchannel handling
//!
//! Drives return raw P-W subchannel interleaved: each of the 96 bytes holds
//! one bit of every channel (P in bit 7 down to W in bit 0). The packed form
//! stores the channels one after the other, 12 bytes each.

use super::track::SectorLayout;

const SUBCHANNEL_BYTES: usize = 96;
const CHANNEL_BYTES: usize = 12;

/// Interleaved P-W to channel order (P, Q, R, S, T, U, V, W).
pub fn deinterleave(raw: &[u8; SUBCHANNEL_BYTES]) -> [u8; SUBCHANNEL_BYTES] {
    let mut packed = [0u8; SUBCHANNEL_BYTES];
    for (symbol, byte) in raw.iter().enumerate() {
        for channel in 0..8 {
            if byte & (0x80 >> channel) != 0 {
                packed[channel * CHANNEL_BYTES + symbol / 8] |= 0x80 >> (symbol % 8);
            }
        }
    }
    packed
}

/// Channel order back to the interleaved form drives return.
pub fn interleave(packed: &[u8; SUBCHANNEL_BYTES]) -> [u8; SUBCHANNEL_BYTES] {
    let mut raw = [0u8; SUBCHANNEL_BYTES];
    for (symbol, byte) in raw.iter_mut().enumerate() {
        for channel in 0..8 {
            if packed[channel * CHANNEL_BYTES + symbol / 8] & (0x80 >> (symbol % 8)) != 0 {
                *byte |= 0x80 >> channel;
            }
        }
    }
    raw
}

/// The 12-byte Q channel of a packed subchannel block.
pub fn q_channel(packed: &[u8; SUBCHANNEL_BYTES]) -> &[u8] {
    &packed[CHANNEL_BYTES..2 * CHANNEL_BYTES]
}

/// Main channel and subchannel of a burst read as separate buffers.
/// `pack` converts every raw P-W block into channel order.
pub fn split(data: &[u8], layout: &SectorLayout, pack: bool) -> (Vec<u8>, Vec<u8>) {
    let stride = layout.stride() as usize;
    let main_size = layout.main_size as usize;
    let sub_size = layout.subchannel_size() as usize;
    let sectors = data.len() / stride.max(1);

    let mut main = Vec::with_capacity(sectors * main_size);
    let mut sub = Vec::with_capacity(sectors * sub_size);
    for record in data.chunks_exact(stride) {
        main.extend_from_slice(&record[..main_size]);
        push_subchannel(&mut sub, &record[main_size..], pack);
    }
    (main, sub)
}

/// Burst data with every sector's subchannel packed in place.
pub fn pack_records(data: &[u8], layout: &SectorLayout) -> Vec<u8> {
    let stride = layout.stride() as usize;
    let main_size = layout.main_size as usize;
    let mut out = Vec::with_capacity(data.len());
    for record in data.chunks_exact(stride) {
        out.extend_from_slice(&record[..main_size]);
        push_subchannel(&mut out, &record[main_size..], true);
    }
    out
}

fn push_subchannel(out: &mut Vec<u8>, subchannel: &[u8], pack: bool) {
    match <&[u8; SUBCHANNEL_BYTES]>::try_from(subchannel) {
        Ok(raw) if pack => out.extend_from_slice(&deinterleave(raw)),
        _ => out.extend_from_slice(subchannel),
    }
}
