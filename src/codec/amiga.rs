/*
    FluxRescue
    https://github.com/dbalsom/fluxrescue

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/codec/amiga.rs

    The Amiga MFM track codec. An Amiga track is one continuous train: an
    0xAAAA preamble, the 0x4489 0x4489 sync, then 11 (DD) or 22 (HD)
    back-to-back sectors. Every field is stored odd-bits-first then
    even-bits-first, and the 32-bit checksums are XOR folds of the stored
    longs with clock cells masked off.
*/
use crate::{
    bitstream::BitStream,
    types::enums::IntegrityCheck,
    DecodeError,
    DiskCh,
    DiskChsn,
    DiskGeometry,
    Sector,
    SectorStatus,
};
use bit_vec::BitVec;

pub const SYNC_WORD: u16 = 0x4489;
pub const SYNC_LONG: u32 = 0x4489_4489;
pub const PREAMBLE_LONG: u32 = 0xAAAA_AAAA;

/// Data cells occupy the even bit positions of a stored long; odd positions
/// carry clock.
pub const DATA_MASK: u32 = 0x5555_5555;

pub const AMIGA_SECTOR_SIZE: usize = 512;
pub const AMIGA_LABEL_LONGS: usize = 4;
pub const AMIGA_FORMAT_BYTE: u8 = 0xFF;

/// Stored longs per sector following the sync: info pair, label pairs,
/// header checksum pair, data checksum pair, then 256 data longs.
const SECTOR_LONGS: usize = 2 + 2 * AMIGA_LABEL_LONGS + 2 + 2 + 2 * (AMIGA_SECTOR_SIZE / 4);

use super::mfm::WEAK_CONFIDENCE;

/// Split a long into its odd-bits and even-bits stored form (clock cells
/// clear).
#[inline]
pub fn split_odd_even(value: u32) -> (u32, u32) {
    ((value >> 1) & DATA_MASK, value & DATA_MASK)
}

/// Recombine stored odd/even longs into the original value.
#[inline]
pub fn combine_odd_even(odd: u32, even: u32) -> u32 {
    ((odd & DATA_MASK) << 1) | (even & DATA_MASK)
}

/// Insert MFM clock cells into a stored long: a clock is set between two
/// clear data cells. `prev` is the final data cell of the preceding long.
pub fn insert_clock(data: u32, prev: &mut bool) -> u32 {
    let mut clocked = data;
    for k in (0..16).rev() {
        let d = (data >> (2 * k)) & 1 != 0;
        if !*prev && !d {
            clocked |= 1 << (2 * k + 1);
        }
        *prev = d;
    }
    clocked
}

fn read_long(bits: &BitStream, cell: usize) -> Option<u32> {
    if cell + 32 > bits.len() {
        return None;
    }
    let mut value = 0u32;
    for i in 0..32 {
        value = (value << 1) | bits.bit(cell + i) as u32;
    }
    Some(value)
}

fn push_long(out: &mut BitVec, value: u32) {
    for i in (0..32).rev() {
        out.push(value & (1 << i) != 0);
    }
}

struct RawSector {
    info: u32,
    header_sum_ok: bool,
    data_sum_ok: bool,
    payload: Vec<u8>,
    quality: f64,
}

fn read_sector(bits: &BitStream, start: usize) -> Option<RawSector> {
    let mut longs = Vec::with_capacity(SECTOR_LONGS);
    for i in 0..SECTOR_LONGS {
        longs.push(read_long(bits, start + i * 32)?);
    }

    let info = combine_odd_even(longs[0], longs[1]);

    // The header checksum covers the stored info and label longs.
    let header_region = &longs[0..2 + 2 * AMIGA_LABEL_LONGS];
    let header_sum = header_region.iter().fold(0u32, |acc, l| acc ^ (l & DATA_MASK));
    let stored_header_sum = combine_odd_even(longs[10], longs[11]);

    let data_region = &longs[14..SECTOR_LONGS];
    let data_sum = data_region.iter().fold(0u32, |acc, l| acc ^ (l & DATA_MASK));
    let stored_data_sum = combine_odd_even(longs[12], longs[13]);

    // Payload: 128 odd longs then 128 even longs.
    let odd = &longs[14..14 + AMIGA_SECTOR_SIZE / 4];
    let even = &longs[14 + AMIGA_SECTOR_SIZE / 4..SECTOR_LONGS];
    let mut payload = Vec::with_capacity(AMIGA_SECTOR_SIZE);
    for (o, e) in odd.iter().zip(even.iter()) {
        payload.extend_from_slice(&combine_odd_even(*o, *e).to_be_bytes());
    }

    Some(RawSector {
        info,
        header_sum_ok: header_sum == stored_header_sum,
        data_sum_ok: data_sum == stored_data_sum,
        payload,
        quality: bits.mean_confidence(start, start + SECTOR_LONGS * 32),
    })
}

/// Decode every sector following a sync mark. Checksum failures become
/// per-sector status; a track without a single sync fails with
/// `NoAddressMarks`.
pub fn decode_track(bits: &BitStream, geometry: &DiskGeometry, ch: DiskCh) -> Result<Vec<Sector>, DecodeError> {
    let n = DiskChsn::n_for_size(AMIGA_SECTOR_SIZE);
    let mut sectors = Vec::new();

    let mut shift_reg: u32 = 0;
    let mut shift_ct: usize = 0;
    let mut bi = 0usize;

    while bi < bits.len() {
        shift_reg = (shift_reg << 1) | bits.bit(bi) as u32;
        shift_ct += 1;
        bi += 1;

        if shift_ct < 32 || shift_reg != SYNC_LONG {
            continue;
        }

        let Some(raw) = read_sector(bits, bi) else {
            break;
        };

        let format = (raw.info >> 24) as u8;
        let track = ((raw.info >> 16) & 0xFF) as u8;
        let amiga_sector = ((raw.info >> 8) & 0xFF) as u8;
        if format != AMIGA_FORMAT_BYTE {
            log::trace!("amiga::decode_track(): bad format byte {:02X} at cell {}", format, bi);
            continue;
        }

        let expected_track = ch.c() as u8 * geometry.heads + ch.h();
        if track != expected_track {
            log::trace!(
                "amiga::decode_track(): sector labeled track {} found on track {}",
                track,
                expected_track
            );
        }

        let mut sector = Sector::unread(DiskChsn::new(ch.c(), ch.h(), amiga_sector + 1, n));
        sector.header_crc = IntegrityCheck::from_valid(raw.header_sum_ok);
        sector.data_crc = IntegrityCheck::from_valid(raw.data_sum_ok);
        sector.quality = raw.quality;
        sector.payload = Some(raw.payload);
        sector.status = match (raw.header_sum_ok, raw.data_sum_ok) {
            (false, _) => SectorStatus::HeaderCrc,
            (true, false) => SectorStatus::Bad,
            (true, true) if raw.quality < WEAK_CONFIDENCE => SectorStatus::Weak,
            (true, true) => SectorStatus::Good,
        };
        sectors.push(sector);

        // Skip past the sector body; the next sync follows immediately.
        bi += SECTOR_LONGS * 32;
        shift_reg = 0;
        shift_ct = 0;
    }

    if sectors.is_empty() {
        log::debug!("amiga::decode_track(): no sync marks on {}", ch);
        return Err(DecodeError::NoAddressMarks);
    }
    Ok(sectors)
}

/// Encode a complete Amiga track: preamble, then each sector as
/// `AAAA AAAA | 4489 4489 | info | label | checksums | data`, gap-filled to
/// the revolution length.
pub fn encode_track(sectors: &[Sector], geometry: &DiskGeometry, ch: DiskCh) -> Result<BitStream, DecodeError> {
    let track_cells = geometry.bitcells_per_revolution();
    let mut out = BitVec::with_capacity(track_cells);
    let mut prev = false;

    // Lead-in gap.
    for _ in 0..2 {
        let gap = insert_clock(0, &mut prev);
        push_long(&mut out, gap);
    }

    let spt = sectors.len() as u32;
    for (i, sector) in sectors.iter().enumerate() {
        let fill;
        let payload: &[u8] = match &sector.payload {
            Some(p) if p.len() == AMIGA_SECTOR_SIZE => p,
            _ => {
                fill = vec![0u8; AMIGA_SECTOR_SIZE];
                &fill
            }
        };

        // Preamble and sync. The sync words carry their own (violated)
        // clocking.
        let gap = insert_clock(0, &mut prev);
        push_long(&mut out, gap);
        push_long(&mut out, SYNC_LONG);
        prev = true; // 0x4489 ends in a set data cell

        let amiga_sector = sector.id.s().saturating_sub(1) as u32;
        let track = ch.c() as u32 * geometry.heads as u32 + ch.h() as u32;
        let info = (AMIGA_FORMAT_BYTE as u32) << 24 | track << 16 | amiga_sector << 8 | (spt - i as u32);

        let label = [0u32; AMIGA_LABEL_LONGS];

        // Stored longs, checksummed before clock insertion (the checksum
        // masks clocks off either way).
        let mut header_longs: Vec<u32> = Vec::with_capacity(2 + 2 * AMIGA_LABEL_LONGS);
        let (o, e) = split_odd_even(info);
        header_longs.push(o);
        header_longs.push(e);
        for l in label {
            let (o, e) = split_odd_even(l);
            header_longs.push(o);
            header_longs.push(e);
        }

        let mut data_longs: Vec<u32> = Vec::with_capacity(2 * (AMIGA_SECTOR_SIZE / 4));
        for chunk in payload.chunks_exact(4) {
            let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            data_longs.push(split_odd_even(value).0);
        }
        for chunk in payload.chunks_exact(4) {
            let value = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            data_longs.push(split_odd_even(value).1);
        }

        let header_sum = header_longs.iter().fold(0u32, |acc, l| acc ^ l);
        let data_sum = data_longs.iter().fold(0u32, |acc, l| acc ^ l);

        let mut stored: Vec<u32> = Vec::with_capacity(SECTOR_LONGS);
        stored.extend_from_slice(&header_longs);
        let (o, e) = split_odd_even(header_sum);
        stored.push(o);
        stored.push(e);
        let (o, e) = split_odd_even(data_sum);
        stored.push(o);
        stored.push(e);
        stored.extend_from_slice(&data_longs);

        for long in stored {
            push_long(&mut out, insert_clock(long, &mut prev));
        }
    }

    // Trailing gap out to the index.
    while out.len() + 32 <= track_cells {
        let gap = insert_clock(0, &mut prev);
        push_long(&mut out, gap);
    }
    if out.len() > track_cells {
        log::warn!(
            "amiga::encode_track(): {} format exceeds the index: {} of {} cells",
            ch,
            out.len(),
            track_cells
        );
        out.truncate(track_cells);
    }

    Ok(BitStream::from_bits(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_odd_even_round_trip() {
        for value in [0u32, 0xFFFF_FFFF, 0xDEAD_BEEF, 0x1234_5678] {
            let (o, e) = split_odd_even(value);
            assert_eq!(combine_odd_even(o, e), value);
            // Stored halves never carry set clock cells.
            assert_eq!(o & !DATA_MASK, 0);
            assert_eq!(e & !DATA_MASK, 0);
        }
    }

    #[test]
    fn test_insert_clock_fills_zero_runs() {
        // All-zero data with a clear previous bit clocks to 0xAAAAAAAA.
        let mut prev = false;
        assert_eq!(insert_clock(0, &mut prev), PREAMBLE_LONG);
        // A set previous data cell suppresses the first clock.
        let mut prev = true;
        assert_eq!(insert_clock(0, &mut prev), 0x2AAA_AAAA);
    }

    #[test]
    fn test_track_round_trip() {
        use crate::{DiskDataRate, DiskGeometry, DiskRpm};

        let geom = DiskGeometry::new(80, 2, 11, 512, DiskRpm::Rpm300, DiskDataRate::Rate250Kbps).unwrap();
        let ch = DiskCh::new(4, 1);
        let mut sectors = Vec::new();
        for s in 1..=11u8 {
            let mut sector = Sector::unread(DiskChsn::new(4, 1, s, 2));
            sector.status = SectorStatus::Good;
            sector.payload = Some((0..512).map(|i| (i as u8).wrapping_add(s)).collect());
            sectors.push(sector);
        }

        let bits = encode_track(&sectors, &geom, ch).unwrap();
        let decoded = decode_track(&bits, &geom, ch).unwrap();
        assert_eq!(decoded.len(), 11);
        for (original, decoded) in sectors.iter().zip(decoded.iter()) {
            assert_eq!(decoded.status, SectorStatus::Good, "sector {}", original.id);
            assert_eq!(decoded.id.s(), original.id.s());
            assert_eq!(decoded.payload, original.payload);
        }
    }
}
