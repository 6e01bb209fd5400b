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

    src/codec/fm.rs

    The FM track codec as used by single-density formats (BBC DFS among
    them): a clock cell before every data bit, 1T/2T flux spacing, 256-byte
    sectors. Address marks use clock violations (C7/D7 clock patterns) and
    are matched together with a preceding sync byte to avoid unaligned
    false positives.
*/
use crate::{
    bitstream::BitStream,
    types::enums::IntegrityCheck,
    util::crc_ibm_3740,
    DecodeError,
    DiskCh,
    DiskChsn,
    DiskGeometry,
    Sector,
    SectorStatus,
};
use bit_vec::BitVec;

pub const FM_BYTE_LEN: usize = 16;

pub const GAP_BYTE: u8 = 0xFF;
pub const SYNC_BYTE: u8 = 0x00;

pub const FM_GAP1: usize = 16;
pub const FM_GAP2: usize = 11;
pub const FM_GAP3: usize = 10;
pub const FM_SYNC_LEN: usize = 6;

// Markers as interleaved clock/data cells: data FE/FB/F8/FC under clock C7
// (D7 for the IAM).
pub const IDAM_MARKER_FM: u16 = 0xF57E;
pub const DAM_MARKER_FM: u16 = 0xF56F;
pub const DDAM_MARKER_FM: u16 = 0xF56A;
pub const IAM_MARKER_FM: u16 = 0xF77A;

/// A sync byte (0xAAAA in cells) must precede a marker for it to count.
const SYNC_CELLS: u32 = 0xAAAA_0000;

/// GAP2 plus the data sync is 17 bytes (272 cells).
const DAM_PAIRING_WINDOW: usize = 600;

use super::mfm::WEAK_CONFIDENCE;

#[derive(Copy, Clone, Debug, PartialEq)]
enum MarkerKind {
    Idam,
    Dam,
    Ddam,
}

/// Encode one byte as 16 FM cells: every data bit is preceded by a set
/// clock cell.
pub fn encode_byte(out: &mut BitVec, byte: u8) {
    for i in (0..8).rev() {
        out.push(true);
        out.push(byte & (1 << i) != 0);
    }
}

pub fn encode_bytes(out: &mut BitVec, bytes: &[u8]) {
    for byte in bytes {
        encode_byte(out, *byte);
    }
}

fn push_marker(out: &mut BitVec, marker: u16) {
    for i in (0..16).rev() {
        out.push(marker & (1 << i) != 0);
    }
}

/// Decode one byte from 16 cells; data bits occupy the odd offsets.
pub fn decode_byte(bits: &BitStream, cell: usize) -> Option<u8> {
    if cell + FM_BYTE_LEN > bits.len() {
        return None;
    }
    let mut byte = 0u8;
    for j in 0..8 {
        byte <<= 1;
        byte |= bits.bit(cell + 2 * j + 1) as u8;
    }
    Some(byte)
}

pub fn decode_bytes(bits: &BitStream, cell: usize, count: usize) -> Option<Vec<u8>> {
    if cell + count * FM_BYTE_LEN > bits.len() {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(decode_byte(bits, cell + i * FM_BYTE_LEN)?);
    }
    Some(out)
}

/// Locate sync-preceded FM markers; returned offsets point at the marker's
/// first cell.
fn scan_markers(bits: &BitStream) -> Vec<(usize, MarkerKind)> {
    let mut markers = Vec::new();
    let mut shift_reg: u32 = 0;
    let mut shift_ct: usize = 0;

    for bi in 0..bits.len() {
        shift_reg = (shift_reg << 1) | bits.bit(bi) as u32;
        shift_ct += 1;
        if shift_ct < 32 {
            continue;
        }
        let kind = match shift_reg {
            r if r == SYNC_CELLS | IDAM_MARKER_FM as u32 => Some(MarkerKind::Idam),
            r if r == SYNC_CELLS | DAM_MARKER_FM as u32 => Some(MarkerKind::Dam),
            r if r == SYNC_CELLS | DDAM_MARKER_FM as u32 => Some(MarkerKind::Ddam),
            _ => None,
        };
        if let Some(kind) = kind {
            markers.push((bi + 1 - 16, kind));
        }
    }
    markers
}

struct PendingHeader {
    chsn: DiskChsn,
    crc_ok: bool,
    end_cell: usize,
}

fn orphan_sector(header: &PendingHeader) -> Sector {
    let mut sector = Sector::unread(header.chsn);
    sector.status = SectorStatus::Missing;
    sector.header_crc = IntegrityCheck::from_valid(header.crc_ok);
    sector
}

/// Decode every sector in a revolution. FM CRCs cover the address-mark data
/// byte and the field that follows it.
pub fn decode_track(bits: &BitStream, _geometry: &DiskGeometry, ch: DiskCh) -> Result<Vec<Sector>, DecodeError> {
    let markers = scan_markers(bits);
    if markers.is_empty() {
        log::debug!("fm::decode_track(): no address marks on {}", ch);
        return Err(DecodeError::NoAddressMarks);
    }

    let mut sectors = Vec::new();
    let mut pending: Option<PendingHeader> = None;

    for (cell, kind) in markers {
        match kind {
            MarkerKind::Idam => {
                if let Some(header) = pending.take() {
                    sectors.push(orphan_sector(&header));
                }
                let Some(hdr) = decode_bytes(bits, cell + FM_BYTE_LEN, 6) else {
                    continue;
                };
                let stored = u16::from_be_bytes([hdr[4], hdr[5]]);
                let mark_crc = crc_ibm_3740(&[0xFE], None);
                let crc_ok = crc_ibm_3740(&hdr[0..4], Some(mark_crc)) == stored;
                pending = Some(PendingHeader {
                    chsn: DiskChsn::new(hdr[0] as u16, hdr[1], hdr[2], hdr[3]),
                    crc_ok,
                    end_cell: cell + 7 * FM_BYTE_LEN,
                });
            }
            MarkerKind::Dam | MarkerKind::Ddam => {
                let Some(header) = pending.take() else {
                    continue;
                };
                if cell.saturating_sub(header.end_cell) > DAM_PAIRING_WINDOW {
                    sectors.push(orphan_sector(&header));
                    continue;
                }

                let deleted = kind == MarkerKind::Ddam;
                let size = header.chsn.n_size();
                let mut sector = Sector::unread(header.chsn);
                sector.header_crc = IntegrityCheck::from_valid(header.crc_ok);

                let data_start = cell + FM_BYTE_LEN;
                match decode_bytes(bits, data_start, size + 2) {
                    Some(field) => {
                        let stored = u16::from_be_bytes([field[size], field[size + 1]]);
                        let mark_byte = if deleted { 0xF8 } else { 0xFB };
                        let mark_crc = crc_ibm_3740(&[mark_byte], None);
                        let data_crc_ok = crc_ibm_3740(&field[0..size], Some(mark_crc)) == stored;

                        let quality = bits.mean_confidence(data_start, data_start + (size + 2) * FM_BYTE_LEN);
                        sector.quality = quality;
                        sector.data_crc = IntegrityCheck::from_valid(data_crc_ok);
                        sector.payload = Some(field[0..size].to_vec());
                        sector.status = match (header.crc_ok, data_crc_ok) {
                            (false, _) => SectorStatus::HeaderCrc,
                            (true, false) => SectorStatus::Bad,
                            (true, true) if deleted => SectorStatus::Deleted,
                            (true, true) if quality < WEAK_CONFIDENCE => SectorStatus::Weak,
                            (true, true) => SectorStatus::Good,
                        };
                    }
                    None => {
                        sector.status = SectorStatus::Missing;
                    }
                }
                sectors.push(sector);
            }
        }
    }

    if let Some(header) = pending {
        sectors.push(orphan_sector(&header));
    }

    Ok(sectors)
}

/// Produce a full FM track of raw cells. Layout per sector:
/// `SYNC IDAM id CRC GAP2 SYNC DAM data CRC GAP3`, framed by GAP1 and a
/// trailing gap out to the index.
pub fn encode_track(sectors: &[Sector], geometry: &DiskGeometry, ch: DiskCh) -> Result<BitStream, DecodeError> {
    let track_cells = geometry.bitcells_per_revolution();
    let track_bytes = track_cells / FM_BYTE_LEN;

    let mut out = BitVec::with_capacity(track_cells);
    let mut bytes_written = 0usize;

    let mut write_run = |out: &mut BitVec, byte: u8, count: usize, written: &mut usize| {
        for _ in 0..count {
            encode_byte(out, byte);
        }
        *written += count;
    };

    write_run(&mut out, GAP_BYTE, FM_GAP1, &mut bytes_written);

    for sector in sectors {
        let size = sector.id.n_size();
        let deleted = sector.status == SectorStatus::Deleted;

        write_run(&mut out, SYNC_BYTE, FM_SYNC_LEN, &mut bytes_written);
        push_marker(&mut out, IDAM_MARKER_FM);
        bytes_written += 1;
        let id_bytes = [sector.id.c() as u8, sector.id.h(), sector.id.s(), sector.id.n()];
        encode_bytes(&mut out, &id_bytes);
        let mark_crc = crc_ibm_3740(&[0xFE], None);
        let crc = crc_ibm_3740(&id_bytes, Some(mark_crc));
        encode_bytes(&mut out, &crc.to_be_bytes());
        bytes_written += 6;

        write_run(&mut out, GAP_BYTE, FM_GAP2, &mut bytes_written);
        write_run(&mut out, SYNC_BYTE, FM_SYNC_LEN, &mut bytes_written);

        push_marker(&mut out, if deleted { DDAM_MARKER_FM } else { DAM_MARKER_FM });
        bytes_written += 1;

        let fill;
        let payload: &[u8] = match &sector.payload {
            Some(p) if p.len() == size => p,
            _ => {
                fill = vec![0u8; size];
                &fill
            }
        };
        encode_bytes(&mut out, payload);
        let mark_byte = if deleted { 0xF8 } else { 0xFB };
        let mark_crc = crc_ibm_3740(&[mark_byte], None);
        let crc = crc_ibm_3740(payload, Some(mark_crc));
        encode_bytes(&mut out, &crc.to_be_bytes());
        bytes_written += size + 2;

        write_run(&mut out, GAP_BYTE, FM_GAP3, &mut bytes_written);
    }

    if bytes_written < track_bytes {
        write_run(&mut out, GAP_BYTE, track_bytes - bytes_written, &mut bytes_written);
    }
    else if bytes_written > track_bytes {
        log::warn!(
            "fm::encode_track(): {} format exceeds the index: {} of {} bytes",
            ch,
            bytes_written,
            track_bytes
        );
        out.truncate(track_cells);
    }

    Ok(BitStream::from_bits(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fm_byte_round_trip() {
        let mut cells = BitVec::new();
        let bytes = [0x00, 0xFF, 0xA5, 0x3C];
        encode_bytes(&mut cells, &bytes);
        let stream = BitStream::from_bits(cells);
        assert_eq!(decode_bytes(&stream, 0, bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn test_fm_clock_always_set() {
        let mut cells = BitVec::new();
        encode_byte(&mut cells, 0x5A);
        for (i, bit) in cells.iter().enumerate() {
            if i % 2 == 0 {
                assert!(bit, "clock cell {} clear", i);
            }
        }
    }

    #[test]
    fn test_marker_clock_violations() {
        // The IDAM pattern interleaves clock C7 with data FE.
        let mut value: u16 = 0;
        let clock = 0xC7u8;
        let data = 0xFEu8;
        for i in (0..8).rev() {
            value = (value << 1) | ((clock >> i) & 1) as u16;
            value = (value << 1) | ((data >> i) & 1) as u16;
        }
        assert_eq!(value, IDAM_MARKER_FM);
    }
}
