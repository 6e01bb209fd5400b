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

    src/codec/mfm.rs

    The IBM System-34 MFM track codec: address mark search, sector ID and
    data field decoding with CRC verification, and the full-track writer.

    Address marks violate the MFM clock rule (A1/C2 bytes with a missing
    clock bit) to form sync patterns that cannot occur in data, so markers
    are matched as pre-encoded 64-cell constants.
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

pub const MFM_BYTE_LEN: usize = 16;
pub const MARKER_LEN: usize = 64;

pub const GAP_BYTE: u8 = 0x4E;
pub const SYNC_BYTE: u8 = 0x00;

pub const IBM_GAP4A: usize = 80;
pub const IBM_GAP1: usize = 50;
pub const IBM_GAP2: usize = 22;
pub const SYNC_LEN: usize = 12;

// Pre-encoded markers for IAM, IDAM, DAM and DDAM.
pub const IAM_MARKER: u64 = 0x5224_5224_5224_5552;
pub const IDAM_MARKER: u64 = 0x4489_4489_4489_5554;
pub const DAM_MARKER: u64 = 0x4489_4489_4489_5545;
pub const DDAM_MARKER: u64 = 0x4489_4489_4489_554A;

pub const IAM_MARKER_BYTES: [u8; 4] = [0xC2, 0xC2, 0xC2, 0xFC];
pub const IDAM_MARKER_BYTES: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFE];
pub const DAM_MARKER_BYTES: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFB];
pub const DDAM_MARKER_BYTES: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xF8];

/// Maximum cell distance between the end of an ID field and its data mark.
/// GAP2 plus the data sync is 34 bytes (544 cells); anything past this
/// window belongs to a different sector.
const DAM_PAIRING_WINDOW: usize = 1000;

/// CRC-valid sectors whose mean cell confidence falls below this are
/// recorded `Weak`.
pub const WEAK_CONFIDENCE: f64 = 0.75;

#[derive(Copy, Clone, Debug, PartialEq)]
enum MarkerKind {
    Iam,
    Idam,
    Dam,
    Ddam,
}

/// A decoded sector plus the cell offsets of its marks, for consumers that
/// need to revisit the raw stream (bit-slip recovery).
#[derive(Clone, Debug)]
pub struct ScannedSector {
    pub sector: Sector,
    pub idam_cell: Option<usize>,
    pub dam_cell: Option<usize>,
}

/// Encode one byte as 16 MFM cells: a clock cell is inserted between
/// adjacent zero data bits. `prev` carries the last data bit across byte
/// boundaries.
pub fn encode_byte(out: &mut BitVec, byte: u8, prev: &mut bool) {
    for i in (0..8).rev() {
        let bit = byte & (1 << i) != 0;
        out.push(!(*prev || bit));
        out.push(bit);
        *prev = bit;
    }
}

pub fn encode_bytes(out: &mut BitVec, bytes: &[u8], prev: &mut bool) {
    for byte in bytes {
        encode_byte(out, *byte, prev);
    }
}

/// Append a pre-encoded 64-cell marker.
fn push_marker(out: &mut BitVec, marker: u64, prev: &mut bool) {
    for i in (0..64).rev() {
        out.push(marker & (1 << i) != 0);
    }
    *prev = marker & 1 != 0;
}

/// Decode one byte from 16 cells starting at `cell`; data bits occupy the
/// odd cell offsets.
pub fn decode_byte(bits: &BitStream, cell: usize) -> Option<u8> {
    if cell + MFM_BYTE_LEN > bits.len() {
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
    if cell + count * MFM_BYTE_LEN > bits.len() {
        return None;
    }
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        out.push(decode_byte(bits, cell + i * MFM_BYTE_LEN)?);
    }
    Some(out)
}

/// Locate every address mark in the stream by shift register comparison.
fn scan_markers(bits: &BitStream) -> Vec<(usize, MarkerKind)> {
    let mut markers = Vec::new();
    let mut shift_reg: u64 = 0;
    let mut shift_ct: usize = 0;

    for bi in 0..bits.len() {
        shift_reg = (shift_reg << 1) | bits.bit(bi) as u64;
        shift_ct += 1;
        if shift_ct < MARKER_LEN {
            continue;
        }
        let kind = match shift_reg {
            IAM_MARKER => Some(MarkerKind::Iam),
            IDAM_MARKER => Some(MarkerKind::Idam),
            DAM_MARKER => Some(MarkerKind::Dam),
            DDAM_MARKER => Some(MarkerKind::Ddam),
            _ => None,
        };
        if let Some(kind) = kind {
            markers.push((bi + 1 - MARKER_LEN, kind));
        }
    }
    markers
}

struct PendingHeader {
    chsn: DiskChsn,
    crc_ok: bool,
    idam_cell: usize,
    end_cell: usize,
}

fn orphan_sector(header: &PendingHeader) -> ScannedSector {
    let mut sector = Sector::unread(header.chsn);
    sector.status = SectorStatus::Missing;
    sector.header_crc = IntegrityCheck::from_valid(header.crc_ok);
    ScannedSector {
        sector,
        idam_cell: Some(header.idam_cell),
        dam_cell: None,
    }
}

/// Decode every sector in a revolution, returning marker offsets alongside.
///
/// A bad header CRC, a bad data CRC or a missing data field records the
/// sector with the appropriate status and continues scanning. Only the
/// complete absence of address marks fails the track.
pub fn scan_track(bits: &BitStream, _geometry: &DiskGeometry, ch: DiskCh) -> Result<Vec<ScannedSector>, DecodeError> {
    let markers = scan_markers(bits);
    if !markers.iter().any(|(_, k)| *k != MarkerKind::Iam) {
        log::debug!("scan_track(): no address marks on {}", ch);
        return Err(DecodeError::NoAddressMarks);
    }

    let mut scanned: Vec<ScannedSector> = Vec::new();
    let mut pending: Option<PendingHeader> = None;

    for (cell, kind) in markers {
        match kind {
            MarkerKind::Iam => {}
            MarkerKind::Idam => {
                if let Some(header) = pending.take() {
                    log::trace!("scan_track(): orphan ID field at cell {} on {}", header.idam_cell, ch);
                    scanned.push(orphan_sector(&header));
                }
                let Some(hdr) = decode_bytes(bits, cell + MARKER_LEN, 6) else {
                    continue;
                };
                let stored = u16::from_be_bytes([hdr[4], hdr[5]]);
                let marker_crc = crc_ibm_3740(&IDAM_MARKER_BYTES, None);
                let crc_ok = crc_ibm_3740(&hdr[0..4], Some(marker_crc)) == stored;
                let chsn = DiskChsn::new(hdr[0] as u16, hdr[1], hdr[2], hdr[3]);
                pending = Some(PendingHeader {
                    chsn,
                    crc_ok,
                    idam_cell: cell,
                    end_cell: cell + MARKER_LEN + 6 * MFM_BYTE_LEN,
                });
            }
            MarkerKind::Dam | MarkerKind::Ddam => {
                let Some(header) = pending.take() else {
                    log::trace!("scan_track(): data mark without ID field at cell {} on {}", cell, ch);
                    continue;
                };
                if cell.saturating_sub(header.end_cell) > DAM_PAIRING_WINDOW {
                    scanned.push(orphan_sector(&header));
                    continue;
                }

                let deleted = kind == MarkerKind::Ddam;
                let size = header.chsn.n_size();
                let mut sector = Sector::unread(header.chsn);
                sector.header_crc = IntegrityCheck::from_valid(header.crc_ok);

                let data_start = cell + MARKER_LEN;
                match decode_bytes(bits, data_start, size + 2) {
                    Some(field) => {
                        let stored = u16::from_be_bytes([field[size], field[size + 1]]);
                        let marker_bytes = if deleted { &DDAM_MARKER_BYTES } else { &DAM_MARKER_BYTES };
                        let marker_crc = crc_ibm_3740(marker_bytes, None);
                        let data_crc_ok = crc_ibm_3740(&field[0..size], Some(marker_crc)) == stored;

                        let quality = bits.mean_confidence(data_start, data_start + (size + 2) * MFM_BYTE_LEN);
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

                scanned.push(ScannedSector {
                    sector,
                    idam_cell: Some(header.idam_cell),
                    dam_cell: Some(cell),
                });
            }
        }
    }

    if let Some(header) = pending {
        scanned.push(orphan_sector(&header));
    }

    log::trace!(
        "scan_track(): {} decoded {} sectors ({} readable)",
        ch,
        scanned.len(),
        scanned.iter().filter(|s| s.sector.status.is_readable()).count()
    );
    Ok(scanned)
}

pub fn decode_track(bits: &BitStream, geometry: &DiskGeometry, ch: DiskCh) -> Result<Vec<Sector>, DecodeError> {
    Ok(scan_track(bits, geometry, ch)?.into_iter().map(|s| s.sector).collect())
}

/// Re-decode a data field at an arbitrary cell origin (used by bit-slip
/// recovery to probe shifted alignments). Returns the payload and whether
/// its CRC verified.
pub fn decode_data_field_at(bits: &BitStream, data_start: usize, size: usize, deleted: bool) -> Option<(Vec<u8>, bool)> {
    let field = decode_bytes(bits, data_start, size + 2)?;
    let stored = u16::from_be_bytes([field[size], field[size + 1]]);
    let marker_bytes = if deleted { &DDAM_MARKER_BYTES } else { &DAM_MARKER_BYTES };
    let marker_crc = crc_ibm_3740(marker_bytes, None);
    let crc_ok = crc_ibm_3740(&field[0..size], Some(marker_crc)) == stored;
    Some((field[0..size].to_vec(), crc_ok))
}

/// GAP3 length for a geometry's track layout.
fn gap3_for(geometry: &DiskGeometry) -> usize {
    match geometry.sectors_per_track {
        15 | 18 => 84,
        36 => 53,
        _ => 80,
    }
}

/// Produce a full track of raw cells:
/// `GAP4a | SYNC | IAM | GAP1 | [SYNC IDAM id CRC GAP2 SYNC DAM data CRC GAP3]* | GAP4b`.
///
/// Sectors are written in slice order; a sector with no payload is filled
/// with zeros. Deleted sectors receive a DDAM.
pub fn encode_track(sectors: &[Sector], geometry: &DiskGeometry, ch: DiskCh) -> Result<BitStream, DecodeError> {
    let track_cells = geometry.bitcells_per_revolution();
    let track_bytes = track_cells / MFM_BYTE_LEN;
    let gap3 = gap3_for(geometry);

    let mut out = BitVec::with_capacity(track_cells);
    let mut prev = false;

    let mut bytes_written = 0usize;
    let mut write_gap = |out: &mut BitVec, prev: &mut bool, byte: u8, count: usize, written: &mut usize| {
        for _ in 0..count {
            encode_byte(out, byte, prev);
        }
        *written += count;
    };

    write_gap(&mut out, &mut prev, GAP_BYTE, IBM_GAP4A, &mut bytes_written);
    write_gap(&mut out, &mut prev, SYNC_BYTE, SYNC_LEN, &mut bytes_written);
    push_marker(&mut out, IAM_MARKER, &mut prev);
    bytes_written += 4;
    write_gap(&mut out, &mut prev, GAP_BYTE, IBM_GAP1, &mut bytes_written);

    for sector in sectors {
        let size = sector.id.n_size();
        let deleted = sector.status == SectorStatus::Deleted;

        // ID field.
        write_gap(&mut out, &mut prev, SYNC_BYTE, SYNC_LEN, &mut bytes_written);
        push_marker(&mut out, IDAM_MARKER, &mut prev);
        bytes_written += 4;
        let id_bytes = [sector.id.c() as u8, sector.id.h(), sector.id.s(), sector.id.n()];
        encode_bytes(&mut out, &id_bytes, &mut prev);
        let marker_crc = crc_ibm_3740(&IDAM_MARKER_BYTES, None);
        let crc = crc_ibm_3740(&id_bytes, Some(marker_crc));
        encode_bytes(&mut out, &crc.to_be_bytes(), &mut prev);
        bytes_written += 6;

        write_gap(&mut out, &mut prev, GAP_BYTE, IBM_GAP2, &mut bytes_written);

        // Data field.
        write_gap(&mut out, &mut prev, SYNC_BYTE, SYNC_LEN, &mut bytes_written);
        let (marker, marker_bytes): (u64, &[u8; 4]) = if deleted {
            (DDAM_MARKER, &DDAM_MARKER_BYTES)
        }
        else {
            (DAM_MARKER, &DAM_MARKER_BYTES)
        };
        push_marker(&mut out, marker, &mut prev);
        bytes_written += 4;

        let fill;
        let payload: &[u8] = match &sector.payload {
            Some(p) if p.len() == size => p,
            Some(p) => {
                log::warn!(
                    "encode_track(): {} payload length {} != sector size {}; padding",
                    sector.id,
                    p.len(),
                    size
                );
                fill = {
                    let mut v = p.clone();
                    v.resize(size, 0);
                    v
                };
                &fill
            }
            None => {
                fill = vec![0u8; size];
                &fill
            }
        };
        encode_bytes(&mut out, payload, &mut prev);
        let marker_crc = crc_ibm_3740(marker_bytes, None);
        let crc = crc_ibm_3740(payload, Some(marker_crc));
        encode_bytes(&mut out, &crc.to_be_bytes(), &mut prev);
        bytes_written += size + 2;

        write_gap(&mut out, &mut prev, GAP_BYTE, gap3, &mut bytes_written);
    }

    // Fill the remainder of the revolution with GAP4b.
    if bytes_written < track_bytes {
        write_gap(&mut out, &mut prev, GAP_BYTE, track_bytes - bytes_written, &mut bytes_written);
    }
    else if bytes_written > track_bytes {
        log::warn!(
            "encode_track(): {} format exceeds the index: {} of {} bytes",
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
    use bit_vec::BitVec;

    #[test]
    fn test_marker_constants_match_byte_encoding() {
        // A marker's cells are the standard MFM encoding of its bytes with
        // one clock violation per sync byte. Encoding A1 normally and
        // clearing the violated clock must reproduce the constant.
        let mut cells = BitVec::new();
        let mut prev = false;
        encode_bytes(&mut cells, &IDAM_MARKER_BYTES, &mut prev);
        let mut value: u64 = 0;
        for bit in cells.iter() {
            value = (value << 1) | bit as u64;
        }
        // Clear the clock between bits 4 and 5 of each A1.
        let violation_mask: u64 = 0x0020_0020_0020_0000;
        assert_eq!(value & !violation_mask, IDAM_MARKER);
    }

    #[test]
    fn test_byte_round_trip() {
        let mut cells = BitVec::new();
        let mut prev = false;
        let bytes = [0x00, 0x4E, 0xA5, 0xFF, 0x12];
        encode_bytes(&mut cells, &bytes, &mut prev);
        let stream = BitStream::from_bits(cells);
        let decoded = decode_bytes(&stream, 0, bytes.len()).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn test_mfm_clock_rule() {
        // 0x00 after a zero bit: every clock cell set, no adjacent ones.
        let mut cells = BitVec::new();
        let mut prev = false;
        encode_byte(&mut cells, 0x00, &mut prev);
        let as_vec: Vec<bool> = cells.iter().collect();
        assert_eq!(as_vec, vec![
            true, false, true, false, true, false, true, false, true, false, true, false, true, false, true, false
        ]);
    }
}
