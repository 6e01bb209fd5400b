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

    src/recovery/bit_slip.rs

    Bit-slip recovery: when a sector's header verifies but its data CRC
    fails, the PLL may have dropped or inserted cells inside the data field.
    Probe re-decodes of the field shifted by whole cells around the data
    mark and accept the first alignment whose CRC verifies.
*/
use crate::{bitstream::BitStream, codec::mfm};

/// Slip offsets in cells, nearest first.
fn slip_offsets() -> impl Iterator<Item = i64> {
    (1..=8i64).flat_map(|k| [k, -k])
}

/// Attempt to recover the data field of a scanned sector whose header CRC
/// passed but whose data CRC failed. Returns the payload on success.
pub fn recover(bits: &BitStream, scanned: &mfm::ScannedSector) -> Option<Vec<u8>> {
    if !scanned.sector.header_crc.is_ok() || scanned.sector.data_crc.is_ok() {
        return None;
    }
    let dam_cell = scanned.dam_cell?;
    let size = scanned.sector.id.n_size();
    let nominal_start = (dam_cell + mfm::MARKER_LEN) as i64;

    for slip in slip_offsets() {
        let start = nominal_start + slip;
        if start < 0 {
            continue;
        }
        if let Some((payload, true)) = mfm::decode_data_field_at(bits, start as usize, size, false) {
            log::debug!(
                "bit_slip::recover(): {} realigned at {} cells",
                scanned.sector.id,
                slip
            );
            return Some(payload);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slip_offsets_nearest_first() {
        let offsets: Vec<i64> = slip_offsets().collect();
        assert_eq!(&offsets[0..4], &[1, -1, 2, -2]);
        assert_eq!(offsets.len(), 16);
        assert!(offsets.contains(&8) && offsets.contains(&-8));
    }
}
