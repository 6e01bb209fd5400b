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

    src/recovery/multi_capture.rs

    Multi-capture statistical recovery: decode many revolutions of the same
    track independently, vote each payload bit weighted by PLL confidence,
    and accept the reconstruction only if its CRC verifies.
*/
use crate::{
    bitstream::BitStream,
    codec::mfm,
    controller::{ControllerError, DriveController},
    util::crc_ibm_3740,
    FluxCapture,
};

/// Controllers capture at most this many revolutions at a time; larger
/// requests are split into several captures.
pub const MAX_REVS_PER_CAPTURE: u32 = 10;

pub const MIN_VOTE_REVOLUTIONS: u32 = 10;
pub const MAX_VOTE_REVOLUTIONS: u32 = 1000;

/// Accumulated per-bit votes for one sector's data field (payload plus CRC).
pub struct SectorVote {
    /// Signed confidence sum per bit: positive leans 1, negative leans 0.
    acc: Vec<f64>,
    /// Total weight seen per bit.
    weight: Vec<f64>,
    size: usize,
    decodes: usize,
}

impl SectorVote {
    pub fn new(size: usize) -> Self {
        let bits = (size + 2) * 8;
        SectorVote {
            acc: vec![0.0; bits],
            weight: vec![0.0; bits],
            size,
            decodes: 0,
        }
    }

    pub fn decodes(&self) -> usize {
        self.decodes
    }

    /// Fold one revolution's decode of the data field into the vote. The
    /// field begins at `data_start` cells (just past the data mark).
    pub fn collect(&mut self, bits: &BitStream, data_start: usize) {
        let byte_ct = self.size + 2;
        if data_start + byte_ct * mfm::MFM_BYTE_LEN > bits.len() {
            return;
        }
        for k in 0..byte_ct {
            for j in 0..8 {
                let cell = data_start + k * mfm::MFM_BYTE_LEN + 2 * j + 1;
                let conf = bits
                    .confidence()
                    .and_then(|c| c.get(cell).copied())
                    .unwrap_or(1.0) as f64;
                let bit_index = k * 8 + j;
                if bits.bit(cell) {
                    self.acc[bit_index] += conf;
                }
                else {
                    self.acc[bit_index] -= conf;
                }
                self.weight[bit_index] += conf;
            }
        }
        self.decodes += 1;
    }

    /// Elect the majority bit at every position and validate the
    /// reconstruction's CRC. Returns the payload and the mean vote margin on
    /// success.
    pub fn elect(&self) -> Option<(Vec<u8>, f64)> {
        if self.decodes == 0 {
            return None;
        }
        let byte_ct = self.size + 2;
        let mut field = vec![0u8; byte_ct];
        let mut margin_sum = 0.0f64;

        for k in 0..byte_ct {
            for j in 0..8 {
                let bit_index = k * 8 + j;
                if self.acc[bit_index] > 0.0 {
                    field[k] |= 0x80 >> j;
                }
                let w = self.weight[bit_index];
                if w > 0.0 {
                    margin_sum += self.acc[bit_index].abs() / w;
                }
            }
        }

        let stored = u16::from_be_bytes([field[self.size], field[self.size + 1]]);
        let marker_crc = crc_ibm_3740(&mfm::DAM_MARKER_BYTES, None);
        if crc_ibm_3740(&field[0..self.size], Some(marker_crc)) != stored {
            return None;
        }

        let confidence = margin_sum / (byte_ct * 8) as f64;
        Some((field[0..self.size].to_vec(), confidence))
    }
}

/// Capture `total` revolutions as a series of bounded captures.
pub fn capture_revolutions(
    controller: &mut dyn DriveController,
    total: u32,
) -> Result<Vec<FluxCapture>, ControllerError> {
    let total = total.clamp(MIN_VOTE_REVOLUTIONS, MAX_VOTE_REVOLUTIONS);
    let mut captures = Vec::new();
    let mut remaining = total;
    while remaining > 0 {
        let chunk = remaining.min(MAX_REVS_PER_CAPTURE) as u8;
        captures.push(controller.read_flux(chunk)?);
        remaining -= chunk as u32;
    }
    Ok(captures)
}
