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

    src/recovery/pll_tuning.rs

    Parameter-sweep recovery: re-decode a captured track over a deterministic
    grid of PLL gains and clock offsets, stopping per sector on the first
    CRC-valid decode.
*/
use crate::{
    codec::TrackCodec,
    flux::pll::{Pll, PllConfig},
    DiskCh,
    DiskGeometry,
    FluxCapture,
    Sector,
};
use std::collections::HashSet;

/// One point in the sweep grid.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PllGridPoint {
    pub period_gain: f64,
    pub phase_gain: f64,
    pub bit_cell_us: f64,
}

const PERIOD_GAINS: [f64; 5] = [0.02, 0.03, 0.05, 0.07, 0.10];
const PHASE_GAINS: [f64; 5] = [0.4, 0.5, 0.6, 0.7, 0.8];

/// The default sweep: period gain major, then phase gain, then bit-cell
/// offsets of ±5% in 2.5% steps around nominal. Callers may substitute
/// their own ordered list.
pub fn default_grid(nominal_bit_cell_us: f64) -> Vec<PllGridPoint> {
    let mut grid = Vec::with_capacity(PERIOD_GAINS.len() * PHASE_GAINS.len() * 5);
    for period_gain in PERIOD_GAINS {
        for phase_gain in PHASE_GAINS {
            for k in -2i32..=2 {
                grid.push(PllGridPoint {
                    period_gain,
                    phase_gain,
                    bit_cell_us: nominal_bit_cell_us * (1.0 + k as f64 * 0.025),
                });
            }
        }
    }
    grid
}

/// Sweep the grid over a capture, looking for CRC-valid decodes of the
/// target sector IDs. Each sector keeps the first grid point that decodes
/// it; the sweep ends early once every target is found.
pub fn sweep(
    capture: &FluxCapture,
    grid: &[PllGridPoint],
    base: &PllConfig,
    geometry: &DiskGeometry,
    ch: DiskCh,
    targets: &[u8],
) -> Vec<(Sector, PllGridPoint)> {
    let codec = TrackCodec::new(base.encoding);
    let mut wanted: HashSet<u8> = targets.iter().copied().collect();
    let mut found = Vec::new();

    'grid: for point in grid {
        let config = PllConfig {
            nominal_bit_cell_us: point.bit_cell_us,
            period_gain: point.period_gain,
            phase_gain: point.phase_gain,
            ..*base
        };
        let pll = Pll::new(config);

        for rev in 0..capture.revolutions() {
            let Ok(view) = capture.revolution(rev) else {
                break;
            };
            let Ok(decoded) = pll.decode(&view) else {
                continue;
            };
            let Ok(sectors) = codec.decode_track(&decoded.bits, geometry, ch) else {
                continue;
            };
            for sector in sectors {
                if wanted.contains(&sector.id.s()) && sector.status.is_readable() {
                    log::debug!(
                        "pll_tuning::sweep(): {} recovered with α={} β={} cell={:.3}µs",
                        sector.id,
                        point.period_gain,
                        point.phase_gain,
                        point.bit_cell_us
                    );
                    wanted.remove(&sector.id.s());
                    found.push((sector, *point));
                }
            }
            if wanted.is_empty() {
                break 'grid;
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_shape_and_order() {
        let grid = default_grid(2.0);
        assert_eq!(grid.len(), 125);
        // Period gain is the slowest-varying axis, bit cell the fastest.
        assert_eq!(grid[0].period_gain, 0.02);
        assert_eq!(grid[0].phase_gain, 0.4);
        assert!((grid[0].bit_cell_us - 1.9).abs() < 1e-9);
        assert!((grid[4].bit_cell_us - 2.1).abs() < 1e-9);
        assert_eq!(grid[5].phase_gain, 0.5);
        assert_eq!(grid[25].period_gain, 0.03);
        assert_eq!(grid.last().unwrap().period_gain, 0.10);
    }
}
