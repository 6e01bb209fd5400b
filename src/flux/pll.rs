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

    src/flux/pll.rs

    The phase-locked loop that converts a flux interval stream into a raw-cell
    bitstream by tracking a variable data clock.
*/
use crate::{
    bitstream::BitStream,
    flux::{FluxStats, FluxView},
    format_us,
    DecodeError,
    TrackEncoding,
};
use bit_vec::BitVec;

/// Width of the moving window used to detect loss of lock.
const ABORT_WINDOW: usize = 1024;

/// PLL configuration. The nominal bit cell is the data-tracking clock period;
/// MFM packs two raw cells per data bit, so flux intervals span 2–4 clock
/// periods on a healthy MFM track.
#[derive(Copy, Clone, Debug)]
pub struct PllConfig {
    /// Nominal clock period in microseconds (2.0 for a 250Kbps MFM track).
    pub nominal_bit_cell_us: f64,
    /// Period gain α: fraction of the per-cell clock error folded into the
    /// clock each interval. Default 0.05, useful range 0.01–0.15.
    pub period_gain: f64,
    /// Phase gain β: fraction of the phase error corrected each interval.
    /// Default 0.6, useful range 0.2–0.9.
    pub phase_gain: f64,
    /// Maximum clock excursion from nominal, as a fraction.
    pub max_adjust: f64,
    pub encoding: TrackEncoding,
    /// Emit a per-bit confidence vector alongside the bits.
    pub emit_confidence: bool,
}

impl Default for PllConfig {
    fn default() -> Self {
        PllConfig {
            nominal_bit_cell_us: 2.0,
            period_gain: 0.05,
            phase_gain: 0.6,
            max_adjust: 0.15,
            encoding: TrackEncoding::Mfm,
            emit_confidence: true,
        }
    }
}

impl PllConfig {
    pub fn with_bit_cell(mut self, us: f64) -> Self {
        self.nominal_bit_cell_us = us;
        self
    }

    pub fn with_gains(mut self, period_gain: f64, phase_gain: f64) -> Self {
        self.period_gain = period_gain;
        self.phase_gain = phase_gain;
        self
    }

    pub fn with_encoding(mut self, encoding: TrackEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_max_adjust(mut self, max_adjust: f64) -> Self {
        self.max_adjust = max_adjust;
        self
    }

    /// Valid flux spacing in clock periods for the configured encoding.
    fn cell_range(&self) -> (i64, i64) {
        match self.encoding {
            TrackEncoding::Mfm | TrackEncoding::AmigaMfm => (2, 4),
            TrackEncoding::Fm => (1, 2),
            TrackEncoding::Gcr => (1, 8),
        }
    }
}

pub struct PllDecodeResult {
    pub bits: BitStream,
    pub stats: FluxStats,
}

pub struct Pll {
    config: PllConfig,
}

impl Pll {
    pub fn new(config: PllConfig) -> Self {
        Pll { config }
    }

    pub fn config(&self) -> &PllConfig {
        &self.config
    }

    /// Decode a flux view into a raw-cell bitstream.
    ///
    /// Per interval δ the candidate cell count is `round((δ − φ) / T)`,
    /// clamped to the encoding's valid range; the decoder emits `n − 1` zero
    /// cells and a one cell, then corrects phase by β of the residual and the
    /// clock by α of the per-cell error. Given nominal flux the output
    /// reproduces the written cells exactly, and identical input and
    /// configuration always produce identical output.
    ///
    /// Fails with `DecodeAbort` only when the cell-count clamp is violated on
    /// a majority of the intervals inside a moving 1024-interval window.
    pub fn decode(&self, view: &FluxView) -> Result<PllDecodeResult, DecodeError> {
        let t_nominal = self.config.nominal_bit_cell_us * 1e-6;
        let min_clock = t_nominal * (1.0 - self.config.max_adjust);
        let max_clock = t_nominal * (1.0 + self.config.max_adjust);
        let (min_cells, max_cells) = self.config.cell_range();

        let mut t = t_nominal;
        let mut phase: f64 = 0.0;

        let mut bits = BitVec::with_capacity(view.len() * 3);
        let mut confidence = self
            .config
            .emit_confidence
            .then(|| Vec::with_capacity(view.len() * 3));

        let mut window = [false; ABORT_WINDOW];
        let mut window_cursor = 0usize;
        let mut window_filled = 0usize;
        let mut window_violations = 0usize;

        let mut stats = FluxStats {
            total: view.len() as u32,
            shortest_flux: f64::MAX,
            ..FluxStats::default()
        };

        for delta in view.delta_iter() {
            stats.shortest_flux = delta.min(stats.shortest_flux);
            stats.longest_flux = delta.max(stats.longest_flux);

            let relative = delta - phase;
            let candidate = (relative / t).round() as i64;
            let clamped = candidate < min_cells || candidate > max_cells;
            let n = candidate.clamp(min_cells, max_cells);

            if candidate < min_cells {
                stats.too_short += 1;
            }
            else if candidate > max_cells {
                stats.too_long += 1;
            }

            // Loss-of-lock detection over the trailing window.
            if window[window_cursor] {
                window_violations -= 1;
            }
            window[window_cursor] = clamped;
            if clamped {
                window_violations += 1;
            }
            window_cursor = (window_cursor + 1) % ABORT_WINDOW;
            window_filled = (window_filled + 1).min(ABORT_WINDOW);
            if window_filled == ABORT_WINDOW && window_violations > ABORT_WINDOW / 2 {
                log::warn!(
                    "Pll::decode(): lock lost, {}/{} clamped intervals in window",
                    window_violations,
                    ABORT_WINDOW
                );
                return Err(DecodeError::DecodeAbort);
            }

            let tau = n as f64 * t;
            let phase_error = relative - tau;

            // n − 1 zero cells, then the transition cell.
            let cell_confidence = (1.0 - phase_error.abs() / t).clamp(0.0, 1.0) as f32;
            for _ in 0..n - 1 {
                bits.push(false);
            }
            bits.push(true);
            if let Some(conf) = confidence.as_mut() {
                for _ in 0..n {
                    conf.push(cell_confidence);
                }
            }

            match n {
                2 => stats.short += 1,
                3 => stats.medium += 1,
                4 => stats.long += 1,
                _ => {}
            }

            // Phase: advance the clock by the expected time plus β of the
            // residual; expressed relative to the flux edge.
            phase = phase + tau + self.config.phase_gain * phase_error - delta;

            // Clock: fold in α of the per-cell timing error, bounded.
            let clock_error = delta / n as f64 - t;
            t = (t + self.config.period_gain * clock_error).clamp(min_clock, max_clock);
        }

        if stats.shortest_flux == f64::MAX {
            stats.shortest_flux = 0.0;
        }

        log::trace!(
            "Pll::decode(): {} intervals -> {} cells, final clock {} [{}]",
            view.len(),
            bits.len(),
            format_us!(t),
            stats
        );

        Ok(PllDecodeResult {
            bits: BitStream::new(bits, confidence),
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FluxCapture, NATIVE_SAMPLE_HZ};

    // 2T/3T/4T at a 2µs clock, in 72MHz ticks.
    const SHORT: i64 = 288;
    const MEDIUM: i64 = 432;
    const LONG: i64 = 576;

    #[test]
    fn test_nominal_decode() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[SHORT, MEDIUM, LONG, SHORT], &[]).unwrap();
        let pll = Pll::new(PllConfig::default());
        let result = pll.decode(&cap.whole()).unwrap();

        let expected: Vec<bool> = [
            vec![false, true],
            vec![false, false, true],
            vec![false, false, false, true],
            vec![false, true],
        ]
        .concat();
        let bits: Vec<bool> = result.bits.bits().iter().collect();
        assert_eq!(bits, expected);
        assert_eq!(result.stats.short, 2);
        assert_eq!(result.stats.medium, 1);
        assert_eq!(result.stats.long, 1);
    }

    #[test]
    fn test_confidence_is_full_on_nominal_flux() {
        let intervals: Vec<i64> = [SHORT, MEDIUM, LONG].repeat(100);
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[]).unwrap();
        let result = Pll::new(PllConfig::default()).decode(&cap.whole()).unwrap();
        let conf = result.bits.confidence().unwrap();
        assert!(conf.iter().all(|c| *c > 0.99));
    }

    #[test]
    fn test_decode_abort_on_garbage() {
        // Every interval is far too long for the MFM window; after 1024 of
        // them the decoder must give up rather than emit junk forever.
        let intervals: Vec<i64> = vec![LONG * 4; 2048];
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[]).unwrap();
        let result = Pll::new(PllConfig::default()).decode(&cap.whole());
        assert!(matches!(result, Err(DecodeError::DecodeAbort)));
    }
}
