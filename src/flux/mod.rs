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

    src/flux/mod.rs

    The flux buffer: an immutable sequence of transition intervals plus index
    marks, with cheap slicing by revolution.
*/
use crate::{random::XorShift, FluxError, NATIVE_SAMPLE_HZ};
use bit_vec::BitVec;
use std::fmt::{self, Display, Formatter};

pub mod pll;

#[doc(hidden)]
#[macro_export]
macro_rules! format_us {
    ($value:expr) => {
        format!("{:.4}μs", $value * 1_000_000.0)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! format_ms {
    ($value:expr) => {
        format!("{:.4}ms", $value * 1_000.0)
    };
}

/// Classification of a flux delta against the nominal MFM windows.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FluxTransition {
    Short,
    Medium,
    Long,
    Other,
}

impl Display for FluxTransition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            FluxTransition::Short => write!(f, "S"),
            FluxTransition::Medium => write!(f, "M"),
            FluxTransition::Long => write!(f, "L"),
            FluxTransition::Other => write!(f, "X"),
        }
    }
}

/// Summary counters collected while decoding a flux stream.
#[derive(Default)]
pub struct FluxStats {
    pub total: u32,
    pub short: u32,
    pub medium: u32,
    pub long: u32,
    pub too_short: u32,
    pub too_long: u32,

    pub shortest_flux: f64,
    pub longest_flux:  f64,
}

impl Display for FluxStats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Total: {} S: {} M: {} L: {} Shortest: {} Longest: {} Too Short: {} Too Long: {}",
            self.total,
            self.short,
            self.medium,
            self.long,
            format_us!(self.shortest_flux),
            format_us!(self.longest_flux),
            self.too_short,
            self.too_long
        )
    }
}

/// An immutable flux capture for one (cylinder, head): transition intervals
/// in integer ticks of `sample_hz`, plus index-pulse positions expressed as
/// indexes into the interval sequence.
///
/// Intervals are strictly positive; index positions are strictly increasing
/// and in range. A capture with one index pulse or none is usable only as a
/// single degenerate revolution.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxCapture {
    sample_hz: u32,
    ticks: Vec<u32>,
    index_positions: Vec<usize>,
}

impl FluxCapture {
    pub fn from_intervals(sample_hz: u32, intervals: &[i64], index_positions: &[usize]) -> Result<Self, FluxError> {
        if sample_hz == 0 {
            return Err(FluxError::InvalidFlux("sample frequency is zero".to_string()));
        }
        let mut ticks = Vec::with_capacity(intervals.len());
        for (i, interval) in intervals.iter().enumerate() {
            if *interval <= 0 || *interval > u32::MAX as i64 {
                return Err(FluxError::InvalidFlux(format!(
                    "interval {} out of range at position {}",
                    interval, i
                )));
            }
            ticks.push(*interval as u32);
        }
        Self::from_ticks(sample_hz, ticks, index_positions.to_vec())
    }

    pub fn from_ticks(sample_hz: u32, ticks: Vec<u32>, index_positions: Vec<usize>) -> Result<Self, FluxError> {
        if ticks.iter().any(|t| *t == 0) {
            return Err(FluxError::InvalidFlux("zero-length interval".to_string()));
        }
        for pair in index_positions.windows(2) {
            if pair[1] <= pair[0] {
                return Err(FluxError::InvalidFlux(format!(
                    "index positions not strictly increasing: {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        if let Some(last) = index_positions.last() {
            if *last > ticks.len() {
                return Err(FluxError::InvalidFlux(format!(
                    "index position {} beyond {} intervals",
                    last,
                    ticks.len()
                )));
            }
        }
        Ok(FluxCapture {
            sample_hz,
            ticks,
            index_positions,
        })
    }

    pub fn sample_hz(&self) -> u32 {
        self.sample_hz
    }

    pub fn ticks(&self) -> &[u32] {
        &self.ticks
    }

    pub fn index_positions(&self) -> &[usize] {
        &self.index_positions
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Number of complete revolutions delimited by index pulses. A capture
    /// with fewer than two index pulses still exposes one degenerate
    /// revolution spanning the whole stream.
    pub fn revolutions(&self) -> usize {
        if self.index_positions.len() < 2 {
            usize::from(!self.ticks.is_empty())
        }
        else {
            self.index_positions.len() - 1
        }
    }

    /// The sub-range of intervals between index pulse `i` and `i + 1`.
    pub fn revolution(&self, i: usize) -> Result<FluxView, FluxError> {
        if self.index_positions.len() < 2 {
            if i == 0 && !self.ticks.is_empty() {
                return Ok(FluxView {
                    sample_hz: self.sample_hz,
                    ticks: &self.ticks,
                });
            }
            return Err(FluxError::OutOfRange(i));
        }
        if i >= self.index_positions.len() - 1 {
            return Err(FluxError::OutOfRange(i));
        }
        Ok(FluxView {
            sample_hz: self.sample_hz,
            ticks: &self.ticks[self.index_positions[i]..self.index_positions[i + 1]],
        })
    }

    /// A view covering every interval in the capture.
    pub fn whole(&self) -> FluxView {
        FluxView {
            sample_hz: self.sample_hz,
            ticks: &self.ticks,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.ticks.iter().map(|t| *t as u64).sum::<u64>() as f64 / self.sample_hz as f64
    }

    /// Spindle speed implied by the first index-to-index spacing, when the
    /// capture carries at least one full revolution.
    pub fn measured_rpm(&self) -> Option<f64> {
        if self.index_positions.len() < 2 {
            return None;
        }
        let secs = self.revolution(0).ok()?.duration_secs();
        (secs > 0.0).then(|| 60.0 / secs)
    }

    /// Synthesize a capture from a raw-cell bitstream at a given cell width.
    ///
    /// Used by the drive simulator and tests. Each revolution repeats the
    /// cell pattern; a `1` cell produces a transition. Optional gaussian
    /// jitter (sigma as a fraction of a cell) is applied deterministically
    /// from the seed. Trailing zero cells carry over into the following
    /// revolution's first interval, as they would on physical media.
    pub fn synthesize(cells: &BitVec, bit_cell_ns: f64, revolutions: usize, jitter: Option<(f64, u64)>) -> Self {
        let mut ticks: Vec<u32> = Vec::new();
        let mut index_positions: Vec<usize> = Vec::new();
        let mut rng = jitter.map(|(sigma, seed)| (sigma, XorShift::new(seed)));

        let tick_ns = 1e9 / NATIVE_SAMPLE_HZ as f64;
        let mut carry_cells = 0usize;

        for _ in 0..revolutions {
            index_positions.push(ticks.len());
            for cell in cells.iter() {
                carry_cells += 1;
                if cell {
                    let mut interval_ns = carry_cells as f64 * bit_cell_ns;
                    if let Some((sigma, rng)) = rng.as_mut() {
                        interval_ns += rng.next_gaussian() * *sigma * bit_cell_ns;
                    }
                    let t = (interval_ns / tick_ns).round().max(1.0) as u32;
                    ticks.push(t);
                    carry_cells = 0;
                }
            }
        }
        index_positions.push(ticks.len());

        FluxCapture {
            sample_hz: NATIVE_SAMPLE_HZ,
            ticks,
            index_positions,
        }
    }

    /// Concatenate the first `revolutions` revolutions into a new capture,
    /// dropping the rest. Used to trim the extra revolution controllers read
    /// to absorb index-timing slack.
    pub fn trimmed(&self, revolutions: usize) -> FluxCapture {
        if self.revolutions() <= revolutions || self.index_positions.len() < 2 {
            return self.clone();
        }
        let end = self.index_positions[revolutions];
        FluxCapture {
            sample_hz: self.sample_hz,
            ticks: self.ticks[..end].to_vec(),
            index_positions: self.index_positions[..=revolutions].to_vec(),
        }
    }
}

/// A borrowed view over one revolution of a capture. Views never extend the
/// capture's lifetime; callers that need retention copy into a new buffer.
#[derive(Copy, Clone, Debug)]
pub struct FluxView<'a> {
    sample_hz: u32,
    ticks: &'a [u32],
}

impl<'a> FluxView<'a> {
    pub fn sample_hz(&self) -> u32 {
        self.sample_hz
    }

    pub fn ticks(&self) -> &'a [u32] {
        self.ticks
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    /// Total duration of the view in nanoseconds.
    pub fn duration_ns(&self) -> u64 {
        let total: u64 = self.ticks.iter().map(|t| *t as u64).sum();
        (total as f64 * (1e9 / self.sample_hz as f64)).round() as u64
    }

    pub fn duration_secs(&self) -> f64 {
        self.ticks.iter().map(|t| *t as u64).sum::<u64>() as f64 / self.sample_hz as f64
    }

    /// Iterate intervals as seconds.
    pub fn delta_iter(&self) -> impl Iterator<Item = f64> + 'a {
        let hz = self.sample_hz as f64;
        self.ticks.iter().map(move |t| *t as f64 / hz)
    }

    /// Iterate intervals as nanoseconds.
    pub fn delta_ns_iter(&self) -> impl Iterator<Item = f64> + 'a {
        let tick_ns = 1e9 / self.sample_hz as f64;
        self.ticks.iter().map(move |t| *t as f64 * tick_ns)
    }

    /// Copy this view into an owned single-revolution capture.
    pub fn to_capture(&self) -> FluxCapture {
        FluxCapture {
            sample_hz: self.sample_hz,
            ticks: self.ticks.to_vec(),
            index_positions: vec![0, self.ticks.len()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_nonpositive_intervals() {
        assert!(FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[100, 0, 100], &[0]).is_err());
        assert!(FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[100, -5, 100], &[0]).is_err());
    }

    #[test]
    fn test_rejects_bad_index_positions() {
        assert!(FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[100; 10], &[0, 5, 5]).is_err());
        assert!(FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[100; 10], &[0, 11]).is_err());
    }

    #[test]
    fn test_revolution_slicing() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[144; 30], &[0, 10, 20, 30]).unwrap();
        assert_eq!(cap.revolutions(), 3);
        assert_eq!(cap.revolution(0).unwrap().len(), 10);
        assert_eq!(cap.revolution(2).unwrap().len(), 10);
        assert!(cap.revolution(3).is_err());
    }

    #[test]
    fn test_degenerate_revolution() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[144; 30], &[]).unwrap();
        assert_eq!(cap.revolutions(), 1);
        assert_eq!(cap.revolution(0).unwrap().len(), 30);
        assert!(cap.revolution(1).is_err());
    }

    #[test]
    fn test_duration_ns() {
        // 72 ticks at 72MHz is exactly 1µs.
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[72; 1000], &[0, 1000]).unwrap();
        assert_eq!(cap.revolution(0).unwrap().duration_ns(), 1_000_000);
    }

    #[test]
    fn test_trimmed() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[144; 30], &[0, 10, 20, 30]).unwrap();
        let trimmed = cap.trimmed(2);
        assert_eq!(trimmed.revolutions(), 2);
        assert_eq!(trimmed.ticks().len(), 20);
    }

    #[test]
    fn test_measured_rpm() {
        // 100,000 intervals of 144 ticks is exactly 200ms per revolution.
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[144; 100_000], &[0, 100_000]).unwrap();
        let rpm = cap.measured_rpm().unwrap();
        assert!((rpm - 300.0).abs() < 0.01, "rpm {}", rpm);

        let no_index = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[144; 100], &[]).unwrap();
        assert!(no_index.measured_rpm().is_none());
    }
}
