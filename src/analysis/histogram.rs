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

    src/analysis/histogram.rs

    Fixed-width interval histogram with local-maxima peak detection and a
    two-parameter gaussian fit per peak. The peak positions drive encoding
    detection, PLL initialization and the jitter/SNR metrics.
*/
use crate::flux::FluxView;

pub const DEFAULT_BIN_WIDTH_NS: f64 = 50.0;

/// Peaks closer together than this are merged; half the 2T/3T spacing of the
/// fastest supported track.
const MIN_PEAK_SEPARATION_NS: f64 = 500.0;

const MAX_PEAKS: usize = 5;

/// A fitted flux timing peak.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GaussianPeak {
    pub mean_ns: f64,
    pub sigma_ns: f64,
    pub count: u64,
}

pub struct FluxHistogram {
    bin_width_ns: f64,
    bins: Vec<u64>,
    total: u64,
}

impl FluxHistogram {
    /// Bin every interval of the view at the given width (nanoseconds).
    pub fn new(view: &FluxView, bin_width_ns: f64) -> Self {
        // 16µs of range covers 4T at the slowest supported data rate with
        // margin to spare.
        let bin_ct = (16_000.0 / bin_width_ns).ceil() as usize;
        let mut bins = vec![0u64; bin_ct];
        let mut total = 0u64;

        for delta_ns in view.delta_ns_iter() {
            let bin = (delta_ns / bin_width_ns) as usize;
            if bin < bins.len() {
                bins[bin] += 1;
                total += 1;
            }
        }

        FluxHistogram {
            bin_width_ns,
            bins,
            total,
        }
    }

    pub fn bin_width_ns(&self) -> f64 {
        self.bin_width_ns
    }

    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    fn bin_center(&self, index: usize) -> f64 {
        (index as f64 + 0.5) * self.bin_width_ns
    }

    /// Locate up to five peaks: local maxima above a relative count
    /// threshold, merged when closer than the minimum separation, each
    /// refined with a gaussian (μ, σ) fit. Peaks are returned in ascending
    /// position order.
    pub fn find_peaks(&self, threshold: Option<f64>) -> Vec<GaussianPeak> {
        let threshold_ct = (self.total as f64 * threshold.unwrap_or(0.005)).round().max(1.0) as u64;
        let mut maxima: Vec<(usize, u64)> = Vec::new();

        for i in 0..self.bins.len() {
            let prev = if i > 0 { self.bins[i - 1] } else { 0 };
            let next = if i + 1 < self.bins.len() { self.bins[i + 1] } else { 0 };
            let curr = self.bins[i];
            if curr >= prev && curr > next && curr >= threshold_ct {
                maxima.push((i, curr));
            }
        }

        // Merge maxima that fall inside the same timing class.
        let min_sep_bins = (MIN_PEAK_SEPARATION_NS / self.bin_width_ns).round() as usize;
        let mut merged: Vec<(usize, u64)> = Vec::new();
        for (bin, ct) in maxima {
            match merged.last_mut() {
                Some((last_bin, last_ct)) if bin - *last_bin < min_sep_bins.max(1) => {
                    if ct > *last_ct {
                        *last_bin = bin;
                        *last_ct = ct;
                    }
                }
                _ => merged.push((bin, ct)),
            }
        }

        // Keep the strongest peaks if more than the maximum survive.
        if merged.len() > MAX_PEAKS {
            merged.sort_by(|a, b| b.1.cmp(&a.1));
            merged.truncate(MAX_PEAKS);
            merged.sort_by_key(|(bin, _)| *bin);
        }

        merged.into_iter().map(|(bin, _)| self.fit_gaussian(bin)).collect()
    }

    /// Two-parameter least-squares gaussian fit: iterated weighted moments
    /// over a ±3σ window centered on the running mean.
    fn fit_gaussian(&self, peak_bin: usize) -> GaussianPeak {
        let mut mean = self.bin_center(peak_bin);
        // Initial window guess of one bin width on either side.
        let mut sigma = self.bin_width_ns;
        let mut count = 0u64;

        for _ in 0..3 {
            let lo = (mean - 3.0 * sigma).max(0.0);
            let hi = mean + 3.0 * sigma;
            let lo_bin = (lo / self.bin_width_ns) as usize;
            let hi_bin = ((hi / self.bin_width_ns).ceil() as usize).min(self.bins.len());

            let mut w_sum = 0.0f64;
            let mut w_mean = 0.0f64;
            count = 0;
            for bin in lo_bin..hi_bin {
                let w = self.bins[bin] as f64;
                w_sum += w;
                w_mean += w * self.bin_center(bin);
                count += self.bins[bin];
            }
            if w_sum == 0.0 {
                break;
            }
            w_mean /= w_sum;

            let mut w_var = 0.0f64;
            for bin in lo_bin..hi_bin {
                let d = self.bin_center(bin) - w_mean;
                w_var += self.bins[bin] as f64 * d * d;
            }
            w_var /= w_sum;

            mean = w_mean;
            // All samples in one bin still carry the bin's quantization
            // spread.
            sigma = w_var.sqrt().max(self.bin_width_ns / 12.0f64.sqrt());
        }

        GaussianPeak {
            mean_ns: mean,
            sigma_ns: sigma,
            count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FluxCapture, NATIVE_SAMPLE_HZ};

    #[test]
    fn test_three_peak_detection() {
        // Clean DD MFM timing: 4/6/8µs.
        let intervals: Vec<i64> = [288i64, 288, 432, 576].repeat(2000);
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[]).unwrap();
        let hist = FluxHistogram::new(&cap.whole(), DEFAULT_BIN_WIDTH_NS);
        let peaks = hist.find_peaks(None);

        assert_eq!(peaks.len(), 3);
        assert!((peaks[0].mean_ns - 4000.0).abs() < 50.0, "2T peak at {}", peaks[0].mean_ns);
        assert!((peaks[1].mean_ns - 6000.0).abs() < 50.0, "3T peak at {}", peaks[1].mean_ns);
        assert!((peaks[2].mean_ns - 8000.0).abs() < 50.0, "4T peak at {}", peaks[2].mean_ns);
        assert!(peaks[0].count > peaks[2].count);
    }

    #[test]
    fn test_empty_view_has_no_peaks() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[], &[]).unwrap();
        let hist = FluxHistogram::new(&cap.whole(), DEFAULT_BIN_WIDTH_NS);
        assert!(hist.find_peaks(None).is_empty());
    }
}
