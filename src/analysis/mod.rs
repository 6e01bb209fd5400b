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

    src/analysis/mod.rs

    The flux analyzer: interval histogram, peak fitting, jitter, SNR,
    encoding detection and the 0-100 signal quality score.
*/
use crate::{flux::FluxView, FluxCapture, TrackEncoding};

pub mod histogram;

pub use histogram::{FluxHistogram, GaussianPeak, DEFAULT_BIN_WIDTH_NS};

/// Ratio tolerance for encoding classification (±10%).
const RATIO_TOLERANCE: f64 = 0.10;

/// SNR in dB mapped onto 0..100 for the quality score.
const SNR_NORM_FULL_SCALE_DB: f64 = 30.0;

/// Analysis results for one flux capture.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxAnalysis {
    /// Histogram bin counts at `bin_width_ns` resolution.
    pub bin_width_ns: f64,
    pub bins: Vec<u64>,
    /// Fitted timing peaks, ascending.
    pub peaks: Vec<GaussianPeak>,
    /// RMS deviation of every interval from its nearest peak.
    pub jitter_rms_ns: f64,
    /// Jitter as a percentage of the 2T (first) peak position.
    pub jitter_pct: f64,
    /// `20·log10(σ_between / σ_within)`, clamped to [-10, 40] dB.
    pub snr_db: f64,
    pub encoding: Option<TrackEncoding>,
    pub encoding_confidence: f64,
    /// Weighted signal quality score, 0-100.
    pub quality: f64,
}

pub struct FluxAnalyzer {
    bin_width_ns: f64,
}

impl Default for FluxAnalyzer {
    fn default() -> Self {
        FluxAnalyzer {
            bin_width_ns: DEFAULT_BIN_WIDTH_NS,
        }
    }
}

impl FluxAnalyzer {
    pub fn with_bin_width(bin_width_ns: f64) -> Self {
        FluxAnalyzer { bin_width_ns }
    }

    pub fn analyze_capture(&self, capture: &FluxCapture) -> FluxAnalysis {
        self.analyze(&capture.whole())
    }

    pub fn analyze(&self, view: &FluxView) -> FluxAnalysis {
        let hist = FluxHistogram::new(view, self.bin_width_ns);
        let peaks = hist.find_peaks(None);

        if peaks.len() < 2 {
            log::debug!(
                "FluxAnalyzer::analyze(): {} peak(s) found in {} intervals; not classifiable",
                peaks.len(),
                view.len()
            );
            return FluxAnalysis {
                bin_width_ns: self.bin_width_ns,
                bins: hist.bins().to_vec(),
                peaks,
                jitter_rms_ns: 0.0,
                jitter_pct: 0.0,
                snr_db: 0.0,
                encoding: None,
                encoding_confidence: 0.0,
                quality: 0.0,
            };
        }

        let jitter_rms_ns = Self::jitter_rms(view, &peaks);
        let jitter_pct = 100.0 * jitter_rms_ns / peaks[0].mean_ns;
        let snr_db = Self::snr_db(&peaks);
        let (encoding, encoding_confidence) = Self::classify(&peaks);

        let snr_norm = (snr_db / SNR_NORM_FULL_SCALE_DB * 100.0).clamp(0.0, 100.0);
        let jitter_norm = (100.0 - jitter_pct * 5.0).clamp(0.0, 100.0);
        let sep_norm = Self::peak_separation_norm(&peaks);
        let quality = 0.4 * snr_norm + 0.4 * jitter_norm + 0.2 * sep_norm;

        log::debug!(
            "FluxAnalyzer::analyze(): {} peaks, jitter {:.1}ns ({:.2}%), snr {:.1}dB, quality {:.1}",
            peaks.len(),
            jitter_rms_ns,
            jitter_pct,
            snr_db,
            quality
        );

        FluxAnalysis {
            bin_width_ns: self.bin_width_ns,
            bins: hist.bins().to_vec(),
            peaks,
            jitter_rms_ns,
            jitter_pct,
            snr_db,
            encoding,
            encoding_confidence,
            quality,
        }
    }

    fn jitter_rms(view: &FluxView, peaks: &[GaussianPeak]) -> f64 {
        let mut sum_sq = 0.0f64;
        let mut n = 0u64;
        for delta_ns in view.delta_ns_iter() {
            let nearest = peaks
                .iter()
                .map(|p| (delta_ns - p.mean_ns).abs())
                .fold(f64::MAX, f64::min);
            sum_sq += nearest * nearest;
            n += 1;
        }
        if n == 0 {
            0.0
        }
        else {
            (sum_sq / n as f64).sqrt()
        }
    }

    fn snr_db(peaks: &[GaussianPeak]) -> f64 {
        let mean = peaks.iter().map(|p| p.mean_ns).sum::<f64>() / peaks.len() as f64;
        let between = (peaks.iter().map(|p| (p.mean_ns - mean).powi(2)).sum::<f64>() / peaks.len() as f64).sqrt();
        let within = peaks.iter().map(|p| p.sigma_ns).sum::<f64>() / peaks.len() as f64;
        (20.0 * (between / within.max(0.5)).log10()).clamp(-10.0, 40.0)
    }

    /// Fully resolved peaks (adjacent means at least 6σ apart) score 100.
    fn peak_separation_norm(peaks: &[GaussianPeak]) -> f64 {
        let within = peaks.iter().map(|p| p.sigma_ns).sum::<f64>() / peaks.len() as f64;
        let min_gap = peaks
            .windows(2)
            .map(|w| w[1].mean_ns - w[0].mean_ns)
            .fold(f64::MAX, f64::min);
        (min_gap / (6.0 * within.max(0.5)) * 100.0).clamp(0.0, 100.0)
    }

    /// Classify the encoding from peak position ratios: 2:3:4 ⇒ MFM,
    /// 1:2 ⇒ FM, four or more peaks in a narrow band ⇒ GCR.
    fn classify(peaks: &[GaussianPeak]) -> (Option<TrackEncoding>, f64) {
        if peaks.len() >= 4 {
            let spread = peaks.last().unwrap().mean_ns / peaks[0].mean_ns;
            if spread <= 2.5 {
                return (Some(TrackEncoding::Gcr), 0.75);
            }
        }

        if peaks.len() == 3 {
            let r1 = peaks[1].mean_ns / peaks[0].mean_ns;
            let r2 = peaks[2].mean_ns / peaks[0].mean_ns;
            let dev = ((r1 / 1.5) - 1.0).abs().max(((r2 / 2.0) - 1.0).abs());
            if dev <= RATIO_TOLERANCE {
                return (Some(TrackEncoding::Mfm), (1.0 - dev / RATIO_TOLERANCE).clamp(0.0, 1.0));
            }
        }

        if peaks.len() == 2 {
            let r = peaks[1].mean_ns / peaks[0].mean_ns;
            let dev = ((r / 2.0) - 1.0).abs();
            if dev <= RATIO_TOLERANCE {
                return (Some(TrackEncoding::Fm), (1.0 - dev / RATIO_TOLERANCE).clamp(0.0, 1.0));
            }
        }

        (None, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FluxCapture, NATIVE_SAMPLE_HZ};

    fn mfm_capture() -> FluxCapture {
        let intervals: Vec<i64> = [288i64, 288, 432, 576, 288, 432].repeat(2000);
        FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[]).unwrap()
    }

    #[test]
    fn test_clean_mfm_classification() {
        let analysis = FluxAnalyzer::default().analyze_capture(&mfm_capture());
        assert_eq!(analysis.encoding, Some(TrackEncoding::Mfm));
        assert!(analysis.encoding_confidence >= 0.9);
        assert!(analysis.jitter_pct < 1.0);
        assert!(analysis.quality >= 95.0, "quality was {}", analysis.quality);
    }

    #[test]
    fn test_fm_classification() {
        let intervals: Vec<i64> = [288i64, 288, 576].repeat(2000);
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &intervals, &[]).unwrap();
        let analysis = FluxAnalyzer::default().analyze_capture(&cap);
        assert_eq!(analysis.encoding, Some(TrackEncoding::Fm));
        assert!(analysis.encoding_confidence >= 0.9);
    }

    #[test]
    fn test_unclassifiable_flux() {
        let cap = FluxCapture::from_intervals(NATIVE_SAMPLE_HZ, &[288; 100], &[]).unwrap();
        let analysis = FluxAnalyzer::default().analyze_capture(&cap);
        assert_eq!(analysis.encoding, None);
        assert_eq!(analysis.quality, 0.0);
    }
}
