mod common;

use fluxrescue::{
    analysis::FluxAnalyzer,
    codec::{self, TrackCodec},
    quality::{DiskReport, TrackGrade},
    DiskCh,
    DiskChs,
    FluxCapture,
    TrackEncoding,
};

use common::*;

/// Clean flux for one encoded MFM track.
fn clean_track_flux() -> FluxCapture {
    let geometry = hd_geometry();
    let table = pattern_table(geometry);
    let sectors: Vec<_> = (1..=geometry.sectors_per_track)
        .map(|s| table.get_chs(DiskChs::new(0, 0, s)).unwrap().clone())
        .collect();
    let bits = TrackCodec::new(TrackEncoding::Mfm)
        .encode_track(&sectors, &geometry, DiskCh::new(0, 0))
        .unwrap();
    FluxCapture::synthesize(bits.bits(), geometry.nominal_bit_cell_us() * 1000.0, 2, None)
}

#[test]
fn test_clean_track_scores_high() {
    init();
    let analysis = FluxAnalyzer::default().analyze_capture(&clean_track_flux());

    assert_eq!(analysis.encoding, Some(TrackEncoding::Mfm));
    assert!(analysis.encoding_confidence >= 0.9, "confidence {}", analysis.encoding_confidence);
    assert!(analysis.jitter_pct < 1.0, "jitter {}%", analysis.jitter_pct);
    assert!(analysis.quality >= 95.0, "quality {}", analysis.quality);
    assert_eq!(TrackGrade::from_score(analysis.quality), TrackGrade::A);
}

#[test]
fn test_three_mfm_peaks_in_ratio() {
    init();
    let analysis = FluxAnalyzer::default().analyze_capture(&clean_track_flux());
    assert_eq!(analysis.peaks.len(), 3);

    let p = &analysis.peaks;
    let r1 = p[1].mean_ns / p[0].mean_ns;
    let r2 = p[2].mean_ns / p[0].mean_ns;
    assert!((r1 - 1.5).abs() < 0.1, "3T/2T ratio {}", r1);
    assert!((r2 - 2.0).abs() < 0.1, "4T/2T ratio {}", r2);
}

#[test]
fn test_jitter_degrades_quality() {
    init();
    let geometry = hd_geometry();
    let table = pattern_table(geometry);
    let sectors: Vec<_> = (1..=geometry.sectors_per_track)
        .map(|s| table.get_chs(DiskChs::new(0, 0, s)).unwrap().clone())
        .collect();
    let bits = TrackCodec::new(TrackEncoding::Mfm)
        .encode_track(&sectors, &geometry, DiskCh::new(0, 0))
        .unwrap();
    let cell_ns = geometry.nominal_bit_cell_us() * 1000.0;

    let clean = FluxAnalyzer::default().analyze_capture(&FluxCapture::synthesize(bits.bits(), cell_ns, 2, None));
    let noisy = FluxAnalyzer::default().analyze_capture(&FluxCapture::synthesize(
        bits.bits(),
        cell_ns,
        2,
        Some((0.08, 11)),
    ));

    assert!(noisy.jitter_rms_ns > clean.jitter_rms_ns);
    assert!(noisy.quality < clean.quality);
}

#[test]
fn test_detect_on_capture() {
    init();
    let (encoding, confidence) = codec::detect(&clean_track_flux());
    assert_eq!(encoding, Some(TrackEncoding::Mfm));
    assert!(confidence >= 0.9);
}

#[test]
fn test_disk_report_aggregation() {
    init();
    let table = pattern_table(dd_geometry());
    let report = DiskReport::build(&table, vec![98.0, 91.0, 85.0]);

    assert_eq!(report.overall_score, 91);
    assert_eq!(report.overall_grade, TrackGrade::A);
    assert_eq!(report.track_grades, vec![TrackGrade::A, TrackGrade::A, TrackGrade::B]);
    assert_eq!(report.heat_map.rows.len(), 40);
    assert_eq!(report.counts.good, table.len());
    assert_eq!(report.errors.total(), 0);
}
