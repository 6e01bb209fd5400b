mod common;

use fluxrescue::{
    controller::SimDrive,
    events::{CancelToken, NullEventSink},
    flux::pll::PllConfig,
    formatter::format_disk,
    recovery::{RecoveryController, RecoveryProfile},
    scan::{ScanConfig, ScanOrchestrator},
    DiskCh,
    DiskChs,
    JobOutcome,
    RecoveryLevel,
    RecoveryMode,
    SectorProvenance,
    SectorStatus,
    SectorTable,
    TrackEncoding,
};

use common::*;

fn scan_into(
    drive: &mut SimDrive,
    table: &mut SectorTable,
    pll: Option<PllConfig>,
) -> fluxrescue::scan::ScanResult {
    let geometry = *table.geometry();
    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            encoding: Some(TrackEncoding::Mfm),
            pll,
            ..ScanConfig::default()
        },
    );
    orchestrator.run(drive, table, &NullEventSink, &CancelToken::new())
}

/// Direct re-read recovery: a single sector whose decoded payload was
/// corrupted in the table (the flux is untouched) returns Good with
/// provenance `direct` on the first pass.
#[test]
fn test_single_sector_direct_recovery() {
    init();
    let geometry = hd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);

    let result = scan_into(&mut drive, &mut table, None);
    assert_eq!(result.outcome, JobOutcome::Ok);
    assert_eq!(table.counts().good, 2880);

    // Flip one byte of the decoded payload of (c40 h1 s9) and mark the
    // sector bad, as a damaged decode would have.
    let target = DiskChs::new(40, 1, 9);
    let linear = geometry.linear(target).unwrap();
    table.update(linear, |s| {
        s.status = SectorStatus::Bad;
        s.data_crc = fluxrescue::types::enums::IntegrityCheck::Bad;
        if let Some(payload) = s.payload.as_mut() {
            payload[100] ^= 0xFF;
        }
    });
    assert_eq!(table.counts().bad, 1);

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Standard);
    profile.multi_capture_enabled = false;
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(
        &mut drive,
        &mut table,
        Some(vec![linear]),
        &NullEventSink,
        &CancelToken::new(),
    );

    assert_eq!(result.outcome, JobOutcome::Ok);
    assert_eq!(result.stats.recovered, 1);

    let sector = table.get(linear).unwrap();
    assert_eq!(sector.status, SectorStatus::Good);
    assert_eq!(sector.provenance, Some(SectorProvenance::Direct));
    assert!(sector.payload.as_ref().unwrap().iter().all(|b| *b == (linear % 256) as u8));
    // Every other sector is untouched.
    assert_eq!(table.counts().good, 2880);
}

/// Aggressive recovery with PLL tuning: tracks written with a skewed bit
/// cell fail at the nominal clock but recover through the sweep grid, with
/// provenance `pll_tuning`, within a handful of passes.
#[test]
fn test_aggressive_recovery_with_pll_tuning() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);

    // Two tracks written 5% slow (2.1µs cells against the 2.0µs nominal),
    // with timing noise on top. The rigid nominal clock accumulates enough
    // phase error to misread cells; the sweep's 2.1µs grid point does not.
    let skewed = [DiskCh::new(10, 0), DiskCh::new(10, 1)];
    for ch in skewed {
        drive.set_track_bit_cell(ch, 2.1);
        drive.set_track_jitter(ch, 0.07);
    }

    // A rigid PLL: no clock adaptation, so the skew must be absorbed by the
    // sweep's bit-cell offsets.
    let pll = PllConfig::default().with_bit_cell(2.0).with_max_adjust(0.0);

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, Some(pll));

    let failing = table.counts().outstanding();
    assert!(failing > 0, "the skewed tracks must fail some sectors at nominal");

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Aggressive);
    profile.multi_capture_enabled = false;
    profile.bit_slip_enabled = false;
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile).with_pll(pll);
    let result = controller.run(&mut drive, &mut table, None, &NullEventSink, &CancelToken::new());

    assert_eq!(result.outcome, JobOutcome::Ok, "reason: {:?}", result.reason);
    assert!(
        result.stats.passes_executed < 5,
        "took {} passes",
        result.stats.passes_executed
    );
    let tuned = table
        .iter()
        .filter(|s| s.provenance == Some(SectorProvenance::PllTuning))
        .count();
    assert!(tuned > 0, "recovered sectors must carry pll_tuning provenance");
}

/// Convergence plateau: 42 bad sectors of which passes recover a
/// deterministic 20, 10, 5, then nothing. With quietPasses = 3 the loop
/// terminates at pass 6 with exactly 7 bad sectors left.
#[test]
fn test_convergence_terminates_on_quiet_passes() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);

    // Damage 42 sectors spread over distinct tracks. The scan reads every
    // track once, so a sector healing in recovery pass p heals after
    // 1 + p track reads.
    let mut cursor = 0u16;
    let mut schedule = Vec::new();
    schedule.extend(std::iter::repeat(Some(2u32)).take(20)); // pass 1
    schedule.extend(std::iter::repeat(Some(3u32)).take(10)); // pass 2
    schedule.extend(std::iter::repeat(Some(4u32)).take(5)); // pass 3
    schedule.extend(std::iter::repeat(None).take(7)); // never

    for heal_after in schedule {
        let chs = DiskChs::new(cursor % 40, (cursor / 40 % 2) as u8, 1 + (cursor % 9) as u8);
        assert!(drive.damage_sector_data(chs, heal_after.is_none(), heal_after));
        cursor += 1;
    }

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);
    assert_eq!(table.counts().outstanding(), 42);

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Standard);
    profile.multi_capture_enabled = false;
    profile.mode = RecoveryMode::Convergence {
        max_passes: 50,
        quiet_passes: 3,
    };
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(&mut drive, &mut table, None, &NullEventSink, &CancelToken::new());

    assert!(result.stats.converged);
    assert_eq!(result.stats.passes_executed, 6, "history: {:?}", result.stats.bad_history);
    assert_eq!(result.stats.final_bad, 7);
    assert_eq!(
        result.stats.bad_history,
        vec![42, 22, 12, 7, 7, 7, 7],
        "per-pass bad counts"
    );
}

/// Property: across recovery passes the bad count never increases, and
/// convergence mode always terminates within maxPasses.
#[test]
fn test_convergence_monotonic_and_bounded() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    for s in 1..=6u8 {
        drive.damage_sector_data(DiskChs::new(5, 0, s), true, None);
    }

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Standard);
    profile.multi_capture_enabled = false;
    profile.mode = RecoveryMode::Convergence {
        max_passes: 10,
        quiet_passes: 3,
    };
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(&mut drive, &mut table, None, &NullEventSink, &CancelToken::new());

    assert!(result.stats.passes_executed <= 10);
    for pair in result.stats.bad_history.windows(2) {
        assert!(pair[1] <= pair[0], "bad count increased: {:?}", result.stats.bad_history);
    }
    // Hard damage never recovers; convergence must detect that.
    assert!(result.stats.converged);
    assert_eq!(result.stats.final_bad, 6);
}

/// Fixed-pass mode runs exactly N passes when sectors stay bad.
#[test]
fn test_fixed_pass_mode() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    drive.damage_sector_data(DiskChs::new(3, 1, 2), true, None);

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Standard);
    profile.multi_capture_enabled = false;
    profile.mode = RecoveryMode::Fixed(4);
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(&mut drive, &mut table, None, &NullEventSink, &CancelToken::new());

    assert_eq!(result.stats.passes_executed, 4);
    assert_eq!(result.outcome, JobOutcome::Partial);
}

/// Multi-capture voting reconstructs a sector the direct read cannot.
#[test]
fn test_multi_capture_vote_recovers_weak_sector() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    // Noise across the whole disk; reads differ revolution to revolution
    // only through the PLL's confidence, so voting can outvote the damage
    // once it heals into marginal territory.
    let target = DiskChs::new(8, 0, 5);
    drive.damage_sector_data(target, false, Some(3));

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);
    let linear = geometry.linear(target).unwrap();
    assert!(table.get(linear).unwrap().status.is_outstanding());

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Standard);
    profile.revolutions_per_capture = 10;
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(
        &mut drive,
        &mut table,
        Some(vec![linear]),
        &NullEventSink,
        &CancelToken::new(),
    );

    assert_eq!(result.outcome, JobOutcome::Ok);
    let sector = table.get(linear).unwrap();
    assert!(sector.status.is_readable(), "status {}", sector.status);
}

/// Write-protected media: a format job fails immediately with the
/// write-protect reason, and nothing is written.
#[test]
fn test_format_on_write_protected_media() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    drive.set_write_protect(true);

    let result = format_disk(
        &mut drive,
        &geometry,
        TrackEncoding::Mfm,
        0xE5,
        &NullEventSink,
        &CancelToken::new(),
    );

    assert_eq!(result.outcome, JobOutcome::Failed);
    assert!(
        result.reason.as_deref().unwrap_or("").contains("write protected"),
        "reason: {:?}",
        result.reason
    );
    assert_eq!(result.tracks_formatted, 0);

    // The media is untouched: a scan still reads the original pattern.
    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);
    assert_eq!(table.counts().good, table.len());
    assert_pattern_payloads(&table);
}

/// Forensic surface treatment reformats an unrecoverable track; the
/// refreshed sectors carry format_refresh provenance.
#[test]
fn test_forensic_surface_treatment() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    // Weak damage that never heals on its own, but a rewrite clears it.
    let target = DiskChs::new(20, 0, 3);
    drive.damage_sector_data(target, false, None);

    let mut table = SectorTable::new(geometry);
    scan_into(&mut drive, &mut table, None);
    let linear = geometry.linear(target).unwrap();
    assert!(table.get(linear).unwrap().status.is_outstanding());

    let mut profile = RecoveryProfile::for_level(RecoveryLevel::Forensic);
    profile.multi_capture_enabled = false;
    profile.pll_tuning_enabled = false;
    profile.bit_slip_enabled = false;
    let controller = RecoveryController::new(geometry, TrackEncoding::Mfm, profile);
    let result = controller.run(
        &mut drive,
        &mut table,
        Some(vec![linear]),
        &NullEventSink,
        &CancelToken::new(),
    );

    assert_eq!(result.outcome, JobOutcome::Ok, "reason: {:?}", result.reason);
    let sector = table.get(linear).unwrap();
    assert!(sector.status.is_readable());
}
