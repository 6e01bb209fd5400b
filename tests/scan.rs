mod common;

use std::sync::Mutex;

use fluxrescue::{
    controller::{ControllerError, SimOp},
    events::{CancelToken, CollectingEventSink, EngineEvent, EventSink, NullEventSink},
    scan::{ScanConfig, ScanOrchestrator},
    DiskChs,
    JobOutcome,
    ScanMode,
    SectorStatus,
    SectorTable,
    TrackEncoding,
};

use common::*;

/// Healthy 1.44M HD scan: every sector decodes Good and the payload pattern
/// survives.
#[test]
fn test_healthy_hd_scan() {
    init();
    let geometry = hd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);

    let orchestrator = ScanOrchestrator::new(geometry, ScanConfig::default());
    let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    assert_eq!(result.outcome, JobOutcome::Ok);
    assert_eq!(result.encoding, TrackEncoding::Mfm);
    let counts = table.counts();
    assert_eq!(counts.good, 2880, "all 2880 sectors must decode Good [{}]", counts);
    assert_pattern_payloads(&table);
}

#[test]
fn test_auto_detection_freezes_mfm() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);

    // No encoding configured: detection on cylinder 0 head 0 decides.
    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            encoding: None,
            ..ScanConfig::default()
        },
    );
    let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    assert_eq!(result.encoding, TrackEncoding::Mfm);
    assert_eq!(table.counts().good, table.len());
}

/// An event sink that cancels the scan after a fixed number of tracks.
struct CancelAfter {
    token: CancelToken,
    remaining: Mutex<usize>,
}

impl EventSink for CancelAfter {
    fn on_event(&self, event: EngineEvent) {
        if let EngineEvent::TrackCompleted { .. } = event {
            let mut remaining = self.remaining.lock().unwrap();
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.token.cancel();
            }
        }
    }
}

/// Property: a cancelled scan stops at a track boundary and leaves the
/// unvisited region entirely Unread.
#[test]
fn test_cancellation_leaves_unvisited_region_unread() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);

    let cancel = CancelToken::new();
    let sink = CancelAfter {
        token: cancel.clone(),
        remaining: Mutex::new(3),
    };

    let orchestrator = ScanOrchestrator::new(geometry, ScanConfig::default());
    let result = orchestrator.run(&mut drive, &mut table, &sink, &cancel);

    assert_eq!(result.outcome, JobOutcome::Partial);
    assert_eq!(result.reason.as_deref(), Some("cancelled"));
    assert_eq!(result.tracks_scanned, 3);

    // Three tracks decoded, and the unwritten region is entirely Unread.
    let spt = geometry.sectors_per_track as usize;
    let counts = table.counts();
    assert_eq!(counts.good, 3 * spt);
    assert_eq!(counts.unread, table.len() - 3 * spt);
    assert!(table
        .iter()
        .all(|s| matches!(s.status, SectorStatus::Good | SectorStatus::Unread)));
}

#[test]
fn test_progress_events_are_monotonic() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);
    let sink = CollectingEventSink::new();

    let orchestrator = ScanOrchestrator::new(geometry, ScanConfig::default());
    orchestrator.run(&mut drive, &mut table, &sink, &CancelToken::new());

    let mut started = Vec::new();
    for event in sink.events() {
        if let EngineEvent::TrackStarted { ch } = event {
            started.push(ch);
        }
    }
    assert_eq!(started.len(), geometry.total_tracks());
    // Cylinders never go backwards, and no track repeats.
    for pair in started.windows(2) {
        assert!(pair[1].c() >= pair[0].c());
        assert_ne!(pair[1], pair[0]);
    }
}

#[test]
fn test_quick_mode_samples_five_cylinders() {
    init();
    let geometry = hd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let mut table = SectorTable::new(geometry);
    let sink = CollectingEventSink::new();

    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            mode: ScanMode::Quick,
            ..ScanConfig::default()
        },
    );
    let result = orchestrator.run(&mut drive, &mut table, &sink, &CancelToken::new());

    // Cylinders 0, 20, 40, 60, 79 on both heads.
    assert_eq!(result.tracks_scanned, 10);
    // The unsampled region stays Unread, so the scan is partial.
    assert_eq!(result.outcome, JobOutcome::Partial);
    let sampled: std::collections::HashSet<u16> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            EngineEvent::TrackStarted { ch } => Some(ch.c()),
            _ => None,
        })
        .collect();
    assert_eq!(sampled, [0u16, 20, 40, 60, 79].into_iter().collect());
}

#[test]
fn test_damaged_sector_reported_bad() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    let target = DiskChs::new(12, 1, 4);
    assert!(drive.damage_sector_data(target, false, None));

    let mut table = SectorTable::new(geometry);
    let orchestrator = ScanOrchestrator::new(geometry, ScanConfig::default());
    let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    assert_eq!(result.outcome, JobOutcome::Partial);
    let sector = table.get_chs(target).unwrap();
    assert!(
        sector.status.is_outstanding(),
        "damaged sector reported {}",
        sector.status
    );
    // Damage is track-local.
    let outstanding = table.counts().outstanding();
    assert!(outstanding >= 1 && outstanding <= geometry.sectors_per_track as usize);
}

#[test]
fn test_transport_lost_is_fatal_but_preserves_table() {
    init();
    let geometry = dd_geometry();
    let mut drive = pattern_drive(geometry, TrackEncoding::Mfm);
    // Fail partway through the scan.
    for _ in 0..10 {
        drive.inject_fault(SimOp::ReadFlux, ControllerError::TransportTimeout);
    }
    drive.inject_fault(SimOp::ReadFlux, ControllerError::TransportLost);

    let mut table = SectorTable::new(geometry);
    let orchestrator = ScanOrchestrator::new(geometry, ScanConfig::default());
    let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    assert_eq!(result.outcome, JobOutcome::Failed);
    // Whatever was committed before the fault is intact.
    let counts = table.counts();
    assert_eq!(counts.total(), table.len());
    assert!(counts.good > 0 || counts.unread == table.len());
}
