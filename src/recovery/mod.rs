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

    src/recovery/mod.rs

    The recovery controller: iterative multi-strategy recovery of bad
    sectors with convergence detection, verification retries, and per-track
    exclusion of failed write strategies.
*/
use crate::{
    codec::{mfm, TrackCodec},
    controller::{ControllerError, DriveController},
    events::{CancelToken, EngineEvent, EventSink},
    flux::pll::{Pll, PllConfig},
    scan::retry_once,
    DiskCh,
    FluxCapture,
    JobOutcome,
    DiskGeometry,
    RecoveryLevel,
    RecoveryMode,
    SectorProvenance,
    SectorStatus,
    SectorTable,
    TrackEncoding,
};
use std::collections::{BTreeMap, HashSet};

pub mod bit_slip;
pub mod multi_capture;
pub mod pll_tuning;
pub mod surface;

pub use pll_tuning::PllGridPoint;

/// Fill patterns consumed cyclically across passes by the format-refresh
/// strategies.
pub const PATTERN_ROTATION: [u8; 4] = [0x55, 0xAA, 0xFF, 0x00];

pub fn pattern_for_pass(pass: u32) -> u8 {
    PATTERN_ROTATION[pass as usize % PATTERN_ROTATION.len()]
}

/// Upper bound on outer-loop re-entries after a verification regression.
pub const MAX_VERIFICATION_RETRIES: u32 = 3;

#[derive(Clone, Debug)]
pub struct RecoveryProfile {
    pub level: RecoveryLevel,
    pub mode: RecoveryMode,
    pub multi_capture_enabled: bool,
    /// Revolutions decoded per voting round, clamped to 10..=1000.
    pub revolutions_per_capture: u32,
    pub pll_tuning_enabled: bool,
    pub bit_slip_enabled: bool,
    pub surface_treatment_enabled: bool,
    /// Override for the deterministic PLL sweep; `None` uses the default
    /// grid around the geometry's nominal bit cell.
    pub pll_grid: Option<Vec<PllGridPoint>>,
}

impl RecoveryProfile {
    /// Strategy set conventional for each recovery level.
    pub fn for_level(level: RecoveryLevel) -> Self {
        match level {
            RecoveryLevel::Standard => RecoveryProfile {
                level,
                mode: RecoveryMode::default(),
                multi_capture_enabled: true,
                revolutions_per_capture: 20,
                pll_tuning_enabled: false,
                bit_slip_enabled: false,
                surface_treatment_enabled: false,
                pll_grid: None,
            },
            RecoveryLevel::Aggressive => RecoveryProfile {
                level,
                mode: RecoveryMode::default(),
                multi_capture_enabled: true,
                revolutions_per_capture: 50,
                pll_tuning_enabled: true,
                bit_slip_enabled: true,
                surface_treatment_enabled: false,
                pll_grid: None,
            },
            RecoveryLevel::Forensic => RecoveryProfile {
                level,
                mode: RecoveryMode::default(),
                multi_capture_enabled: true,
                revolutions_per_capture: 100,
                pll_tuning_enabled: true,
                bit_slip_enabled: true,
                surface_treatment_enabled: true,
                pll_grid: None,
            },
        }
    }
}

impl Default for RecoveryProfile {
    fn default() -> Self {
        RecoveryProfile::for_level(RecoveryLevel::Standard)
    }
}

#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecoveryStats {
    pub initial_bad: usize,
    pub final_bad: usize,
    pub recovered: usize,
    pub passes_executed: u32,
    pub converged: bool,
    pub plateau: bool,
    pub convergence_pass: Option<u32>,
    /// Bad counts: the initial value, then one entry per pass.
    pub bad_history: Vec<usize>,
    pub verification_retries: u32,
    pub patterns_used: Vec<u8>,
}

impl RecoveryStats {
    pub fn recovery_rate(&self) -> f64 {
        if self.initial_bad == 0 {
            0.0
        }
        else {
            self.recovered as f64 / self.initial_bad as f64 * 100.0
        }
    }
}

#[derive(Debug)]
pub struct RecoveryResult {
    pub outcome: JobOutcome,
    pub reason: Option<String>,
    pub stats: RecoveryStats,
}

pub struct RecoveryController {
    geometry: DiskGeometry,
    encoding: TrackEncoding,
    profile: RecoveryProfile,
    pll: PllConfig,
}

impl RecoveryController {
    pub fn new(geometry: DiskGeometry, encoding: TrackEncoding, profile: RecoveryProfile) -> Self {
        let pll = PllConfig::default()
            .with_bit_cell(geometry.nominal_bit_cell_us())
            .with_encoding(encoding);
        RecoveryController {
            geometry,
            encoding,
            profile,
            pll,
        }
    }

    /// Override the base PLL used for direct reads (the sweep grid derives
    /// its offsets from this configuration's nominal bit cell).
    pub fn with_pll(mut self, pll: PllConfig) -> Self {
        self.pll = pll.with_encoding(self.encoding);
        self
    }

    fn outstanding(table: &SectorTable, targets: &[usize]) -> Vec<usize> {
        targets
            .iter()
            .copied()
            .filter(|a| table.get(*a).map(|s| s.status.is_outstanding()).unwrap_or(false))
            .collect()
    }

    fn track_of(&self, linear: usize, table: &SectorTable) -> Option<usize> {
        table
            .geometry()
            .chs_from_linear(linear)
            .and_then(|chs| self.geometry.track_index(chs.ch()))
    }

    fn ch_of_track(&self, track_idx: usize) -> DiskCh {
        DiskCh::new(
            (track_idx / self.geometry.heads as usize) as u16,
            (track_idx % self.geometry.heads as usize) as u8,
        )
    }

    fn group_by_track(&self, addrs: &[usize], table: &SectorTable) -> BTreeMap<usize, Vec<usize>> {
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for addr in addrs {
            if let Some(track) = self.track_of(*addr, table) {
                groups.entry(track).or_default().push(*addr);
            }
        }
        groups
    }

    /// Decode every revolution of a capture into the table, stamping
    /// readable sectors with a provenance.
    fn decode_revolutions(
        &self,
        capture: &FluxCapture,
        table: &mut SectorTable,
        ch: DiskCh,
        pass: u32,
        provenance: SectorProvenance,
    ) {
        let codec = TrackCodec::new(self.encoding);
        let pll = Pll::new(self.pll);
        for rev in 0..capture.revolutions() {
            let Ok(view) = capture.revolution(rev) else { break };
            let Ok(decoded) = pll.decode(&view) else { continue };
            let Ok(sectors) = codec.decode_track(&decoded.bits, &self.geometry, ch) else {
                continue;
            };
            for mut sector in sectors {
                if sector.status.is_readable() {
                    sector.provenance = Some(provenance);
                }
                table.merge(sector, pass);
            }
        }
    }

    /// Multi-capture vote over the still-outstanding sectors of one track.
    fn vote_track(
        &self,
        captures: &[FluxCapture],
        table: &mut SectorTable,
        ch: DiskCh,
        targets: &[usize],
        pass: u32,
    ) {
        let pll = Pll::new(self.pll);
        let size = self.geometry.sector_size;

        let mut votes: BTreeMap<u8, multi_capture::SectorVote> = BTreeMap::new();
        for addr in targets {
            if let Some(chs) = self.geometry.chs_from_linear(*addr) {
                votes.insert(chs.s(), multi_capture::SectorVote::new(size));
            }
        }

        for capture in captures {
            for rev in 0..capture.revolutions() {
                let Ok(view) = capture.revolution(rev) else { break };
                let Ok(decoded) = pll.decode(&view) else { continue };
                let Ok(scanned) = mfm::scan_track(&decoded.bits, &self.geometry, ch) else {
                    continue;
                };
                for s in scanned {
                    if let (Some(vote), Some(dam)) = (votes.get_mut(&s.sector.id.s()), s.dam_cell) {
                        vote.collect(&decoded.bits, dam + mfm::MARKER_LEN);
                    }
                }
            }
        }

        for (sid, vote) in votes {
            let Some((payload, confidence)) = vote.elect() else {
                log::debug!(
                    "recovery: vote failed for sector {} on {} ({} decodes)",
                    sid,
                    ch,
                    vote.decodes()
                );
                continue;
            };
            log::info!(
                "recovery: sector {} on {} reconstructed from {} decodes (margin {:.2})",
                sid,
                ch,
                vote.decodes(),
                confidence
            );
            table.update_chs(crate::DiskChs::new(ch.c(), ch.h(), sid), |sector| {
                sector.status = SectorStatus::Recovered;
                sector.payload = Some(payload.clone());
                sector.data_crc = crate::types::enums::IntegrityCheck::Ok;
                sector.quality = confidence;
                sector.provenance = Some(SectorProvenance::MultiCaptureVote);
                sector.last_successful_pass = Some(pass);
            });
        }
    }

    /// One recovery pass over the outstanding addresses, strategy by
    /// strategy. Only fatal transport errors propagate.
    #[allow(clippy::too_many_arguments)]
    fn run_pass(
        &self,
        controller: &mut dyn DriveController,
        table: &mut SectorTable,
        original: &[usize],
        pass: u32,
        quiet_run: u32,
        excluded_tracks: &mut HashSet<usize>,
        writes_blocked: &mut bool,
    ) -> Result<(), ControllerError> {
        let outstanding = Self::outstanding(table, original);
        let groups = self.group_by_track(&outstanding, table);

        for (track_idx, addrs) in &groups {
            let ch = self.ch_of_track(*track_idx);
            match retry_once(|| controller.seek(ch)) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("recovery: seek to {} failed: {}", ch, e);
                    continue;
                }
                Ok(()) => {}
            }

            // Strategy 1: direct re-read at nominal PLL.
            let capture = match retry_once(|| controller.read_flux(2)) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::error!("recovery: read at {} failed: {}", ch, e);
                    continue;
                }
                Ok(capture) => capture,
            };
            self.decode_revolutions(&capture, table, ch, pass, SectorProvenance::Direct);

            let mut remaining = Self::outstanding(table, addrs);
            if remaining.is_empty() {
                continue;
            }

            // Strategy 2: multi-capture voting.
            if self.profile.multi_capture_enabled {
                match multi_capture::capture_revolutions(controller, self.profile.revolutions_per_capture) {
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => log::error!("recovery: multi-capture read at {} failed: {}", ch, e),
                    Ok(captures) => self.vote_track(&captures, table, ch, &remaining, pass),
                }
                remaining = Self::outstanding(table, addrs);
                if remaining.is_empty() {
                    continue;
                }
            }

            // Strategy 3: PLL parameter sweep.
            if self.profile.pll_tuning_enabled && self.profile.level != RecoveryLevel::Standard {
                let grid = self
                    .profile
                    .pll_grid
                    .clone()
                    .unwrap_or_else(|| pll_tuning::default_grid(self.pll.nominal_bit_cell_us));
                let targets: Vec<u8> = remaining
                    .iter()
                    .filter_map(|a| self.geometry.chs_from_linear(*a).map(|chs| chs.s()))
                    .collect();
                for (mut sector, point) in
                    pll_tuning::sweep(&capture, &grid, &self.pll, &self.geometry, ch, &targets)
                {
                    log::info!(
                        "recovery: {} recovered by tuning (cell {:.3}µs)",
                        sector.id,
                        point.bit_cell_us
                    );
                    sector.status = SectorStatus::Recovered;
                    sector.provenance = Some(SectorProvenance::PllTuning);
                    table.merge(sector, pass);
                }
                remaining = Self::outstanding(table, addrs);
                if remaining.is_empty() {
                    continue;
                }
            }

            // Strategy 4: bit-slip search. Forensic always; Aggressive only
            // once the pass counts have gone quiet.
            let slip_active = self.profile.bit_slip_enabled
                && (self.profile.level == RecoveryLevel::Forensic
                    || (self.profile.level == RecoveryLevel::Aggressive && quiet_run >= 2));
            if slip_active {
                let pll = Pll::new(self.pll);
                for rev in 0..capture.revolutions() {
                    let Ok(view) = capture.revolution(rev) else { break };
                    let Ok(decoded) = pll.decode(&view) else { continue };
                    let Ok(scanned) = mfm::scan_track(&decoded.bits, &self.geometry, ch) else {
                        continue;
                    };
                    for s in scanned {
                        let chs = s.sector.chs();
                        let still_wanted = remaining
                            .iter()
                            .any(|a| self.geometry.chs_from_linear(*a) == Some(chs));
                        if !still_wanted {
                            continue;
                        }
                        if let Some(payload) = bit_slip::recover(&decoded.bits, &s) {
                            table.update_chs(chs, |sector| {
                                sector.status = SectorStatus::Recovered;
                                sector.payload = Some(payload.clone());
                                sector.data_crc = crate::types::enums::IntegrityCheck::Ok;
                                sector.provenance = Some(SectorProvenance::BitSlip);
                                sector.last_successful_pass = Some(pass);
                            });
                        }
                    }
                    remaining = Self::outstanding(table, addrs);
                    if remaining.is_empty() {
                        break;
                    }
                }
            }
        }

        // Strategy 5: surface treatment on any still-bad track at the end of
        // the pass.
        if self.profile.surface_treatment_enabled
            && self.profile.level == RecoveryLevel::Forensic
            && !*writes_blocked
        {
            let still_bad = Self::outstanding(table, original);
            let bad_tracks: Vec<usize> = self
                .group_by_track(&still_bad, table)
                .into_keys()
                .filter(|t| !excluded_tracks.contains(t))
                .collect();

            for track_idx in bad_tracks {
                let ch = self.ch_of_track(track_idx);
                match retry_once(|| controller.seek(ch)) {
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(_) => continue,
                    Ok(()) => {}
                }
                let fill = pattern_for_pass(pass.saturating_sub(1));
                match surface::treat_track(controller, &self.geometry, self.encoding, ch, fill) {
                    Ok(()) => {
                        let capture = match retry_once(|| controller.read_flux(2)) {
                            Err(e) if e.is_fatal() => return Err(e),
                            Err(_) => continue,
                            Ok(capture) => capture,
                        };
                        self.decode_revolutions(&capture, table, ch, pass, SectorProvenance::FormatRefresh);
                    }
                    Err(ControllerError::WriteProtected) => {
                        log::error!("recovery: media write protected; abandoning write strategies");
                        *writes_blocked = true;
                        excluded_tracks.insert(track_idx);
                        break;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        log::error!("recovery: surface treatment failed on {}: {}", ch, e);
                        excluded_tracks.insert(track_idx);
                        surface::mark_treatment_failed(table, &self.geometry, ch);
                    }
                }
            }
        }

        Ok(())
    }

    /// Re-scan the originally bad addresses and reconcile: fresh CRC-valid
    /// decodes are merged; previously readable sectors that fail afresh are
    /// regressions that send the outer loop around again.
    fn verify(
        &self,
        controller: &mut dyn DriveController,
        table: &mut SectorTable,
        original: &[usize],
        pass: u32,
    ) -> Result<usize, ControllerError> {
        let mut regressed = 0usize;
        let groups = self.group_by_track(original, table);

        for (track_idx, addrs) in groups {
            let ch = self.ch_of_track(track_idx);
            match retry_once(|| controller.seek(ch)) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => continue,
                Ok(()) => {}
            }
            let capture = match retry_once(|| controller.read_flux(2)) {
                Err(e) if e.is_fatal() => return Err(e),
                Err(_) => continue,
                Ok(capture) => capture,
            };

            let mut scratch = SectorTable::new(self.geometry);
            self.decode_revolutions(&capture, &mut scratch, ch, pass, SectorProvenance::Direct);

            for addr in addrs {
                let fresh_readable = scratch.get(addr).map(|s| s.status.is_readable()).unwrap_or(false);
                let was_readable = table.get(addr).map(|s| s.status.is_readable()).unwrap_or(false);

                if was_readable && !fresh_readable {
                    // Reconstructed payloads (voting, bit-slip) are not
                    // expected to re-read directly; only direct or
                    // tuning-recovered sectors regress.
                    let direct = matches!(
                        table.get(addr).and_then(|s| s.provenance),
                        Some(SectorProvenance::Direct) | Some(SectorProvenance::FormatRefresh) | None
                    );
                    if direct {
                        regressed += 1;
                        table.update(addr, |s| s.status = SectorStatus::Bad);
                    }
                }
                else if !was_readable && fresh_readable {
                    if let Some(fresh) = scratch.get(addr).cloned() {
                        table.merge(fresh, pass);
                    }
                }
                else if was_readable {
                    table.update(addr, |s| s.last_successful_pass = Some(pass));
                }
            }
        }
        Ok(regressed)
    }

    /// Run recovery over the given linear addresses (or every outstanding
    /// sector when `targets` is `None`).
    pub fn run(
        &self,
        controller: &mut dyn DriveController,
        table: &mut SectorTable,
        targets: Option<Vec<usize>>,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> RecoveryResult {
        let original: Vec<usize> = match targets {
            Some(t) => t,
            None => table.outstanding_addresses(),
        };

        let mut stats = RecoveryStats {
            initial_bad: original.len(),
            final_bad: original.len(),
            bad_history: vec![original.len()],
            ..RecoveryStats::default()
        };

        if original.is_empty() {
            return RecoveryResult {
                outcome: JobOutcome::Ok,
                reason: None,
                stats,
            };
        }

        if let Err(e) = retry_once(|| controller.set_motor(true)) {
            return RecoveryResult {
                outcome: JobOutcome::Failed,
                reason: Some(e.to_string()),
                stats,
            };
        }

        let (max_passes, quiet_passes) = match self.profile.mode {
            RecoveryMode::Fixed(n) => (n, None),
            RecoveryMode::Convergence { max_passes, quiet_passes } => (max_passes, Some(quiet_passes as usize)),
        };

        let mut excluded_tracks: HashSet<usize> = HashSet::new();
        let mut writes_blocked = false;
        let mut quiet_run: u32 = 0;
        let mut fatal: Option<String> = None;
        let mut cancelled = false;

        'outer: for retry in 0..=MAX_VERIFICATION_RETRIES {
            stats.verification_retries = retry;
            let mut pass_counts: Vec<usize> = Vec::new();
            let mut pass: u32 = 0;

            while pass < max_passes {
                pass += 1;
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'outer;
                }
                stats.passes_executed += 1;
                let global_pass = stats.passes_executed;
                stats.patterns_used.push(pattern_for_pass(global_pass - 1));

                if let Err(e) = self.run_pass(
                    controller,
                    table,
                    &original,
                    global_pass,
                    quiet_run,
                    &mut excluded_tracks,
                    &mut writes_blocked,
                ) {
                    fatal = Some(e.to_string());
                    break 'outer;
                }

                let bad = Self::outstanding(table, &original).len();
                let prev = pass_counts.last().copied().unwrap_or(stats.initial_bad);
                quiet_run = if bad == prev { quiet_run + 1 } else { 0 };
                pass_counts.push(bad);
                stats.bad_history.push(bad);
                sink.on_event(EngineEvent::PassCompleted {
                    pass: global_pass,
                    bad_count: bad,
                });
                log::info!("recovery: pass {} complete, {} bad remain", global_pass, bad);

                if bad == 0 {
                    break;
                }

                if let Some(quiet) = quiet_passes {
                    // Converged: the last `quiet` passes produced no further
                    // improvement (quiet zero deltas).
                    if pass_counts.len() > quiet {
                        let tail = &pass_counts[pass_counts.len() - (quiet + 1)..];
                        if tail.iter().all(|b| *b == tail[0]) {
                            stats.converged = true;
                            stats.convergence_pass = Some(global_pass);
                            sink.on_event(EngineEvent::Converged {
                                pass: global_pass,
                                plateau: false,
                            });
                            break;
                        }
                    }
                    // Plateau: no decrease anywhere in the last quiet + 2
                    // passes.
                    if pass_counts.len() > quiet + 2 {
                        let tail = &pass_counts[pass_counts.len() - (quiet + 3)..];
                        if tail.windows(2).all(|w| w[1] >= w[0]) {
                            stats.converged = true;
                            stats.plateau = true;
                            stats.convergence_pass = Some(global_pass);
                            sink.on_event(EngineEvent::Converged {
                                pass: global_pass,
                                plateau: true,
                            });
                            break;
                        }
                    }
                }
            }

            // Verification: the originally bad addresses must re-read clean.
            match self.verify(controller, table, &original, stats.passes_executed) {
                Err(e) => {
                    fatal = Some(e.to_string());
                    break 'outer;
                }
                Ok(0) => break 'outer,
                Ok(regressed) => {
                    log::warn!(
                        "recovery: verification found {} regression(s); retry {}/{}",
                        regressed,
                        retry + 1,
                        MAX_VERIFICATION_RETRIES
                    );
                }
            }
        }

        let _ = controller.set_motor(false);

        stats.final_bad = Self::outstanding(table, &original).len();
        stats.recovered = stats.initial_bad.saturating_sub(stats.final_bad);

        let (outcome, reason) = if let Some(reason) = fatal {
            (JobOutcome::Failed, Some(reason))
        }
        else if cancelled {
            (JobOutcome::Partial, Some("cancelled".to_string()))
        }
        else if stats.final_bad == 0 {
            (JobOutcome::Ok, None)
        }
        else {
            (JobOutcome::Partial, Some("bad sectors remain".to_string()))
        };

        log::info!(
            "recovery: {} ({} of {} recovered over {} passes)",
            outcome,
            stats.recovered,
            stats.initial_bad,
            stats.passes_executed
        );

        RecoveryResult { outcome, reason, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_rotation() {
        assert_eq!(pattern_for_pass(0), 0x55);
        assert_eq!(pattern_for_pass(1), 0xAA);
        assert_eq!(pattern_for_pass(2), 0xFF);
        assert_eq!(pattern_for_pass(3), 0x00);
        assert_eq!(pattern_for_pass(4), 0x55);
    }

    #[test]
    fn test_profile_levels() {
        let standard = RecoveryProfile::for_level(RecoveryLevel::Standard);
        assert!(!standard.pll_tuning_enabled && !standard.surface_treatment_enabled);
        let forensic = RecoveryProfile::for_level(RecoveryLevel::Forensic);
        assert!(forensic.pll_tuning_enabled && forensic.bit_slip_enabled && forensic.surface_treatment_enabled);
    }
}
