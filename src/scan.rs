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

    src/scan.rs

    The full-disk scan orchestrator: walks the geometry in ascending-cylinder
    snake order, captures flux, decodes each revolution and merges the result
    into the sector table, honoring cancellation at track boundaries.
*/
use crate::{
    codec::{self, TrackCodec},
    controller::{ControllerError, DriveController},
    events::{CancelToken, EngineEvent, EventSink},
    flux::pll::{Pll, PllConfig},
    DecodeError,
    DiskCh,
    DiskChs,
    DiskGeometry,
    FluxCapture,
    JobOutcome,
    ScanMode,
    SectorStatus,
    SectorTable,
    TrackEncoding,
};

#[derive(Clone, Debug)]
pub struct ScanConfig {
    pub mode: ScanMode,
    /// `None` requests auto-detection on the first track, after which the
    /// choice is frozen for the whole scan.
    pub encoding: Option<TrackEncoding>,
    /// Override the mode's default revolutions per capture.
    pub revolutions: Option<u8>,
    /// Override the geometry-derived PLL configuration.
    pub pll: Option<PllConfig>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            mode: ScanMode::Standard,
            encoding: None,
            revolutions: None,
            pll: None,
        }
    }
}

#[derive(Debug)]
pub struct ScanResult {
    pub outcome: JobOutcome,
    pub reason: Option<String>,
    /// The encoding actually used (detected or configured).
    pub encoding: TrackEncoding,
    pub tracks_scanned: usize,
    /// Flux captures retained for later recovery (forensic mode).
    pub retained_flux: Vec<(DiskCh, FluxCapture)>,
}

/// Run a hardware operation, retrying once on the retryable error classes
/// (failed seeks and transport timeouts).
pub(crate) fn retry_once<T, F>(mut op: F) -> Result<T, ControllerError>
where
    F: FnMut() -> Result<T, ControllerError>,
{
    match op() {
        Err(e) if e.is_retryable() => {
            log::warn!("retry_once(): retrying after {}", e);
            op()
        }
        other => other,
    }
}

pub struct ScanOrchestrator {
    geometry: DiskGeometry,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(geometry: DiskGeometry, config: ScanConfig) -> Self {
        ScanOrchestrator { geometry, config }
    }

    /// The cylinders visited by a mode: quick scans sample five spread
    /// cylinders, every other mode reads them all.
    fn cylinders(&self) -> Vec<u16> {
        let c = self.geometry.cylinders;
        match self.config.mode {
            ScanMode::Quick => {
                let mut picks = vec![0, c / 4, c / 2, 3 * c / 4, c.saturating_sub(1)];
                picks.dedup();
                picks
            }
            _ => (0..c).collect(),
        }
    }

    fn pll_config(&self, encoding: TrackEncoding) -> PllConfig {
        self.config
            .pll
            .unwrap_or_else(|| {
                PllConfig::default()
                    .with_bit_cell(self.geometry.nominal_bit_cell_us())
            })
            .with_encoding(encoding)
    }

    /// Decode every revolution of a capture and merge the results into the
    /// table. Returns true if any address mark was seen on the track.
    pub(crate) fn decode_into_table(
        &self,
        capture: &FluxCapture,
        encoding: TrackEncoding,
        ch: DiskCh,
        table: &mut SectorTable,
        pass: u32,
    ) -> bool {
        let codec = TrackCodec::new(encoding);
        let pll = Pll::new(self.pll_config(encoding));
        let mut any_marks = false;

        for rev in 0..capture.revolutions() {
            let view = match capture.revolution(rev) {
                Ok(view) => view,
                Err(_) => break,
            };
            let decoded = match pll.decode(&view) {
                Ok(result) => result,
                Err(DecodeError::DecodeAbort) => {
                    log::warn!("scan: {} revolution {} lost PLL lock; skipping", ch, rev);
                    continue;
                }
                Err(_) => continue,
            };
            match codec.decode_track(&decoded.bits, &self.geometry, ch) {
                Ok(sectors) => {
                    any_marks = true;
                    for sector in sectors {
                        table.merge(sector, pass);
                    }
                }
                Err(DecodeError::NoAddressMarks) => {}
                Err(e) => {
                    log::warn!("scan: {} revolution {} decode failed: {}", ch, rev, e);
                }
            }
        }
        any_marks
    }

    /// After a track's revolutions are merged, resolve what was never seen:
    /// on a track with marks, absent sector IDs become `NoAddress`; a track
    /// with no marks at all is recorded as all-missing.
    fn resolve_unseen(&self, table: &mut SectorTable, ch: DiskCh, any_marks: bool) {
        for s in 1..=self.geometry.sectors_per_track {
            let chs = DiskChs::new(ch.c(), ch.h(), s);
            table.update_chs(chs, |sector| {
                if sector.status == SectorStatus::Unread {
                    sector.status = if any_marks {
                        SectorStatus::NoAddress
                    }
                    else {
                        SectorStatus::Missing
                    };
                }
            });
        }
    }

    /// Execute the scan. The table's unvisited region is left `Unread`; a
    /// cancelled scan stops at the next track boundary and reports partial
    /// results. `TransportLost` is fatal but never corrupts the table.
    pub fn run(
        &self,
        controller: &mut dyn DriveController,
        table: &mut SectorTable,
        sink: &dyn EventSink,
        cancel: &CancelToken,
    ) -> ScanResult {
        let revolutions = self.config.revolutions.unwrap_or(self.config.mode.revolutions());
        let mut encoding = self.config.encoding;
        let mut retained_flux = Vec::new();
        let mut tracks_scanned = 0usize;

        log::info!(
            "scan: starting {} scan of {} ({} revolutions/track)",
            self.config.mode,
            self.geometry,
            revolutions
        );

        if let Err(e) = retry_once(|| controller.set_motor(true)) {
            return self.finish(controller, table, JobOutcome::Failed, Some(e.to_string()), encoding, tracks_scanned, retained_flux);
        }

        let mut cancelled = false;
        'scan: for (ci, c) in self.cylinders().into_iter().enumerate() {
            // Snake order: odd visits walk the heads backwards.
            let heads: Vec<u8> = if ci % 2 == 0 {
                (0..self.geometry.heads).collect()
            }
            else {
                (0..self.geometry.heads).rev().collect()
            };

            for h in heads {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'scan;
                }
                let ch = DiskCh::new(c, h);
                sink.on_event(EngineEvent::TrackStarted { ch });

                if let Err(e) = retry_once(|| controller.seek(ch)) {
                    if e.is_fatal() {
                        return self.finish(controller, table, JobOutcome::Failed, Some(e.to_string()), encoding, tracks_scanned, retained_flux);
                    }
                    log::error!("scan: seek to {} failed: {}", ch, e);
                    continue;
                }

                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'scan;
                }

                let capture = match retry_once(|| controller.read_flux(revolutions)) {
                    Ok(capture) => capture,
                    Err(e) if e.is_fatal() => {
                        return self.finish(controller, table, JobOutcome::Failed, Some(e.to_string()), encoding, tracks_scanned, retained_flux);
                    }
                    Err(e) => {
                        log::error!("scan: read at {} failed: {}", ch, e);
                        continue;
                    }
                };

                // Auto mode: detect on the first track, then freeze.
                let frozen = match encoding {
                    Some(enc) => enc,
                    None => {
                        let (detected, confidence) = codec::detect(&capture);
                        let chosen = detected.unwrap_or(TrackEncoding::Mfm);
                        log::info!(
                            "scan: detected {} (confidence {:.2}) on {}; freezing",
                            chosen,
                            confidence,
                            ch
                        );
                        encoding = Some(chosen);
                        chosen
                    }
                };

                let any_marks = self.decode_into_table(&capture, frozen, ch, table, 0);
                self.resolve_unseen(table, ch, any_marks);

                for s in 1..=self.geometry.sectors_per_track {
                    let chs = DiskChs::new(c, h, s);
                    if let Some(sector) = table.get_chs(chs) {
                        sink.on_event(EngineEvent::SectorDecoded {
                            chs,
                            status: sector.status,
                        });
                    }
                }

                if self.config.mode.retains_flux() {
                    retained_flux.push((ch, capture));
                }

                tracks_scanned += 1;
                sink.on_event(EngineEvent::TrackCompleted {
                    ch,
                    counts: table.counts(),
                });
            }
        }

        let (outcome, reason) = if cancelled {
            (JobOutcome::Partial, Some("cancelled".to_string()))
        }
        else if table.counts().outstanding() > 0 {
            (JobOutcome::Partial, Some("bad sectors remain".to_string()))
        }
        else {
            (JobOutcome::Ok, None)
        };

        sink.on_event(EngineEvent::ScanCompleted { counts: table.counts() });
        self.finish(controller, table, outcome, reason, encoding, tracks_scanned, retained_flux)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        controller: &mut dyn DriveController,
        table: &SectorTable,
        outcome: JobOutcome,
        reason: Option<String>,
        encoding: Option<TrackEncoding>,
        tracks_scanned: usize,
        retained_flux: Vec<(DiskCh, FluxCapture)>,
    ) -> ScanResult {
        let _ = controller.set_motor(false);
        log::info!(
            "scan: {} after {} tracks [{}]",
            outcome,
            tracks_scanned,
            table.counts()
        );
        ScanResult {
            outcome,
            reason,
            encoding: encoding.unwrap_or_default(),
            tracks_scanned,
            retained_flux,
        }
    }
}
