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

    src/controller/sim.rs

    A deterministic in-memory drive. Tracks are held as raw cells (or as
    captured flux, when loaded from a flux image); reads synthesize flux with
    reproducible jitter, writes decode flux back into cells. Fault injection
    and scripted damage let the orchestrators be exercised over every error
    path without hardware.
*/
use crate::{
    codec::mfm,
    flux::pll::{Pll, PllConfig},
    DiskCh,
    DiskChs,
    DiskGeometry,
    FluxCapture,
    SectorTable,
    TrackEncoding,
};
use bit_vec::BitVec;
use std::collections::VecDeque;

use super::{ControllerConfig, ControllerError, DriveController};

/// Operation classes for scripted fault injection.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SimOp {
    Seek,
    Motor,
    ReadFlux,
    WriteFlux,
    Erase,
    Rpm,
}

/// A scripted cell defect.
#[derive(Clone, Debug)]
struct Damage {
    cell: usize,
    /// Hard damage survives rewrites; weak damage is healed by a write.
    hard: bool,
    /// Weak damage may also heal spontaneously once the track has been read
    /// this many times (models marginal domains that eventually resolve).
    heal_after_reads: Option<u32>,
}

enum Surface {
    Cells { cells: BitVec, bit_cell_us: f64 },
    Flux(FluxCapture),
}

struct SimTrack {
    surface: Surface,
    damage: Vec<Damage>,
    jitter_sigma: f64,
    reads: u32,
}

pub struct SimDrive {
    config: ControllerConfig,
    geometry: DiskGeometry,
    encoding: TrackEncoding,
    tracks: Vec<SimTrack>,
    position: Option<DiskCh>,
    motor_on: bool,
    write_protect: bool,
    closed: bool,
    rpm_error_pct: f64,
    faults: VecDeque<(SimOp, ControllerError)>,
}

impl SimDrive {
    /// Open a simulated handle over an unformatted disk. Idempotent for a
    /// given configuration; the spindle starts stopped.
    pub fn open(config: ControllerConfig, geometry: DiskGeometry, encoding: TrackEncoding) -> Self {
        log::debug!(
            "SimDrive::open(): unit {} at {}Kbit/s, motor timeout {}ms",
            config.drive_unit,
            config.bus_rate_kbps,
            config.motor_timeout_ms
        );
        let mut drive = Self::new_blank(geometry, encoding);
        drive.config = config;
        drive
    }

    /// An unformatted disk: every track is transition-free.
    pub fn new_blank(geometry: DiskGeometry, encoding: TrackEncoding) -> Self {
        let cell_us = geometry.nominal_bit_cell_us();
        let tracks = (0..geometry.total_tracks())
            .map(|_| SimTrack {
                surface: Surface::Cells {
                    cells: BitVec::from_elem(geometry.bitcells_per_revolution(), false),
                    bit_cell_us: cell_us,
                },
                damage: Vec::new(),
                jitter_sigma: 0.0,
                reads: 0,
            })
            .collect();
        SimDrive {
            config: ControllerConfig::default(),
            geometry,
            encoding,
            tracks,
            position: None,
            motor_on: false,
            write_protect: false,
            closed: false,
            rpm_error_pct: 0.0,
            faults: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// A disk whose every track is the encoding of the given sector table.
    pub fn from_sector_table(table: &SectorTable, encoding: TrackEncoding) -> Self {
        let geometry = *table.geometry();
        let mut drive = Self::new_blank(geometry, encoding);
        let codec = crate::codec::TrackCodec::new(encoding);

        for c in 0..geometry.cylinders {
            for h in 0..geometry.heads {
                let ch = DiskCh::new(c, h);
                let sectors: Vec<_> = (1..=geometry.sectors_per_track)
                    .filter_map(|s| table.get_chs(DiskChs::new(c, h, s)).cloned())
                    .collect();
                let bits = codec
                    .encode_track(&sectors, &geometry, ch)
                    .expect("track encode for simulated drive");
                let idx = geometry.track_index(ch).unwrap();
                drive.tracks[idx].surface = Surface::Cells {
                    cells: bits.bits().clone(),
                    bit_cell_us: geometry.nominal_bit_cell_us(),
                };
            }
        }
        drive
    }

    /// A disk backed by previously captured flux (a loaded SCP image).
    pub fn from_flux_tracks(
        geometry: DiskGeometry,
        encoding: TrackEncoding,
        tracks: Vec<(DiskCh, FluxCapture)>,
    ) -> Self {
        let mut drive = Self::new_blank(geometry, encoding);
        for (ch, capture) in tracks {
            if let Some(idx) = geometry.track_index(ch) {
                drive.tracks[idx].surface = Surface::Flux(capture);
            }
        }
        drive
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn encoding(&self) -> TrackEncoding {
        self.encoding
    }

    pub fn set_write_protect(&mut self, protect: bool) {
        self.write_protect = protect;
    }

    pub fn set_rpm_error_pct(&mut self, pct: f64) {
        self.rpm_error_pct = pct;
    }

    /// Skew a track's written bit cell (simulates a drive with a fast or
    /// slow write clock).
    pub fn set_track_bit_cell(&mut self, ch: DiskCh, bit_cell_us: f64) {
        if let Some(idx) = self.geometry.track_index(ch) {
            if let Surface::Cells { bit_cell_us: cell, .. } = &mut self.tracks[idx].surface {
                *cell = bit_cell_us;
            }
        }
    }

    /// Gaussian timing jitter for a track, as a fraction of the bit cell.
    /// The noise stream is seeded per track, so repeated reads of a track
    /// see identical flux.
    pub fn set_track_jitter(&mut self, ch: DiskCh, sigma: f64) {
        if let Some(idx) = self.geometry.track_index(ch) {
            self.tracks[idx].jitter_sigma = sigma;
        }
    }

    pub fn set_all_track_jitter(&mut self, sigma: f64) {
        for track in self.tracks.iter_mut() {
            track.jitter_sigma = sigma;
        }
    }

    /// Queue an error for the next operation of the given class.
    pub fn inject_fault(&mut self, op: SimOp, error: ControllerError) {
        self.faults.push_back((op, error));
    }

    fn take_fault(&mut self, op: SimOp) -> Result<(), ControllerError> {
        if let Some((queued_op, _)) = self.faults.front() {
            if *queued_op == op {
                let (_, error) = self.faults.pop_front().unwrap();
                if matches!(error, ControllerError::TransportLost) {
                    self.closed = true;
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Damage a sector's data field by clearing a transition cell inside its
    /// payload. Weak damage (hard = false) is repaired by any rewrite of the
    /// track, or heals on its own after the given number of track reads.
    ///
    /// Only cell-backed MFM tracks can be damaged this way. Returns false if
    /// the sector's data field could not be located.
    pub fn damage_sector_data(&mut self, chs: DiskChs, hard: bool, heal_after_reads: Option<u32>) -> bool {
        let Some(idx) = self.geometry.track_index(chs.ch()) else {
            return false;
        };
        let cells = match &self.tracks[idx].surface {
            Surface::Cells { cells, .. } => cells.clone(),
            _ => return false,
        };

        let bits = crate::bitstream::BitStream::from_bits(cells.clone());
        let Ok(scan) = mfm::scan_track(&bits, &self.geometry, chs.ch()) else {
            return false;
        };
        let Some(found) = scan.iter().find(|s| s.sector.id.s() == chs.s() && s.dam_cell.is_some()) else {
            return false;
        };

        // Find a set cell a little way into the payload and clear it; the
        // merged flux interval garbles the local bytes and fails the CRC.
        let data_start = found.dam_cell.unwrap() + mfm::MARKER_LEN;
        let size_cells = found.sector.id.n_size() * mfm::MFM_BYTE_LEN;
        for cell in (data_start + 64)..(data_start + size_cells) {
            if cells[cell] {
                self.tracks[idx].damage.push(Damage {
                    cell,
                    hard,
                    heal_after_reads,
                });
                log::debug!("SimDrive::damage_sector_data(): {} damaged at cell {}", chs, cell);
                return true;
            }
        }
        false
    }

    fn current_track(&self) -> Result<usize, ControllerError> {
        let ch = self.position.ok_or(ControllerError::NotReady)?;
        self.geometry.track_index(ch).ok_or(ControllerError::NotReady)
    }

    fn check_ready(&self) -> Result<(), ControllerError> {
        if self.closed {
            return Err(ControllerError::TransportLost);
        }
        if !self.motor_on {
            return Err(ControllerError::NotReady);
        }
        Ok(())
    }
}

impl DriveController for SimDrive {
    fn seek(&mut self, ch: DiskCh) -> Result<(), ControllerError> {
        if self.closed {
            return Err(ControllerError::TransportLost);
        }
        self.take_fault(SimOp::Seek)?;
        if self.geometry.track_index(ch).is_none() {
            return Err(ControllerError::SeekError(ch.to_string()));
        }
        self.position = Some(ch);
        Ok(())
    }

    fn set_motor(&mut self, on: bool) -> Result<(), ControllerError> {
        if self.closed {
            return Err(ControllerError::TransportLost);
        }
        self.take_fault(SimOp::Motor)?;
        self.motor_on = on;
        Ok(())
    }

    fn read_flux(&mut self, revolutions: u8) -> Result<FluxCapture, ControllerError> {
        self.check_ready()?;
        self.take_fault(SimOp::ReadFlux)?;
        let idx = self.current_track()?;

        let track = &mut self.tracks[idx];
        track.reads += 1;
        let reads = track.reads;

        match &track.surface {
            Surface::Flux(capture) => Ok(capture.trimmed(revolutions as usize)),
            Surface::Cells { cells, bit_cell_us } => {
                let mut cells = cells.clone();
                for damage in track.damage.iter() {
                    let healed = match (damage.hard, damage.heal_after_reads) {
                        (true, _) => false,
                        (false, Some(heal)) => reads >= heal,
                        (false, None) => false,
                    };
                    if !healed && damage.cell < cells.len() {
                        cells.set(damage.cell, !cells[damage.cell]);
                    }
                }

                let jitter = (track.jitter_sigma > 0.0)
                    .then(|| (track.jitter_sigma, 0x5EED_0001_u64.wrapping_mul(idx as u64 + 1)));

                // Capture one extra revolution, then trim it off.
                let capture = FluxCapture::synthesize(&cells, bit_cell_us * 1000.0, revolutions as usize + 1, jitter);
                Ok(capture.trimmed(revolutions as usize))
            }
        }
    }

    fn write_flux(&mut self, capture: &FluxCapture) -> Result<(), ControllerError> {
        self.check_ready()?;
        if self.write_protect {
            return Err(ControllerError::WriteProtected);
        }
        self.take_fault(SimOp::WriteFlux)?;
        let idx = self.current_track()?;

        // Decode the incoming flux at the drive's write clock to recover the
        // cells that land on the media.
        let nominal = self.geometry.nominal_bit_cell_us();
        let pll = Pll::new(
            PllConfig::default()
                .with_bit_cell(nominal)
                .with_encoding(match self.encoding {
                    TrackEncoding::Fm => TrackEncoding::Fm,
                    _ => TrackEncoding::Mfm,
                }),
        );
        let view = capture.revolution(0).map_err(|_| ControllerError::WriteError)?;
        let decoded = pll.decode(&view).map_err(|_| ControllerError::WriteError)?;

        let track = &mut self.tracks[idx];
        track.surface = Surface::Cells {
            cells: decoded.bits.bits().clone(),
            bit_cell_us: nominal,
        };
        // A rewrite restores weak domains; hard damage persists.
        track.damage.retain(|d| d.hard);
        Ok(())
    }

    fn erase_track(&mut self) -> Result<(), ControllerError> {
        self.check_ready()?;
        if self.write_protect {
            return Err(ControllerError::WriteProtected);
        }
        self.take_fault(SimOp::Erase)?;
        let idx = self.current_track()?;
        let track = &mut self.tracks[idx];
        track.surface = Surface::Cells {
            cells: BitVec::from_elem(self.geometry.bitcells_per_revolution(), false),
            bit_cell_us: self.geometry.nominal_bit_cell_us(),
        };
        track.damage.retain(|d| d.hard);
        Ok(())
    }

    fn measure_rpm(&mut self) -> Result<f64, ControllerError> {
        self.check_ready()?;
        self.take_fault(SimOp::Rpm)?;
        Ok(self.geometry.rpm.rpm() * (1.0 + self.rpm_error_pct / 100.0))
    }

    fn close(&mut self) {
        self.motor_on = false;
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeometryPreset, Sector, SectorStatus};

    fn table_with_payload() -> SectorTable {
        let geometry = GeometryPreset::PcFloppy360.geometry();
        let mut table = SectorTable::new(geometry);
        for linear in 0..table.len() {
            table.update(linear, |s: &mut Sector| {
                s.status = SectorStatus::Good;
                s.payload = Some(vec![(linear % 256) as u8; 512]);
            });
        }
        table
    }

    #[test]
    fn test_read_requires_motor_and_seek() {
        let mut drive = SimDrive::from_sector_table(&table_with_payload(), TrackEncoding::Mfm);
        assert!(matches!(drive.read_flux(1), Err(ControllerError::NotReady)));
        drive.set_motor(true).unwrap();
        assert!(matches!(drive.read_flux(1), Err(ControllerError::NotReady)));
        drive.seek(DiskCh::new(0, 0)).unwrap();
        let capture = drive.read_flux(2).unwrap();
        assert_eq!(capture.revolutions(), 2);
    }

    #[test]
    fn test_write_protect() {
        let mut drive = SimDrive::from_sector_table(&table_with_payload(), TrackEncoding::Mfm);
        drive.set_write_protect(true);
        drive.set_motor(true).unwrap();
        drive.seek(DiskCh::new(0, 0)).unwrap();
        let capture = drive.read_flux(1).unwrap();
        assert!(matches!(drive.write_flux(&capture), Err(ControllerError::WriteProtected)));
    }

    #[test]
    fn test_open_with_config() {
        let config = ControllerConfig {
            drive_unit: 1,
            ..ControllerConfig::default()
        };
        let mut drive = SimDrive::open(config, GeometryPreset::PcFloppy360.geometry(), TrackEncoding::Mfm);
        assert_eq!(drive.config().drive_unit, 1);
        drive.set_motor(true).unwrap();
        drive.seek(DiskCh::new(0, 0)).unwrap();
        // A blank disk reads as transition-free flux.
        let capture = drive.read_flux(1).unwrap();
        assert!(capture.is_empty());
    }

    #[test]
    fn test_fault_injection_order() {
        let mut drive = SimDrive::from_sector_table(&table_with_payload(), TrackEncoding::Mfm);
        drive.inject_fault(SimOp::Seek, ControllerError::SeekError("scripted".into()));
        drive.set_motor(true).unwrap();
        assert!(drive.seek(DiskCh::new(0, 0)).is_err());
        // The fault is consumed; the retry succeeds.
        assert!(drive.seek(DiskCh::new(0, 0)).is_ok());
    }
}
