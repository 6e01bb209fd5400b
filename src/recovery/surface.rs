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

    src/recovery/surface.rs

    Surface treatment: DC-erase a stubborn track, exercise the magnetic
    coating with a fixed pattern sequence, then reformat it with the
    configured fill. A write failure excludes the track from any further
    write-based strategy in the job.
*/
use crate::{
    codec::TrackCodec,
    controller::{ControllerError, DriveController},
    DiskCh,
    DiskChs,
    DiskChsn,
    DiskGeometry,
    FluxCapture,
    Sector,
    SectorStatus,
    TrackEncoding,
};

/// The treatment sequence written after the erase, before the reformat.
pub const TREATMENT_PATTERNS: [u8; 4] = [0x00, 0xFF, 0xAA, 0x55];

/// Build one revolution of flux for a freshly formatted track whose sectors
/// all carry the given fill byte.
pub fn format_track_flux(
    geometry: &DiskGeometry,
    encoding: TrackEncoding,
    ch: DiskCh,
    fill: u8,
) -> Result<FluxCapture, crate::DecodeError> {
    let n = DiskChsn::n_for_size(geometry.sector_size);
    let sectors: Vec<Sector> = (1..=geometry.sectors_per_track)
        .map(|s| {
            let mut sector = Sector::unread(DiskChsn::new(ch.c(), ch.h(), s, n));
            sector.status = SectorStatus::Good;
            sector.payload = Some(vec![fill; geometry.sector_size]);
            sector
        })
        .collect();

    let bits = TrackCodec::new(encoding).encode_track(&sectors, geometry, ch)?;
    Ok(FluxCapture::synthesize(
        bits.bits(),
        geometry.nominal_bit_cell_us() * 1000.0,
        1,
        None,
    ))
}

/// Treat one track: erase, write the pattern sequence, reformat with the
/// fill byte. The caller has already sought to the track.
pub fn treat_track(
    controller: &mut dyn DriveController,
    geometry: &DiskGeometry,
    encoding: TrackEncoding,
    ch: DiskCh,
    fill: u8,
) -> Result<(), ControllerError> {
    log::info!("surface: treating {}", ch);
    controller.erase_track()?;

    for pattern in TREATMENT_PATTERNS {
        let capture = format_track_flux(geometry, encoding, ch, pattern)
            .map_err(|_| ControllerError::WriteError)?;
        controller.write_flux(&capture)?;
    }

    let capture = format_track_flux(geometry, encoding, ch, fill).map_err(|_| ControllerError::WriteError)?;
    controller.write_flux(&capture)?;
    Ok(())
}

/// Mark every sector of a treated-but-unrecoverable track. Used when a
/// write fails mid-treatment: the track is excluded from further write
/// strategies for the rest of the job.
pub fn mark_treatment_failed(table: &mut crate::SectorTable, geometry: &DiskGeometry, ch: DiskCh) {
    for s in 1..=geometry.sectors_per_track {
        table.update_chs(DiskChs::new(ch.c(), ch.h(), s), |sector| {
            sector.quality = 0.0;
        });
    }
    log::warn!("surface: treatment failed on {}; track excluded from write strategies", ch);
}
