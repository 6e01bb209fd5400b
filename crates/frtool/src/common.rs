/*
    frtool
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

    src/common.rs

    Shared plumbing for the commands: loading SCP captures into a simulated
    drive, writing sector images, exit-code mapping.
*/
use anyhow::{anyhow, Error};
use std::path::Path;

use fluxrescue::{
    controller::SimDrive,
    file_parsers::{
        raw::{FillPolicy, RawFormat},
        scp::{ScpDisk, ScpFormat},
    },
    DiskCh,
    DiskGeometry,
    FluxCapture,
    JobOutcome,
    SectorTable,
    TrackEncoding,
};

use crate::read_file;

/// Load an SCP capture and mount it as a simulated drive for the engine to
/// scan or recover against.
pub fn drive_from_scp(path: &Path, geometry: DiskGeometry, encoding: TrackEncoding) -> Result<SimDrive, Error> {
    let disk = ScpFormat::load(read_file(path)?)?;
    let double_sided = geometry.heads == 2;

    let mut tracks: Vec<(DiskCh, FluxCapture)> = Vec::new();
    for c in 0..geometry.cylinders {
        for h in 0..geometry.heads {
            let ch = DiskCh::new(c, h);
            if let Some(capture) = disk.track(ScpDisk::track_index(ch, double_sided)) {
                tracks.push((ch, capture.clone()));
            }
        }
    }
    if tracks.is_empty() {
        return Err(anyhow!("no usable tracks in {}", path.display()));
    }
    log::info!("Loaded {} flux tracks from {}", tracks.len(), path.display());
    Ok(SimDrive::from_flux_tracks(geometry, encoding, tracks))
}

/// Write a sector table as an IMG, filling unreadable sectors with zeros.
pub fn write_img(table: &SectorTable, path: &Path) -> Result<(), Error> {
    let mut file = std::fs::File::create(path)?;
    RawFormat::save_image(table, &mut file, Some(FillPolicy::Zero))?;
    Ok(())
}

/// The CLI contract: 0 on success, 2 on partial (cancelled or bad sectors
/// remain), 3 on failure.
pub fn exit_code(outcome: JobOutcome) -> i32 {
    match outcome {
        JobOutcome::Ok => 0,
        JobOutcome::Partial => 2,
        JobOutcome::Failed => 3,
    }
}
