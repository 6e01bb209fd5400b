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
*/

//! FluxRescue is a flux-level floppy disk engine: it ingests raw
//! magnetic-transition streams from a flux-capable controller, decodes them
//! into logical sectors with quality metrics, applies iterative multi-strategy
//! recovery to damaged media, and persists captures and sector images to the
//! IMG, SCP and HFE on-disk formats.

pub mod analysis;
pub mod bitstream;
pub mod codec;
pub mod controller;
pub mod events;
pub mod file_parsers;
pub mod flux;
pub mod formatter;
pub mod io;
pub mod quality;
pub mod random;
pub mod recovery;
pub mod scan;
pub mod sector_map;
pub mod types;
pub mod util;

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

/// The engine's native flux sample rate. Captures produced by controllers or
/// parsed from flux image files are expressed in ticks of this clock
/// (≈13.9 ns per tick).
pub const NATIVE_SAMPLE_HZ: u32 = 72_000_000;

pub const DEFAULT_SECTOR_SIZE: usize = 512;
pub const MAXIMUM_SECTOR_SIZE: usize = 8192;

pub use crate::{
    bitstream::BitStream,
    flux::{FluxCapture, FluxView},
    sector_map::{Sector, SectorTable},
    types::{
        chs::{DiskCh, DiskChs, DiskChsn},
        enums::{
            DiskDataRate,
            DiskRpm,
            RecoveryLevel,
            RecoveryMode,
            ScanMode,
            SectorProvenance,
            SectorStatus,
            TrackEncoding,
        },
        geometry::{DiskGeometry, GeometryPreset},
    },
};

/// Errors raised by flux buffer construction and revolution slicing.
#[derive(Debug, Error)]
pub enum FluxError {
    #[error("Flux stream rejected: {0}")]
    InvalidFlux(String),
    #[error("Revolution index out of range: {0}")]
    OutOfRange(usize),
}

/// Errors raised while converting flux to bits or bits to sectors. Data-level
/// faults (bad CRCs, missing data fields) are never errors; they are recorded
/// as per-sector status instead.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("PLL lost lock over a majority of the tracking window")]
    DecodeAbort,
    #[error("No address marks found in revolution")]
    NoAddressMarks,
    #[error("Encoding not supported for this operation: {0}")]
    UnsupportedEncoding(TrackEncoding),
}

/// Errors raised by the disk image format parsers and writers.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("An IO error occurred reading or writing the image")]
    IoError,
    #[error("Unknown image format")]
    UnknownFormat,
    #[error("The image format parser encountered an error: {0}")]
    FormatParseError(String),
    #[error("Image size does not match any known geometry")]
    UnknownGeometry,
    #[error("Sector table is incomplete and no fill policy was given")]
    MissingSectors,
    #[error("Parameter error: {0}")]
    ParameterError(String),
}

/// Overall outcome of a scan, recovery or format job. Jobs always complete
/// with a structured result; there are no silent drops.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobOutcome {
    Ok,
    Partial,
    Failed,
}

impl Display for JobOutcome {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            JobOutcome::Ok => write!(f, "ok"),
            JobOutcome::Partial => write!(f, "partial"),
            JobOutcome::Failed => write!(f, "failed"),
        }
    }
}
