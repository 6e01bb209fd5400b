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

    tests/common/mod.rs

    Common support routines for tests. Every fixture is synthesized: sector
    tables with a counting payload pattern, simulated drives built from
    their encodings.
*/
#![allow(dead_code)]

use fluxrescue::{controller::SimDrive, DiskGeometry, GeometryPreset, SectorStatus, SectorTable, TrackEncoding};

pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn hd_geometry() -> DiskGeometry {
    GeometryPreset::PcFloppy1440.geometry()
}

pub fn dd_geometry() -> DiskGeometry {
    GeometryPreset::PcFloppy360.geometry()
}

/// A fully `Good` table where every byte of sector `i` is `i mod 256`.
pub fn pattern_table(geometry: DiskGeometry) -> SectorTable {
    let mut table = SectorTable::new(geometry);
    let size = geometry.sector_size;
    for linear in 0..table.len() {
        table.update(linear, |sector| {
            sector.status = SectorStatus::Good;
            sector.payload = Some(vec![(linear % 256) as u8; size]);
            sector.quality = 1.0;
        });
    }
    table
}

/// Verify a table against the counting pattern.
pub fn assert_pattern_payloads(table: &SectorTable) {
    for (linear, sector) in table.iter().enumerate() {
        let payload = sector
            .payload
            .as_ref()
            .unwrap_or_else(|| panic!("sector {} has no payload", sector.id));
        let expected = (linear % 256) as u8;
        assert!(
            payload.iter().all(|b| *b == expected),
            "sector {} payload mismatch: expected {:02X}",
            sector.id,
            expected
        );
    }
}

pub fn pattern_drive(geometry: DiskGeometry, encoding: TrackEncoding) -> SimDrive {
    SimDrive::from_sector_table(&pattern_table(geometry), encoding)
}
