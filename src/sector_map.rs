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

    src/sector_map.rs

    The sector table: a dense, exclusively-owned map from linear address to
    sector state, mutated only by the scan orchestrator and the recovery
    controller.
*/
use crate::{
    types::enums::IntegrityCheck,
    DiskChs,
    DiskChsn,
    DiskGeometry,
    SectorProvenance,
    SectorStatus,
};
use std::fmt::{self, Display, Formatter};

/// One addressable sector and everything known about it.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sector {
    pub id: DiskChsn,
    pub status: SectorStatus,
    pub payload: Option<Vec<u8>>,
    pub header_crc: IntegrityCheck,
    pub data_crc: IntegrityCheck,
    /// Signal quality for this sector's data field, 0.0–1.0.
    pub quality: f64,
    pub read_count: u32,
    pub last_successful_pass: Option<u32>,
    pub provenance: Option<SectorProvenance>,
}

impl Sector {
    pub fn unread(id: DiskChsn) -> Self {
        Sector {
            id,
            status: SectorStatus::Unread,
            payload: None,
            header_crc: IntegrityCheck::Absent,
            data_crc: IntegrityCheck::Absent,
            quality: 0.0,
            read_count: 0,
            last_successful_pass: None,
            provenance: None,
        }
    }

    pub fn chs(&self) -> DiskChs {
        self.id.chs()
    }
}

/// Aggregate status counters, maintained incrementally as the table mutates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusCounts {
    pub unread: usize,
    pub good: usize,
    pub weak: usize,
    pub bad: usize,
    pub missing: usize,
    pub no_address: usize,
    pub header_crc: usize,
    pub deleted: usize,
    pub recovered: usize,
}

impl StatusCounts {
    fn slot(&mut self, status: SectorStatus) -> &mut usize {
        match status {
            SectorStatus::Unread => &mut self.unread,
            SectorStatus::Good => &mut self.good,
            SectorStatus::Weak => &mut self.weak,
            SectorStatus::Bad => &mut self.bad,
            SectorStatus::Missing => &mut self.missing,
            SectorStatus::NoAddress => &mut self.no_address,
            SectorStatus::HeaderCrc => &mut self.header_crc,
            SectorStatus::Deleted => &mut self.deleted,
            SectorStatus::Recovered => &mut self.recovered,
        }
    }

    pub fn total(&self) -> usize {
        self.unread
            + self.good
            + self.weak
            + self.bad
            + self.missing
            + self.no_address
            + self.header_crc
            + self.deleted
            + self.recovered
    }

    /// Sectors carrying a CRC-valid payload.
    pub fn readable(&self) -> usize {
        self.good + self.weak + self.deleted + self.recovered
    }

    /// Sectors still needing recovery attention.
    pub fn outstanding(&self) -> usize {
        self.unread + self.bad + self.missing + self.no_address + self.header_crc
    }
}

impl Display for StatusCounts {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "good: {} weak: {} bad: {} missing: {} noaddr: {} hdrcrc: {} deleted: {} recovered: {} unread: {}",
            self.good,
            self.weak,
            self.bad,
            self.missing,
            self.no_address,
            self.header_crc,
            self.deleted,
            self.recovered,
            self.unread
        )
    }
}

/// Dense sector table indexed by linear address. Every address has exactly
/// one sector; the table owns its sectors exclusively, so updates for the
/// same address are totally ordered by construction.
#[derive(Clone, Debug)]
pub struct SectorTable {
    geometry: DiskGeometry,
    sectors: Vec<Sector>,
    counts: StatusCounts,
}

impl SectorTable {
    /// A table with every entry `Unread`.
    pub fn new(geometry: DiskGeometry) -> Self {
        let n = DiskChsn::n_for_size(geometry.sector_size);
        let mut sectors = Vec::with_capacity(geometry.total_sectors());
        for linear in 0..geometry.total_sectors() {
            let chs = geometry.chs_from_linear(linear).expect("in-range address");
            sectors.push(Sector::unread(DiskChsn::new(chs.c(), chs.h(), chs.s(), n)));
        }
        let counts = StatusCounts {
            unread: sectors.len(),
            ..StatusCounts::default()
        };
        SectorTable {
            geometry,
            sectors,
            counts,
        }
    }

    pub fn geometry(&self) -> &DiskGeometry {
        &self.geometry
    }

    pub fn len(&self) -> usize {
        self.sectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sectors.is_empty()
    }

    pub fn counts(&self) -> StatusCounts {
        self.counts
    }

    pub fn get(&self, linear: usize) -> Option<&Sector> {
        self.sectors.get(linear)
    }

    pub fn get_chs(&self, chs: DiskChs) -> Option<&Sector> {
        self.geometry.linear(chs).and_then(|l| self.sectors.get(l))
    }

    /// Exclusive per-sector update; the aggregate counters track the status
    /// transition.
    pub fn update<F>(&mut self, linear: usize, f: F) -> bool
    where
        F: FnOnce(&mut Sector),
    {
        let Some(sector) = self.sectors.get_mut(linear) else {
            return false;
        };
        let before = sector.status;
        f(sector);
        let after = sector.status;
        if before != after {
            *self.counts.slot(before) -= 1;
            *self.counts.slot(after) += 1;
        }
        true
    }

    pub fn update_chs<F>(&mut self, chs: DiskChs, f: F) -> bool
    where
        F: FnOnce(&mut Sector),
    {
        match self.geometry.linear(chs) {
            Some(linear) => self.update(linear, f),
            None => false,
        }
    }

    /// Merge a freshly decoded sector into the table. The existing record is
    /// replaced when its status ranks below the new one; equal ranks keep
    /// the higher quality score. Read counts accumulate either way.
    pub fn merge(&mut self, decoded: Sector, pass: u32) {
        let Some(linear) = self.geometry.linear(decoded.chs()) else {
            log::warn!("SectorTable::merge(): decoded sector {} outside geometry", decoded.id);
            return;
        };
        self.update(linear, |existing| {
            existing.read_count += 1;
            let replace = match existing.status.rank().cmp(&decoded.status.rank()) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => decoded.quality > existing.quality,
                std::cmp::Ordering::Greater => false,
            };
            if replace {
                existing.status = decoded.status;
                existing.payload = decoded.payload;
                existing.header_crc = decoded.header_crc;
                existing.data_crc = decoded.data_crc;
                existing.quality = decoded.quality;
                existing.provenance = decoded.provenance;
                if decoded.status.is_readable() {
                    existing.last_successful_pass = Some(pass);
                }
            }
        });
    }

    /// Ordered iteration by (cylinder, head, sector ID), which is the
    /// table's linear layout.
    pub fn iter(&self) -> impl Iterator<Item = &Sector> {
        self.sectors.iter()
    }

    /// Linear addresses whose sectors still need recovery.
    pub fn outstanding_addresses(&self) -> Vec<usize> {
        self.sectors
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status.is_outstanding())
            .map(|(l, _)| l)
            .collect()
    }

    /// Linear addresses with a given status.
    pub fn addresses_with_status(&self, status: SectorStatus) -> Vec<usize> {
        self.sectors
            .iter()
            .enumerate()
            .filter(|(_, s)| s.status == status)
            .map(|(l, _)| l)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeometryPreset;

    fn table() -> SectorTable {
        SectorTable::new(GeometryPreset::PcFloppy1440.geometry())
    }

    #[test]
    fn test_new_table_all_unread() {
        let table = table();
        assert_eq!(table.len(), 2880);
        assert_eq!(table.counts().unread, 2880);
        assert_eq!(table.counts().total(), 2880);
        assert!(table.iter().all(|s| s.status == SectorStatus::Unread));
    }

    #[test]
    fn test_counts_track_updates() {
        let mut table = table();
        table.update(0, |s| s.status = SectorStatus::Good);
        table.update(1, |s| s.status = SectorStatus::Bad);
        table.update(1, |s| s.status = SectorStatus::Recovered);
        let counts = table.counts();
        assert_eq!(counts.good, 1);
        assert_eq!(counts.bad, 0);
        assert_eq!(counts.recovered, 1);
        assert_eq!(counts.unread, 2878);
        assert_eq!(counts.total(), 2880);
    }

    #[test]
    fn test_merge_prefers_better_status() {
        let mut table = table();
        let id = table.get(0).unwrap().id;

        let mut bad = Sector::unread(id);
        bad.status = SectorStatus::Bad;
        bad.quality = 0.2;
        table.merge(bad, 1);
        assert_eq!(table.get(0).unwrap().status, SectorStatus::Bad);

        let mut good = Sector::unread(id);
        good.status = SectorStatus::Good;
        good.quality = 0.9;
        good.payload = Some(vec![0xA5; 512]);
        table.merge(good, 2);
        let sector = table.get(0).unwrap();
        assert_eq!(sector.status, SectorStatus::Good);
        assert_eq!(sector.read_count, 2);
        assert_eq!(sector.last_successful_pass, Some(2));

        // A later, worse decode must not clobber the good payload.
        let mut worse = Sector::unread(id);
        worse.status = SectorStatus::Bad;
        table.merge(worse, 3);
        assert_eq!(table.get(0).unwrap().status, SectorStatus::Good);
    }

    #[test]
    fn test_merge_equal_status_keeps_higher_quality() {
        let mut table = table();
        let id = table.get(0).unwrap().id;

        let mut first = Sector::unread(id);
        first.status = SectorStatus::Good;
        first.quality = 0.95;
        first.payload = Some(vec![1; 512]);
        table.merge(first, 1);

        let mut second = Sector::unread(id);
        second.status = SectorStatus::Good;
        second.quality = 0.50;
        second.payload = Some(vec![2; 512]);
        table.merge(second, 1);

        let sector = table.get(0).unwrap();
        assert_eq!(sector.quality, 0.95);
        assert_eq!(sector.payload.as_ref().unwrap()[0], 1);
    }
}
