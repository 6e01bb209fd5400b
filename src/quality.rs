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

    src/quality.rs

    Quality and reporting data: per-track letter grades from the analyzer's
    signal score, error category tallies, the overall disk score, and the
    status heat map a front end renders.
*/
use crate::{sector_map::StatusCounts, SectorStatus, SectorTable};
use std::fmt::{self, Display, Formatter};

/// A..F track grade from the analyzer's 0-100 quality score.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackGrade {
    A,
    B,
    C,
    D,
    F,
}

impl TrackGrade {
    pub fn from_score(score: f64) -> TrackGrade {
        match score {
            s if s >= 90.0 => TrackGrade::A,
            s if s >= 75.0 => TrackGrade::B,
            s if s >= 60.0 => TrackGrade::C,
            s if s >= 40.0 => TrackGrade::D,
            _ => TrackGrade::F,
        }
    }
}

impl Display for TrackGrade {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackGrade::A => write!(f, "A"),
            TrackGrade::B => write!(f, "B"),
            TrackGrade::C => write!(f, "C"),
            TrackGrade::D => write!(f, "D"),
            TrackGrade::F => write!(f, "F"),
        }
    }
}

/// The error categories tallied for reporting.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ErrorTally {
    pub crc: usize,
    pub missing: usize,
    pub weak: usize,
    pub no_address: usize,
    pub header_crc: usize,
    pub deleted: usize,
}

impl ErrorTally {
    pub fn from_table(table: &SectorTable) -> Self {
        let mut tally = ErrorTally::default();
        for sector in table.iter() {
            match sector.status {
                SectorStatus::Bad => tally.crc += 1,
                SectorStatus::Missing => tally.missing += 1,
                SectorStatus::Weak => tally.weak += 1,
                SectorStatus::NoAddress => tally.no_address += 1,
                SectorStatus::HeaderCrc => tally.header_crc += 1,
                SectorStatus::Deleted => tally.deleted += 1,
                _ => {}
            }
        }
        tally
    }

    pub fn total(&self) -> usize {
        self.crc + self.missing + self.weak + self.no_address + self.header_crc + self.deleted
    }
}

/// One row per cylinder, one cell per (head, sector) in head-major order.
/// This is the structure a front end renders directly.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorHeatMap {
    pub rows: Vec<Vec<SectorStatus>>,
}

impl SectorHeatMap {
    pub fn from_table(table: &SectorTable) -> Self {
        let geometry = table.geometry();
        let row_len = geometry.heads as usize * geometry.sectors_per_track as usize;
        let mut rows = Vec::with_capacity(geometry.cylinders as usize);
        let mut iter = table.iter();
        for _ in 0..geometry.cylinders {
            let row: Vec<SectorStatus> = iter.by_ref().take(row_len).map(|s| s.status).collect();
            rows.push(row);
        }
        SectorHeatMap { rows }
    }
}

/// Aggregated per-disk report data.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskReport {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub sector_size: usize,
    pub counts: StatusCounts,
    pub errors: ErrorTally,
    /// Per-track signal quality score, in track-index order, where flux was
    /// available to analyze.
    pub track_scores: Vec<f64>,
    pub track_grades: Vec<TrackGrade>,
    /// Rounded mean of the per-track scores.
    pub overall_score: u32,
    pub overall_grade: TrackGrade,
    pub heat_map: SectorHeatMap,
}

impl DiskReport {
    pub fn build(table: &SectorTable, track_scores: Vec<f64>) -> Self {
        let geometry = table.geometry();
        let track_grades: Vec<TrackGrade> = track_scores.iter().map(|s| TrackGrade::from_score(*s)).collect();
        let overall_score = if track_scores.is_empty() {
            0
        }
        else {
            (track_scores.iter().sum::<f64>() / track_scores.len() as f64).round() as u32
        };

        DiskReport {
            cylinders: geometry.cylinders,
            heads: geometry.heads,
            sectors_per_track: geometry.sectors_per_track,
            sector_size: geometry.sector_size,
            counts: table.counts(),
            errors: ErrorTally::from_table(table),
            track_scores,
            track_grades,
            overall_score,
            overall_grade: TrackGrade::from_score(overall_score as f64),
            heat_map: SectorHeatMap::from_table(table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeometryPreset;

    #[test]
    fn test_grade_thresholds() {
        assert_eq!(TrackGrade::from_score(95.0), TrackGrade::A);
        assert_eq!(TrackGrade::from_score(90.0), TrackGrade::A);
        assert_eq!(TrackGrade::from_score(89.9), TrackGrade::B);
        assert_eq!(TrackGrade::from_score(75.0), TrackGrade::B);
        assert_eq!(TrackGrade::from_score(60.0), TrackGrade::C);
        assert_eq!(TrackGrade::from_score(40.0), TrackGrade::D);
        assert_eq!(TrackGrade::from_score(39.9), TrackGrade::F);
    }

    #[test]
    fn test_heat_map_shape() {
        let table = SectorTable::new(GeometryPreset::PcFloppy1440.geometry());
        let map = SectorHeatMap::from_table(&table);
        assert_eq!(map.rows.len(), 80);
        assert!(map.rows.iter().all(|r| r.len() == 36));
    }

    #[test]
    fn test_error_tally() {
        let mut table = SectorTable::new(GeometryPreset::PcFloppy360.geometry());
        table.update(0, |s| s.status = SectorStatus::Bad);
        table.update(1, |s| s.status = SectorStatus::Weak);
        table.update(2, |s| s.status = SectorStatus::Missing);
        let tally = ErrorTally::from_table(&table);
        assert_eq!(tally.crc, 1);
        assert_eq!(tally.weak, 1);
        assert_eq!(tally.missing, 1);
        assert_eq!(tally.total(), 3);
    }
}
