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

    src/types/geometry.rs

    Disk geometry: the immutable per-session description of the addressable
    sector space, plus the standard PC format presets.
*/
use crate::types::{
    chs::{DiskCh, DiskChs},
    enums::{DiskDataRate, DiskRpm},
};
use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

/// Immutable disk geometry. Created at session start; all addressing flows
/// through it. `total_sectors = cylinders × heads × sectors_per_track`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskGeometry {
    pub cylinders: u16,
    pub heads: u8,
    pub sectors_per_track: u8,
    pub sector_size: usize,
    pub rpm: DiskRpm,
    pub data_rate: DiskDataRate,
}

impl DiskGeometry {
    pub fn new(
        cylinders: u16,
        heads: u8,
        sectors_per_track: u8,
        sector_size: usize,
        rpm: DiskRpm,
        data_rate: DiskDataRate,
    ) -> Result<Self, String> {
        if !(1..=255).contains(&cylinders) {
            return Err(format!("cylinder count out of range: {}", cylinders));
        }
        if !(1..=2).contains(&heads) {
            return Err(format!("head count out of range: {}", heads));
        }
        if !(1..=36).contains(&sectors_per_track) {
            return Err(format!("sectors per track out of range: {}", sectors_per_track));
        }
        if !sector_size.is_power_of_two() || !(128..=8192).contains(&sector_size) {
            return Err(format!("sector size not a power of two in 128..8192: {}", sector_size));
        }
        Ok(DiskGeometry {
            cylinders,
            heads,
            sectors_per_track,
            sector_size,
            rpm,
            data_rate,
        })
    }

    pub fn total_sectors(&self) -> usize {
        self.cylinders as usize * self.heads as usize * self.sectors_per_track as usize
    }

    pub fn total_tracks(&self) -> usize {
        self.cylinders as usize * self.heads as usize
    }

    pub fn total_bytes(&self) -> usize {
        self.total_sectors() * self.sector_size
    }

    /// Linear address of a sector: `(c × heads + h) × spt + (s − 1)`.
    /// Sector IDs are 1-based.
    pub fn linear(&self, chs: DiskChs) -> Option<usize> {
        if chs.c() >= self.cylinders
            || chs.h() >= self.heads
            || chs.s() == 0
            || chs.s() > self.sectors_per_track
        {
            return None;
        }
        Some(
            (chs.c() as usize * self.heads as usize + chs.h() as usize) * self.sectors_per_track as usize
                + (chs.s() as usize - 1),
        )
    }

    pub fn chs_from_linear(&self, linear: usize) -> Option<DiskChs> {
        if linear >= self.total_sectors() {
            return None;
        }
        let spt = self.sectors_per_track as usize;
        let track = linear / spt;
        let s = (linear % spt) as u8 + 1;
        let c = (track / self.heads as usize) as u16;
        let h = (track % self.heads as usize) as u8;
        Some(DiskChs::new(c, h, s))
    }

    /// Track index (`c × heads + h`) for a physical track address.
    pub fn track_index(&self, ch: DiskCh) -> Option<usize> {
        if ch.c() >= self.cylinders || ch.h() >= self.heads {
            return None;
        }
        Some(ch.c() as usize * self.heads as usize + ch.h() as usize)
    }

    /// Raw bit cells per revolution at this geometry's data rate and spin
    /// speed. MFM carries two raw cells per data bit.
    pub fn bitcells_per_revolution(&self) -> usize {
        (self.data_rate.bps() as f64 * 2.0 * self.rpm.revolution_secs()).round() as usize
    }

    /// Nominal PLL clock period for this geometry, in microseconds.
    pub fn nominal_bit_cell_us(&self) -> f64 {
        self.rpm.revolution_secs() * 1e6 / self.bitcells_per_revolution() as f64
    }
}

impl Display for DiskGeometry {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}c {}h {}s {}b {} {}",
            self.cylinders, self.heads, self.sectors_per_track, self.sector_size, self.rpm, self.data_rate
        )
    }
}

/// The standard PC floppy formats, used for IMG geometry inference and the
/// CLI `--geometry` flag.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GeometryPreset {
    PcFloppy160,
    PcFloppy180,
    PcFloppy320,
    PcFloppy360,
    PcFloppy720,
    PcFloppy1200,
    PcFloppy1440,
    PcFloppy2880,
}

impl GeometryPreset {
    pub fn geometry(&self) -> DiskGeometry {
        use DiskDataRate::*;
        use DiskRpm::*;
        let (c, h, s, rpm, rate) = match self {
            GeometryPreset::PcFloppy160 => (40, 1, 8, Rpm300, Rate250Kbps),
            GeometryPreset::PcFloppy180 => (40, 1, 9, Rpm300, Rate250Kbps),
            GeometryPreset::PcFloppy320 => (40, 2, 8, Rpm300, Rate250Kbps),
            GeometryPreset::PcFloppy360 => (40, 2, 9, Rpm300, Rate250Kbps),
            GeometryPreset::PcFloppy720 => (80, 2, 9, Rpm300, Rate250Kbps),
            GeometryPreset::PcFloppy1200 => (80, 2, 15, Rpm360, Rate500Kbps),
            GeometryPreset::PcFloppy1440 => (80, 2, 18, Rpm300, Rate500Kbps),
            GeometryPreset::PcFloppy2880 => (80, 2, 36, Rpm300, Rate1000Kbps),
        };
        DiskGeometry {
            cylinders: c,
            heads: h,
            sectors_per_track: s,
            sector_size: 512,
            rpm,
            data_rate: rate,
        }
    }

    /// Match a raw sector image length against the known format sizes.
    pub fn from_raw_size(size: usize) -> Option<GeometryPreset> {
        match size {
            163_840 => Some(GeometryPreset::PcFloppy160),
            184_320 => Some(GeometryPreset::PcFloppy180),
            327_680 => Some(GeometryPreset::PcFloppy320),
            368_640 => Some(GeometryPreset::PcFloppy360),
            737_280 => Some(GeometryPreset::PcFloppy720),
            1_228_800 => Some(GeometryPreset::PcFloppy1200),
            1_474_560 => Some(GeometryPreset::PcFloppy1440),
            2_949_120 => Some(GeometryPreset::PcFloppy2880),
            _ => None,
        }
    }

    /// Default GAP3 length for the format's track layout.
    pub fn gap3(&self) -> usize {
        match self {
            GeometryPreset::PcFloppy1440 => 84,
            GeometryPreset::PcFloppy1200 => 84,
            GeometryPreset::PcFloppy2880 => 53,
            _ => 80,
        }
    }
}

impl FromStr for GeometryPreset {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "160k" => Ok(GeometryPreset::PcFloppy160),
            "180k" => Ok(GeometryPreset::PcFloppy180),
            "320k" => Ok(GeometryPreset::PcFloppy320),
            "360k" => Ok(GeometryPreset::PcFloppy360),
            "720k" => Ok(GeometryPreset::PcFloppy720),
            "1200k" | "1.2m" => Ok(GeometryPreset::PcFloppy1200),
            "1440k" | "1.44m" => Ok(GeometryPreset::PcFloppy1440),
            "2880k" | "2.88m" => Ok(GeometryPreset::PcFloppy2880),
            _ => Err(format!("unknown geometry preset: {}", input)),
        }
    }
}

impl Display for GeometryPreset {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            GeometryPreset::PcFloppy160 => write!(f, "160K"),
            GeometryPreset::PcFloppy180 => write!(f, "180K"),
            GeometryPreset::PcFloppy320 => write!(f, "320K"),
            GeometryPreset::PcFloppy360 => write!(f, "360K"),
            GeometryPreset::PcFloppy720 => write!(f, "720K"),
            GeometryPreset::PcFloppy1200 => write!(f, "1.2M"),
            GeometryPreset::PcFloppy1440 => write!(f, "1.44M"),
            GeometryPreset::PcFloppy2880 => write!(f, "2.88M"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_addressing_round_trip() {
        let geom = GeometryPreset::PcFloppy1440.geometry();
        assert_eq!(geom.total_sectors(), 2880);
        for linear in 0..geom.total_sectors() {
            let chs = geom.chs_from_linear(linear).unwrap();
            assert_eq!(geom.linear(chs).unwrap(), linear);
        }
    }

    #[test]
    fn test_linear_rejects_out_of_range() {
        let geom = GeometryPreset::PcFloppy360.geometry();
        assert!(geom.linear(DiskChs::new(40, 0, 1)).is_none());
        assert!(geom.linear(DiskChs::new(0, 2, 1)).is_none());
        assert!(geom.linear(DiskChs::new(0, 0, 0)).is_none());
        assert!(geom.linear(DiskChs::new(0, 0, 10)).is_none());
    }

    #[test]
    fn test_geometry_validation() {
        assert!(DiskGeometry::new(0, 2, 18, 512, DiskRpm::Rpm300, DiskDataRate::Rate500Kbps).is_err());
        assert!(DiskGeometry::new(80, 3, 18, 512, DiskRpm::Rpm300, DiskDataRate::Rate500Kbps).is_err());
        assert!(DiskGeometry::new(80, 2, 18, 513, DiskRpm::Rpm300, DiskDataRate::Rate500Kbps).is_err());
        assert!(DiskGeometry::new(80, 2, 18, 512, DiskRpm::Rpm300, DiskDataRate::Rate500Kbps).is_ok());
    }

    #[test]
    fn test_bitcells_per_revolution() {
        // 250Kbps at 300RPM: 100,000 raw cells (6250 MFM bytes).
        let geom = GeometryPreset::PcFloppy360.geometry();
        assert_eq!(geom.bitcells_per_revolution(), 100_000);
        // 500Kbps at 300RPM doubles that.
        let geom = GeometryPreset::PcFloppy1440.geometry();
        assert_eq!(geom.bitcells_per_revolution(), 200_000);
    }
}
