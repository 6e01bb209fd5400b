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
use std::fmt::{self, Display, Formatter};

/// The bit-level encoding of a track.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackEncoding {
    #[default]
    Mfm,
    Fm,
    AmigaMfm,
    Gcr,
}

impl Display for TrackEncoding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackEncoding::Mfm => write!(f, "MFM"),
            TrackEncoding::Fm => write!(f, "FM"),
            TrackEncoding::AmigaMfm => write!(f, "Amiga MFM"),
            TrackEncoding::Gcr => write!(f, "GCR"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiskDataRate {
    Rate125Kbps,
    #[default]
    Rate250Kbps,
    Rate500Kbps,
    Rate1000Kbps,
}

impl DiskDataRate {
    pub fn bps(&self) -> u32 {
        match self {
            DiskDataRate::Rate125Kbps => 125_000,
            DiskDataRate::Rate250Kbps => 250_000,
            DiskDataRate::Rate500Kbps => 500_000,
            DiskDataRate::Rate1000Kbps => 1_000_000,
        }
    }
}

impl Display for DiskDataRate {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}Kbps", self.bps() / 1000)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiskRpm {
    #[default]
    Rpm300,
    Rpm360,
}

impl DiskRpm {
    pub fn rpm(&self) -> f64 {
        match self {
            DiskRpm::Rpm300 => 300.0,
            DiskRpm::Rpm360 => 360.0,
        }
    }

    /// Nominal time for one revolution, in seconds.
    pub fn revolution_secs(&self) -> f64 {
        60.0 / self.rpm()
    }
}

impl Display for DiskRpm {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{:.0}RPM", self.rpm())
    }
}

/// The decode state of a single sector in the sector table.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectorStatus {
    /// Never visited by a scan.
    #[default]
    Unread,
    /// Header and data CRCs both valid.
    Good,
    /// CRC-valid data carrying low-confidence bit cells.
    Weak,
    /// Data CRC mismatch.
    Bad,
    /// Address field seen, data field absent.
    Missing,
    /// No address mark for this sector ID anywhere in the track.
    NoAddress,
    /// Address field CRC mismatch.
    HeaderCrc,
    /// Deleted-data address mark with a valid CRC.
    Deleted,
    /// Previously bad, restored by a recovery strategy.
    Recovered,
}

impl SectorStatus {
    /// Merge rank. A scan replaces an existing sector record when the
    /// existing status ranks below the new one; equal ranks keep the higher
    /// quality score.
    pub fn rank(&self) -> u8 {
        match self {
            SectorStatus::Unread => 0,
            SectorStatus::Missing => 1,
            SectorStatus::NoAddress => 2,
            SectorStatus::HeaderCrc => 3,
            SectorStatus::Bad => 4,
            SectorStatus::Weak => 5,
            SectorStatus::Deleted => 6,
            SectorStatus::Recovered => 7,
            SectorStatus::Good => 8,
        }
    }

    /// True if this sector still needs recovery attention.
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            SectorStatus::Unread
                | SectorStatus::Bad
                | SectorStatus::Missing
                | SectorStatus::NoAddress
                | SectorStatus::HeaderCrc
        )
    }

    /// True if the sector carries a CRC-valid payload.
    pub fn is_readable(&self) -> bool {
        matches!(
            self,
            SectorStatus::Good | SectorStatus::Weak | SectorStatus::Deleted | SectorStatus::Recovered
        )
    }
}

impl Display for SectorStatus {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SectorStatus::Unread => write!(f, "Unread"),
            SectorStatus::Good => write!(f, "Good"),
            SectorStatus::Weak => write!(f, "Weak"),
            SectorStatus::Bad => write!(f, "Bad"),
            SectorStatus::Missing => write!(f, "Missing"),
            SectorStatus::NoAddress => write!(f, "NoAddress"),
            SectorStatus::HeaderCrc => write!(f, "HeaderCRC"),
            SectorStatus::Deleted => write!(f, "Deleted"),
            SectorStatus::Recovered => write!(f, "Recovered"),
        }
    }
}

/// Which strategy produced a sector's current payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectorProvenance {
    Direct,
    MultiCaptureVote,
    PllTuning,
    BitSlip,
    FormatRefresh,
}

impl Display for SectorProvenance {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            SectorProvenance::Direct => write!(f, "direct"),
            SectorProvenance::MultiCaptureVote => write!(f, "multi_capture_vote"),
            SectorProvenance::PllTuning => write!(f, "pll_tuning"),
            SectorProvenance::BitSlip => write!(f, "bit_slip"),
            SectorProvenance::FormatRefresh => write!(f, "format_refresh"),
        }
    }
}

/// Tri-state integrity check result for a header or data CRC field.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IntegrityCheck {
    #[default]
    Absent,
    Ok,
    Bad,
}

impl IntegrityCheck {
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            IntegrityCheck::Ok
        }
        else {
            IntegrityCheck::Bad
        }
    }
    pub fn is_ok(&self) -> bool {
        matches!(self, IntegrityCheck::Ok)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanMode {
    Quick,
    #[default]
    Standard,
    Thorough,
    Forensic,
}

impl ScanMode {
    /// Revolutions captured per track in this mode.
    pub fn revolutions(&self) -> u8 {
        match self {
            ScanMode::Quick => 1,
            ScanMode::Standard => 2,
            ScanMode::Thorough => 3,
            ScanMode::Forensic => 5,
        }
    }

    /// Forensic scans retain flux for every track for later recovery.
    pub fn retains_flux(&self) -> bool {
        matches!(self, ScanMode::Forensic)
    }
}

impl Display for ScanMode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            ScanMode::Quick => write!(f, "quick"),
            ScanMode::Standard => write!(f, "standard"),
            ScanMode::Thorough => write!(f, "thorough"),
            ScanMode::Forensic => write!(f, "forensic"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryLevel {
    #[default]
    Standard,
    Aggressive,
    Forensic,
}

impl Display for RecoveryLevel {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            RecoveryLevel::Standard => write!(f, "standard"),
            RecoveryLevel::Aggressive => write!(f, "aggressive"),
            RecoveryLevel::Forensic => write!(f, "forensic"),
        }
    }
}

/// Pass scheduling for a recovery job: a fixed number of passes, or run to
/// convergence of the bad-sector count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RecoveryMode {
    Fixed(u32),
    Convergence { max_passes: u32, quiet_passes: u32 },
}

impl Default for RecoveryMode {
    fn default() -> Self {
        RecoveryMode::Convergence {
            max_passes: 50,
            quiet_passes: 3,
        }
    }
}

impl Display for RecoveryMode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            RecoveryMode::Fixed(n) => write!(f, "fixed:{}", n),
            RecoveryMode::Convergence { max_passes, quiet_passes } => {
                write!(f, "convergence(max:{} quiet:{})", max_passes, quiet_passes)
            }
        }
    }
}
