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

//! The `chs` module defines structures for working with Cylinder-Head-Sector
//! addressing and sector IDs.

use crate::MAXIMUM_SECTOR_SIZE;
use std::fmt::Display;

/// A physical track address: cylinder and head.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskCh {
    c: u16,
    h: u8,
}

impl DiskCh {
    pub fn new(c: u16, h: u8) -> Self {
        DiskCh { c, h }
    }
    pub fn c(&self) -> u16 {
        self.c
    }
    pub fn h(&self) -> u8 {
        self.h
    }
}

impl From<(u16, u8)> for DiskCh {
    fn from((c, h): (u16, u8)) -> Self {
        DiskCh { c, h }
    }
}

impl Display for DiskCh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{}]", self.c, self.h)
    }
}

/// A sector address: cylinder, head and 1-based sector ID.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskChs {
    ch: DiskCh,
    s:  u8,
}

impl DiskChs {
    pub fn new(c: u16, h: u8, s: u8) -> Self {
        DiskChs {
            ch: DiskCh::new(c, h),
            s,
        }
    }
    pub fn ch(&self) -> DiskCh {
        self.ch
    }
    pub fn c(&self) -> u16 {
        self.ch.c()
    }
    pub fn h(&self) -> u8 {
        self.ch.h()
    }
    pub fn s(&self) -> u8 {
        self.s
    }
}

impl Display for DiskChs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:2}]", self.c(), self.h(), self.s)
    }
}

/// The four components of a sector ID as written in an address field:
/// cylinder, head, sector ID, and size code `n` (`size = 128 << n`).
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskChsn {
    chs: DiskChs,
    n:   u8,
}

impl DiskChsn {
    pub fn new(c: u16, h: u8, s: u8, n: u8) -> Self {
        DiskChsn {
            chs: DiskChs::new(c, h, s),
            n,
        }
    }
    pub fn chs(&self) -> DiskChs {
        self.chs
    }
    pub fn ch(&self) -> DiskCh {
        self.chs.ch()
    }
    pub fn c(&self) -> u16 {
        self.chs.c()
    }
    pub fn h(&self) -> u8 {
        self.chs.h()
    }
    pub fn s(&self) -> u8 {
        self.chs.s()
    }
    pub fn n(&self) -> u8 {
        self.n
    }

    /// The size of the `n` parameter in bytes: `128 << n`, clamped to the
    /// maximum sector size of 8192 bytes.
    pub fn n_size(&self) -> usize {
        std::cmp::min(MAXIMUM_SECTOR_SIZE, 128usize.overflowing_shl(self.n as u32).0)
    }

    /// The size code for a sector size in bytes. Sizes are assumed to be
    /// powers of two in 128..=8192.
    pub fn n_for_size(size: usize) -> u8 {
        let mut n = 0u8;
        let mut s = 128usize;
        while s < size.min(MAXIMUM_SECTOR_SIZE) {
            s <<= 1;
            n += 1;
        }
        n
    }
}

impl Display for DiskChsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:2} n:{}]", self.c(), self.h(), self.s(), self.n)
    }
}
