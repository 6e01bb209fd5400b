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

    src/file_parsers/scp.rs

    The SuperCardPro flux image format. SCP stores per-track, per-revolution
    flux words in 25 ns ticks; the engine's native 72 MHz captures convert
    to and from that resolution exactly when intervals land on whole 25 ns
    multiples. Reads and writes are byte-exact against the published layout.
*/
use crate::{io::ReadSeek, DiskCh, FluxCapture, ImageError, NATIVE_SAMPLE_HZ};
use binrw::{binrw, BinRead, BinWrite};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

pub const SCP_TRACK_COUNT: usize = 168;
pub const SCP_HEADER_LEN: usize = 0x10;
pub const SCP_MAX_REVOLUTIONS: usize = 5;

pub const SCP_FB_INDEX: u8 = 0b0000_0001;
pub const SCP_FB_TPI: u8 = 0b0000_0010;
pub const SCP_FB_RPM: u8 = 0b0000_0100;
pub const SCP_FB_TYPE: u8 = 0b0000_1000;
pub const SCP_FB_READONLY: u8 = 0b0001_0000;
pub const SCP_FB_FOOTER: u8 = 0b0010_0000;
pub const SCP_FB_EXTENDED_MODE: u8 = 0b0100_0000;
pub const SCP_NON_SCP_CAPTURE: u8 = 0b1000_0000;

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct ScpFileHeader {
    pub id: [u8; 3],
    pub version: u8,
    pub disk_type: u8,
    pub revolutions: u8,
    pub start_track: u8,
    pub end_track: u8,
    pub flags: u8,
    pub bit_cell_width: u8,
    pub heads: u8,
    pub resolution: u8,
    pub checksum: u32,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct ScpTrackHeader {
    pub id: [u8; 3],
    pub track_number: u8,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
pub struct ScpTrackRevolution {
    pub index_time: u32,
    pub length: u32,
    pub data_offset: u32,
}

/// Engine ticks (72 MHz) to SCP ticks (25 ns): × 5/9 exactly.
#[inline]
fn to_scp_ticks(engine_ticks: u32) -> u32 {
    ((engine_ticks as f64 * 5.0 / 9.0).round() as u32).max(1)
}

/// SCP ticks back to engine ticks: × 9/5.
#[inline]
fn to_engine_ticks(scp_ticks: u32) -> u32 {
    ((scp_ticks as f64 * 9.0 / 5.0).round() as u32).max(1)
}

/// An SCP image: up to 168 single-sided track slots of captured flux.
pub struct ScpDisk {
    pub disk_type: u8,
    /// Header heads field: 0 = both sides, 1 = side 0 only, 2 = side 1 only.
    pub heads: u8,
    pub revolutions: u8,
    pub tracks: Vec<Option<FluxCapture>>,
}

impl Default for ScpDisk {
    fn default() -> Self {
        ScpDisk {
            disk_type: 0x80,
            heads: 0,
            revolutions: 1,
            tracks: (0..SCP_TRACK_COUNT).map(|_| None).collect(),
        }
    }
}

impl ScpDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// SCP track index for a physical address: `2·c + h` on double-sided
    /// media, `c` otherwise.
    pub fn track_index(ch: DiskCh, double_sided: bool) -> usize {
        if double_sided {
            ch.c() as usize * 2 + ch.h() as usize
        }
        else {
            ch.c() as usize
        }
    }

    pub fn set_track(&mut self, index: usize, capture: FluxCapture) {
        if index < SCP_TRACK_COUNT {
            self.revolutions = self.revolutions.max(capture.revolutions().min(SCP_MAX_REVOLUTIONS) as u8);
            self.tracks[index] = Some(capture);
        }
    }

    pub fn track(&self, index: usize) -> Option<&FluxCapture> {
        self.tracks.get(index).and_then(|t| t.as_ref())
    }

    /// Iterate present tracks as (scp index, capture).
    pub fn iter_tracks(&self) -> impl Iterator<Item = (usize, &FluxCapture)> {
        self.tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|c| (i, c)))
    }
}

/// Encode one revolution's intervals as SCP flux words: a zero word flags
/// an interval of 65536 ticks or more, carried in a following 32-bit
/// extension.
fn encode_flux(ticks: &[u32], out: &mut Vec<u8>) -> u32 {
    let mut index_time = 0u32;
    for tick in ticks {
        let scp = to_scp_ticks(*tick);
        index_time = index_time.wrapping_add(scp);
        if scp >= 0x1_0000 {
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&scp.to_le_bytes());
        }
        else {
            out.extend_from_slice(&(scp as u16).to_le_bytes());
        }
    }
    index_time
}

/// Decode `count` flux transitions starting at `cursor`.
fn decode_flux(data: &[u8], offset: usize, count: usize) -> Result<Vec<u32>, ImageError> {
    let mut ticks = Vec::with_capacity(count);
    let mut pos = offset;
    for _ in 0..count {
        if pos + 2 > data.len() {
            return Err(ImageError::FormatParseError("flux data truncated".to_string()));
        }
        let word = u16::from_le_bytes([data[pos], data[pos + 1]]);
        pos += 2;
        let scp = if word == 0 {
            if pos + 4 > data.len() {
                return Err(ImageError::FormatParseError("flux extension truncated".to_string()));
            }
            let ext = u32::from_le_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
            pos += 4;
            ext
        }
        else {
            word as u32
        };
        ticks.push(to_engine_ticks(scp));
    }
    Ok(ticks)
}

pub struct ScpFormat;

impl ScpFormat {
    pub fn extensions() -> Vec<&'static str> {
        vec!["scp"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        if image.seek(SeekFrom::Start(0)).is_err() {
            return false;
        }
        match ScpFileHeader::read(&mut image) {
            Ok(header) => header.id == *b"SCP",
            Err(_) => false,
        }
    }

    pub fn load<RWS: ReadSeek>(mut image: RWS) -> Result<ScpDisk, ImageError> {
        image.seek(SeekFrom::Start(0)).map_err(|_| ImageError::IoError)?;
        let mut data = Vec::new();
        image.read_to_end(&mut data).map_err(|_| ImageError::IoError)?;

        let mut cursor = Cursor::new(&data);
        let header = ScpFileHeader::read(&mut cursor).map_err(|_| ImageError::IoError)?;
        if header.id != *b"SCP" {
            return Err(ImageError::UnknownFormat);
        }
        log::trace!(
            "ScpFormat::load(): v{}.{}, {} revolutions, tracks {}..{}",
            header.version >> 4,
            header.version & 0x0F,
            header.revolutions,
            header.start_track,
            header.end_track
        );

        if header.bit_cell_width != 0 {
            return Err(ImageError::FormatParseError(format!(
                "unsupported bit cell width {}",
                header.bit_cell_width
            )));
        }
        if header.resolution != 0 {
            return Err(ImageError::FormatParseError(format!(
                "unsupported capture resolution {}",
                header.resolution
            )));
        }
        if header.flags & SCP_FB_EXTENDED_MODE != 0 {
            return Err(ImageError::FormatParseError("extended mode images unsupported".to_string()));
        }

        if header.checksum != 0 {
            let sum = data[SCP_HEADER_LEN..]
                .iter()
                .fold(0u32, |acc, b| acc.wrapping_add(*b as u32));
            if sum != header.checksum {
                log::error!(
                    "ScpFormat::load(): checksum mismatch: stored {:08X}, computed {:08X}",
                    header.checksum,
                    sum
                );
                return Err(ImageError::FormatParseError("checksum mismatch".to_string()));
            }
        }

        let mut disk = ScpDisk {
            disk_type: header.disk_type,
            heads: header.heads,
            revolutions: header.revolutions,
            tracks: (0..SCP_TRACK_COUNT).map(|_| None).collect(),
        };

        let mut offsets = [0u32; SCP_TRACK_COUNT];
        for offset in offsets.iter_mut() {
            *offset = u32::read_le(&mut cursor).map_err(|_| ImageError::IoError)?;
        }

        for (track_no, track_offset) in offsets.iter().enumerate() {
            if *track_offset == 0 {
                continue;
            }
            let mut cursor = Cursor::new(&data);
            cursor
                .seek(SeekFrom::Start(*track_offset as u64))
                .map_err(|_| ImageError::IoError)?;
            let track_header = ScpTrackHeader::read(&mut cursor).map_err(|_| ImageError::IoError)?;
            if track_header.id != *b"TRK" {
                return Err(ImageError::FormatParseError(format!(
                    "bad track header at {:08X}",
                    track_offset
                )));
            }

            let mut revolutions = Vec::with_capacity(header.revolutions as usize);
            for _ in 0..header.revolutions {
                revolutions.push(ScpTrackRevolution::read(&mut cursor).map_err(|_| ImageError::IoError)?);
            }

            let mut ticks: Vec<u32> = Vec::new();
            let mut index_positions = vec![0usize];
            for rev in &revolutions {
                let rev_ticks = decode_flux(
                    &data,
                    *track_offset as usize + rev.data_offset as usize,
                    rev.length as usize,
                )?;
                ticks.extend_from_slice(&rev_ticks);
                index_positions.push(ticks.len());
            }

            let capture = FluxCapture::from_ticks(NATIVE_SAMPLE_HZ, ticks, index_positions)
                .map_err(|e| ImageError::FormatParseError(e.to_string()))?;
            disk.tracks[track_no] = Some(capture);
        }

        Ok(disk)
    }

    pub fn save<W: Write>(disk: &ScpDisk, output: &mut W) -> Result<(), ImageError> {
        let present: Vec<(usize, &FluxCapture)> = disk.iter_tracks().collect();
        if present.is_empty() {
            return Err(ImageError::ParameterError("no tracks to write".to_string()));
        }

        let revolutions = present
            .iter()
            .map(|(_, c)| c.revolutions().min(SCP_MAX_REVOLUTIONS))
            .min()
            .unwrap_or(1)
            .max(1) as u8;

        // Body: the track offset table plus the per-track blocks, built
        // first so the header checksum can cover it.
        let mut offsets = [0u32; SCP_TRACK_COUNT];
        let mut blocks: Vec<u8> = Vec::new();
        let blocks_base = SCP_HEADER_LEN + SCP_TRACK_COUNT * 4;

        for (track_no, capture) in &present {
            offsets[*track_no] = (blocks_base + blocks.len()) as u32;

            let mut flux: Vec<u8> = Vec::new();
            let mut entries: Vec<ScpTrackRevolution> = Vec::new();
            let data_base = 4 + revolutions as usize * 12;

            for rev in 0..revolutions as usize {
                let view = capture
                    .revolution(rev)
                    .map_err(|e| ImageError::ParameterError(e.to_string()))?;
                let data_offset = (data_base + flux.len()) as u32;
                let length = view.len() as u32;
                let index_time = encode_flux(view.ticks(), &mut flux);
                entries.push(ScpTrackRevolution {
                    index_time,
                    length,
                    data_offset,
                });
            }

            let mut block = Cursor::new(Vec::new());
            ScpTrackHeader {
                id: *b"TRK",
                track_number: *track_no as u8,
            }
            .write(&mut block)
            .map_err(|_| ImageError::IoError)?;
            for entry in &entries {
                entry.write(&mut block).map_err(|_| ImageError::IoError)?;
            }
            block.get_mut().extend_from_slice(&flux);
            blocks.extend_from_slice(block.get_ref());
        }

        let mut body: Vec<u8> = Vec::with_capacity(blocks_base - SCP_HEADER_LEN + blocks.len());
        for offset in offsets {
            body.extend_from_slice(&offset.to_le_bytes());
        }
        body.extend_from_slice(&blocks);

        let checksum = body.iter().fold(0u32, |acc, b| acc.wrapping_add(*b as u32));

        let header = ScpFileHeader {
            id: *b"SCP",
            version: 0x22,
            disk_type: disk.disk_type,
            revolutions,
            start_track: present.first().map(|(i, _)| *i as u8).unwrap_or(0),
            end_track: present.last().map(|(i, _)| *i as u8).unwrap_or(0),
            flags: SCP_FB_INDEX | SCP_NON_SCP_CAPTURE,
            bit_cell_width: 0,
            heads: disk.heads,
            resolution: 0,
            checksum,
        };

        let mut header_bytes = Cursor::new(Vec::new());
        header.write(&mut header_bytes).map_err(|_| ImageError::IoError)?;
        output
            .write_all(header_bytes.get_ref())
            .map_err(|_| ImageError::IoError)?;
        output.write_all(&body).map_err(|_| ImageError::IoError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_conversion_exact_on_25ns_multiples() {
        // 288 engine ticks is exactly 4µs = 160 SCP ticks.
        assert_eq!(to_scp_ticks(288), 160);
        assert_eq!(to_engine_ticks(160), 288);
        assert_eq!(to_scp_ticks(432), 240);
        assert_eq!(to_engine_ticks(240), 432);
    }

    #[test]
    fn test_track_index_mapping() {
        assert_eq!(ScpDisk::track_index(DiskCh::new(0, 0), true), 0);
        assert_eq!(ScpDisk::track_index(DiskCh::new(0, 1), true), 1);
        assert_eq!(ScpDisk::track_index(DiskCh::new(40, 1), true), 81);
        assert_eq!(ScpDisk::track_index(DiskCh::new(40, 0), false), 40);
    }
}
