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

    src/file_parsers/hfe.rs

    The HFE v1 bitstream image format (HxC floppy emulator). Track data
    alternates 256-byte side-0 and side-1 blocks inside 512-byte sectors;
    bit order within each byte is LSB first. Bitstreams round-trip exactly.
*/
use crate::{io::ReadSeek, ImageError, TrackEncoding};
use binrw::{binrw, BinRead, BinWrite};
use std::io::{Cursor, Seek, SeekFrom, Write};

pub const HFE_BLOCK_LEN: usize = 512;
pub const HFE_SIDE_CHUNK: usize = 256;

pub const HFE_ENCODING_FM: u8 = 0x00;
pub const HFE_ENCODING_MFM: u8 = 0x02;
pub const HFE_ENCODING_AMIGA_MFM: u8 = 0x04;

const fn reverse_bits(mut byte: u8) -> u8 {
    byte = (byte >> 4) | (byte << 4);
    byte = ((byte & 0x33) << 2) | ((byte & 0xCC) >> 2);
    byte = ((byte & 0x55) << 1) | ((byte & 0xAA) >> 1);
    byte
}

const fn generate_reverse_table() -> [u8; 256] {
    let mut table = [0; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = reverse_bits(i as u8);
        i += 1;
    }
    table
}

const REVERSE_TABLE: [u8; 256] = generate_reverse_table();

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct HfeFileHeader {
    signature: [u8; 8],
    format_revision: u8,
    number_of_tracks: u8,
    number_of_sides: u8,
    track_encoding: u8,
    bit_rate: u16,
    rpm: u16,
    interface_mode: u8,
    unused: u8,
    track_list_offset: u16,
    write_allowed: u8,
    single_step: u8,
    track0s0_altencoding: u8,
    track0s0_encoding: u8,
    track0s1_altencoding: u8,
    track0s1_encoding: u8,
}

#[derive(Debug)]
#[binrw]
#[brw(little)]
struct HfeTrackIndexEntry {
    offset: u16,
    len: u16,
}

fn encoding_code(encoding: TrackEncoding) -> Result<u8, ImageError> {
    match encoding {
        TrackEncoding::Mfm => Ok(HFE_ENCODING_MFM),
        TrackEncoding::Fm => Ok(HFE_ENCODING_FM),
        TrackEncoding::AmigaMfm => Ok(HFE_ENCODING_AMIGA_MFM),
        TrackEncoding::Gcr => Err(ImageError::ParameterError("GCR cannot be written to HFE".to_string())),
    }
}

fn encoding_from_code(code: u8) -> Option<TrackEncoding> {
    match code {
        HFE_ENCODING_MFM => Some(TrackEncoding::Mfm),
        HFE_ENCODING_FM => Some(TrackEncoding::Fm),
        HFE_ENCODING_AMIGA_MFM => Some(TrackEncoding::AmigaMfm),
        _ => None,
    }
}

/// A loaded or to-be-written HFE image: per-cylinder raw track bytes for
/// each side, in engine bit order (MSB first).
pub struct HfeDisk {
    pub encoding: TrackEncoding,
    pub bit_rate_kbps: u16,
    pub rpm: u16,
    pub sides: u8,
    pub tracks: Vec<(Vec<u8>, Vec<u8>)>,
}

impl HfeDisk {
    pub fn new(encoding: TrackEncoding, bit_rate_kbps: u16, rpm: u16, sides: u8) -> Self {
        HfeDisk {
            encoding,
            bit_rate_kbps,
            rpm,
            sides,
            tracks: Vec::new(),
        }
    }

    pub fn cylinders(&self) -> usize {
        self.tracks.len()
    }
}

pub struct HfeFormat;

impl HfeFormat {
    pub fn extensions() -> Vec<&'static str> {
        vec!["hfe"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        if image.seek(SeekFrom::Start(0)).is_err() {
            return false;
        }
        match HfeFileHeader::read(&mut image) {
            Ok(header) => header.signature == *b"HXCPICFE",
            Err(_) => false,
        }
    }

    pub fn load<RWS: ReadSeek>(mut image: RWS) -> Result<HfeDisk, ImageError> {
        let image_len = image.seek(SeekFrom::End(0)).map_err(|_| ImageError::IoError)?;
        image.seek(SeekFrom::Start(0)).map_err(|_| ImageError::IoError)?;

        let header = HfeFileHeader::read(&mut image).map_err(|_| ImageError::IoError)?;
        if header.signature != *b"HXCPICFE" {
            return Err(ImageError::UnknownFormat);
        }
        let encoding = encoding_from_code(header.track_encoding).ok_or_else(|| {
            ImageError::FormatParseError(format!("unknown track encoding {:02X}", header.track_encoding))
        })?;
        log::trace!(
            "HfeFormat::load(): {} tracks, {} sides, {} @ {}Kbps",
            header.number_of_tracks,
            header.number_of_sides,
            encoding,
            header.bit_rate
        );

        let lut_offset = header.track_list_offset as u64 * HFE_BLOCK_LEN as u64;
        image.seek(SeekFrom::Start(lut_offset)).map_err(|_| ImageError::IoError)?;

        let mut index = Vec::with_capacity(header.number_of_tracks as usize);
        for _ in 0..header.number_of_tracks {
            let entry = HfeTrackIndexEntry::read(&mut image).map_err(|_| ImageError::IoError)?;
            if entry.len & 1 != 0 {
                return Err(ImageError::FormatParseError(
                    "odd track length breaks head interleave".to_string(),
                ));
            }
            index.push(entry);
        }

        let mut disk = HfeDisk::new(encoding, header.bit_rate, header.rpm, header.number_of_sides);

        for entry in &index {
            let data_offset = entry.offset as u64 * HFE_BLOCK_LEN as u64;
            if data_offset + entry.len as u64 > image_len + HFE_BLOCK_LEN as u64 {
                return Err(ImageError::FormatParseError("track data out of bounds".to_string()));
            }
            image.seek(SeekFrom::Start(data_offset)).map_err(|_| ImageError::IoError)?;

            let side_len = entry.len as usize / 2;
            let mut side0 = Vec::with_capacity(side_len);
            let mut side1 = Vec::with_capacity(side_len);
            let mut remaining = entry.len as usize;

            while remaining > 0 {
                let chunk = (remaining / 2).min(HFE_SIDE_CHUNK);
                for side in [&mut side0, &mut side1] {
                    let mut buffer = vec![0u8; chunk];
                    image.read_exact(&mut buffer).map_err(|_| ImageError::IoError)?;
                    for byte in buffer.iter_mut() {
                        *byte = REVERSE_TABLE[*byte as usize];
                    }
                    side.extend_from_slice(&buffer);
                    remaining -= chunk;
                }
            }

            disk.tracks.push((side0, side1));
        }

        Ok(disk)
    }

    pub fn save<W: Write>(disk: &HfeDisk, output: &mut W) -> Result<(), ImageError> {
        if disk.tracks.is_empty() {
            return Err(ImageError::ParameterError("no tracks to write".to_string()));
        }

        let header = HfeFileHeader {
            signature: *b"HXCPICFE",
            format_revision: 0,
            number_of_tracks: disk.tracks.len() as u8,
            number_of_sides: disk.sides,
            track_encoding: encoding_code(disk.encoding)?,
            bit_rate: disk.bit_rate_kbps,
            rpm: disk.rpm,
            interface_mode: 0x07,
            unused: 0,
            track_list_offset: 1,
            write_allowed: 0xFF,
            single_step: 0xFF,
            track0s0_altencoding: 0xFF,
            track0s0_encoding: 0xFF,
            track0s1_altencoding: 0xFF,
            track0s1_encoding: 0xFF,
        };

        // Block 0: header, padded.
        let mut header_block = Cursor::new(Vec::new());
        header.write(&mut header_block).map_err(|_| ImageError::IoError)?;
        let mut header_block = header_block.into_inner();
        header_block.resize(HFE_BLOCK_LEN, 0xFF);

        // Block 1: the track LUT. Track data follows, one entry per
        // cylinder, block aligned.
        let lut_blocks = (disk.tracks.len() * 4).div_ceil(HFE_BLOCK_LEN);
        let mut next_block = 1 + lut_blocks;
        let mut lut = Cursor::new(Vec::new());
        let mut data: Vec<u8> = Vec::new();

        for (side0, side1) in &disk.tracks {
            let side_len = side0.len().max(side1.len());
            let len = side_len * 2;
            let entry = HfeTrackIndexEntry {
                offset: next_block as u16,
                len: len as u16,
            };
            entry.write(&mut lut).map_err(|_| ImageError::IoError)?;

            // Interleave 256-byte chunks per side, LSB-first on the wire.
            let mut track_bytes: Vec<u8> = Vec::new();
            let mut cursor = 0usize;
            while cursor < side_len {
                let chunk = (side_len - cursor).min(HFE_SIDE_CHUNK);
                for side in [side0, side1] {
                    let mut buffer = vec![0u8; chunk];
                    let available = side.len().saturating_sub(cursor).min(chunk);
                    buffer[..available].copy_from_slice(&side[cursor..cursor + available]);
                    for byte in buffer.iter_mut() {
                        *byte = REVERSE_TABLE[*byte as usize];
                    }
                    track_bytes.extend_from_slice(&buffer);
                }
                cursor += chunk;
            }

            // Pad the track out to whole 512-byte blocks.
            let padded = track_bytes.len().div_ceil(HFE_BLOCK_LEN) * HFE_BLOCK_LEN;
            track_bytes.resize(padded, 0xFF);
            next_block += padded / HFE_BLOCK_LEN;
            data.extend_from_slice(&track_bytes);
        }

        let mut lut_bytes = lut.into_inner();
        lut_bytes.resize(lut_blocks * HFE_BLOCK_LEN, 0xFF);

        output.write_all(&header_block).map_err(|_| ImageError::IoError)?;
        output.write_all(&lut_bytes).map_err(|_| ImageError::IoError)?;
        output.write_all(&data).map_err(|_| ImageError::IoError)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_reverse_bits(byte: u8) -> u8 {
        let mut reversed = 0;
        for i in 0..8 {
            reversed |= ((byte >> i) & 1) << (7 - i);
        }
        reversed
    }

    #[test]
    fn test_generate_reverse_table() {
        let table = generate_reverse_table();
        for i in 0..256 {
            assert_eq!(table[i], simple_reverse_bits(i as u8), "failed at index {}", i);
        }
    }

    #[test]
    fn test_round_trip() {
        let mut disk = HfeDisk::new(TrackEncoding::Mfm, 250, 300, 2);
        for c in 0..4u8 {
            let side0: Vec<u8> = (0..6250).map(|i| (i as u8).wrapping_mul(c + 1)).collect();
            let side1: Vec<u8> = (0..6250).map(|i| (i as u8) ^ 0x5A).collect();
            disk.tracks.push((side0, side1));
        }

        let mut buffer = Vec::new();
        HfeFormat::save(&disk, &mut buffer).unwrap();
        let reloaded = HfeFormat::load(Cursor::new(buffer)).unwrap();

        assert_eq!(reloaded.encoding, TrackEncoding::Mfm);
        assert_eq!(reloaded.cylinders(), 4);
        for (a, b) in disk.tracks.iter().zip(reloaded.tracks.iter()) {
            assert_eq!(a.0, b.0);
            assert_eq!(a.1, b.1);
        }
    }
}
