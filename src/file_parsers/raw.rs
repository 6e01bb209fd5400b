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

    src/file_parsers/raw.rs

    Raw sector images (IMG/IMA): a concatenation of sector payloads in
    linear address order, no header. Geometry is inferred from the file
    length against the table of standard format sizes.
*/
use crate::{
    io::{ReadSeek, ReadWriteSeek},
    types::enums::IntegrityCheck,
    util::get_length,
    GeometryPreset,
    ImageError,
    SectorStatus,
    SectorTable,
};

/// What to write in place of a sector with no readable payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FillPolicy {
    Zero,
    /// The DOS format filler.
    DosE5,
    Custom(u8),
}

impl FillPolicy {
    pub fn byte(&self) -> u8 {
        match self {
            FillPolicy::Zero => 0x00,
            FillPolicy::DosE5 => 0xE5,
            FillPolicy::Custom(byte) => *byte,
        }
    }
}

pub struct RawFormat;

impl RawFormat {
    pub fn extensions() -> Vec<&'static str> {
        vec!["img", "ima"]
    }

    pub fn detect<RWS: ReadSeek>(mut image: RWS) -> bool {
        let len = get_length(&mut image).map_or(0, |l| l as usize);
        GeometryPreset::from_raw_size(len).is_some()
    }

    /// Read an image into a fully `Good` sector table. An unrecognized
    /// length fails with `UnknownGeometry`; there is no default guess.
    pub fn load_image<RWS: ReadSeek>(mut image: RWS) -> Result<SectorTable, ImageError> {
        let len = get_length(&mut image).map_err(|_| ImageError::IoError)? as usize;
        let preset = GeometryPreset::from_raw_size(len).ok_or(ImageError::UnknownGeometry)?;
        let geometry = preset.geometry();
        log::debug!("RawFormat::load_image(): {} bytes -> {}", len, preset);

        let mut table = SectorTable::new(geometry);
        let mut buffer = vec![0u8; geometry.sector_size];
        for linear in 0..geometry.total_sectors() {
            image.read_exact(&mut buffer).map_err(|_| ImageError::IoError)?;
            table.update(linear, |sector| {
                sector.status = SectorStatus::Good;
                sector.payload = Some(buffer.clone());
                sector.header_crc = IntegrityCheck::Ok;
                sector.data_crc = IntegrityCheck::Ok;
                sector.quality = 1.0;
            });
        }
        Ok(table)
    }

    /// Write the table as a raw image. Every sector must carry a readable
    /// payload unless a fill policy covers the gaps; the output length is
    /// always `total_sectors × sector_size`.
    pub fn save_image<RWS: ReadWriteSeek>(
        table: &SectorTable,
        output: &mut RWS,
        fill: Option<FillPolicy>,
    ) -> Result<(), ImageError> {
        let geometry = table.geometry();
        let fill_buffer = fill.map(|f| vec![f.byte(); geometry.sector_size]);

        for sector in table.iter() {
            let payload = match (&sector.payload, sector.status.is_readable()) {
                (Some(payload), true) if payload.len() == geometry.sector_size => payload,
                _ => match &fill_buffer {
                    Some(buffer) => buffer,
                    None => {
                        log::error!(
                            "RawFormat::save_image(): sector {} has no readable payload and no fill policy",
                            sector.id
                        );
                        return Err(ImageError::MissingSectors);
                    }
                },
            };
            output.write_all(payload).map_err(|_| ImageError::IoError)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{io::Cursor, Sector};

    fn full_table() -> SectorTable {
        let mut table = SectorTable::new(GeometryPreset::PcFloppy360.geometry());
        for linear in 0..table.len() {
            table.update(linear, |s: &mut Sector| {
                s.status = SectorStatus::Good;
                s.payload = Some(vec![(linear % 251) as u8; 512]);
            });
        }
        table
    }

    #[test]
    fn test_size_law_and_round_trip() {
        let table = full_table();
        let mut buffer = Cursor::new(Vec::new());
        RawFormat::save_image(&table, &mut buffer, None).unwrap();
        assert_eq!(buffer.get_ref().len(), table.geometry().total_bytes());

        let reloaded = RawFormat::load_image(Cursor::new(buffer.get_ref().clone())).unwrap();
        for (a, b) in table.iter().zip(reloaded.iter()) {
            assert_eq!(a.payload, b.payload);
        }
    }

    #[test]
    fn test_missing_sectors_require_fill() {
        let mut table = full_table();
        table.update(100, |s| {
            s.status = SectorStatus::Bad;
        });

        let mut buffer = Cursor::new(Vec::new());
        assert!(matches!(
            RawFormat::save_image(&table, &mut buffer, None),
            Err(ImageError::MissingSectors)
        ));

        let mut buffer = Cursor::new(Vec::new());
        RawFormat::save_image(&table, &mut buffer, Some(FillPolicy::DosE5)).unwrap();
        let offset = 100 * 512;
        assert_eq!(buffer.get_ref()[offset], 0xE5);
    }

    #[test]
    fn test_unknown_geometry() {
        let result = RawFormat::load_image(Cursor::new(vec![0u8; 12345]));
        assert!(matches!(result, Err(ImageError::UnknownGeometry)));
    }
}
