/*
    frtool
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
use anyhow::{anyhow, Error};
use bpaf::*;
use std::path::PathBuf;

use fluxrescue::{
    codec::TrackCodec,
    file_parsers::{
        hfe::{HfeDisk, HfeFormat},
        raw::RawFormat,
        scp::{ScpDisk, ScpFormat},
        ImageFileFormat,
    },
    DiskCh,
    DiskChs,
    FluxCapture,
    Sector,
    TrackEncoding,
};

use crate::{
    args::{encoding_parser, in_file_parser, out_file_parser, GlobalOptions},
    common::exit_code,
    read_file,
};

#[derive(Clone, Debug)]
pub struct EncodeParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub revolutions: u8,
    pub encoding: Option<TrackEncoding>,
}

pub fn encode_parser() -> impl Parser<EncodeParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let revolutions = long("revolutions")
        .short('r')
        .argument::<u8>("N")
        .help("Revolutions of flux to emit per track (SCP output)")
        .guard(|&n| (1..=5).contains(&n), "Revolutions must be 1..=5")
        .fallback(1);
    let encoding = encoding_parser();

    construct!(EncodeParams {
        in_file,
        out_file,
        revolutions,
        encoding,
    })
}

pub fn run(global: &GlobalOptions, params: &EncodeParams) -> Result<i32, Error> {
    let table = RawFormat::load_image(read_file(&params.in_file)?)?;
    let geometry = *table.geometry();
    let encoding = params.encoding.unwrap_or_default();
    let codec = TrackCodec::new(encoding);

    let out_format = params
        .out_file
        .extension()
        .and_then(|e| e.to_str())
        .and_then(ImageFileFormat::from_extension)
        .ok_or_else(|| anyhow!("output extension must be .scp or .hfe"))?;

    // Encode every track once; both containers consume the cells.
    let mut track_bits = Vec::new();
    for c in 0..geometry.cylinders {
        for h in 0..geometry.heads {
            let ch = DiskCh::new(c, h);
            let sectors: Vec<Sector> = (1..=geometry.sectors_per_track)
                .filter_map(|s| table.get_chs(DiskChs::new(c, h, s)).cloned())
                .collect();
            track_bits.push((ch, codec.encode_track(&sectors, &geometry, ch)?));
        }
    }

    match out_format {
        ImageFileFormat::SuperCardPro => {
            let mut disk = ScpDisk::new();
            disk.heads = if geometry.heads == 2 { 0 } else { 1 };
            for (ch, bits) in &track_bits {
                let capture = FluxCapture::synthesize(
                    bits.bits(),
                    geometry.nominal_bit_cell_us() * 1000.0,
                    params.revolutions as usize,
                    None,
                );
                disk.set_track(ScpDisk::track_index(*ch, geometry.heads == 2), capture);
            }
            let mut file = std::fs::File::create(&params.out_file)?;
            ScpFormat::save(&disk, &mut file)?;
        }
        ImageFileFormat::HxcHfe => {
            let mut disk = HfeDisk::new(
                encoding,
                (geometry.data_rate.bps() / 1000) as u16,
                geometry.rpm.rpm() as u16,
                geometry.heads,
            );
            for c in 0..geometry.cylinders as usize {
                let side0 = track_bits[c * geometry.heads as usize].1.to_bytes();
                let side1 = if geometry.heads == 2 {
                    track_bits[c * 2 + 1].1.to_bytes()
                }
                else {
                    vec![0u8; side0.len()]
                };
                disk.tracks.push((side0, side1));
            }
            let mut file = std::fs::File::create(&params.out_file)?;
            HfeFormat::save(&disk, &mut file)?;
        }
        ImageFileFormat::RawSectorImage => {
            return Err(anyhow!("encode writes flux images; use a .scp or .hfe output"));
        }
    }

    if !global.silent {
        println!(
            "Encoded {} tracks of {} as {:?}",
            track_bits.len(),
            encoding,
            out_format
        );
    }
    Ok(exit_code(fluxrescue::JobOutcome::Ok))
}
