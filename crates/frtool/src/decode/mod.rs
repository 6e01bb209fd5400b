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
    bitstream::BitStream,
    codec::TrackCodec,
    events::{CancelToken, NullEventSink},
    file_parsers::{detect_format, hfe::HfeFormat, ImageFileFormat},
    scan::{ScanConfig, ScanOrchestrator},
    DiskCh,
    GeometryPreset,
    JobOutcome,
    ScanMode,
    SectorTable,
    TrackEncoding,
};

use crate::{
    args::{encoding_parser, geometry_parser, in_file_parser, out_file_parser, GlobalOptions},
    common::{drive_from_scp, exit_code, write_img},
    read_file,
};

#[derive(Clone, Debug)]
pub struct DecodeParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub geometry: GeometryPreset,
    pub encoding: Option<TrackEncoding>,
}

pub fn decode_parser() -> impl Parser<DecodeParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let geometry = geometry_parser();
    let encoding = encoding_parser();

    construct!(DecodeParams {
        in_file,
        out_file,
        geometry,
        encoding,
    })
}

pub fn run(global: &GlobalOptions, params: &DecodeParams) -> Result<i32, Error> {
    let format = detect_format(read_file(&params.in_file)?)
        .ok_or_else(|| anyhow!("unrecognized input format: {}", params.in_file.display()))?;
    let geometry = params.geometry.geometry();
    let mut table = SectorTable::new(geometry);

    match format {
        ImageFileFormat::SuperCardPro => {
            // Flux input: run the full decode pipeline via a mounted drive.
            let mut drive = drive_from_scp(&params.in_file, geometry, params.encoding.unwrap_or_default())?;
            let orchestrator = ScanOrchestrator::new(
                geometry,
                ScanConfig {
                    mode: ScanMode::Standard,
                    encoding: params.encoding,
                    ..ScanConfig::default()
                },
            );
            let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());
            if result.outcome == JobOutcome::Failed {
                return Err(anyhow!(
                    "decode failed: {}",
                    result.reason.unwrap_or_else(|| "unknown".to_string())
                ));
            }
        }
        ImageFileFormat::HxcHfe => {
            // Bitstream input: decode tracks directly, no PLL involved.
            let disk = HfeFormat::load(read_file(&params.in_file)?)?;
            let encoding = params.encoding.unwrap_or(disk.encoding);
            let codec = TrackCodec::new(encoding);
            for (c, (side0, side1)) in disk.tracks.iter().enumerate() {
                if c as u16 >= geometry.cylinders {
                    break;
                }
                for (h, side) in [side0, side1].into_iter().enumerate().take(geometry.heads as usize) {
                    let ch = DiskCh::new(c as u16, h as u8);
                    let bits = BitStream::from(side.as_slice());
                    match codec.decode_track(&bits, &geometry, ch) {
                        Ok(sectors) => {
                            for sector in sectors {
                                table.merge(sector, 0);
                            }
                        }
                        Err(e) => log::warn!("decode: {} failed: {}", ch, e),
                    }
                }
            }
        }
        ImageFileFormat::RawSectorImage => {
            return Err(anyhow!("input is already a sector image"));
        }
    }

    let counts = table.counts();
    if !global.silent {
        println!("Decoded {}/{} readable [{}]", counts.readable(), table.len(), counts);
    }

    write_img(&table, &params.out_file)?;
    let outcome = if counts.outstanding() == 0 {
        JobOutcome::Ok
    }
    else {
        JobOutcome::Partial
    };
    Ok(exit_code(outcome))
}
