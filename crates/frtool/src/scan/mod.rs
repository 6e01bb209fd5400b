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
use anyhow::Error;
use bpaf::*;
use std::path::PathBuf;

use fluxrescue::{
    events::{CancelToken, NullEventSink},
    scan::{ScanConfig, ScanOrchestrator},
    GeometryPreset,
    ScanMode,
    SectorTable,
    TrackEncoding,
};

use crate::{
    args::{encoding_parser, geometry_parser, in_file_parser, out_file_parser, scan_mode_parser, GlobalOptions},
    common::{drive_from_scp, exit_code, write_img},
};

#[derive(Clone, Debug)]
pub struct ScanParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub mode: ScanMode,
    pub geometry: GeometryPreset,
    pub encoding: Option<TrackEncoding>,
}

pub fn scan_parser() -> impl Parser<ScanParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let mode = scan_mode_parser();
    let geometry = geometry_parser();
    let encoding = encoding_parser();

    construct!(ScanParams {
        in_file,
        out_file,
        mode,
        geometry,
        encoding,
    })
}

pub fn run(global: &GlobalOptions, params: &ScanParams) -> Result<i32, Error> {
    let geometry = params.geometry.geometry();
    let mut drive = drive_from_scp(&params.in_file, geometry, params.encoding.unwrap_or_default())?;
    let mut table = SectorTable::new(geometry);

    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            mode: params.mode,
            encoding: params.encoding,
            ..ScanConfig::default()
        },
    );

    let result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    if !global.silent {
        let counts = table.counts();
        println!(
            "Scan {}: {} encoding, {}/{} readable [{}]",
            result.outcome,
            result.encoding,
            counts.readable(),
            table.len(),
            counts
        );
        if let Some(reason) = &result.reason {
            println!("Reason: {}", reason);
        }
    }

    write_img(&table, &params.out_file)?;
    Ok(exit_code(result.outcome))
}
