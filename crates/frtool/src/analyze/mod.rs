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
    analysis::FluxAnalyzer,
    events::{CancelToken, NullEventSink},
    file_parsers::scp::{ScpDisk, ScpFormat},
    quality::DiskReport,
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
    common::{drive_from_scp, exit_code},
    read_file,
};

#[derive(Clone, Debug)]
pub struct AnalyzeParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub geometry: GeometryPreset,
    pub encoding: Option<TrackEncoding>,
}

pub fn analyze_parser() -> impl Parser<AnalyzeParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let geometry = geometry_parser();
    let encoding = encoding_parser();

    construct!(AnalyzeParams {
        in_file,
        out_file,
        geometry,
        encoding,
    })
}

pub fn run(global: &GlobalOptions, params: &AnalyzeParams) -> Result<i32, Error> {
    let geometry = params.geometry.geometry();
    let disk = ScpFormat::load(read_file(&params.in_file)?)?;
    let analyzer = FluxAnalyzer::default();
    let double_sided = geometry.heads == 2;

    // Per-track signal scores straight from the flux.
    let mut track_scores = Vec::new();
    for c in 0..geometry.cylinders {
        for h in 0..geometry.heads {
            let ch = DiskCh::new(c, h);
            if let Some(capture) = disk.track(ScpDisk::track_index(ch, double_sided)) {
                track_scores.push(analyzer.analyze_capture(capture).quality);
            }
        }
    }

    // Sector statuses from a standard decode of the same flux.
    let mut drive = drive_from_scp(&params.in_file, geometry, params.encoding.unwrap_or_default())?;
    let mut table = SectorTable::new(geometry);
    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            mode: ScanMode::Standard,
            encoding: params.encoding,
            ..ScanConfig::default()
        },
    );
    orchestrator.run(&mut drive, &mut table, &NullEventSink, &CancelToken::new());

    let report = DiskReport::build(&table, track_scores);
    let file = std::fs::File::create(&params.out_file)?;
    serde_json::to_writer_pretty(file, &report)?;

    if !global.silent {
        println!(
            "Analyzed {} tracks: score {} (grade {})",
            report.track_scores.len(),
            report.overall_score,
            report.overall_grade
        );
    }
    Ok(exit_code(JobOutcome::Ok))
}
