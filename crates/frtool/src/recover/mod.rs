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
    recovery::{RecoveryController, RecoveryProfile},
    scan::{ScanConfig, ScanOrchestrator},
    GeometryPreset,
    RecoveryLevel,
    RecoveryMode,
    ScanMode,
    SectorTable,
    TrackEncoding,
};

use crate::{
    args::{
        encoding_parser,
        geometry_parser,
        in_file_parser,
        out_file_parser,
        recovery_level_parser,
        recovery_mode_parser,
        GlobalOptions,
    },
    common::{drive_from_scp, exit_code, write_img},
};

#[derive(Clone, Debug)]
pub struct RecoverParams {
    pub in_file: PathBuf,
    pub out_file: PathBuf,
    pub level: RecoveryLevel,
    pub mode: RecoveryMode,
    pub geometry: GeometryPreset,
    pub encoding: Option<TrackEncoding>,
}

pub fn recover_parser() -> impl Parser<RecoverParams> {
    let in_file = in_file_parser();
    let out_file = out_file_parser();
    let level = recovery_level_parser();
    let mode = recovery_mode_parser();
    let geometry = geometry_parser();
    let encoding = encoding_parser();

    construct!(RecoverParams {
        in_file,
        out_file,
        level,
        mode,
        geometry,
        encoding,
    })
}

pub fn run(global: &GlobalOptions, params: &RecoverParams) -> Result<i32, Error> {
    let geometry = params.geometry.geometry();
    let mut drive = drive_from_scp(&params.in_file, geometry, params.encoding.unwrap_or_default())?;
    let mut table = SectorTable::new(geometry);

    // Baseline scan to find the bad addresses.
    let orchestrator = ScanOrchestrator::new(
        geometry,
        ScanConfig {
            mode: ScanMode::Standard,
            encoding: params.encoding,
            ..ScanConfig::default()
        },
    );
    let cancel = CancelToken::new();
    let scan_result = orchestrator.run(&mut drive, &mut table, &NullEventSink, &cancel);
    if !global.silent {
        println!(
            "Baseline scan {}: {} bad of {}",
            scan_result.outcome,
            table.counts().outstanding(),
            table.len()
        );
    }

    let mut profile = RecoveryProfile::for_level(params.level);
    profile.mode = params.mode;
    let controller = RecoveryController::new(geometry, scan_result.encoding, profile);
    let result = controller.run(&mut drive, &mut table, None, &NullEventSink, &cancel);

    if !global.silent {
        println!(
            "Recovery {}: {} of {} recovered over {} passes{}",
            result.outcome,
            result.stats.recovered,
            result.stats.initial_bad,
            result.stats.passes_executed,
            if result.stats.converged { " (converged)" } else { "" }
        );
        if let Some(reason) = &result.reason {
            println!("Reason: {}", reason);
        }
    }

    write_img(&table, &params.out_file)?;
    Ok(exit_code(result.outcome))
}
