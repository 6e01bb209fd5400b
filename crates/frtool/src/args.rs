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
use bpaf::*;
use std::{path::PathBuf, str::FromStr};

use fluxrescue::{GeometryPreset, RecoveryLevel, RecoveryMode, ScanMode, TrackEncoding};

use crate::{
    analyze::{analyze_parser, AnalyzeParams},
    decode::{decode_parser, DecodeParams},
    encode::{encode_parser, EncodeParams},
    recover::{recover_parser, RecoverParams},
    scan::{scan_parser, ScanParams},
};

#[derive(Clone, Debug)]
pub enum Command {
    Version,
    Scan(ScanParams),
    Recover(RecoverParams),
    Encode(EncodeParams),
    Decode(DecodeParams),
    Analyze(AnalyzeParams),
}

#[derive(Debug)]
pub struct AppParams {
    pub global: GlobalOptions,
    pub command: Command,
}

#[derive(Debug)]
pub struct GlobalOptions {
    pub silent: bool,
}

pub fn global_options_parser() -> impl Parser<GlobalOptions> {
    let silent = long("silent")
        .help("Suppress all output except required output")
        .switch();

    construct!(GlobalOptions { silent })
}

pub(crate) fn in_file_parser() -> impl Parser<PathBuf> {
    long("in")
        .short('i')
        .argument::<PathBuf>("IN_FILE")
        .help("Path to input file")
}

pub(crate) fn out_file_parser() -> impl Parser<PathBuf> {
    long("out")
        .short('o')
        .argument::<PathBuf>("OUT_FILE")
        .help("Path to output file")
}

pub(crate) fn geometry_parser() -> impl Parser<GeometryPreset> {
    long("geometry")
        .short('g')
        .argument::<GeometryPreset>("PRESET")
        .help("Disk geometry preset: 160k|180k|320k|360k|720k|1200k|1440k|2880k")
        .fallback(GeometryPreset::PcFloppy1440)
}

pub(crate) fn scan_mode_parser() -> impl Parser<ScanMode> {
    long("mode")
        .short('m')
        .argument::<String>("MODE")
        .help("Scan mode: quick|standard|thorough|forensic")
        .parse(|s| match s.to_lowercase().as_str() {
            "quick" => Ok(ScanMode::Quick),
            "standard" => Ok(ScanMode::Standard),
            "thorough" => Ok(ScanMode::Thorough),
            "forensic" => Ok(ScanMode::Forensic),
            _ => Err("Invalid mode; expected 'quick', 'standard', 'thorough' or 'forensic'"),
        })
        .fallback(ScanMode::Standard)
}

pub(crate) fn encoding_parser() -> impl Parser<Option<TrackEncoding>> {
    long("encoding")
        .short('e')
        .argument::<String>("ENCODING")
        .help("Track encoding: mfm|fm|amiga (omit to auto-detect)")
        .parse(|s| match s.to_lowercase().as_str() {
            "mfm" => Ok(TrackEncoding::Mfm),
            "fm" => Ok(TrackEncoding::Fm),
            "amiga" => Ok(TrackEncoding::AmigaMfm),
            _ => Err("Invalid encoding; expected 'mfm', 'fm' or 'amiga'"),
        })
        .optional()
}

pub(crate) fn recovery_level_parser() -> impl Parser<RecoveryLevel> {
    long("level")
        .short('l')
        .argument::<String>("LEVEL")
        .help("Recovery level: standard|aggressive|forensic")
        .parse(|s| match s.to_lowercase().as_str() {
            "standard" => Ok(RecoveryLevel::Standard),
            "aggressive" => Ok(RecoveryLevel::Aggressive),
            "forensic" => Ok(RecoveryLevel::Forensic),
            _ => Err("Invalid level; expected 'standard', 'aggressive' or 'forensic'"),
        })
        .fallback(RecoveryLevel::Standard)
}

/// `fixed:N` or `convergence` per the recovery profile.
pub(crate) struct RecoveryModeArg(pub RecoveryMode);

impl FromStr for RecoveryModeArg {
    type Err = &'static str;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let lower = input.to_lowercase();
        if lower == "convergence" {
            return Ok(RecoveryModeArg(RecoveryMode::default()));
        }
        if let Some(n) = lower.strip_prefix("fixed:") {
            let passes: u32 = n.parse().map_err(|_| "Invalid pass count in 'fixed:N'")?;
            return Ok(RecoveryModeArg(RecoveryMode::Fixed(passes)));
        }
        Err("Invalid mode; expected 'fixed:N' or 'convergence'")
    }
}

pub(crate) fn recovery_mode_parser() -> impl Parser<RecoveryMode> {
    long("mode")
        .short('m')
        .argument::<String>("MODE")
        .help("Pass scheduling: fixed:N or convergence")
        .parse(|s| RecoveryModeArg::from_str(&s).map(|m| m.0))
        .fallback(RecoveryMode::default())
}

pub(crate) fn command_parser() -> impl Parser<AppParams> {
    let global = global_options_parser();

    let version = pure(Command::Version)
        .to_options()
        .command("version")
        .help("Display version information and exit");

    let scan = construct!(Command::Scan(scan_parser()))
        .to_options()
        .command("scan")
        .help("Scan a disk (or flux image) into a sector image");
    let recover = construct!(Command::Recover(recover_parser()))
        .to_options()
        .command("recover")
        .help("Run multi-strategy recovery over bad sectors");
    let encode = construct!(Command::Encode(encode_parser()))
        .to_options()
        .command("encode")
        .help("Encode a sector image into a flux or bitstream image");
    let decode = construct!(Command::Decode(decode_parser()))
        .to_options()
        .command("decode")
        .help("Decode a flux or bitstream image into a sector image");
    let analyze = construct!(Command::Analyze(analyze_parser()))
        .to_options()
        .command("analyze")
        .help("Analyze flux signal quality and emit a JSON report");

    let command = construct!([version, scan, recover, encode, decode, analyze]);

    construct!(AppParams { global, command })
}
