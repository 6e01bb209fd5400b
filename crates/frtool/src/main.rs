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

pub mod analyze;
pub mod args;
pub mod common;
pub mod decode;
pub mod encode;
pub mod recover;
pub mod scan;

use anyhow::Error;
use bpaf::Parser;
use std::{io::Cursor, path::Path};

use crate::args::Command;
use args::command_parser;

fn main() {
    env_logger::init();

    let app_params = command_parser().run();

    let command_result: Result<i32, Error> = match &app_params.command {
        Command::Version => {
            println!("frtool v{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::Scan(params) => scan::run(&app_params.global, params),
        Command::Recover(params) => recover::run(&app_params.global, params),
        Command::Encode(params) => encode::run(&app_params.global, params),
        Command::Decode(params) => decode::run(&app_params.global, params),
        Command::Analyze(params) => analyze::run(&app_params.global, params),
    };

    match command_result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Command failed: {}", e);
            for cause in e.chain().skip(1) {
                eprintln!("Caused by: {}", cause);
            }
            std::process::exit(1);
        }
    }
}

pub(crate) fn read_file(path: &Path) -> Result<Cursor<Vec<u8>>, Error> {
    let buffer = std::fs::read(path)?;
    Ok(Cursor::new(buffer))
}
