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
*/
use crate::io::ReadSeek;

pub mod hfe;
pub mod raw;
pub mod scp;

/// The on-disk image formats the engine reads and writes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ImageFileFormat {
    /// Raw sector concatenation (IMG/IMA).
    RawSectorImage,
    /// SuperCard Pro flux image.
    SuperCardPro,
    /// HxC HFE v1 bitstream image.
    HxcHfe,
}

impl ImageFileFormat {
    pub fn extensions(&self) -> Vec<&'static str> {
        match self {
            ImageFileFormat::RawSectorImage => vec!["img", "ima"],
            ImageFileFormat::SuperCardPro => vec!["scp"],
            ImageFileFormat::HxcHfe => vec!["hfe"],
        }
    }

    pub fn detect<RWS: ReadSeek>(&self, image: RWS) -> bool {
        match self {
            ImageFileFormat::RawSectorImage => raw::RawFormat::detect(image),
            ImageFileFormat::SuperCardPro => scp::ScpFormat::detect(image),
            ImageFileFormat::HxcHfe => hfe::HfeFormat::detect(image),
        }
    }

    /// Match a format from a file extension.
    pub fn from_extension(ext: &str) -> Option<ImageFileFormat> {
        let ext = ext.to_lowercase();
        [
            ImageFileFormat::RawSectorImage,
            ImageFileFormat::SuperCardPro,
            ImageFileFormat::HxcHfe,
        ]
        .into_iter()
        .find(|f| f.extensions().contains(&ext.as_str()))
    }
}

/// Probe an image stream against every known format.
pub fn detect_format<RWS: ReadSeek>(mut image: RWS) -> Option<ImageFileFormat> {
    // Magic-numbered formats first; raw images match on size alone.
    for format in [
        ImageFileFormat::SuperCardPro,
        ImageFileFormat::HxcHfe,
        ImageFileFormat::RawSectorImage,
    ] {
        if format.detect(&mut image) {
            return Some(format);
        }
    }
    None
}
