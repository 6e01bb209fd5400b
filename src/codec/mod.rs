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

    src/codec/mod.rs

    Track codec dispatch. Codecs convert between raw-cell bitstreams and
    sector lists. Data-level faults (bad CRCs, missing fields) never abort a
    track; they become per-sector status. Only a revolution with no
    recognizable address mark at all raises `NoAddressMarks`.
*/
use crate::{
    analysis::FluxAnalyzer,
    bitstream::BitStream,
    DecodeError,
    DiskCh,
    DiskGeometry,
    FluxCapture,
    Sector,
    TrackEncoding,
};

pub mod amiga;
pub mod fm;
pub mod mfm;

/// Dispatch over the supported track encodings, in the manner of the image
/// format parser dispatch.
#[derive(Copy, Clone, Debug)]
pub struct TrackCodec {
    encoding: TrackEncoding,
}

impl TrackCodec {
    pub fn new(encoding: TrackEncoding) -> Self {
        TrackCodec { encoding }
    }

    pub fn encoding(&self) -> TrackEncoding {
        self.encoding
    }

    pub fn decode_track(
        &self,
        bits: &BitStream,
        geometry: &DiskGeometry,
        ch: DiskCh,
    ) -> Result<Vec<Sector>, DecodeError> {
        match self.encoding {
            TrackEncoding::Mfm => mfm::decode_track(bits, geometry, ch),
            TrackEncoding::Fm => fm::decode_track(bits, geometry, ch),
            TrackEncoding::AmigaMfm => amiga::decode_track(bits, geometry, ch),
            TrackEncoding::Gcr => Err(DecodeError::UnsupportedEncoding(TrackEncoding::Gcr)),
        }
    }

    pub fn encode_track(
        &self,
        sectors: &[Sector],
        geometry: &DiskGeometry,
        ch: DiskCh,
    ) -> Result<BitStream, DecodeError> {
        match self.encoding {
            TrackEncoding::Mfm => mfm::encode_track(sectors, geometry, ch),
            TrackEncoding::Fm => fm::encode_track(sectors, geometry, ch),
            TrackEncoding::AmigaMfm => amiga::encode_track(sectors, geometry, ch),
            TrackEncoding::Gcr => Err(DecodeError::UnsupportedEncoding(TrackEncoding::Gcr)),
        }
    }
}

/// Guess the encoding of a capture from its timing peaks. Returns the
/// classification and a 0..1 confidence.
pub fn detect(capture: &FluxCapture) -> (Option<TrackEncoding>, f64) {
    let analysis = FluxAnalyzer::default().analyze_capture(capture);
    log::debug!(
        "codec::detect(): {:?} with confidence {:.2}",
        analysis.encoding,
        analysis.encoding_confidence
    );
    (analysis.encoding, analysis.encoding_confidence)
}
