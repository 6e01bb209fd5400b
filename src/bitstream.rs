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

    src/bitstream.rs

    A packed raw-cell bit sequence with an optional parallel confidence
    vector, produced by the PLL and consumed by the track codecs.
*/
use bit_vec::BitVec;

#[derive(Clone, Debug, Default)]
pub struct BitStream {
    bits: BitVec,
    confidence: Option<Vec<f32>>,
}

impl BitStream {
    pub fn new(bits: BitVec, confidence: Option<Vec<f32>>) -> Self {
        if let Some(conf) = &confidence {
            debug_assert_eq!(conf.len(), bits.len());
        }
        BitStream { bits, confidence }
    }

    pub fn from_bits(bits: BitVec) -> Self {
        BitStream { bits, confidence: None }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &BitVec {
        &self.bits
    }

    pub fn confidence(&self) -> Option<&[f32]> {
        self.confidence.as_deref()
    }

    #[inline]
    pub fn bit(&self, index: usize) -> bool {
        self.bits[index]
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        self.bits.get(index)
    }

    /// Mean confidence over a half-open cell range. Returns 1.0 when no
    /// confidence vector was captured.
    pub fn mean_confidence(&self, start: usize, end: usize) -> f64 {
        match &self.confidence {
            Some(conf) if start < end && end <= conf.len() => {
                let sum: f64 = conf[start..end].iter().map(|c| *c as f64).sum();
                sum / (end - start) as f64
            }
            _ => 1.0,
        }
    }

    /// Pack the cells into bytes, MSB first. The final partial byte, if any,
    /// is zero-padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits.to_bytes()
    }
}

impl From<&[u8]> for BitStream {
    fn from(bytes: &[u8]) -> Self {
        BitStream::from_bits(BitVec::from_bytes(bytes))
    }
}
