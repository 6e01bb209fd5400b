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
use crate::io::{Seek, SeekFrom};

/// CRC16 as used by the IBM 3740 floppy controller family: polynomial 0x1021,
/// initial value 0xFFFF, MSB first, no final XOR.
///
/// Pass a previous CRC as `initial` to continue a running computation over a
/// split buffer (the marker bytes and the payload are often hashed
/// separately).
pub fn crc_ibm_3740(data: &[u8], initial: Option<u16>) -> u16 {
    const POLY: u16 = 0x1021;
    let mut crc = initial.unwrap_or(0xFFFF);
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ POLY;
            }
            else {
                crc <<= 1;
            }
        }
    }
    crc
}

pub(crate) fn get_length<T: Seek>(source: &mut T) -> Result<u64, crate::io::Error> {
    let length = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    Ok(length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc_check_value() {
        // The standard CRC-CCITT (FALSE) check value for "123456789".
        assert_eq!(crc_ibm_3740(b"123456789", None), 0x29B1);
    }

    #[test]
    fn test_crc_split_continuation() {
        let whole = crc_ibm_3740(b"123456789", None);
        let first = crc_ibm_3740(b"12345", None);
        let split = crc_ibm_3740(b"6789", Some(first));
        assert_eq!(whole, split);
    }
}
