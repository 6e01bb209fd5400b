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

    src/random.rs

    Deterministic pseudo-random sources. The simulator's jitter injection and
    the synthetic-noise tests must be reproducible run to run, so no external
    RNG is used anywhere in the engine.
*/

#![allow(dead_code)]

const RANDOM_BITS_SIZE: usize = 2048;

const PSEUDO_RANDOM_BITS: [bool; RANDOM_BITS_SIZE] = generate_pseudo_random_bits(0x57A857FA, RANDOM_BITS_SIZE);

const fn pseudo_random_bit(seed: u32, index: usize) -> bool {
    // A simple pseudo-random function using bit shifts and XOR
    let mut value = seed ^ (index as u32);
    value = value.wrapping_mul(0x45d9f3b);
    value ^= value >> 16;
    (value & 1) != 0
}

const fn generate_pseudo_random_bits(seed: u32, len: usize) -> [bool; RANDOM_BITS_SIZE] {
    let mut bits = [false; RANDOM_BITS_SIZE];
    let mut i = 0;
    while i < len {
        bits[i] = pseudo_random_bit(seed, i);
        i += 1;
    }
    bits
}

pub fn random_bit(index: usize) -> bool {
    PSEUDO_RANDOM_BITS[index & (RANDOM_BITS_SIZE - 1)]
}

/// A small seedable xorshift generator for reproducible noise streams.
#[derive(Clone, Debug)]
pub struct XorShift {
    state: u64,
}

impl XorShift {
    pub fn new(seed: u64) -> Self {
        // A zero state would lock the generator at zero forever.
        XorShift {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform float in [0, 1).
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Standard normal deviate via Box-Muller.
    pub fn next_gaussian(&mut self) -> f64 {
        let mut u1 = self.next_f64();
        if u1 < 1e-12 {
            u1 = 1e-12;
        }
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xorshift_deterministic() {
        let mut a = XorShift::new(12345);
        let mut b = XorShift::new(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = XorShift::new(7);
        let n = 50_000;
        let samples: Vec<f64> = (0..n).map(|_| rng.next_gaussian()).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.02, "mean drifted: {}", mean);
        assert!((var - 1.0).abs() < 0.05, "variance drifted: {}", var);
    }
}
