//! Adler-32 running checksum for the read phase.
//!
//! The read phase folds every byte of the buffer into an Adler-32 state that
//! is carried across loop iterations, never reset mid-run. The fold is
//! order-dependent and deterministic for a fixed content sequence, and it
//! forces the read pass to visit the entire buffer rather than sample it.

const MOD_ADLER: u32 = 65_521;

/// Largest chunk length for which the deferred modulo cannot overflow u32:
/// 255 * n * (n + 1) / 2 + (n + 1) * (MOD_ADLER - 1) < 2^32 holds for n = 5552.
const NMAX: usize = 5552;

/// Incremental Adler-32 state.
///
/// `Adler32::new()` starts from the standard seed (1). A previous checksum
/// value can be resumed with [`Adler32::from_value`], matching zlib's
/// `adler32(prev, data)` continuation semantics; resuming from 0 reproduces
/// a fold whose carried value was zero-initialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Fresh checksum state (value 1, the Adler-32 seed).
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Resume from a previously returned checksum value.
    pub fn from_value(value: u32) -> Self {
        Self {
            a: value & 0xFFFF,
            b: value >> 16,
        }
    }

    /// Fold `data` into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                self.a += u32::from(byte);
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    /// Current checksum value.
    pub fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}
