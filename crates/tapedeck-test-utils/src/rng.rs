//! Deterministic PRNG for reproducible payloads.

/// Minimal xorshift64 PRNG. A fixed seed gives identical output across runs.
pub struct Xorshift64(u64);

impl Xorshift64 {
    /// A zero seed would stick at zero, so it is remapped.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed })
    }

    pub fn next_u64(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    pub fn fill(&mut self, buf: &mut [u8]) {
        for chunk in buf.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

/// `len` pseudo-random bytes. Position-dependent, so a misplaced range is detectable.
#[must_use]
pub fn payload(len: usize, seed: u64) -> Vec<u8> {
    let mut out = vec![0u8; len];
    Xorshift64::new(seed).fill(&mut out);
    out
}
