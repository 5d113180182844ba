//! Deterministic data generators for integration tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded random data generator; the same seed reproduces the same bytes.
pub struct TestDataGenerator {
    rng: StdRng,
}

impl TestDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// `len` random bytes.
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }
}

/// Read `stream` to end-of-stream, returning everything it produced.
pub async fn read_to_end(stream: &mut tierfs::stream::InputStream) -> tierfs::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = vec![0u8; 8192];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(out);
        }
        out.extend_from_slice(&chunk[..n]);
    }
}
