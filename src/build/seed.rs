//! Obfuscation seeds.

use rand::rngs::OsRng;
use rand::RngCore;

/// Seed length in bytes before hex encoding.
pub const SEED_BYTES: usize = 32;

/// Fresh seed from the OS CSPRNG, hex encoded (64 characters).
pub fn generate_seed() -> String {
    let mut seed = [0u8; SEED_BYTES];
    OsRng.fill_bytes(&mut seed);
    hex::encode(seed)
}
