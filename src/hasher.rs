use sha2::{Digest, Sha256};
use std::fmt;

/// Hash section emitted in place of a digest when there is nothing to hash.
pub const EMPTY_HASH: &str = "000000000000";

/// Length of the truncated SHA-256 section in every hashed JA4+ fingerprint.
pub const HASH_LEN: usize = 12;

/// Reusable SHA-256 state owned by one worker.
///
/// The digest is reset after every use, so a single instance serves every
/// fingerprint computed by its owner. Each worker constructs its own instance;
/// it is never shared between threads.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    digest: Sha256,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self { digest: Sha256::new() }
    }

    /// First 12 lowercase hex characters of SHA-256 over `input`.
    ///
    /// An empty input yields [`EMPTY_HASH`] instead of the digest of zero bytes.
    pub fn hash12(&mut self, input: &[u8]) -> String {
        if input.is_empty() {
            return EMPTY_HASH.to_string();
        }
        self.digest.update(input);
        let digest = self.digest.finalize_reset();
        let mut hex = format!("{digest:x}");
        hex.truncate(HASH_LEN);
        hex
    }
}

impl fmt::Debug for FingerprintHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerprintHasher").finish_non_exhaustive()
    }
}
