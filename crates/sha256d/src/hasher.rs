//! SHA-256 capability trait and its `sha2` implementation.

use sha2::Digest as _;

/// A 32-byte SHA-256 output.
pub type Digest = [u8; 32];

/// Incremental SHA-256.
///
/// `Clone` is part of the contract: the header evaluator hashes the first 64 header bytes once,
/// then clones that midstate for every candidate nonce.
pub trait Sha256: Default + Clone + Send {
    /// Absorb `data`.
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the digest.
    fn finalize(self) -> Digest;

    /// One-shot hash of `data`.
    fn digest(data: &[u8]) -> Digest {
        let mut h = Self::default();
        h.update(data);
        h.finalize()
    }
}

/// [`Sha256`] backed by the `sha2` crate.
#[derive(Debug, Default, Clone)]
pub struct Sha2(sha2::Sha256);

impl Sha256 for Sha2 {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self) -> Digest {
        self.0.finalize().into()
    }
}

/// `SHA256(SHA256(data))` with the default backend.
pub fn double_sha256(data: &[u8]) -> Digest {
    Sha2::digest(&Sha2::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_digest() {
        assert_eq!(
            hex::encode(Sha2::digest(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn incremental_equals_one_shot() {
        let mut h = Sha2::default();
        h.update(b"hello ");
        let midstate = h.clone();
        h.update(b"world");

        let mut again = midstate;
        again.update(b"world");

        assert_eq!(h.finalize(), Sha2::digest(b"hello world"));
        assert_eq!(again.finalize(), Sha2::digest(b"hello world"));
    }

    #[test]
    fn double_hash_of_abc() {
        assert_eq!(
            hex::encode(double_sha256(b"abc")),
            "4f8b42c22dd3729b519ba6f68d2da7cc5b2d606d05daed5ad5128cc03e6c6358"
        );
    }
}
