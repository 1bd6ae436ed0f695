//! Keccak-256 hashing, used for event signatures, message digests, and
//! balance-proof preimages.

use dcrypt::algorithms::hash::Keccak256;
use svcchan_types::model::Hash32;

/// Computes the Keccak-256 digest of `data`.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let digest = Keccak256::digest(data).expect("keccak256 digest");
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_ref());
    Hash32(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_of_empty_matches_known_digest() {
        let digest = keccak256(b"");
        assert_eq!(
            hex::encode(digest.0),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a47"
        );
    }

    #[test]
    fn keccak256_is_deterministic() {
        assert_eq!(keccak256(b"svcchan"), keccak256(b"svcchan"));
        assert_ne!(keccak256(b"svcchan"), keccak256(b"svcchan2"));
    }
}
