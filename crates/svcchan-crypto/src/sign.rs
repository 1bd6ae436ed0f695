//! ECDSA signing and public-key recovery over secp256k1, used to sign and
//! verify balance proofs and to recover a counter-party's public key from an on-chain address the
//! first time it is observed.

use crate::error::CryptoError;
use ethers::core::k256::ecdsa::{RecoveryId, Signature as RecoverableSignature, SigningKey, VerifyingKey};
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use svcchan_types::model::{EthAddress, Hash32, PublicKey65};

/// A 65-byte recoverable ECDSA signature: `r || s || v`, where `v` is `0` or `1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub [u8; 65]);

/// Signs a 32-byte digest (the hash of a balance proof or other message)
/// with a raw secp256k1 private key.
pub fn sign_digest(digest: &Hash32, private_key: &[u8; 32]) -> Result<Signature, CryptoError> {
    let signing_key = SigningKey::from_bytes(private_key.into())
        .map_err(|e| CryptoError::InvalidInput(format!("invalid private key: {e}")))?;
    let (sig, recid): (RecoverableSignature, RecoveryId) = signing_key
        .sign_prehash_recoverable(&digest.0)
        .map_err(|e| CryptoError::OperationFailed(format!("ecdsa signing failed: {e}")))?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recid.to_byte();
    Ok(Signature(out))
}

/// Recovers the signer's uncompressed public key from a digest and signature.
pub fn recover_public_key(
    digest: &Hash32,
    signature: &Signature,
) -> Result<PublicKey65, CryptoError> {
    let sig = RecoverableSignature::from_slice(&signature.0[..64])
        .map_err(|_| CryptoError::VerificationFailed)?;
    let recid =
        RecoveryId::from_byte(signature.0[64]).ok_or(CryptoError::VerificationFailed)?;
    let verifying_key = VerifyingKey::recover_from_prehash(&digest.0, &sig, recid)
        .map_err(|_| CryptoError::VerificationFailed)?;
    let encoded = verifying_key.to_encoded_point(false);
    PublicKey65::from_slice(encoded.as_bytes())
        .map_err(|e| CryptoError::InvalidInput(e.to_string()))
}

/// Derives the 20-byte Ethereum-style address from an uncompressed public key:
/// the low 20 bytes of the Keccak-256 hash of the 64 non-prefix key bytes.
pub fn address_from_public_key(public_key: &PublicKey65) -> EthAddress {
    let digest = crate::hash::keccak256(&public_key.0[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&digest.0[12..]);
    EthAddress(addr)
}

/// Verifies that `signature` over `digest` was produced by the holder of
/// `expected`, without needing to recover the key first.
pub fn verify(
    digest: &Hash32,
    signature: &Signature,
    expected: &PublicKey65,
) -> Result<bool, CryptoError> {
    let recovered = recover_public_key(digest, signature)?;
    Ok(&recovered == expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::k256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    fn sample_keypair() -> ([u8; 32], PublicKey65) {
        let signing_key = SigningKey::random(&mut OsRng);
        let private = signing_key.to_bytes();
        let mut priv_bytes = [0u8; 32];
        priv_bytes.copy_from_slice(&private);
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let public = PublicKey65::from_slice(encoded.as_bytes()).unwrap();
        (priv_bytes, public)
    }

    #[test]
    fn sign_and_recover_round_trips() {
        let (private, public) = sample_keypair();
        let digest = crate::hash::keccak256(b"balance proof preimage");
        let sig = sign_digest(&digest, &private).unwrap();
        let recovered = recover_public_key(&digest, &sig).unwrap();
        assert_eq!(recovered, public);
        assert!(verify(&digest, &sig, &public).unwrap());
    }

    #[test]
    fn verify_rejects_wrong_key() {
        let (private, _) = sample_keypair();
        let (_, other_public) = sample_keypair();
        let digest = crate::hash::keccak256(b"balance proof preimage");
        let sig = sign_digest(&digest, &private).unwrap();
        assert!(!verify(&digest, &sig, &other_public).unwrap());
    }

    #[test]
    fn address_from_public_key_is_20_bytes_of_keccak() {
        let (_, public) = sample_keypair();
        let addr = address_from_public_key(&public);
        let digest = crate::hash::keccak256(&public.0[1..]);
        assert_eq!(addr.0, digest.0[12..]);
    }
}
