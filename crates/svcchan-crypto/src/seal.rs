//! ECIES sealing for endpoint messages: encrypt a payload to a counter-party's public key, then the
//! caller signs the resulting ciphertext separately with [`crate::sign`]. Format: `[ephemeral
//! public key: 65B][nonce: 12B][ciphertext + tag]`. The shared secret is the x-coordinate of an
//! ECDH agreement between an ephemeral secp256k1 key and the recipient's static key, passed through
//! Keccak-256 to derive the AEAD key — the same primitives already used elsewhere in this crate (no
//! separate KDF/cipher dependency introduced).

use dcrypt::algorithms::aead::chacha20poly1305::ChaCha20Poly1305;
use dcrypt::algorithms::types::Nonce;
use dcrypt::api::traits::symmetric::{DecryptOperation, EncryptOperation, SymmetricCipher};
use ethers::core::k256::ecdsa::SigningKey;
use ethers::core::k256::elliptic_curve::sec1::ToEncodedPoint;
use ethers::core::k256::{NonZeroScalar, ProjectivePoint, PublicKey};
use rand::{rngs::OsRng, RngCore};

use svcchan_types::model::PublicKey65;

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;

/// Encrypts `plaintext` so that only the holder of `recipient`'s private
/// key can recover it.
pub fn seal(recipient: &PublicKey65, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_key = public_key_from_bytes(recipient)?;

    let ephemeral = SigningKey::random(&mut OsRng);
    let ephemeral_public = ephemeral.verifying_key().to_encoded_point(false);

    let aead_key = crate::hash::keccak256(&shared_x(ephemeral.as_nonzero_scalar(), &recipient_key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let cipher = ChaCha20Poly1305::new(&aead_key.0);
    let nonce = Nonce::new(nonce_bytes);
    let ciphertext = SymmetricCipher::encrypt(&cipher)
        .with_nonce(&nonce)
        .encrypt(plaintext)
        .map_err(|e| CryptoError::OperationFailed(format!("seal encryption failed: {e}")))?;

    let mut out = Vec::with_capacity(65 + NONCE_LEN + ciphertext.as_ref().len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(ciphertext.as_ref());
    Ok(out)
}

/// Recovers the plaintext sealed by [`seal`], given the recipient's raw
/// private key.
pub fn open(private_key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < 65 + NONCE_LEN {
        return Err(CryptoError::InvalidInput("sealed message too short".into()));
    }
    let ephemeral_public = public_key_from_bytes(&PublicKey65::from_slice(&sealed[..65]).map_err(|e| {
        CryptoError::InvalidInput(format!("bad ephemeral public key: {e}"))
    })?)?;
    let nonce_bytes: [u8; NONCE_LEN] = sealed[65..65 + NONCE_LEN]
        .try_into()
        .expect("slice is exactly NONCE_LEN");
    let ciphertext_bytes = &sealed[65 + NONCE_LEN..];

    let scalar = NonZeroScalar::try_from(private_key.as_slice())
        .map_err(|_| CryptoError::InvalidInput("invalid private key scalar".into()))?;
    let aead_key = crate::hash::keccak256(&shared_x(&scalar, &ephemeral_public));

    let cipher = ChaCha20Poly1305::new(&aead_key.0);
    let nonce = Nonce::new(nonce_bytes);
    let ciphertext_obj = dcrypt::api::types::Ciphertext::new(ciphertext_bytes.to_vec());
    let plaintext = SymmetricCipher::decrypt(&cipher)
        .with_nonce(&nonce)
        .decrypt(&ciphertext_obj)
        .map_err(|_| CryptoError::DecryptionFailed)?;
    Ok(plaintext)
}

fn public_key_from_bytes(key: &PublicKey65) -> Result<PublicKey, CryptoError> {
    PublicKey::from_sec1_bytes(&key.0).map_err(|e| CryptoError::InvalidInput(format!("bad public key: {e}")))
}

/// The x-coordinate of `scalar * peer`, the ECDH shared point, via plain
/// curve-point scalar multiplication (no separate `ecdh` cargo feature).
fn shared_x(scalar: &NonZeroScalar, peer: &PublicKey) -> [u8; 32] {
    let point = (ProjectivePoint::from(*peer.as_affine()) * scalar.as_ref()).to_affine();
    let encoded = point.to_encoded_point(false);
    let mut out = [0u8; 32];
    out.copy_from_slice(encoded.x().expect("non-identity point has an x-coordinate"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::core::k256::ecdsa::SigningKey;

    fn sample_keypair() -> ([u8; 32], PublicKey65) {
        let signing_key = SigningKey::random(&mut OsRng);
        let mut private = [0u8; 32];
        private.copy_from_slice(&signing_key.to_bytes());
        let public = signing_key.verifying_key().to_encoded_point(false);
        (private, PublicKey65::from_slice(public.as_bytes()).unwrap())
    }

    #[test]
    fn seal_and_open_round_trips() {
        let (private, public) = sample_keypair();
        let sealed = seal(&public, b"endpoint credential payload").unwrap();
        let opened = open(&private, &sealed).unwrap();
        assert_eq!(opened, b"endpoint credential payload");
    }

    #[test]
    fn open_with_wrong_key_fails() {
        let (_, public) = sample_keypair();
        let (other_private, _) = sample_keypair();
        let sealed = seal(&public, b"secret").unwrap();
        assert!(open(&other_private, &sealed).is_err());
    }
}
