//! Encryption at rest for account private keys. Format V1: [ Magic: "SVCC-KEY" (8) ] [ Version: u16
//! (2) ] [ KDF Algo: u8 (1) ] [ KDF Mem KiB: u32 (4) ] [ KDF Iters: u32 (4) ] [ KDF Lanes: u8 (1) ]
//! [ Salt: 16B ] [ AEAD Algo: u8 (1) ] [ Nonce: 12B ] [ Ciphertext + Tag: N + 16 ]

use crate::error::CryptoError;
use dcrypt::algorithms::aead::chacha20poly1305::ChaCha20Poly1305;
use dcrypt::algorithms::kdf::{Argon2, KdfOperation, KeyDerivationFunction};
use dcrypt::algorithms::types::Nonce;
use dcrypt::api::traits::symmetric::{DecryptOperation, EncryptOperation, SymmetricCipher};
use rand::{rngs::OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

const HEADER_MAGIC: &[u8; 8] = b"SVCC-KEY";
const HEADER_VERSION: u16 = 1;
const HEADER_LEN: usize = 8 + 2 + 1 + 4 + 4 + 1 + 16 + 1 + 12;

const KDF_ALGO_ARGON2ID: u8 = 1;
const KDF_MEM_KIB: u32 = 64 * 1024;
const KDF_ITERS: u32 = 3;
const KDF_LANES: u8 = 4;
const SALT_LEN: usize = 16;
const AEAD_ALGO_CHACHA20POLY1305: u8 = 1;
const NONCE_LEN: usize = 12;
const KEK_LEN: usize = 32;
const KDF_INFO: &[u8] = b"svcchan-account-key-wrapping";

/// Decrypted key material that is zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(pub Vec<u8>);

/// Encrypts a raw private key using a passphrase, producing the V1
/// on-disk/on-row blob stored in `Account.private_key_encrypted`.
pub fn encrypt_key(secret: &[u8], passphrase: &str) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce_bytes);

    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(HEADER_MAGIC);
    header.extend_from_slice(&HEADER_VERSION.to_be_bytes());
    header.push(KDF_ALGO_ARGON2ID);
    header.extend_from_slice(&KDF_MEM_KIB.to_be_bytes());
    header.extend_from_slice(&KDF_ITERS.to_be_bytes());
    header.push(KDF_LANES);
    header.extend_from_slice(&salt);
    header.push(AEAD_ALGO_CHACHA20POLY1305);
    header.extend_from_slice(&nonce_bytes);
    assert_eq!(header.len(), HEADER_LEN);

    let kdf = Argon2::<SALT_LEN>::new();
    let kek: [u8; KEK_LEN] = kdf
        .builder()
        .with_ikm(passphrase.as_bytes())
        .with_salt(&salt)
        .with_info(KDF_INFO)
        .with_output_length(KEK_LEN)
        .derive_array()
        .map_err(|e| CryptoError::OperationFailed(format!("argon2 derivation failed: {e}")))?;

    let cipher = ChaCha20Poly1305::new(&kek);
    let nonce = Nonce::new(nonce_bytes);
    let ciphertext = SymmetricCipher::encrypt(&cipher)
        .with_nonce(&nonce)
        .encrypt(secret)
        .map_err(|e| CryptoError::OperationFailed(format!("encryption failed: {e}")))?;

    let mut out = header;
    out.extend_from_slice(ciphertext.as_ref());
    Ok(out)
}

/// Decrypts a blob produced by [`encrypt_key`].
pub fn decrypt_key(data: &[u8], passphrase: &str) -> Result<SensitiveBytes, CryptoError> {
    if data.len() < HEADER_LEN {
        return Err(CryptoError::InvalidInput("key blob too short".into()));
    }
    if &data[0..8] != HEADER_MAGIC {
        return Err(CryptoError::InvalidInput("bad key blob signature".into()));
    }
    let version = u16::from_be_bytes(
        data[8..10]
            .try_into()
            .map_err(|_| CryptoError::InvalidInput("truncated header".into()))?,
    );
    if version != HEADER_VERSION {
        return Err(CryptoError::Unsupported(format!(
            "unsupported key format version {version}"
        )));
    }

    let salt = &data[20..36];
    let nonce_bytes = &data[37..49];
    let ciphertext_bytes = &data[HEADER_LEN..];

    let kdf = Argon2::<SALT_LEN>::new();
    let kek: [u8; KEK_LEN] = kdf
        .builder()
        .with_ikm(passphrase.as_bytes())
        .with_salt(salt)
        .with_info(KDF_INFO)
        .with_output_length(KEK_LEN)
        .derive_array()
        .map_err(|e| CryptoError::OperationFailed(format!("argon2 derivation failed: {e}")))?;

    let cipher = ChaCha20Poly1305::new(&kek);
    let nonce_array: [u8; NONCE_LEN] = nonce_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInput("truncated nonce".into()))?;
    let nonce = Nonce::new(nonce_array);
    let ciphertext_obj = dcrypt::api::types::Ciphertext::new(ciphertext_bytes.to_vec());

    let plaintext = SymmetricCipher::decrypt(&cipher)
        .with_nonce(&nonce)
        .decrypt(&ciphertext_obj)
        .map_err(|_| CryptoError::DecryptionFailed)?;

    Ok(SensitiveBytes(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_v1() {
        let secret = b"0123456789abcdef0123456789abcdef";
        let pass = "correct horse battery staple";
        let encrypted = encrypt_key(secret, pass).unwrap();
        assert_eq!(&encrypted[0..8], HEADER_MAGIC);
        assert_eq!(encrypted.len(), HEADER_LEN + secret.len() + 16);
        let decrypted = decrypt_key(&encrypted, pass).unwrap();
        assert_eq!(decrypted.0, secret);
    }

    #[test]
    fn wrong_passphrase_fails() {
        let encrypted = encrypt_key(b"secret", "right").unwrap();
        assert!(decrypt_key(&encrypted, "wrong").is_err());
    }

    #[test]
    fn tampered_salt_fails() {
        let mut encrypted = encrypt_key(b"secret", "pass").unwrap();
        encrypted[25] ^= 0xFF;
        assert!(decrypt_key(&encrypted, "pass").is_err());
    }

    #[test]
    fn truncated_blob_rejected() {
        let err = decrypt_key(&[0u8; 10], "pass").unwrap_err();
        matches!(err, CryptoError::InvalidInput(_));
    }
}
