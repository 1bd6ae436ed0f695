//! Endpoint-message construction and sealing: a per-channel username/password pair, wrapped in the
//! JSON message names, ECIES-sealed to the client's public key, then signed by the agent over the
//! ciphertext.

use std::collections::HashMap;

use rand::RngCore;
use uuid::Uuid;

use svcchan_types::model::{Blob, Hash32, PublicKey65};

use crate::error::EndpointError;

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// The per-channel login a connecting client authenticates with.
/// `password` is returned in the clear once, for embedding in the sealed
/// message; only `password_hash`/`salt` are meant to be persisted.
pub struct SessionCredential {
    pub username: String,
    pub password: String,
    pub password_hash: Blob,
    pub salt: Blob,
}

/// Generates a fresh credential for `channel_id`. The username embeds the
/// channel id's leading hex digits so it is recognizable in logs without
/// round-tripping through the database.
pub fn generate_session_credential(channel_id: Uuid) -> SessionCredential {
    let username = format!("u{}", &channel_id.simple().to_string()[..8]);
    let password = random_hex(16);

    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let mut salted = salt.to_vec();
    salted.extend_from_slice(password.as_bytes());
    let password_hash = svcchan_crypto::hash::keccak256(&salted);

    SessionCredential {
        username,
        password,
        password_hash: Blob(password_hash.0.to_vec()),
        salt: Blob(salt.to_vec()),
    }
}

/// The plaintext an agent seals to a client's public key. Carried as JSON rather than a fixed byte
/// layout, since unlike the offering message it has no on-chain commitment to match.
#[derive(serde::Serialize)]
struct EndpointMessage {
    #[serde(rename = "templateHash")]
    template_hash: String,
    username: String,
    password: String,
    #[serde(rename = "paymentReceiverAddress")]
    payment_receiver_address: String,
    #[serde(rename = "serviceEndpointAddress")]
    service_endpoint_address: Option<String>,
    #[serde(rename = "additionalParams")]
    additional_params: HashMap<String, String>,
}

/// A sealed, agent-signed endpoint message ready to hand to the matching
/// server, along with the content hash the `Endpoint` row records.
pub struct SealedCredential {
    pub credential: SessionCredential,
    pub raw: Blob,
    pub hash: Hash32,
}

/// Builds, seals, and signs a channel's endpoint message in one step.
/// `agent_private_key` signs the ciphertext; it is never itself sealed.
pub fn build_sealed_credential(
    channel_id: Uuid,
    template_hash: Hash32,
    payment_receiver_address: svcchan_types::model::EthAddress,
    service_endpoint_address: Option<String>,
    client_public_key: &PublicKey65,
    agent_private_key: &[u8; 32],
) -> Result<SealedCredential, EndpointError> {
    let credential = generate_session_credential(channel_id);

    let message = EndpointMessage {
        template_hash: format!("0x{}", hex::encode(template_hash.0)),
        username: credential.username.clone(),
        password: credential.password.clone(),
        payment_receiver_address: format!("0x{}", hex::encode(payment_receiver_address.0)),
        service_endpoint_address,
        additional_params: HashMap::new(),
    };
    let plaintext = serde_json::to_vec(&message).expect("EndpointMessage always serializes");

    let ciphertext = svcchan_crypto::seal::seal(client_public_key, &plaintext)?;
    let signature = svcchan_crypto::sign::sign_digest(&svcchan_crypto::hash::keccak256(&ciphertext), agent_private_key)?;

    let mut raw = ciphertext;
    raw.extend_from_slice(&signature.0);
    let hash = svcchan_crypto::hash::keccak256(&raw);

    Ok(SealedCredential {
        credential,
        raw: Blob(raw),
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_session_credential_hashes_differently_per_channel() {
        let a = generate_session_credential(Uuid::new_v4());
        let b = generate_session_credential(Uuid::new_v4());
        assert_ne!(a.password, b.password);
        assert_ne!(a.password_hash.0, b.password_hash.0);
    }

    #[test]
    fn username_is_stable_prefix_of_channel_id() {
        let id = Uuid::new_v4();
        let cred = generate_session_credential(id);
        assert!(cred.username.starts_with('u'));
        assert_eq!(cred.username.len(), 9);
    }
}
