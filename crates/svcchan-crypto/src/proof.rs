//! Balance-proof and cooperative-close preimage hashes: a double Keccak-256 over a fixed domain
//! string and the proof's fields, matching the hash every counter-party must independently
//! reconstruct to verify a signature.

use svcchan_types::model::{EthAddress, Hash32};

fn preimage(
    domain: &str,
    counterparty: EthAddress,
    block: u64,
    offering_hash: Hash32,
    balance: u64,
    contract: EthAddress,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(domain.len() + 20 + 8 + 32 + 8 + 20);
    buf.extend_from_slice(domain.as_bytes());
    buf.extend_from_slice(&counterparty.0);
    buf.extend_from_slice(&block.to_be_bytes());
    buf.extend_from_slice(&offering_hash.0);
    buf.extend_from_slice(&balance.to_be_bytes());
    buf.extend_from_slice(&contract.0);
    buf
}

/// `H = Keccak256(Keccak256("Privatix: sender balance proof signature",
/// agent_addr, block, offering_hash, balance, service_contract_addr))`,
/// signed by the client and verified by the agent's payment receiver.
pub fn balance_proof_hash(
    agent: EthAddress,
    block: u64,
    offering_hash: Hash32,
    balance: u64,
    service_contract: EthAddress,
) -> Hash32 {
    let inner = crate::hash::keccak256(&preimage(
        "Privatix: sender balance proof signature",
        agent,
        block,
        offering_hash,
        balance,
        service_contract,
    ));
    crate::hash::keccak256(&inner.0)
}

/// `H = Keccak256(Keccak256("Privatix: receiver closing signature",
/// client_addr, block, offering_hash, balance, service_contract_addr))`,
/// signed by the agent when cooperatively closing a channel.
pub fn cooperative_close_hash(
    client: EthAddress,
    block: u64,
    offering_hash: Hash32,
    balance: u64,
    service_contract: EthAddress,
) -> Hash32 {
    let inner = crate::hash::keccak256(&preimage(
        "Privatix: receiver closing signature",
        client,
        block,
        offering_hash,
        balance,
        service_contract,
    ));
    crate::hash::keccak256(&inner.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_proof_hash_is_deterministic() {
        let agent = EthAddress([1u8; 20]);
        let offering_hash = Hash32([2u8; 32]);
        let contract = EthAddress([3u8; 20]);
        let a = balance_proof_hash(agent, 10, offering_hash, 500, contract);
        let b = balance_proof_hash(agent, 10, offering_hash, 500, contract);
        assert_eq!(a, b);
    }

    #[test]
    fn balance_proof_and_cooperative_close_hashes_differ() {
        let addr = EthAddress([1u8; 20]);
        let offering_hash = Hash32([2u8; 32]);
        let contract = EthAddress([3u8; 20]);
        let a = balance_proof_hash(addr, 10, offering_hash, 500, contract);
        let b = cooperative_close_hash(addr, 10, offering_hash, 500, contract);
        assert_ne!(a, b);
    }
}
