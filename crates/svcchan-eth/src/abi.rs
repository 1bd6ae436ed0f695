//! Minimal hand-rolled Solidity ABI call encoding: selectors and fixed-width word packing for the
//! handful of contract methods this control plane calls. Mirrors the equally hand-rolled log-data
//! decoding in the scheduler rather than pulling in a full ABI codegen dependency.

use ethers::types::Address;

use svcchan_types::model::Hash32;

/// First four bytes of `Keccak256(signature)`, e.g.
/// `"registerServiceOffering(bytes32,uint192,uint16)"`.
fn selector(signature: &str) -> [u8; 4] {
    let digest = svcchan_crypto::hash::keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest.0[0..4]);
    out
}

fn word_uint(value: u128) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[16..32].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_address(addr: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(addr.as_bytes());
    word
}

fn word_bytes32(hash: Hash32) -> [u8; 32] {
    hash.0
}

/// Appends a dynamic `bytes` argument at a static offset already reserved
/// by the caller: length word followed by the data, right-padded to a
/// 32-byte boundary.
fn append_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    buf.extend_from_slice(&word_uint(data.len() as u128));
    buf.extend_from_slice(data);
    let pad = (32 - data.len() % 32) % 32;
    buf.extend(std::iter::repeat(0u8).take(pad));
}

/// `registerServiceOffering(bytes32 hash, uint192 minDeposit, uint16 supply)`.
pub fn encode_register_service_offering(hash: Hash32, min_deposit: u128, supply: u32) -> Vec<u8> {
    let mut data = selector("registerServiceOffering(bytes32,uint192,uint16)").to_vec();
    data.extend_from_slice(&word_bytes32(hash));
    data.extend_from_slice(&word_uint(min_deposit));
    data.extend_from_slice(&word_uint(supply as u128));
    data
}

/// `approve(address spender, uint256 amount)`, the ERC-20 token contract
/// call preceding `addBalance`.
pub fn encode_approve(spender: Address, amount: u128) -> Vec<u8> {
    let mut data = selector("approve(address,uint256)").to_vec();
    data.extend_from_slice(&word_address(spender));
    data.extend_from_slice(&word_uint(amount));
    data
}

/// `addBalanceErc20(uint192 amount)` on the service-payment-channel
/// contract.
pub fn encode_add_balance(amount: u128) -> Vec<u8> {
    let mut data = selector("addBalanceErc20(uint192)").to_vec();
    data.extend_from_slice(&word_uint(amount));
    data
}

/// `cooperativeClose(address client, uint192 openBlockNumber, bytes32
/// offeringHash, uint192 balance, bytes balanceMsgSig, bytes closingSig)`
/// . The two trailing `bytes` arguments are encoded with static head offsets followed by their tail
/// data, per the standard ABI dynamic-argument layout.
pub fn encode_cooperative_close(
    client: Address,
    block: u64,
    offering_hash: Hash32,
    balance: u128,
    balance_msg_sig: &[u8],
    closing_sig: &[u8],
) -> Vec<u8> {
    let mut data = selector(
        "cooperativeClose(address,uint192,bytes32,uint192,bytes,bytes)",
    )
    .to_vec();
    data.extend_from_slice(&word_address(client));
    data.extend_from_slice(&word_uint(block as u128));
    data.extend_from_slice(&word_bytes32(offering_hash));
    data.extend_from_slice(&word_uint(balance));
    // Head: two dynamic offsets, relative to the start of the argument
    // block (after the 4-byte selector), in 32-byte words. Six static
    // head slots precede the tails.
    let head_words = 6u128;
    let sig1_len_words = 1 + balance_msg_sig.len().div_ceil(32) as u128;
    data.extend_from_slice(&word_uint(head_words * 32));
    data.extend_from_slice(&word_uint((head_words + sig1_len_words) * 32));
    append_bytes(&mut data, balance_msg_sig);
    append_bytes(&mut data, closing_sig);
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_are_four_bytes_and_stable() {
        let a = encode_register_service_offering(Hash32([1u8; 32]), 100, 5);
        let b = encode_register_service_offering(Hash32([1u8; 32]), 100, 5);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4 + 32 * 3);
    }

    #[test]
    fn approve_encodes_spender_and_amount() {
        let spender = Address::from([7u8; 20]);
        let data = encode_approve(spender, 42);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[4 + 12..4 + 32], spender.as_bytes());
    }

    #[test]
    fn cooperative_close_appends_both_signature_tails() {
        let data = encode_cooperative_close(
            Address::from([1u8; 20]),
            10,
            Hash32([2u8; 32]),
            500,
            &[9u8; 65],
            &[8u8; 65],
        );
        assert!(data.len() > 4 + 32 * 6);
    }
}
