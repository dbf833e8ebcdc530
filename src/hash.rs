//! Hash derivations binding a transfer to its gateway and network transaction
//!
//! - `pHash` = keccak256(payload)
//! - `sHash` = keccak256(selector), burn-and-mint selectors normalised to `asset/to{dest}`
//! - `gHash` = keccak256(pHash ‖ sHash ‖ to ‖ nonce)
//! - `nHash` = keccak256(nonce ‖ txid ‖ u32_be(txindex))
//! - `sigHash` = keccak256(pHash ‖ u256(amount) ‖ sHash ‖ pad32(to) ‖ nHash)
//!
//! The network transaction hash is a sha256 over the version, the selector
//! and the packed transaction input.

use alloy_primitives::U256;
use sha2::{Digest, Sha256};
use tiny_keccak::{Hasher, Keccak};

use crate::error::{Result, TransferError};
use crate::pack::{marshal_string, PackValue};
use crate::types::Bytes32;

/// Transaction version used when hashing network transactions
pub const TRANSACTION_VERSION: &str = "1";

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

fn keccak256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    for part in parts {
        hasher.update(part);
    }
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

// ============================================================================
// Gateway Hashes
// ============================================================================

pub fn generate_p_hash(payload: &[u8]) -> Bytes32 {
    keccak256(payload)
}

/// Rewrites `"BTC/fromFantomToEthereum"` as `"BTC/toEthereum"`.
pub fn normalize_selector(selector: &str) -> String {
    let Some(slash) = selector.find('/') else {
        return selector.to_string();
    };
    match selector[slash + 1..].rfind("To") {
        Some(pos) => {
            let rest = &selector[slash + 1 + pos + 2..];
            format!("{}/to{}", &selector[..slash], rest)
        }
        None => selector.to_string(),
    }
}

pub fn generate_s_hash(selector: &str) -> Bytes32 {
    keccak256(normalize_selector(selector).as_bytes())
}

/// Gateway hash over the payload hash, selector hash, recipient and nonce
pub fn generate_g_hash(p_hash: &[u8], s_hash: &[u8], to: &[u8], nonce: &[u8]) -> Bytes32 {
    keccak256_concat(&[p_hash, s_hash, to, nonce])
}

/// Nonce hash, unique per input transaction
pub fn generate_n_hash(nonce: &[u8], txid: &[u8], txindex: u32) -> Bytes32 {
    keccak256_concat(&[nonce, txid, &txindex.to_be_bytes()])
}

/// Signature hash signed by the network for mints and releases
pub fn generate_sighash(
    p_hash: &[u8],
    amount: U256,
    to: &[u8],
    s_hash: &[u8],
    n_hash: &[u8],
) -> Result<Bytes32> {
    for (name, hash) in [("pHash", p_hash), ("sHash", s_hash), ("nHash", n_hash)] {
        if hash.len() != 32 {
            return Err(TransferError::ParameterError(format!(
                "invalid {} length - {} instead of 32",
                name,
                hash.len()
            )));
        }
    }
    if to.len() > 32 {
        return Err(TransferError::ParameterError(format!(
            "recipient too long - {} bytes",
            to.len()
        )));
    }

    let mut padded_to = [0u8; 32];
    padded_to[32 - to.len()..].copy_from_slice(to);

    Ok(keccak256_concat(&[
        p_hash,
        &amount.to_be_bytes::<32>(),
        s_hash,
        &padded_to,
        n_hash,
    ]))
}

// ============================================================================
// Network Transaction Hash
// ============================================================================

/// sha256(str(version) ‖ str(selector) ‖ marshal(value))
pub fn generate_transaction_hash(version: &str, selector: &str, value: &PackValue) -> Bytes32 {
    let mut encoded = Vec::new();
    marshal_string(version, &mut encoded);
    marshal_string(selector, &mut encoded);
    encoded.extend_from_slice(&value.marshal());

    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    hasher.finalize().into()
}

/// Convert bytes to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256() {
        let result = keccak256(b"hello");
        assert_eq!(
            bytes32_to_hex(&result),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_s_hash_normalizes_burn_and_mint() {
        assert_eq!(normalize_selector("BTC/toEthereum"), "BTC/toEthereum");
        assert_eq!(
            normalize_selector("BTC/fromFantomToEthereum"),
            "BTC/toEthereum"
        );
        assert_eq!(normalize_selector("BTC/fromEthereum"), "BTC/fromEthereum");
        assert_eq!(
            generate_s_hash("BTC/fromFantomToEthereum"),
            keccak256(b"BTC/toEthereum")
        );
    }

    #[test]
    fn test_g_hash_purity() {
        let p = generate_p_hash(&[]);
        let s = generate_s_hash("BTC/toEthereum");
        let to = [0x11u8; 20];
        let nonce = [0u8; 32];

        let a = generate_g_hash(&p, &s, &to, &nonce);
        let b = generate_g_hash(&p, &s, &to, &nonce);
        assert_eq!(a, b);

        let mut other_to = to;
        other_to[0] = 0x12;
        assert_ne!(a, generate_g_hash(&p, &s, &other_to, &nonce));
        assert_ne!(a, generate_g_hash(&s, &p, &to, &nonce));
    }

    #[test]
    fn test_g_hash_distinct_nonces() {
        let p = generate_p_hash(b"payload");
        let s = generate_s_hash("BTC/toEthereum");
        let to = [0xabu8; 20];

        // Deterministic pseudo-random nonces
        let mut seen = std::collections::HashSet::new();
        let mut seed = [7u8; 32];
        for _ in 0..256 {
            seed = keccak256(&seed);
            assert!(seen.insert(generate_g_hash(&p, &s, &to, &seed)));
        }
    }

    #[test]
    fn test_n_hash_includes_txindex() {
        let nonce = [0u8; 32];
        let txid = [1u8; 32];
        assert_ne!(
            generate_n_hash(&nonce, &txid, 0),
            generate_n_hash(&nonce, &txid, 1)
        );

        let mut expected = Vec::new();
        expected.extend_from_slice(&nonce);
        expected.extend_from_slice(&txid);
        expected.extend_from_slice(&[0, 0, 0, 1]);
        assert_eq!(generate_n_hash(&nonce, &txid, 1), keccak256(&expected));
    }

    #[test]
    fn test_sighash_rejects_short_hashes() {
        let ok = [0u8; 32];
        assert!(generate_sighash(&ok, U256::from(1u64), &[1u8; 20], &ok, &ok).is_ok());
        let err = generate_sighash(&ok[..31], U256::from(1u64), &[1u8; 20], &ok, &ok).unwrap_err();
        assert!(matches!(err, TransferError::ParameterError(_)));
    }

    #[test]
    fn test_sighash_left_pads_recipient() {
        let h = [3u8; 32];
        let to = [0xaau8; 20];
        let mut padded = [0u8; 32];
        padded[12..].copy_from_slice(&to);

        let mut expected = Vec::new();
        expected.extend_from_slice(&h);
        expected.extend_from_slice(&U256::from(5u64).to_be_bytes::<32>());
        expected.extend_from_slice(&h);
        expected.extend_from_slice(&padded);
        expected.extend_from_slice(&h);

        assert_eq!(
            generate_sighash(&h, U256::from(5u64), &to, &h, &h).unwrap(),
            keccak256(&expected)
        );
    }

    #[test]
    fn test_transaction_hash_depends_on_selector() {
        let value = PackValue::U32(1);
        let a = generate_transaction_hash(TRANSACTION_VERSION, "BTC/toEthereum", &value);
        let b = generate_transaction_hash(TRANSACTION_VERSION, "BTC/fromEthereum", &value);
        assert_ne!(a, b);
        assert_eq!(
            a,
            generate_transaction_hash(TRANSACTION_VERSION, "BTC/toEthereum", &value)
        );
    }
}
