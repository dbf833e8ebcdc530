//! Packed transaction inputs
//!
//! The signing network identifies a transaction by hashing its selector and a
//! typed, packed input value. This module provides the value type and its
//! deterministic binary marshalling:
//!
//! - type definition: one type-id byte; structs add a u32 field count and,
//!   per field, a length-prefixed name followed by the field's type
//! - value: length-prefixed bytes/strings, big-endian integers, raw bytes32
//!
//! Lengths and integers are big-endian.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::types::Bytes32;

const TYPE_U32: u8 = 4;
const TYPE_U256: u8 = 7;
const TYPE_STR: u8 = 10;
const TYPE_BYTES: u8 = 11;
const TYPE_BYTES32: u8 = 12;
const TYPE_STRUCT: u8 = 20;

/// A typed value as understood by the signing network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
pub enum PackValue {
    U32(u32),
    U256(U256),
    Str(String),
    Bytes(#[serde(with = "hex::serde")] Vec<u8>),
    Bytes32(#[serde(with = "hex::serde")] Bytes32),
    Struct(Vec<(String, PackValue)>),
}

impl PackValue {
    /// Look up a struct field by name
    pub fn field(&self, name: &str) -> Option<&PackValue> {
        match self {
            PackValue::Struct(fields) => fields.iter().find(|(k, _)| k == name).map(|(_, v)| v),
            _ => None,
        }
    }

    fn type_id(&self) -> u8 {
        match self {
            PackValue::U32(_) => TYPE_U32,
            PackValue::U256(_) => TYPE_U256,
            PackValue::Str(_) => TYPE_STR,
            PackValue::Bytes(_) => TYPE_BYTES,
            PackValue::Bytes32(_) => TYPE_BYTES32,
            PackValue::Struct(_) => TYPE_STRUCT,
        }
    }

    fn marshal_type(&self, out: &mut Vec<u8>) {
        out.push(self.type_id());
        if let PackValue::Struct(fields) = self {
            out.extend_from_slice(&(fields.len() as u32).to_be_bytes());
            for (name, value) in fields {
                marshal_string(name, out);
                value.marshal_type(out);
            }
        }
    }

    fn marshal_value(&self, out: &mut Vec<u8>) {
        match self {
            PackValue::U32(v) => out.extend_from_slice(&v.to_be_bytes()),
            PackValue::U256(v) => out.extend_from_slice(&v.to_be_bytes::<32>()),
            PackValue::Str(s) => marshal_string(s, out),
            PackValue::Bytes(b) => marshal_bytes(b, out),
            PackValue::Bytes32(b) => out.extend_from_slice(b),
            PackValue::Struct(fields) => {
                for (_, value) in fields {
                    value.marshal_value(out);
                }
            }
        }
    }

    /// Marshal the type definition followed by the value
    pub fn marshal(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.marshal_type(&mut out);
        self.marshal_value(&mut out);
        out
    }
}

fn marshal_bytes(bytes: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

/// Marshal a string as u32 length followed by its UTF-8 bytes
pub fn marshal_string(value: &str, out: &mut Vec<u8>) {
    marshal_bytes(value.as_bytes(), out);
}

/// Input of a cross-chain (mint/release) transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainTxInput {
    #[serde(with = "hex::serde")]
    pub txid: Vec<u8>,
    pub txindex: u32,
    pub amount: U256,
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub phash: Bytes32,
    pub to: String,
    #[serde(with = "hex::serde")]
    pub nonce: Bytes32,
    #[serde(with = "hex::serde")]
    pub nhash: Bytes32,
    #[serde(with = "hex::serde")]
    pub gpubkey: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ghash: Bytes32,
}

impl CrossChainTxInput {
    /// Field order is part of the transaction hash
    pub fn to_pack_value(&self) -> PackValue {
        PackValue::Struct(vec![
            ("txid".to_string(), PackValue::Bytes(self.txid.clone())),
            ("txindex".to_string(), PackValue::U32(self.txindex)),
            ("amount".to_string(), PackValue::U256(self.amount)),
            ("payload".to_string(), PackValue::Bytes(self.payload.clone())),
            ("phash".to_string(), PackValue::Bytes32(self.phash)),
            ("to".to_string(), PackValue::Str(self.to.clone())),
            ("nonce".to_string(), PackValue::Bytes32(self.nonce)),
            ("nhash".to_string(), PackValue::Bytes32(self.nhash)),
            ("gpubkey".to_string(), PackValue::Bytes(self.gpubkey.clone())),
            ("ghash".to_string(), PackValue::Bytes32(self.ghash)),
        ])
    }
}

impl From<&CrossChainTxInput> for PackValue {
    fn from(input: &CrossChainTxInput) -> Self {
        input.to_pack_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_primitives() {
        assert_eq!(PackValue::U32(1).marshal(), vec![TYPE_U32, 0, 0, 0, 1]);

        let s = PackValue::Str("ab".into()).marshal();
        assert_eq!(s, vec![TYPE_STR, 0, 0, 0, 2, b'a', b'b']);

        let u = PackValue::U256(U256::from(258u64)).marshal();
        assert_eq!(u.len(), 33);
        assert_eq!(&u[31..], &[1, 2]);
    }

    #[test]
    fn test_marshal_struct_includes_field_names() {
        let value = PackValue::Struct(vec![("a".into(), PackValue::U32(7))]);
        let encoded = value.marshal();
        // type id, field count, name "a", field type, value
        assert_eq!(
            encoded,
            vec![TYPE_STRUCT, 0, 0, 0, 1, 0, 0, 0, 1, b'a', TYPE_U32, 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_cross_chain_field_order() {
        let input = CrossChainTxInput {
            txid: vec![1, 2, 3],
            txindex: 0,
            amount: U256::from(100u64),
            payload: vec![],
            phash: [0u8; 32],
            to: "0xabc".into(),
            nonce: [0u8; 32],
            nhash: [0u8; 32],
            gpubkey: vec![],
            ghash: [0u8; 32],
        };
        let packed = input.to_pack_value();
        let PackValue::Struct(fields) = &packed else {
            panic!("expected struct");
        };
        let names: Vec<&str> = fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "txid", "txindex", "amount", "payload", "phash", "to", "nonce", "nhash", "gpubkey",
                "ghash"
            ]
        );
        assert_eq!(packed.field("to"), Some(&PackValue::Str("0xabc".into())));
    }
}
