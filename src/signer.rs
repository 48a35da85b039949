//! Deterministic Signer Derivation
//!
//! The host wallet hands out its BIP-44 coin-type node for Ethereum
//! (`m/44'/60'`) instead of the seed. From that node we derive the account key
//! at `m/44'/60'/0'/0/{index}` with BIP-32 private child derivation and wrap it
//! in an alloy `PrivateKeySigner`.
//!
//! Child derivation produces `key || chain code` as a single 64-byte buffer.
//! Only the 32-byte key prefix may reach the signer: a 64-byte buffer fed to a
//! key constructor that accepts it yields a valid but wrong key. The length is
//! checked explicitly in `private_key_prefix`.
//!
//! Author: AI-Generated
//! Created: 2026-10-16
//!
//! Dependencies:
//!     - hmac + sha2 (HMAC-SHA512 for CKDpriv)
//!     - k256 (secp256k1 scalar addition, compressed public keys)
//!     - alloy (PrivateKeySigner)

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, NonZeroScalar, Scalar, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use thiserror::Error;

type HmacSha512 = Hmac<Sha512>;

/// BIP-44 coin type for Ethereum
pub const ETH_COIN_TYPE: u32 = 60;

/// Account the trader always signs with
pub const ACCOUNT_INDEX: u32 = 0;

/// Depth of the `m/44'/60'` node handed out by the host
pub const COIN_TYPE_NODE_DEPTH: u8 = 2;

pub const PRIVATE_KEY_LEN: usize = 32;
pub const CHAIN_CODE_LEN: usize = 32;

const HARDENED: u32 = 0x8000_0000;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("entropy field `{field}` is not valid hex: {source}")]
    InvalidHex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("key material is {0} bytes, expected 32 (or 64 with chain code)")]
    KeyLength(usize),

    #[error("chain code is {0} bytes, expected 32")]
    ChainCodeLength(usize),

    #[error("entropy is not an m/44'/60' node (depth {depth}, coin type {coin_type})")]
    UnexpectedNode { depth: u8, coin_type: u32 },

    #[error("private key is not a valid secp256k1 scalar")]
    InvalidKey,

    #[error("child index {0} produced an invalid key")]
    InvalidChildKey(u32),
}

/// Coin-type node as returned by the host (`get_bip44_entropy(60)`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedEntropy {
    pub depth: u8,
    #[serde(rename = "coin_type")]
    pub coin_type: u32,
    /// Hex, with or without 0x
    pub private_key: String,
    /// Hex, with or without 0x
    pub chain_code: String,
}

/// Private key plus chain code at some node of the tree
struct ExtendedKey {
    key: SecretKey,
    chain_code: [u8; CHAIN_CODE_LEN],
}

impl ExtendedKey {
    fn from_entropy(entropy: &SeedEntropy) -> Result<Self, DerivationError> {
        if entropy.depth != COIN_TYPE_NODE_DEPTH || entropy.coin_type != ETH_COIN_TYPE {
            return Err(DerivationError::UnexpectedNode {
                depth: entropy.depth,
                coin_type: entropy.coin_type,
            });
        }

        let key = decode_hex("privateKey", &entropy.private_key)?;
        if key.len() != PRIVATE_KEY_LEN {
            return Err(DerivationError::KeyLength(key.len()));
        }
        let chain_code = decode_hex("chainCode", &entropy.chain_code)?;
        let chain_code: [u8; CHAIN_CODE_LEN] = chain_code
            .as_slice()
            .try_into()
            .map_err(|_| DerivationError::ChainCodeLength(chain_code.len()))?;

        Ok(Self {
            key: secret_key(private_key_prefix(&key)?)?,
            chain_code,
        })
    }

    /// Splits a CKDpriv output buffer back into key and chain code
    fn from_combined(material: &[u8; PRIVATE_KEY_LEN + CHAIN_CODE_LEN]) -> Result<Self, DerivationError> {
        let mut chain_code = [0u8; CHAIN_CODE_LEN];
        chain_code.copy_from_slice(&material[PRIVATE_KEY_LEN..]);
        Ok(Self {
            key: secret_key(private_key_prefix(material)?)?,
            chain_code,
        })
    }

    /// BIP-32 CKDpriv. Returns `child key || child chain code`.
    fn derive_child(&self, index: u32) -> Result<[u8; PRIVATE_KEY_LEN + CHAIN_CODE_LEN], DerivationError> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|_| DerivationError::ChainCodeLength(self.chain_code.len()))?;
        if index >= HARDENED {
            mac.update(&[0u8]);
            mac.update(&self.key.to_bytes());
        } else {
            mac.update(self.key.public_key().to_encoded_point(true).as_bytes());
        }
        mac.update(&index.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let (il, ir) = digest.split_at(PRIVATE_KEY_LEN);

        // parse256(IL) must be < n, and the sum must not be zero
        let tweak = Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(il)))
            .ok_or(DerivationError::InvalidChildKey(index))?;
        let parent = *self.key.to_nonzero_scalar();
        let child = Option::<NonZeroScalar>::from(NonZeroScalar::new(tweak + parent))
            .ok_or(DerivationError::InvalidChildKey(index))?;

        let mut out = [0u8; PRIVATE_KEY_LEN + CHAIN_CODE_LEN];
        out[..PRIVATE_KEY_LEN].copy_from_slice(&SecretKey::from(child).to_bytes());
        out[PRIVATE_KEY_LEN..].copy_from_slice(ir);
        Ok(out)
    }
}

/// Derivation path of the account used for a given index
pub fn derivation_path(index: u32) -> String {
    format!("m/44'/{}'/0'/0/{}", ETH_COIN_TYPE, index)
}

/// Derives the signer at `m/44'/60'/0'/0/{index}` from the host's coin-type node.
pub fn derive_signer(entropy: &SeedEntropy, index: u32) -> Result<PrivateKeySigner, DerivationError> {
    let coin_type_node = ExtendedKey::from_entropy(entropy)?;
    let account = ExtendedKey::from_combined(&coin_type_node.derive_child(HARDENED)?)?;
    let change = ExtendedKey::from_combined(&account.derive_child(0)?)?;
    let material = change.derive_child(index)?;

    let key = private_key_prefix(&material)?;
    PrivateKeySigner::from_bytes(&B256::from(*key)).map_err(|_| DerivationError::InvalidKey)
}

/// Address of the signer `derive_signer` would return
pub fn derive_address(entropy: &SeedEntropy, index: u32) -> Result<Address, DerivationError> {
    Ok(derive_signer(entropy, index)?.address())
}

/// Key prefix of derived key material.
///
/// Accepts exactly a bare 32-byte key or a 64-byte `key || chain code`
/// buffer. Anything else is an error, never a silent truncation.
pub fn private_key_prefix(material: &[u8]) -> Result<&[u8; PRIVATE_KEY_LEN], DerivationError> {
    let len = material.len();
    if len != PRIVATE_KEY_LEN && len != PRIVATE_KEY_LEN + CHAIN_CODE_LEN {
        return Err(DerivationError::KeyLength(len));
    }
    material[..PRIVATE_KEY_LEN]
        .try_into()
        .map_err(|_| DerivationError::KeyLength(len))
}

fn secret_key(bytes: &[u8; PRIVATE_KEY_LEN]) -> Result<SecretKey, DerivationError> {
    SecretKey::from_bytes(&FieldBytes::from(*bytes)).map_err(|_| DerivationError::InvalidKey)
}

fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>, DerivationError> {
    let trimmed = value.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|source| DerivationError::InvalidHex { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entropy() -> SeedEntropy {
        SeedEntropy {
            depth: 2,
            coin_type: 60,
            private_key: "0x1f6f0b0b3c0a6c1f4b0d2a7a9e5d8c3b2a1f0e9d8c7b6a5f4e3d2c1b0a998877".into(),
            chain_code: "0x6b3c9a1e2d4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b".into(),
        }
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = derive_address(&entropy(), ACCOUNT_INDEX).unwrap();
        let second = derive_address(&entropy(), ACCOUNT_INDEX).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Address::ZERO);
    }

    #[test]
    fn test_index_changes_account() {
        let a0 = derive_address(&entropy(), 0).unwrap();
        let a1 = derive_address(&entropy(), 1).unwrap();
        assert_ne!(a0, a1);
    }

    #[test]
    fn test_signer_is_not_the_coin_type_key() {
        // The derived account must differ from signing with the node key itself
        let node_key = hex::decode(entropy().private_key.trim_start_matches("0x")).unwrap();
        let node_signer = PrivateKeySigner::from_slice(&node_key).unwrap();
        assert_ne!(derive_address(&entropy(), 0).unwrap(), node_signer.address());
    }

    #[test]
    fn test_truncated_key_is_rejected() {
        let mut short = entropy();
        short.private_key = "0x1f6f0b0b3c0a6c1f4b0d2a7a9e5d8c3b".into(); // 16 bytes
        assert!(matches!(derive_signer(&short, 0), Err(DerivationError::KeyLength(16))));
    }

    #[test]
    fn test_truncated_chain_code_is_rejected() {
        let mut short = entropy();
        short.chain_code = "0x6b3c9a1e".into();
        assert!(matches!(derive_signer(&short, 0), Err(DerivationError::ChainCodeLength(4))));
    }

    #[test]
    fn test_bad_hex_is_rejected() {
        let mut bad = entropy();
        bad.private_key = "not hex at all".into();
        assert!(matches!(
            derive_signer(&bad, 0),
            Err(DerivationError::InvalidHex { field: "privateKey", .. })
        ));
    }

    #[test]
    fn test_wrong_node_is_rejected() {
        let mut wrong = entropy();
        wrong.coin_type = 0;
        assert!(matches!(
            derive_signer(&wrong, 0),
            Err(DerivationError::UnexpectedNode { depth: 2, coin_type: 0 })
        ));
    }

    #[test]
    fn test_zero_key_is_rejected() {
        let mut zero = entropy();
        zero.private_key = format!("0x{}", "00".repeat(32));
        assert!(matches!(derive_signer(&zero, 0), Err(DerivationError::InvalidKey)));
    }

    #[test]
    fn test_key_prefix_length_guard() {
        let combined: Vec<u8> = (0u8..64).collect();
        let prefix = private_key_prefix(&combined).unwrap();
        assert_eq!(&prefix[..], &combined[..32]);

        let bare = [7u8; 32];
        assert_eq!(private_key_prefix(&bare).unwrap(), &bare);

        assert!(matches!(private_key_prefix(&[1u8; 48]), Err(DerivationError::KeyLength(48))));
        assert!(matches!(private_key_prefix(&[1u8; 31]), Err(DerivationError::KeyLength(31))));
    }

    #[test]
    fn test_hardened_and_normal_children_differ() {
        let node = ExtendedKey::from_entropy(&entropy()).unwrap();
        let hardened = node.derive_child(HARDENED).unwrap();
        let normal = node.derive_child(0).unwrap();
        assert_ne!(hardened, normal);
        // Chain code half is carried through untouched by from_combined
        let child = ExtendedKey::from_combined(&hardened).unwrap();
        assert_eq!(&child.chain_code[..], &hardened[32..]);
    }

    /// `m/44'/60'` node of "test test test test test test test test test test test junk"
    fn hardhat_entropy() -> SeedEntropy {
        SeedEntropy {
            depth: 2,
            coin_type: 60,
            private_key: "0x3aa04966203428ada6ecc9c0e950b676c5fd2f92508821ddfab82dbea932dcd1".into(),
            chain_code: "0x788481500fc91511dba8a20fe0df7b82f4a669249965c404ce272a41d2e8dc4f".into(),
        }
    }

    fn combined(key: &str, chain_code: &str) -> [u8; PRIVATE_KEY_LEN + CHAIN_CODE_LEN] {
        let mut out = [0u8; PRIVATE_KEY_LEN + CHAIN_CODE_LEN];
        out[..PRIVATE_KEY_LEN].copy_from_slice(&hex::decode(key).unwrap());
        out[PRIVATE_KEY_LEN..].copy_from_slice(&hex::decode(chain_code).unwrap());
        out
    }

    #[test]
    fn test_well_known_dev_account() {
        let signer = derive_signer(&hardhat_entropy(), 0).unwrap();
        assert_eq!(
            signer.address(),
            alloy::primitives::address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266")
        );
        assert_eq!(
            hex::encode(signer.to_bytes()),
            "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
        );
        assert_eq!(
            derive_address(&hardhat_entropy(), 1).unwrap(),
            alloy::primitives::address!("70997970C51812dc3A010C7d01b50e0d17dc79C8")
        );
    }

    #[test]
    fn test_bip32_vector_1_children() {
        // Master node of seed 000102030405060708090a0b0c0d0e0f
        let master = ExtendedKey::from_combined(&combined(
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35",
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508",
        ))
        .unwrap();

        // m/0H
        let hardened = master.derive_child(HARDENED).unwrap();
        assert_eq!(
            hardened,
            combined(
                "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea",
                "47fdacbd0f1097043b78c63c20c34ef4ed9a111d980047ad16282c7ae6236141",
            )
        );

        // m/0H/1
        let normal = ExtendedKey::from_combined(&hardened)
            .unwrap()
            .derive_child(1)
            .unwrap();
        assert_eq!(
            normal,
            combined(
                "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368",
                "2a7857631386ba23dacac34180dd1983734e444fdbf774041578e9b6adb37c19",
            )
        );
    }

    #[test]
    fn test_entropy_json_shape() {
        let json = r#"{
            "depth": 2,
            "coin_type": 60,
            "privateKey": "0x1f6f0b0b3c0a6c1f4b0d2a7a9e5d8c3b2a1f0e9d8c7b6a5f4e3d2c1b0a998877",
            "chainCode": "0x6b3c9a1e2d4f5a6b7c8d9e0f1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d7e8f9a0b"
        }"#;
        let parsed: SeedEntropy = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, entropy());
        assert_eq!(derivation_path(0), "m/44'/60'/0'/0/0");
    }
}
