use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::event::{EventCustodialRegistration, EventTokenMint, EventTokenTransfer, Msg};

/// Bytes in an account, voucher or pool address
pub const ADDRESS_LEN: usize = 20;
/// Bytes in a transaction hash
pub const HASH_LEN: usize = 32;
pub const DEFAULT_DECIMALS: u32 = 6;
/// Per-voucher limit given to every voucher a new pool is seeded with
pub const DEFAULT_POOL_LIMIT: u64 = 500;
/// Sentinel account that always exists. Transfers from it mint new balance.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// `0x`-prefixed hex of `len` random bytes.
///
/// # Errors
///
/// Returns [`Error::ShortRandomRead`] if the generator cannot fill the buffer.
pub fn random_hex<R: RngCore + ?Sized>(rng: &mut R, len: usize) -> Result<String, Error> {
    let mut buf = vec![0u8; len];
    rng.try_fill_bytes(&mut buf)
        .map_err(|_| Error::ShortRandomRead {
            expected: len,
            actual: 0,
        })?;
    Ok(format!("0x{}", hex::encode(buf)))
}

/// Derives the address of a voucher or pool from its symbol
pub trait AddressHasher: Send + Sync + fmt::Debug {
    fn address_for(&self, symbol: &str) -> String;
}

/// SHA-256 of the symbol, truncated to [`ADDRESS_LEN`] bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl AddressHasher for Sha256Hasher {
    fn address_for(&self, symbol: &str) -> String {
        let digest = Sha256::digest(symbol.as_bytes());
        format!("0x{}", hex::encode(&digest[..ADDRESS_LEN]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub track: String,
    pub address: String,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub default_voucher: Option<String>,
    #[serde(default)]
    pub balances: BTreeMap<String, u64>,
    #[serde(default)]
    pub alias: Option<String>,
    /// Hashes of transactions touching this account. Rebuilt on load.
    #[serde(skip)]
    pub txs: Vec<String>,
}

impl Account {
    pub fn new(address: impl Into<String>, track: impl Into<String>) -> Self {
        Self {
            track: track.into(),
            address: address.into(),
            nonce: 0,
            default_voucher: None,
            balances: BTreeMap::new(),
            alias: None,
            txs: Vec::new(),
        }
    }

    pub fn balance_of(&self, symbol: &str) -> u64 {
        self.balances.get(symbol).copied().unwrap_or(0)
    }

    pub fn to_registration_event(&self) -> Msg {
        Msg::CustodialRegistration(EventCustodialRegistration {
            account: self.address.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voucher {
    pub name: String,
    pub symbol: String,
    pub address: String,
    pub decimals: u32,
    #[serde(default)]
    pub sink: String,
    #[serde(default)]
    pub commodity: String,
    #[serde(default)]
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    pub symbol: String,
    pub address: String,
    #[serde(default)]
    pub vouchers: Vec<Voucher>,
    /// Swap limit keyed by voucher address
    #[serde(default)]
    pub limits: BTreeMap<String, u64>,
}

impl Pool {
    pub fn has_voucher(&self, voucher_address: &str) -> bool {
        self.vouchers.iter().any(|v| v.address == voucher_address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tx {
    pub track: String,
    pub hash: String,
    pub to: String,
    pub from: String,
    /// Voucher symbol
    pub voucher: String,
    pub value: u64,
    pub when: DateTime<Utc>,
}

impl Tx {
    pub fn is_mint(&self) -> bool {
        self.from == ZERO_ADDRESS
    }

    pub fn to_event(&self, voucher_address: &str) -> Msg {
        if self.is_mint() {
            Msg::TokenMint(EventTokenMint {
                to: self.to.clone(),
                value: self.value,
                tx_hash: self.hash.clone(),
                voucher_address: voucher_address.to_string(),
            })
        } else {
            Msg::TokenTransfer(EventTokenTransfer {
                to: self.to.clone(),
                value: self.value,
                voucher_address: voucher_address.to_string(),
                tx_hash: self.hash.clone(),
                from: self.from.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "entropy exhausted",
            )))
        }
    }

    #[test]
    fn test_random_hex_length() {
        let hex = random_hex(&mut rand::thread_rng(), ADDRESS_LEN).unwrap();
        assert_eq!(hex.len(), 2 + ADDRESS_LEN * 2);
        assert!(hex.starts_with("0x"));
    }

    #[test]
    fn test_random_hex_short_read() {
        let err = random_hex(&mut BrokenRng, HASH_LEN).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortRandomRead {
                expected: HASH_LEN,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_sha256_hasher_is_stable() {
        let hasher = Sha256Hasher;
        let a = hasher.address_for("SRF");
        assert_eq!(a, hasher.address_for("SRF"));
        assert_ne!(a, hasher.address_for("CTY"));
        assert_eq!(a.len(), 2 + ADDRESS_LEN * 2);
    }

    #[test]
    fn test_account_txs_not_persisted() {
        let mut acc = Account::new("0x01", "track");
        acc.txs.push("0xff".to_string());
        acc.balances.insert("SRF".to_string(), 3);
        let bytes = serde_json::to_vec(&acc).unwrap();
        let decoded: Account = serde_json::from_slice(&bytes).unwrap();
        assert!(decoded.txs.is_empty());
        assert_eq!(decoded.balance_of("SRF"), 3);
        assert_eq!(decoded.balance_of("CTY"), 0);
    }

    #[test]
    fn test_mint_event_for_sentinel_sender() {
        let tx = Tx {
            track: "t".to_string(),
            hash: "0xff".to_string(),
            to: "0x01".to_string(),
            from: ZERO_ADDRESS.to_string(),
            voucher: "SRF".to_string(),
            value: 10,
            when: Utc::now(),
        };
        assert!(matches!(tx.to_event("0xaa"), Msg::TokenMint(ref e) if e.voucher_address == "0xaa"));

        let tx = Tx {
            from: "0x02".to_string(),
            ..tx
        };
        assert!(matches!(tx.to_event("0xaa"), Msg::TokenTransfer(ref e) if e.from == "0x02"));
    }
}
