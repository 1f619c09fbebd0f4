use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use uuid::Uuid;

use super::entity::{Account, AddressHasher, Pool, Tx, Voucher, ZERO_ADDRESS};
use crate::error::Error;
use crate::event::{Emitter, Msg};
use crate::store::KeyValueStore;

/// What to do with a persisted record that fails to decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPolicy {
    /// Fail the whole load on the first malformed record
    #[default]
    Abort,
    /// Log the record and keep loading
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Category {
    Account,
    Tx,
    Alias,
    Pool,
    Voucher,
}

impl Category {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Tx => "tx",
            Self::Alias => "alias",
            Self::Pool => "pool",
            Self::Voucher => "voucher",
        }
    }

    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "account" => Some(Self::Account),
            "tx" => Some(Self::Tx),
            "alias" => Some(Self::Alias),
            "pool" => Some(Self::Pool),
            "voucher" => Some(Self::Voucher),
            _ => None,
        }
    }
}

/// Authoritative in-memory copy of every emulated entity, written through to
/// an optional [`KeyValueStore`].
pub(crate) struct Ledger {
    store: Option<Arc<dyn KeyValueStore>>,
    prefix: Vec<u8>,
    pub(crate) hasher: Arc<dyn AddressHasher>,
    /// Source of addresses and transaction hashes
    pub(crate) rng: Box<dyn RngCore + Send>,
    pub(crate) emitter: Option<Emitter>,
    /// Events held back until the operation producing them has succeeded
    pub(crate) deferred: Option<Vec<Msg>>,
    pub(crate) auto_create: bool,
    pub(crate) auto_vouchers: Vec<(String, u64)>,
    pub(crate) default_account: String,
    pub(crate) accounts: HashMap<String, Account>,
    pub(crate) accounts_track: HashMap<String, String>,
    pub(crate) aliases: HashMap<String, String>,
    /// Keyed by symbol
    pub(crate) vouchers: BTreeMap<String, Voucher>,
    /// Voucher address to symbol
    pub(crate) vouchers_address: HashMap<String, String>,
    pub(crate) txs: HashMap<String, Tx>,
    pub(crate) txs_track: HashMap<String, String>,
    /// Keyed by pool address
    pub(crate) pools: BTreeMap<String, Pool>,
}

impl Ledger {
    pub(crate) fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        prefix: Vec<u8>,
        hasher: Arc<dyn AddressHasher>,
    ) -> Self {
        let mut accounts = HashMap::new();
        accounts.insert(ZERO_ADDRESS.to_string(), Account::new(ZERO_ADDRESS, ""));
        Self {
            store,
            prefix,
            hasher,
            rng: Box::new(OsRng),
            emitter: None,
            deferred: None,
            auto_create: false,
            auto_vouchers: Vec::new(),
            default_account: ZERO_ADDRESS.to_string(),
            accounts,
            accounts_track: HashMap::new(),
            aliases: HashMap::new(),
            vouchers: BTreeMap::new(),
            vouchers_address: HashMap::new(),
            txs: HashMap::new(),
            txs_track: HashMap::new(),
            pools: BTreeMap::new(),
        }
    }

    pub(crate) fn key_for(&self, category: Category, id: &str) -> Vec<u8> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(category.as_str().as_bytes());
        key.push(b'_');
        key.extend_from_slice(id.as_bytes());
        key
    }

    /// Loads every record under the prefix, then rebuilds the transaction index.
    pub(crate) fn load(&mut self, policy: LoadPolicy) -> Result<(), Error> {
        if let Some(store) = self.store.clone() {
            let entries = store.dump(&self.prefix)?;
            tracing::debug!(records = entries.len(), "loading persisted ledger");
            for (key, value) in entries {
                if let Err(err) = self.load_item(&key, &value) {
                    match policy {
                        LoadPolicy::Abort => return Err(err),
                        LoadPolicy::Skip => {
                            tracing::warn!(error = %err, "skipping malformed record");
                        }
                    }
                }
            }
        }
        self.index_all();
        Ok(())
    }

    fn load_item(&mut self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let rest = key
            .strip_prefix(self.prefix.as_slice())
            .ok_or_else(|| Error::malformed(key, "missing prefix"))?;
        let rest = std::str::from_utf8(rest).map_err(|e| Error::malformed(key, e.to_string()))?;
        let (tag, id) = rest
            .split_once('_')
            .ok_or_else(|| Error::malformed(key, "missing category separator"))?;
        let Some(category) = Category::parse(tag) else {
            tracing::warn!(category = tag, "unknown record category, skipping");
            return Ok(());
        };
        let decode_err = |e: serde_json::Error| Error::malformed(key, e.to_string());

        match category {
            Category::Account => {
                let acc: Account = serde_json::from_slice(value).map_err(decode_err)?;
                if !acc.track.is_empty() {
                    self.accounts_track.insert(acc.track.clone(), id.to_string());
                }
                if let Some(alias) = &acc.alias {
                    self.aliases.insert(alias.clone(), id.to_string());
                }
                tracing::trace!(address = id, "loaded account");
                self.accounts.insert(id.to_string(), acc);
            }
            Category::Tx => {
                let tx: Tx = serde_json::from_slice(value).map_err(decode_err)?;
                self.txs_track.insert(tx.track.clone(), id.to_string());
                tracing::trace!(hash = id, "loaded tx");
                self.txs.insert(id.to_string(), tx);
            }
            Category::Alias => {
                let address: String = serde_json::from_slice(value).map_err(decode_err)?;
                tracing::trace!(alias = id, address = %address, "loaded alias");
                self.aliases.insert(id.to_string(), address);
            }
            Category::Pool => {
                let pool: Pool = serde_json::from_slice(value).map_err(decode_err)?;
                tracing::trace!(pool = id, "loaded pool");
                self.pools.insert(id.to_string(), pool);
            }
            Category::Voucher => {
                let voucher: Voucher = serde_json::from_slice(value).map_err(decode_err)?;
                tracing::trace!(symbol = %voucher.symbol, "loaded voucher");
                self.vouchers_address
                    .insert(voucher.address.clone(), voucher.symbol.clone());
                self.vouchers.insert(voucher.symbol.clone(), voucher);
            }
        }
        Ok(())
    }

    /// Rebuilds every account's transaction list in `(when, hash)` order.
    fn index_all(&mut self) {
        for acc in self.accounts.values_mut() {
            acc.txs.clear();
        }
        let mut txs: Vec<Tx> = self.txs.values().cloned().collect();
        txs.sort_by(|a, b| a.when.cmp(&b.when).then_with(|| a.hash.cmp(&b.hash)));
        for tx in &txs {
            self.index_tx(tx);
        }
    }

    /// Appends the transaction to the sender's and, if different, the recipient's list
    pub(crate) fn index_tx(&mut self, tx: &Tx) {
        let mut parties = vec![tx.from.as_str()];
        if tx.to != tx.from {
            parties.push(tx.to.as_str());
        }
        for address in parties {
            let acc = self.accounts.entry(address.to_string()).or_insert_with(|| {
                tracing::warn!(address, tx = %tx.hash, "tx references unknown account, recreating");
                Account::new(address, Uuid::new_v4().to_string())
            });
            acc.txs.push(tx.hash.clone());
            tracing::trace!(address, tx = %tx.hash, "indexed tx");
        }
    }

    fn save<T: Serialize>(&self, category: Category, id: &str, value: &T) -> Result<(), Error> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let bytes = serde_json::to_vec(value)?;
        store.put(&self.key_for(category, id), &bytes)
    }

    pub(crate) fn save_account(&self, acc: &Account) -> Result<(), Error> {
        self.save(Category::Account, &acc.address, acc)
    }

    pub(crate) fn save_tx(&self, tx: &Tx) -> Result<(), Error> {
        self.save(Category::Tx, &tx.hash, tx)
    }

    pub(crate) fn save_alias(&self, alias: &str, address: &str) -> Result<(), Error> {
        self.save(Category::Alias, alias, &address)
    }

    pub(crate) fn save_pool(&self, pool: &Pool) -> Result<(), Error> {
        self.save(Category::Pool, &pool.address, pool)
    }

    pub(crate) fn save_voucher(&self, voucher: &Voucher) -> Result<(), Error> {
        self.save(Category::Voucher, &voucher.address, voucher)
    }

    /// Stores a new account in memory and in the tracking index
    pub(crate) fn insert_account(&mut self, acc: Account) {
        if !acc.track.is_empty() {
            self.accounts_track
                .insert(acc.track.clone(), acc.address.clone());
        }
        self.accounts.insert(acc.address.clone(), acc);
    }

    pub(crate) fn account(&self, address: &str) -> Result<&Account, Error> {
        self.accounts
            .get(address)
            .ok_or_else(|| Error::not_found(format!("account {address}")))
    }

    pub(crate) fn voucher_by_address(&self, address: &str) -> Result<&Voucher, Error> {
        let symbol = self
            .vouchers_address
            .get(address)
            .ok_or_else(|| Error::not_found(format!("voucher address {address}")))?;
        self.vouchers.get(symbol).ok_or_else(|| {
            Error::not_found(format!("voucher address {address} found but does not resolve"))
        })
    }

    pub(crate) fn voucher_by_symbol(&self, symbol: &str) -> Result<&Voucher, Error> {
        self.vouchers
            .get(symbol)
            .ok_or_else(|| Error::not_found(format!("voucher {symbol}")))
    }

    pub(crate) fn pool(&self, address: &str) -> Result<&Pool, Error> {
        self.pools
            .get(address)
            .ok_or_else(|| Error::not_found(format!("pool address {address}")))
    }
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("persistent", &self.store.is_some())
            .field("prefix", &String::from_utf8_lossy(&self.prefix))
            .field("default_account", &self.default_account)
            .field("accounts", &self.accounts.len())
            .field("aliases", &self.aliases.len())
            .field("vouchers", &self.vouchers.len())
            .field("txs", &self.txs.len())
            .field("pools", &self.pools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dev::entity::Sha256Hasher;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn ledger_with(store: Arc<MemoryStore>) -> Ledger {
        let store: Arc<dyn KeyValueStore> = store;
        Ledger::new(Some(store), b"__".to_vec(), Arc::new(Sha256Hasher))
    }

    fn tx(hash: &str, from: &str, to: &str, offset: i64) -> Tx {
        Tx {
            track: format!("track-{hash}"),
            hash: hash.to_string(),
            to: to.to_string(),
            from: from.to_string(),
            voucher: "SRF".to_string(),
            value: 1,
            when: Utc::now() + Duration::seconds(offset),
        }
    }

    #[test]
    fn test_key_layout() {
        let ledger = ledger_with(Arc::new(MemoryStore::new()));
        assert_eq!(ledger.key_for(Category::Tx, "0xff"), b"__tx_0xff".to_vec());
        assert_eq!(
            ledger.key_for(Category::Alias, "foo.sarafu.local"),
            b"__alias_foo.sarafu.local".to_vec()
        );
    }

    #[test]
    fn test_load_rebuilds_index_in_time_order() {
        let store = Arc::new(MemoryStore::new());
        let writer = ledger_with(store.clone());
        writer.save_account(&Account::new("0x01", "t1")).unwrap();
        writer.save_account(&Account::new("0x02", "t2")).unwrap();
        // saved out of order on purpose
        writer.save_tx(&tx("0xbb", "0x01", "0x02", 10)).unwrap();
        writer.save_tx(&tx("0xaa", "0x02", "0x01", 0)).unwrap();
        writer.save_tx(&tx("0xcc", "0x01", "0x01", 20)).unwrap();

        let mut ledger = ledger_with(store);
        ledger.load(LoadPolicy::Abort).unwrap();

        assert_eq!(ledger.accounts["0x01"].txs, vec!["0xaa", "0xbb", "0xcc"]);
        assert_eq!(ledger.accounts["0x02"].txs, vec!["0xaa", "0xbb"]);
        assert_eq!(ledger.accounts_track["t2"], "0x02");
        assert_eq!(ledger.txs_track["track-0xbb"], "0xbb");
        assert!(ledger.accounts.contains_key(ZERO_ADDRESS));
    }

    #[test]
    fn test_unknown_category_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"__session_abc", b"whatever").unwrap();
        let mut ledger = ledger_with(store);
        ledger.load(LoadPolicy::Abort).unwrap();
        assert_eq!(ledger.accounts.len(), 1);
    }

    #[test]
    fn test_malformed_record_policy() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"__account_0x01", b"{not json").unwrap();
        ledger_with(store.clone())
            .save_account(&Account::new("0x02", "t2"))
            .unwrap();

        let err = ledger_with(store.clone())
            .load(LoadPolicy::Abort)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { ref key, .. } if key == "__account_0x01"));

        let mut ledger = ledger_with(store);
        ledger.load(LoadPolicy::Skip).unwrap();
        assert!(ledger.accounts.contains_key("0x02"));
        assert!(!ledger.accounts.contains_key("0x01"));
    }

    #[test]
    fn test_key_without_separator_is_malformed() {
        let store = Arc::new(MemoryStore::new());
        store.put(b"__account", b"{}").unwrap();
        let err = ledger_with(store).load(LoadPolicy::Abort).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
    }

    #[test]
    fn test_in_memory_ledger_ignores_persistence() {
        let mut ledger = Ledger::new(None, b"__".to_vec(), Arc::new(Sha256Hasher));
        ledger.save_account(&Account::new("0x01", "t1")).unwrap();
        ledger.load(LoadPolicy::Abort).unwrap();
        assert_eq!(ledger.accounts.len(), 1);
    }
}
