//! Development stand-in for the custodial and data services.
//!
//! [`DevAccountService`] keeps accounts, vouchers, pools, transactions and
//! aliases in memory and implements [`AccountService`] on top of them, so
//! callers can run against it without a live backend. Given a
//! [`KeyValueStore`], every mutation is written through and the whole state is
//! reloaded on construction.
//!
//! # Examples
//!
//! ```rust
//! use sarafu_api::dev::DevAccountService;
//! use sarafu_api::service::AccountService;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sarafu_api::Error> {
//! let svc = DevAccountService::builder()
//!     .with_auto_voucher("SRF", 500)
//!     .build()?;
//!
//! let account = svc.create_account().await?;
//! let balance = svc.check_balance(&account.public_key).await?;
//! assert_eq!(balance.balance, "500");
//!
//! let alias = svc.request_alias(&account.public_key, "foo").await?;
//! assert_eq!(alias.alias, "foo.sarafu.local");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::RngCore;

use crate::config::DevConfig;
use crate::error::Error;
use crate::event::Emitter;
use crate::model::*;
use crate::service::AccountService;
use crate::store::KeyValueStore;

mod alias;
pub mod entity;
mod ledger;
mod operations;

pub use alias::{is_valid_alias_hint, is_valid_phone_number, SEARCH_DOMAIN};
pub use entity::{Account, AddressHasher, Pool, Sha256Hasher, Tx, Voucher, ZERO_ADDRESS};
pub use ledger::LoadPolicy;
pub use operations::MAX_FETCHED_TXS;

use ledger::Ledger;
use operations::parse_amount;

/// In-memory account service, optionally persisted to a [`KeyValueStore`].
///
/// Clones share the same state. All operations serialize on one lock.
#[derive(Debug, Clone)]
pub struct DevAccountService {
    inner: Arc<Mutex<Ledger>>,
}

impl Default for DevAccountService {
    fn default() -> Self {
        Self::new()
    }
}

impl DevAccountService {
    /// Creates an empty, purely in-memory service with no auto vouchers.
    #[must_use]
    pub fn new() -> Self {
        let ledger = Ledger::new(None, b"__".to_vec(), Arc::new(Sha256Hasher));
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn builder() -> DevAccountServiceBuilder {
        DevAccountServiceBuilder::default()
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a voucher whose address is derived from its symbol.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty symbol and
    /// [`Error::AlreadyExists`] if the symbol is taken.
    pub fn add_voucher(&self, symbol: &str) -> Result<Voucher, Error> {
        self.ledger().add_voucher(symbol)
    }

    /// Registers a pool seeded with every voucher known at this point.
    pub fn register_pool(&self, name: &str, symbol: &str) -> Result<Pool, Error> {
        self.ledger().register_pool(name, symbol)
    }

    /// Snapshot of every alias binding
    pub fn aliases(&self) -> HashMap<String, String> {
        self.ledger().aliases.clone()
    }

    /// Account that pays auto vouchers to new accounts
    pub fn default_account(&self) -> String {
        self.ledger().default_account.clone()
    }

    pub fn account(&self, address: &str) -> Option<Account> {
        self.ledger().accounts.get(address).cloned()
    }

    pub fn transaction(&self, hash: &str) -> Option<Tx> {
        self.ledger().txs.get(hash).cloned()
    }

    /// Resolves an account by the tracking id returned when it was created
    pub fn account_by_tracking_id(&self, tracking_id: &str) -> Option<Account> {
        let ledger = self.ledger();
        let address = ledger.accounts_track.get(tracking_id)?;
        ledger.accounts.get(address).cloned()
    }

    /// Resolves a transaction by the tracking id returned from a transfer
    pub fn transaction_by_tracking_id(&self, tracking_id: &str) -> Option<Tx> {
        let ledger = self.ledger();
        let hash = ledger.txs_track.get(tracking_id)?;
        ledger.txs.get(hash).cloned()
    }
}

/// Builder for [`DevAccountService`]
pub struct DevAccountServiceBuilder {
    store: Option<Arc<dyn KeyValueStore>>,
    prefix: Vec<u8>,
    load_policy: LoadPolicy,
    auto_create: bool,
    auto_vouchers: Vec<(String, u64)>,
    emitter: Option<Emitter>,
    hasher: Arc<dyn AddressHasher>,
    rng: Option<Box<dyn RngCore + Send>>,
}

impl Default for DevAccountServiceBuilder {
    fn default() -> Self {
        Self {
            store: None,
            prefix: b"__".to_vec(),
            load_policy: LoadPolicy::default(),
            auto_create: false,
            auto_vouchers: Vec::new(),
            emitter: None,
            hasher: Arc::new(Sha256Hasher),
            rng: None,
        }
    }
}

impl DevAccountServiceBuilder {
    /// Starts from the settings in a [`DevConfig`]
    #[must_use]
    pub fn from_config(config: &DevConfig) -> Self {
        Self {
            prefix: config.store_prefix.clone(),
            load_policy: if config.skip_malformed {
                LoadPolicy::Skip
            } else {
                LoadPolicy::Abort
            },
            auto_create: config.auto_create,
            auto_vouchers: config.auto_vouchers.clone(),
            ..Self::default()
        }
    }

    /// Persist to and reload from `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Key prefix of every persisted record (default `__`)
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<Vec<u8>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_load_policy(mut self, policy: LoadPolicy) -> Self {
        self.load_policy = policy;
        self
    }

    /// Create unknown transfer recipients instead of rejecting the transfer
    #[must_use]
    pub fn with_auto_create(mut self, auto_create: bool) -> Self {
        self.auto_create = auto_create;
        self
    }

    /// Register `symbol` and pay `value` of it to every new account
    #[must_use]
    pub fn with_auto_voucher(mut self, symbol: &str, value: u64) -> Self {
        self.auto_vouchers.push((symbol.to_string(), value));
        self
    }

    #[must_use]
    pub fn with_emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn AddressHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Random source for account addresses and transaction hashes (default
    /// [`rand::rngs::OsRng`])
    #[must_use]
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    /// Loads persisted state and registers the auto vouchers.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read, a record is malformed
    /// under [`LoadPolicy::Abort`], or an auto voucher symbol is empty.
    pub fn build(self) -> Result<DevAccountService, Error> {
        let mut ledger = Ledger::new(self.store, self.prefix, self.hasher);
        ledger.auto_create = self.auto_create;
        if let Some(rng) = self.rng {
            ledger.rng = rng;
        }
        ledger.load(self.load_policy)?;

        for (symbol, value) in self.auto_vouchers {
            match ledger.add_voucher(&symbol) {
                Ok(_) => {}
                Err(Error::AlreadyExists(_)) => {
                    tracing::debug!(symbol = %symbol, "auto voucher already registered");
                }
                Err(err) => return Err(err),
            }
            ledger.auto_vouchers.push((symbol, value));
        }
        ledger.emitter = self.emitter;
        tracing::debug!(ledger = ?ledger, "dev account service ready");

        Ok(DevAccountService {
            inner: Arc::new(Mutex::new(ledger)),
        })
    }
}

#[async_trait]
impl AccountService for DevAccountService {
    async fn create_account(&self) -> Result<AccountResult, Error> {
        self.ledger().create_account()
    }

    async fn check_balance(&self, public_key: &str) -> Result<BalanceResult, Error> {
        self.ledger().check_balance(public_key)
    }

    async fn track_account_status(&self, public_key: &str) -> Result<TrackStatusResult, Error> {
        self.ledger().track_account_status(public_key)
    }

    async fn fetch_vouchers(&self, public_key: &str) -> Result<Vec<TokenHoldings>, Error> {
        self.ledger().fetch_vouchers(public_key)
    }

    async fn fetch_transactions(&self, public_key: &str) -> Result<Vec<Last10TxResponse>, Error> {
        self.ledger().fetch_transactions(public_key)
    }

    async fn voucher_data(&self, address: &str) -> Result<VoucherDataResult, Error> {
        self.ledger().voucher_data(address)
    }

    async fn token_transfer(
        &self,
        amount: &str,
        from: &str,
        to: &str,
        token_address: &str,
    ) -> Result<TokenTransferResponse, Error> {
        let value = parse_amount(amount)?;
        let tx = self.ledger().transfer(value, from, to, token_address)?;
        Ok(TokenTransferResponse {
            tracking_id: tx.track,
        })
    }

    async fn check_alias_address(&self, alias: &str) -> Result<AliasAddress, Error> {
        self.ledger().check_alias_address(alias)
    }

    async fn request_alias(
        &self,
        public_key: &str,
        hint: &str,
    ) -> Result<RequestAliasResult, Error> {
        self.ledger().request_alias(public_key, hint)
    }

    async fn pool_deposit(
        &self,
        amount: &str,
        from: &str,
        pool_address: &str,
        token_address: &str,
    ) -> Result<PoolDepositResult, Error> {
        self.ledger()
            .pool_deposit(amount, from, pool_address, token_address)
    }

    async fn fetch_top_pools(&self) -> Result<Vec<PoolDetails>, Error> {
        Ok(self.ledger().fetch_top_pools())
    }

    async fn get_pool_swappable_from_vouchers(
        &self,
        pool_address: &str,
        public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        self.ledger()
            .get_pool_swappable_from_vouchers(pool_address, public_key)
    }

    async fn get_pool_swappable_vouchers(
        &self,
        pool_address: &str,
        _public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        self.ledger().get_pool_swappable_vouchers(pool_address)
    }

    async fn get_pool_swap_quote(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        _to_token_address: &str,
    ) -> Result<PoolSwapQuoteResult, Error> {
        self.ledger()
            .get_pool_swap_quote(amount, from, from_token_address, pool_address)
    }

    async fn pool_swap(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapResult, Error> {
        self.ledger().pool_swap(
            amount,
            from,
            from_token_address,
            pool_address,
            to_token_address,
        )
    }

    async fn get_swap_from_token_max_limit(
        &self,
        pool_address: &str,
        from_token_address: &str,
        _to_token_address: &str,
        _public_key: &str,
    ) -> Result<MaxLimitResult, Error> {
        self.ledger()
            .get_swap_from_token_max_limit(pool_address, from_token_address)
    }
}
