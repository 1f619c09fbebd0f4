use chrono::Utc;
use uuid::Uuid;

use super::entity::{
    random_hex, Account, Pool, Tx, Voucher, ADDRESS_LEN, DEFAULT_DECIMALS, DEFAULT_POOL_LIMIT,
    HASH_LEN, ZERO_ADDRESS,
};
use super::ledger::Ledger;
use crate::error::Error;
use crate::event::Msg;
use crate::model::{
    AccountResult, BalanceResult, Last10TxResponse, MaxLimitResult, PoolDepositResult,
    PoolDetails, PoolSwapQuoteResult, PoolSwapResult, TokenHoldings, TrackStatusResult,
    VoucherDataResult,
};

/// Most entries returned by a transaction listing
pub const MAX_FETCHED_TXS: usize = 10;

pub(crate) fn parse_amount(amount: &str) -> Result<u64, Error> {
    amount
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::invalid_input(format!("amount {amount:?}: {e}")))
}

impl Ledger {
    fn emit(&mut self, msg: Msg) {
        if let Some(queue) = self.deferred.as_mut() {
            queue.push(msg);
        } else if let Some(emitter) = &self.emitter {
            emitter.emit(msg);
        }
    }

    /// Registers a new account and pays it the auto vouchers.
    ///
    /// The registration event goes out ahead of the funding events, and only
    /// once funding has succeeded.
    pub(crate) fn create_account(&mut self) -> Result<AccountResult, Error> {
        let address = random_hex(self.rng.as_mut(), ADDRESS_LEN)?;
        let track = Uuid::new_v4().to_string();
        let acc = Account::new(address.clone(), track.clone());

        self.save_account(&acc)?;
        let registration = acc.to_registration_event();
        self.insert_account(acc);

        self.deferred = Some(vec![registration]);
        let funded = self.fund_account(&address);
        let events = self.deferred.take().unwrap_or_default();
        if let Err(err) = funded {
            tracing::warn!(address = %address, withheld = events.len(), error = %err, "funding new account failed");
            return Err(err);
        }
        for msg in events {
            self.emit(msg);
        }

        if self.default_account == ZERO_ADDRESS {
            tracing::debug!(address = %address, "promoting first account to default account");
            self.default_account = address.clone();
        }
        tracing::debug!(address = %address, track = %track, "account created");

        Ok(AccountResult {
            public_key: address,
            tracking_id: track,
        })
    }

    /// Pays every auto voucher to a new account, from the default account while
    /// it can cover the amount and minted from the sentinel otherwise.
    fn fund_account(&mut self, address: &str) -> Result<(), Error> {
        for (symbol, value) in self.auto_vouchers.clone() {
            let voucher = self.voucher_by_symbol(&symbol).map_err(|_| {
                Error::not_found(format!("auto voucher {symbol} set but not resolved"))
            })?;
            let voucher_address = voucher.address.clone();
            let faucet = self.default_account.clone();
            let sender = match self.accounts.get(&faucet) {
                Some(acc) if acc.balance_of(&symbol) >= value => faucet,
                _ => {
                    tracing::debug!(faucet = %faucet, symbol = %symbol, "faucet cannot cover auto voucher, minting");
                    ZERO_ADDRESS.to_string()
                }
            };
            self.transfer(value, &sender, address, &voucher_address)?;
        }
        Ok(())
    }

    pub(crate) fn add_voucher(&mut self, symbol: &str) -> Result<Voucher, Error> {
        if symbol.is_empty() {
            return Err(Error::invalid_input("cannot add voucher with empty symbol"));
        }
        if self.vouchers.contains_key(symbol) {
            return Err(Error::already_exists(format!(
                "voucher with symbol {symbol}"
            )));
        }
        let voucher = Voucher {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            address: self.hasher.address_for(symbol),
            decimals: DEFAULT_DECIMALS,
            sink: String::new(),
            commodity: String::new(),
            location: String::new(),
        };
        self.save_voucher(&voucher)?;
        self.vouchers_address
            .insert(voucher.address.clone(), symbol.to_string());
        self.vouchers.insert(symbol.to_string(), voucher.clone());
        tracing::info!(symbol, address = %voucher.address, "added dev voucher");
        Ok(voucher)
    }

    pub(crate) fn register_pool(&mut self, name: &str, symbol: &str) -> Result<Pool, Error> {
        if symbol.is_empty() {
            return Err(Error::invalid_input("cannot register pool with empty symbol"));
        }
        let address = self.hasher.address_for(symbol);
        if self.pools.contains_key(&address) {
            return Err(Error::already_exists(format!("pool with symbol {symbol}")));
        }
        let vouchers: Vec<Voucher> = self.vouchers.values().cloned().collect();
        let limits = vouchers
            .iter()
            .map(|v| (v.address.clone(), DEFAULT_POOL_LIMIT))
            .collect();
        let pool = Pool {
            name: name.to_string(),
            symbol: symbol.to_string(),
            address: address.clone(),
            vouchers,
            limits,
        };
        self.save_pool(&pool)?;
        self.pools.insert(address, pool.clone());
        tracing::info!(name, symbol, address = %pool.address, vouchers = pool.vouchers.len(), "registered pool");
        Ok(pool)
    }

    /// Moves `value` of the voucher at `token_address` between accounts.
    ///
    /// Every check runs before anything is written, so a failed transfer leaves
    /// no trace. The sentinel account is never debited.
    pub(crate) fn transfer(
        &mut self,
        value: u64,
        from: &str,
        to: &str,
        token_address: &str,
    ) -> Result<Tx, Error> {
        let mut sender = self
            .accounts
            .get(from)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("sender account {from}")))?;
        let mut recipient = match self.accounts.get(to) {
            Some(acc) => acc.clone(),
            None if self.auto_create => {
                tracing::debug!(address = to, "auto-creating transfer recipient");
                Account::new(to, Uuid::new_v4().to_string())
            }
            None => {
                return Err(Error::not_found(format!(
                    "recipient account {to}, and not creating"
                )))
            }
        };
        let voucher = self.voucher_by_address(token_address)?.clone();
        let symbol = voucher.symbol.as_str();

        let is_mint = from == ZERO_ADDRESS;
        let balance = sender.balance_of(symbol);
        if !is_mint && balance < value {
            return Err(Error::InsufficientBalance {
                address: from.to_string(),
                voucher: symbol.to_string(),
                balance,
                requested: value,
            });
        }

        let self_transfer = from == to;
        if !self_transfer {
            let credited = recipient
                .balance_of(symbol)
                .checked_add(value)
                .ok_or_else(|| Error::invalid_input(format!("balance overflow for {to}")))?;
            recipient.balances.insert(symbol.to_string(), credited);
            if !is_mint {
                sender.balances.insert(symbol.to_string(), balance - value);
            }
            if recipient.default_voucher.is_none() {
                recipient.default_voucher = Some(symbol.to_string());
            }
        } else if sender.default_voucher.is_none() && sender.balances.contains_key(symbol) {
            sender.default_voucher = Some(symbol.to_string());
        }
        sender.nonce += 1;

        let tx = Tx {
            track: Uuid::new_v4().to_string(),
            hash: random_hex(self.rng.as_mut(), HASH_LEN)?,
            to: to.to_string(),
            from: from.to_string(),
            voucher: symbol.to_string(),
            value,
            when: Utc::now(),
        };

        self.save_tx(&tx)?;
        self.save_account(&sender)?;
        if !self_transfer {
            self.save_account(&recipient)?;
        }

        if !self_transfer {
            self.insert_account(recipient);
        }
        self.insert_account(sender);
        self.txs_track.insert(tx.track.clone(), tx.hash.clone());
        self.txs.insert(tx.hash.clone(), tx.clone());
        self.index_tx(&tx);

        self.emit(tx.to_event(&voucher.address));
        tracing::debug!(hash = %tx.hash, from, to, symbol = %tx.voucher, value, "token transfer created");
        Ok(tx)
    }

    pub(crate) fn check_balance(&self, address: &str) -> Result<BalanceResult, Error> {
        let acc = self.account(address)?;
        let symbol = acc
            .default_voucher
            .as_deref()
            .ok_or_else(|| Error::not_found(format!("default voucher for {address}")))?;
        let balance = acc.balances.get(symbol).ok_or_else(|| {
            Error::not_found(format!(
                "balance for default voucher {symbol} of {address}"
            ))
        })?;
        Ok(BalanceResult {
            balance: balance.to_string(),
            nonce: serde_json::Number::from(acc.nonce),
        })
    }

    pub(crate) fn track_account_status(&self, address: &str) -> Result<TrackStatusResult, Error> {
        self.account(address)?;
        Ok(TrackStatusResult { active: true })
    }

    pub(crate) fn fetch_vouchers(&self, address: &str) -> Result<Vec<TokenHoldings>, Error> {
        let acc = self.account(address)?;
        acc.balances
            .iter()
            .map(|(symbol, balance)| {
                let voucher = self.voucher_by_symbol(symbol)?;
                Ok(TokenHoldings {
                    contract_address: voucher.address.clone(),
                    token_symbol: voucher.symbol.clone(),
                    token_decimals: voucher.decimals.to_string(),
                    balance: balance.to_string(),
                })
            })
            .collect()
    }

    /// The [`MAX_FETCHED_TXS`] most recent transactions, newest first
    pub(crate) fn fetch_transactions(&self, address: &str) -> Result<Vec<Last10TxResponse>, Error> {
        let acc = self.account(address)?;
        let mut txs: Vec<&Tx> = acc.txs.iter().filter_map(|h| self.txs.get(h)).collect();
        txs.sort_by(|a, b| b.when.cmp(&a.when).then_with(|| b.hash.cmp(&a.hash)));
        txs.into_iter()
            .take(MAX_FETCHED_TXS)
            .map(|tx| {
                let voucher = self.voucher_by_symbol(&tx.voucher).map_err(|_| {
                    Error::not_found(format!(
                        "voucher {} in tx list but not found in voucher list",
                        tx.voucher
                    ))
                })?;
                Ok(Last10TxResponse {
                    sender: tx.from.clone(),
                    recipient: tx.to.clone(),
                    transfer_value: tx.value.to_string(),
                    contract_address: voucher.address.clone(),
                    tx_hash: tx.hash.clone(),
                    date_block: tx.when,
                    token_symbol: voucher.symbol.clone(),
                    token_decimals: voucher.decimals.to_string(),
                })
            })
            .collect()
    }

    pub(crate) fn voucher_data(&self, address: &str) -> Result<VoucherDataResult, Error> {
        let voucher = self.voucher_by_address(address)?;
        Ok(VoucherDataResult {
            token_name: voucher.name.clone(),
            token_symbol: voucher.symbol.clone(),
            token_decimals: voucher.decimals,
            sink_address: voucher.sink.clone(),
            token_commodity: voucher.commodity.clone(),
            token_location: voucher.location.clone(),
        })
    }

    fn pool_member(&self, pool: &Pool, voucher_address: &str) -> Result<(), Error> {
        if pool.has_voucher(voucher_address) {
            Ok(())
        } else {
            Err(Error::not_found(format!(
                "voucher {voucher_address} in pool {}",
                pool.address
            )))
        }
    }

    pub(crate) fn pool_deposit(
        &self,
        amount: &str,
        from: &str,
        pool_address: &str,
        token_address: &str,
    ) -> Result<PoolDepositResult, Error> {
        parse_amount(amount)?;
        self.account(from)?;
        self.voucher_by_address(token_address)?;
        let pool = self.pool(pool_address)?;
        self.pool_member(pool, token_address)?;
        Ok(PoolDepositResult {
            tracking_id: Uuid::new_v4().to_string(),
        })
    }

    /// Quotes the input amount back unchanged; no fees are simulated.
    pub(crate) fn get_pool_swap_quote(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
    ) -> Result<PoolSwapQuoteResult, Error> {
        parse_amount(amount)?;
        self.account(from)?;
        let pool = self.pool(pool_address)?;
        self.pool_member(pool, from_token_address)?;
        Ok(PoolSwapQuoteResult {
            includes_fees_deduction: false,
            out_value: amount.to_string(),
        })
    }

    pub(crate) fn pool_swap(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapResult, Error> {
        parse_amount(amount)?;
        let pool = self.pool(pool_address)?;
        self.account(from)?;
        self.pool_member(pool, from_token_address)?;
        self.pool_member(pool, to_token_address)?;
        Ok(PoolSwapResult {
            tracking_id: Uuid::new_v4().to_string(),
        })
    }

    pub(crate) fn get_swap_from_token_max_limit(
        &self,
        pool_address: &str,
        from_token_address: &str,
    ) -> Result<MaxLimitResult, Error> {
        let pool = self.pool(pool_address)?;
        let limit = pool.limits.get(from_token_address).ok_or_else(|| {
            Error::not_found(format!(
                "limit for token {from_token_address} in pool {pool_address}"
            ))
        })?;
        Ok(MaxLimitResult {
            max: limit.to_string(),
        })
    }

    pub(crate) fn fetch_top_pools(&self) -> Vec<PoolDetails> {
        let mut pools: Vec<&Pool> = self.pools.values().collect();
        pools.sort_by(|a, b| a.name.cmp(&b.name));
        pools
            .into_iter()
            .map(|p| PoolDetails {
                pool_name: p.name.clone(),
                pool_symbol: p.symbol.clone(),
                pool_contract_address: p.address.clone(),
            })
            .collect()
    }

    /// The pool's vouchers, with the account's balance in each
    pub(crate) fn get_pool_swappable_from_vouchers(
        &self,
        pool_address: &str,
        address: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        let pool = self.pool(pool_address)?;
        let acc = self.accounts.get(address);
        Ok(pool
            .vouchers
            .iter()
            .map(|v| TokenHoldings {
                contract_address: v.address.clone(),
                token_symbol: v.symbol.clone(),
                token_decimals: v.decimals.to_string(),
                balance: acc.map_or(0, |a| a.balance_of(&v.symbol)).to_string(),
            })
            .collect())
    }

    /// Every registered voucher, with the pool's limit for it as balance
    pub(crate) fn get_pool_swappable_vouchers(
        &self,
        pool_address: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        let pool = self.pool(pool_address)?;
        Ok(self
            .vouchers
            .values()
            .map(|v| TokenHoldings {
                contract_address: v.address.clone(),
                token_symbol: v.symbol.clone(),
                token_decimals: v.decimals.to_string(),
                balance: pool
                    .limits
                    .get(&v.address)
                    .copied()
                    .unwrap_or(DEFAULT_POOL_LIMIT)
                    .to_string(),
            })
            .collect())
    }
}
