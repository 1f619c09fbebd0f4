//! Traits for account service implementations
//!
//! Both the HTTP transport and the development emulator implement
//! [`AccountService`], so callers can swap one for the other.

use async_trait::async_trait;

use crate::error::Error;
use crate::model::*;

/// Custodial account, voucher, pool and alias operations
#[async_trait]
pub trait AccountService: Send + Sync {
    // Account methods

    /// Create a new custodial account
    async fn create_account(&self) -> Result<AccountResult, Error>;

    /// Balance of the account's default voucher
    async fn check_balance(&self, public_key: &str) -> Result<BalanceResult, Error>;

    /// Whether the account has been activated
    async fn track_account_status(&self, public_key: &str) -> Result<TrackStatusResult, Error>;

    // Voucher methods

    /// Vouchers held by the account
    async fn fetch_vouchers(&self, public_key: &str) -> Result<Vec<TokenHoldings>, Error>;

    /// Up to ten most recent transfers involving the account
    async fn fetch_transactions(&self, public_key: &str) -> Result<Vec<Last10TxResponse>, Error>;

    /// Metadata for a voucher contract
    async fn voucher_data(&self, address: &str) -> Result<VoucherDataResult, Error>;

    /// Transfer `amount` of the voucher at `token_address`
    async fn token_transfer(
        &self,
        amount: &str,
        from: &str,
        to: &str,
        token_address: &str,
    ) -> Result<TokenTransferResponse, Error>;

    // Alias methods

    /// Resolve an alias to its account address
    async fn check_alias_address(&self, alias: &str) -> Result<AliasAddress, Error>;

    /// Bind an alias derived from `hint` to the account
    async fn request_alias(&self, public_key: &str, hint: &str)
        -> Result<RequestAliasResult, Error>;

    // Pool methods

    async fn pool_deposit(
        &self,
        amount: &str,
        from: &str,
        pool_address: &str,
        token_address: &str,
    ) -> Result<PoolDepositResult, Error>;

    async fn fetch_top_pools(&self) -> Result<Vec<PoolDetails>, Error>;

    /// Vouchers the account can swap from in the pool
    async fn get_pool_swappable_from_vouchers(
        &self,
        pool_address: &str,
        public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error>;

    /// Vouchers the pool can swap to
    async fn get_pool_swappable_vouchers(
        &self,
        pool_address: &str,
        public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error>;

    async fn get_pool_swap_quote(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapQuoteResult, Error>;

    async fn pool_swap(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapResult, Error>;

    /// Largest amount of `from_token_address` the pool accepts in one swap
    async fn get_swap_from_token_max_limit(
        &self,
        pool_address: &str,
        from_token_address: &str,
        to_token_address: &str,
        public_key: &str,
    ) -> Result<MaxLimitResult, Error>;
}

/// SMS notifications sent through the external messaging service
#[async_trait]
pub trait SmsService: Send + Sync {
    async fn send_upsell_sms(
        &self,
        inviter_phone: &str,
        invitee_phone: &str,
    ) -> Result<SendSmsResponse, Error>;

    async fn send_address_sms(&self, public_key: &str, origin_phone: &str) -> Result<(), Error>;

    async fn send_pin_reset_sms(&self, admin: &str, phone: &str) -> Result<(), Error>;
}
