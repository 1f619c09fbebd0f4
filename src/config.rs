//! Environment-driven configuration.
//!
//! Values are read from the process environment. Call [`load_dotenv`] first to
//! pick up a `.env` file in the working directory.

use std::env;

use secrecy::Secret;
use url::Url;

use crate::error::Error;

const CREATE_ACCOUNT_PATH: &str = "/api/v2/account/create";
const BALANCE_PATH_PREFIX: &str = "/api/account";
const TRACK_PATH: &str = "/api/v2/account/status";
const TOKEN_TRANSFER_PATH: &str = "/api/v2/token/transfer";
const VOUCHER_HOLDINGS_PATH_PREFIX: &str = "/api/v1/holdings";
const VOUCHER_TRANSFERS_PATH_PREFIX: &str = "/api/v1/transfers/last10";
const VOUCHER_DATA_PATH_PREFIX: &str = "/api/v1/token";
const POOL_DEPOSIT_PATH: &str = "/api/v2/pool/deposit";
const POOL_SWAP_QUOTE_PATH: &str = "/api/v2/pool/quote";
const POOL_SWAP_PATH: &str = "/api/v2/pool/swap";
const TOP_POOLS_PATH: &str = "/api/v1/pool/top";
const POOL_SWAPPABLE_VOUCHERS_PATH_PREFIX: &str = "/api/v1/pool";
const ALIAS_REGISTRATION_PATH: &str = "/api/v1/internal/register";
const ALIAS_RESOLVER_PATH: &str = "/api/v1/resolve";
const EXTERNAL_SMS_PATH_PREFIX: &str = "/api/v1/external";
const SEND_SMS_PATH: &str = "/api/v1/external/upsell";

/// Loads a `.env` file if one is present. Missing files are ignored.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Appends `prefix` (a `/`-separated path) and `extra` segments to `base`.
pub(crate) fn join_path(base: &Url, prefix: &str, extra: &[&str]) -> Result<Url, Error> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| Error::InvalidConfig(format!("{base} cannot be a base url")))?
        .pop_if_empty()
        .extend(prefix.split('/').filter(|s| !s.is_empty()))
        .extend(extra);
    Ok(url)
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_bool(name: &str, default: bool) -> Result<bool, Error> {
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<bool>()
            .map_err(|e| Error::InvalidConfig(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Base URLs and credentials for the remote services.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub custodial_url_base: Url,
    pub data_url_base: Url,
    pub alias_ens_url_base: Url,
    pub external_sms_url_base: Url,
    pub bearer_token: Secret<String>,
    pub include_stables: bool,
}

impl ApiConfig {
    /// Creates an ApiConfig from environment variables with default fallbacks
    ///
    /// Environment variables:
    /// - `CUSTODIAL_URL_BASE` (default: `http://localhost:5003`)
    /// - `DATA_URL_BASE` (default: `http://localhost:5006`)
    /// - `ALIAS_ENS_BASE` (default: `http://localhost:5015`)
    /// - `EXTERNAL_SMS_BASE` (default: `http://localhost:5035`)
    /// - `BEARER_TOKEN` (default: empty)
    /// - `INCLUDE_STABLES_PARAM` (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns an error if a base URL does not parse or a flag is not a boolean
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self {
            custodial_url_base: Url::parse(&env_or("CUSTODIAL_URL_BASE", "http://localhost:5003"))?,
            data_url_base: Url::parse(&env_or("DATA_URL_BASE", "http://localhost:5006"))?,
            alias_ens_url_base: Url::parse(&env_or("ALIAS_ENS_BASE", "http://localhost:5015"))?,
            external_sms_url_base: Url::parse(&env_or(
                "EXTERNAL_SMS_BASE",
                "http://localhost:5035",
            ))?,
            bearer_token: Secret::new(env_or("BEARER_TOKEN", "")),
            include_stables: env_bool("INCLUDE_STABLES_PARAM", false)?,
        })
    }

    /// Points every service at the same base URL. Mostly useful against a mock server.
    pub fn with_single_base(base: Url, bearer_token: &str) -> Self {
        Self {
            custodial_url_base: base.clone(),
            data_url_base: base.clone(),
            alias_ens_url_base: base.clone(),
            external_sms_url_base: base,
            bearer_token: Secret::new(bearer_token.to_string()),
            include_stables: false,
        }
    }

    pub fn create_account_url(&self) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, CREATE_ACCOUNT_PATH, &[])
    }

    pub fn balance_url(&self, public_key: &str) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, BALANCE_PATH_PREFIX, &[public_key])
    }

    pub fn track_url(&self, public_key: &str) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, TRACK_PATH, &[public_key])
    }

    pub fn token_transfer_url(&self) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, TOKEN_TRANSFER_PATH, &[])
    }

    pub fn pool_deposit_url(&self) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, POOL_DEPOSIT_PATH, &[])
    }

    pub fn pool_swap_quote_url(&self) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, POOL_SWAP_QUOTE_PATH, &[])
    }

    pub fn pool_swap_url(&self) -> Result<Url, Error> {
        join_path(&self.custodial_url_base, POOL_SWAP_PATH, &[])
    }

    /// Holdings endpoint. Appends `stables=true` when stable coins are requested.
    pub fn voucher_holdings_url(&self, public_key: &str) -> Result<Url, Error> {
        let mut url = join_path(&self.data_url_base, VOUCHER_HOLDINGS_PATH_PREFIX, &[public_key])?;
        if self.include_stables {
            url.query_pairs_mut().append_pair("stables", "true");
        }
        Ok(url)
    }

    pub fn voucher_transfers_url(&self, public_key: &str) -> Result<Url, Error> {
        join_path(&self.data_url_base, VOUCHER_TRANSFERS_PATH_PREFIX, &[public_key])
    }

    pub fn voucher_data_url(&self, address: &str) -> Result<Url, Error> {
        join_path(&self.data_url_base, VOUCHER_DATA_PATH_PREFIX, &[address])
    }

    pub fn top_pools_url(&self) -> Result<Url, Error> {
        join_path(&self.data_url_base, TOP_POOLS_PATH, &[])
    }

    /// `/api/v1/pool/{pool}/{segments...}` on the data service.
    pub fn pool_vouchers_url(&self, pool_address: &str, segments: &[&str]) -> Result<Url, Error> {
        let mut url = join_path(
            &self.data_url_base,
            POOL_SWAPPABLE_VOUCHERS_PATH_PREFIX,
            &[pool_address],
        )?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidConfig("data url cannot be a base url".to_string()))?
            .extend(segments);
        Ok(url)
    }

    pub fn send_sms_url(&self) -> Result<Url, Error> {
        join_path(&self.data_url_base, SEND_SMS_PATH, &[])
    }

    pub fn alias_registration_url(&self) -> Result<Url, Error> {
        join_path(&self.alias_ens_url_base, ALIAS_REGISTRATION_PATH, &[])
    }

    /// Resolver lookup, with the alias passed as the `name` query parameter.
    pub fn alias_resolver_url(&self, alias: &str) -> Result<Url, Error> {
        let mut url = join_path(&self.alias_ens_url_base, ALIAS_RESOLVER_PATH, &[])?;
        url.query_pairs_mut().append_pair("name", alias);
        Ok(url)
    }

    pub fn external_sms_url(&self, kind: &str) -> Result<Url, Error> {
        join_path(&self.external_sms_url_base, EXTERNAL_SMS_PATH_PREFIX, &[kind])
    }
}

/// Configuration for retry behavior in API requests
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds to cap exponential backoff
    pub max_delay_ms: u64,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            timeout_seconds: 10,
        }
    }
}

impl RetryConfig {
    /// Creates a RetryConfig from environment variables with default fallbacks
    ///
    /// Environment variables:
    /// - `API_RETRY_MAX_ATTEMPTS`: Maximum attempts (default: 3)
    /// - `API_RETRY_BASE_DELAY_MS`: Base delay in milliseconds (default: 1000)
    /// - `API_RETRY_MAX_DELAY_MS`: Maximum delay in milliseconds (default: 30000)
    /// - `API_REQUEST_TIMEOUT_SECONDS`: Request timeout in seconds (default: 10)
    ///
    /// # Errors
    ///
    /// Returns an error if any environment variable contains an invalid value
    pub fn from_env() -> Result<Self, Error> {
        let defaults = Self::default();
        let config = Self {
            max_attempts: parse_env("API_RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay_ms: parse_env("API_RETRY_BASE_DELAY_MS", defaults.base_delay_ms)?,
            max_delay_ms: parse_env("API_RETRY_MAX_DELAY_MS", defaults.max_delay_ms)?,
            timeout_seconds: parse_env("API_REQUEST_TIMEOUT_SECONDS", defaults.timeout_seconds)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Creates a RetryConfig with short delays for test environments
    pub fn for_tests() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 50,
            timeout_seconds: 5,
        }
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(Error::InvalidConfig(
                "base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::InvalidConfig(
                "max_delay_ms must be greater than or equal to base_delay_ms".to_string(),
            ));
        }
        if self.timeout_seconds == 0 {
            return Err(Error::InvalidConfig(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| Error::InvalidConfig(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(default),
    }
}

/// Settings for the development emulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevConfig {
    /// Key prefix for every persisted record
    pub store_prefix: Vec<u8>,
    /// Create unknown transfer recipients instead of failing
    pub auto_create: bool,
    /// Vouchers registered at startup and paid to every new account
    pub auto_vouchers: Vec<(String, u64)>,
    /// Skip malformed records on load instead of aborting
    pub skip_malformed: bool,
}

impl Default for DevConfig {
    fn default() -> Self {
        Self {
            store_prefix: b"__".to_vec(),
            auto_create: false,
            auto_vouchers: Vec::new(),
            skip_malformed: false,
        }
    }
}

impl DevConfig {
    /// Creates a DevConfig from environment variables
    ///
    /// Environment variables:
    /// - `DEV_STORE_PREFIX` (default: `__`)
    /// - `DEV_AUTO_CREATE` (default: `false`)
    /// - `DEV_AUTO_VOUCHERS`: comma separated `SYMBOL:amount` pairs
    /// - `DEV_SKIP_MALFORMED` (default: `false`)
    ///
    /// # Errors
    ///
    /// Returns an error if a flag is not a boolean or an auto voucher entry is malformed
    pub fn from_env() -> Result<Self, Error> {
        let auto_vouchers = match env::var("DEV_AUTO_VOUCHERS") {
            Ok(val) => parse_auto_vouchers(&val)?,
            Err(_) => Vec::new(),
        };
        let prefix = env_or("DEV_STORE_PREFIX", "__");
        if prefix.is_empty() {
            return Err(Error::InvalidConfig(
                "DEV_STORE_PREFIX must not be empty".to_string(),
            ));
        }
        Ok(Self {
            store_prefix: prefix.into_bytes(),
            auto_create: env_bool("DEV_AUTO_CREATE", false)?,
            auto_vouchers,
            skip_malformed: env_bool("DEV_SKIP_MALFORMED", false)?,
        })
    }
}

fn parse_auto_vouchers(val: &str) -> Result<Vec<(String, u64)>, Error> {
    val.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (symbol, amount) = entry.split_once(':').ok_or_else(|| {
                Error::InvalidConfig(format!("Invalid DEV_AUTO_VOUCHERS entry: {entry}"))
            })?;
            let amount = amount.trim().parse::<u64>().map_err(|e| {
                Error::InvalidConfig(format!("Invalid DEV_AUTO_VOUCHERS amount for {symbol}: {e}"))
            })?;
            Ok((symbol.trim().to_string(), amount))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;

    #[test]
    fn test_join_path_keeps_base_path() {
        let base = Url::parse("https://example.com/svc").unwrap();
        let url = join_path(&base, "/api/v1/token", &["0xabc"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/svc/api/v1/token/0xabc");

        let base = Url::parse("http://localhost:5003/").unwrap();
        let url = join_path(&base, CREATE_ACCOUNT_PATH, &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5003/api/v2/account/create");
    }

    #[test]
    #[serial]
    fn test_api_config_from_env_defaults() {
        for name in [
            "CUSTODIAL_URL_BASE",
            "DATA_URL_BASE",
            "ALIAS_ENS_BASE",
            "EXTERNAL_SMS_BASE",
            "BEARER_TOKEN",
            "INCLUDE_STABLES_PARAM",
        ] {
            env::remove_var(name);
        }

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.custodial_url_base.as_str(), "http://localhost:5003/");
        assert_eq!(config.data_url_base.as_str(), "http://localhost:5006/");
        assert!(config.bearer_token.expose_secret().is_empty());
        assert!(!config.include_stables);
        assert_eq!(
            config.balance_url("0xabc").unwrap().as_str(),
            "http://localhost:5003/api/account/0xabc"
        );
        assert_eq!(
            config.voucher_transfers_url("0xabc").unwrap().as_str(),
            "http://localhost:5006/api/v1/transfers/last10/0xabc"
        );
    }

    #[test]
    #[serial]
    fn test_api_config_invalid_url() {
        env::set_var("CUSTODIAL_URL_BASE", "not a url");
        let result = ApiConfig::from_env();
        assert!(matches!(result, Err(Error::UrlParse(_))));
        env::remove_var("CUSTODIAL_URL_BASE");
    }

    #[test]
    #[serial]
    fn test_include_stables_adds_query() {
        env::set_var("INCLUDE_STABLES_PARAM", "true");
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(
            config.voucher_holdings_url("0xabc").unwrap().as_str(),
            "http://localhost:5006/api/v1/holdings/0xabc?stables=true"
        );
        env::remove_var("INCLUDE_STABLES_PARAM");
    }

    #[test]
    fn test_alias_resolver_url_uses_query() {
        let config = ApiConfig::with_single_base(
            Url::parse("http://localhost:5015").unwrap(),
            "token",
        );
        assert_eq!(
            config.alias_resolver_url("foo.sarafu.eth").unwrap().as_str(),
            "http://localhost:5015/api/v1/resolve?name=foo.sarafu.eth"
        );
        assert_eq!(
            config
                .pool_vouchers_url("0xpool", &["from", "0xabc"])
                .unwrap()
                .as_str(),
            "http://localhost:5015/api/v1/pool/0xpool/from/0xabc"
        );
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 1000);
        assert_eq!(config.max_delay_ms, 30000);
        assert_eq!(config.timeout_seconds, 10);
    }

    #[test]
    #[serial]
    fn test_retry_config_from_env_validation() {
        env::set_var("API_RETRY_MAX_ATTEMPTS", "0");
        assert!(matches!(
            RetryConfig::from_env(),
            Err(Error::InvalidConfig(_))
        ));
        env::set_var("API_RETRY_MAX_ATTEMPTS", "abc");
        assert!(matches!(
            RetryConfig::from_env(),
            Err(Error::InvalidConfig(_))
        ));
        env::set_var("API_RETRY_MAX_ATTEMPTS", "5");
        let config = RetryConfig::from_env().unwrap();
        assert_eq!(config.max_attempts, 5);
        env::remove_var("API_RETRY_MAX_ATTEMPTS");
    }

    #[test]
    #[serial]
    fn test_dev_config_from_env() {
        env::set_var("DEV_AUTO_VOUCHERS", "SRF:500, CTY:20");
        env::set_var("DEV_AUTO_CREATE", "true");
        env::remove_var("DEV_STORE_PREFIX");
        env::remove_var("DEV_SKIP_MALFORMED");

        let config = DevConfig::from_env().unwrap();
        assert_eq!(config.store_prefix, b"__".to_vec());
        assert!(config.auto_create);
        assert!(!config.skip_malformed);
        assert_eq!(
            config.auto_vouchers,
            vec![("SRF".to_string(), 500), ("CTY".to_string(), 20)]
        );

        env::set_var("DEV_AUTO_VOUCHERS", "SRF");
        assert!(matches!(DevConfig::from_env(), Err(Error::InvalidConfig(_))));

        env::remove_var("DEV_AUTO_VOUCHERS");
        env::remove_var("DEV_AUTO_CREATE");
    }
}
