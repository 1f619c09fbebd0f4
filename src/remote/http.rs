//! HTTP client for the custodial, data, alias and SMS services.
//!
//! Every endpoint answers with a `{ok, description, result}` envelope on
//! success and `{ok, description, errorCode}` with a 4xx/5xx status on
//! failure. [`HttpAccountService`] unwraps the envelope, retries server errors,
//! rate limits and timeouts with backoff, and decodes `result` into the model
//! types.

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;
use url::Url;

use crate::config::{ApiConfig, RetryConfig};
use crate::error::Error;
use crate::model::*;
use crate::service::{AccountService, SmsService};

/// Appended to alias hints that are not already fully qualified
pub const ENS_DOMAIN: &str = ".sarafu.eth";

#[derive(Deserialize)]
struct HoldingsResult {
    holdings: Vec<TokenHoldings>,
}

#[derive(Deserialize)]
struct TransfersResult {
    transfers: Vec<Last10TxResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenDetailsResult {
    token_details: VoucherDataResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TopPoolsResult {
    top_pools: Vec<PoolDetails>,
}

#[derive(Deserialize)]
struct FilteredResult {
    filtered: Vec<TokenHoldings>,
}

/// [`AccountService`] and [`SmsService`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpAccountService {
    client: Client,
    config: ApiConfig,
    retry: RetryConfig,
}

impl HttpAccountService {
    pub fn new(config: ApiConfig, retry: RetryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry,
        }
    }

    /// Builds the service from [`ApiConfig::from_env`] and [`RetryConfig::from_env`].
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid
    pub fn from_env() -> Result<Self, Error> {
        Ok(Self::new(ApiConfig::from_env()?, RetryConfig::from_env()?))
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Qualifies a bare alias hint with [`ENS_DOMAIN`]
    pub fn to_fqdn(hint: &str) -> String {
        if hint.contains('.') {
            hint.to_string()
        } else {
            format!("{hint}{ENS_DOMAIN}")
        }
    }

    /// Sends the request built by `request_builder`, retrying server errors,
    /// timeouts and connection failures. A 429 waits for `Retry-After` (capped
    /// at the max delay) before the next attempt.
    ///
    /// Other client errors and the last failed attempt are returned as
    /// responses so the caller can decode the error envelope.
    async fn execute_with_retry<F>(&self, request_builder: F) -> Result<reqwest::Response, Error>
    where
        F: Fn() -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request =
                request_builder().timeout(StdDuration::from_secs(self.retry.timeout_seconds));

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retry.max_attempts
                    {
                        let retry_after = Self::extract_retry_after(&response).unwrap_or(60);
                        tracing::warn!(
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            retry_after,
                            "rate limited, retrying"
                        );
                        let delay_ms =
                            std::cmp::min(retry_after.saturating_mul(1000), self.retry.max_delay_ms);
                        sleep(StdDuration::from_millis(delay_ms)).await;
                        continue;
                    }
                    if status.is_server_error() && attempt < self.retry.max_attempts {
                        tracing::warn!(
                            %status,
                            attempt,
                            max_attempts = self.retry.max_attempts,
                            "server error, retrying"
                        );
                        sleep(self.calculate_backoff_delay(attempt)).await;
                        continue;
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let err = Error::from(e);
                    if !err.is_retryable() || attempt >= self.retry.max_attempts {
                        tracing::error!(attempt, error = %err, "request failed");
                        return Err(err);
                    }
                    tracing::warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        "request failed, retrying"
                    );
                    sleep(self.calculate_backoff_delay(attempt)).await;
                }
            }
        }
    }

    /// Seconds from a `Retry-After` header, when it holds a plain number
    fn extract_retry_after(response: &reqwest::Response) -> Option<u64> {
        response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
    }

    /// min(base_delay * 2^(attempt-1) + jitter, max_delay), jitter in [0, base_delay/2]
    fn calculate_backoff_delay(&self, attempt: u32) -> StdDuration {
        use rand::Rng;

        let base_delay = self.retry.base_delay_ms;
        let max_delay = self.retry.max_delay_ms;

        let exponential_delay =
            base_delay.saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        let jitter = rand::thread_rng().gen_range(0..=base_delay / 2);
        let final_delay = std::cmp::min(exponential_delay.saturating_add(jitter), max_delay);

        tracing::debug!(
            attempt,
            delay_ms = final_delay,
            exponential_ms = exponential_delay,
            jitter_ms = jitter,
            "calculated backoff delay"
        );

        StdDuration::from_millis(final_delay)
    }

    /// Sends a request and unwraps the response envelope.
    async fn request_raw(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<OkResponse, Error> {
        tracing::info!(%method, %url, "sending request");
        let token = self.config.bearer_token.expose_secret();

        let response = self
            .execute_with_retry(|| {
                let mut request_builder = self
                    .client
                    .request(method.clone(), url.clone())
                    .bearer_auth(token)
                    .header(CONTENT_TYPE, "application/json");
                if let Some(body) = &body {
                    request_builder = request_builder.json(body);
                }
                request_builder
            })
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        tracing::debug!(%url, %status, len = bytes.len(), "received response");

        if status.is_client_error() || status.is_server_error() {
            let err: ErrResponse = serde_json::from_slice(&bytes).map_err(|_| {
                Error::RequestFailed(format!(
                    "Request to {url} failed with status {status}: {}",
                    String::from_utf8_lossy(&bytes)
                ))
            })?;
            tracing::error!(%url, %status, description = %err.description, "api error");
            return Err(Error::Api {
                description: err.description,
                error_code: err.error_code,
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| Error::ResponseParsingFailed(e.to_string()))
    }

    /// Sends a request and decodes the envelope's non-empty `result`.
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<T, Error> {
        let envelope = self.request_raw(method, url, body).await?;
        if envelope.result.is_empty() {
            return Err(Error::ResponseParsingFailed("Empty api result".to_string()));
        }
        serde_json::from_value(serde_json::Value::Object(envelope.result))
            .map_err(|e| Error::ResponseParsingFailed(e.to_string()))
    }

    async fn request_empty(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<(), Error> {
        self.request_raw(method, url, body).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountService for HttpAccountService {
    async fn create_account(&self) -> Result<AccountResult, Error> {
        self.request_json(Method::POST, self.config.create_account_url()?, None)
            .await
    }

    async fn check_balance(&self, public_key: &str) -> Result<BalanceResult, Error> {
        self.request_json(Method::GET, self.config.balance_url(public_key)?, None)
            .await
    }

    async fn track_account_status(&self, public_key: &str) -> Result<TrackStatusResult, Error> {
        self.request_json(Method::GET, self.config.track_url(public_key)?, None)
            .await
    }

    async fn fetch_vouchers(&self, public_key: &str) -> Result<Vec<TokenHoldings>, Error> {
        let r: HoldingsResult = self
            .request_json(
                Method::GET,
                self.config.voucher_holdings_url(public_key)?,
                None,
            )
            .await?;
        Ok(r.holdings)
    }

    async fn fetch_transactions(&self, public_key: &str) -> Result<Vec<Last10TxResponse>, Error> {
        let r: TransfersResult = self
            .request_json(
                Method::GET,
                self.config.voucher_transfers_url(public_key)?,
                None,
            )
            .await?;
        Ok(r.transfers)
    }

    async fn voucher_data(&self, address: &str) -> Result<VoucherDataResult, Error> {
        let r: TokenDetailsResult = self
            .request_json(Method::GET, self.config.voucher_data_url(address)?, None)
            .await?;
        Ok(r.token_details)
    }

    async fn token_transfer(
        &self,
        amount: &str,
        from: &str,
        to: &str,
        token_address: &str,
    ) -> Result<TokenTransferResponse, Error> {
        let body = json!({
            "amount": amount,
            "from": from,
            "to": to,
            "tokenAddress": token_address,
        });
        self.request_json(Method::POST, self.config.token_transfer_url()?, Some(body))
            .await
    }

    async fn check_alias_address(&self, alias: &str) -> Result<AliasAddress, Error> {
        tracing::info!(alias, "resolving alias to address");
        let r: AliasEnsAddressResult = self
            .request_json(Method::GET, self.config.alias_resolver_url(alias)?, None)
            .await?;
        Ok(AliasAddress { address: r.address })
    }

    async fn request_alias(
        &self,
        public_key: &str,
        hint: &str,
    ) -> Result<RequestAliasResult, Error> {
        let hint = Self::to_fqdn(hint);
        tracing::info!(address = public_key, hint = %hint, "requesting alias");
        let body = json!({
            "address": public_key,
            "hint": hint,
        });
        let r: AliasEnsResult = self
            .request_json(
                Method::POST,
                self.config.alias_registration_url()?,
                Some(body),
            )
            .await?;
        tracing::info!(alias = %r.name, "alias assigned");
        Ok(RequestAliasResult { alias: r.name })
    }

    async fn pool_deposit(
        &self,
        amount: &str,
        from: &str,
        pool_address: &str,
        token_address: &str,
    ) -> Result<PoolDepositResult, Error> {
        let body = json!({
            "amount": amount,
            "from": from,
            "poolAddress": pool_address,
            "tokenAddress": token_address,
        });
        self.request_json(Method::POST, self.config.pool_deposit_url()?, Some(body))
            .await
    }

    async fn fetch_top_pools(&self) -> Result<Vec<PoolDetails>, Error> {
        let r: TopPoolsResult = self
            .request_json(Method::GET, self.config.top_pools_url()?, None)
            .await?;
        Ok(r.top_pools)
    }

    async fn get_pool_swappable_from_vouchers(
        &self,
        pool_address: &str,
        public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        let url = self
            .config
            .pool_vouchers_url(pool_address, &["from", public_key])?;
        let r: FilteredResult = self.request_json(Method::GET, url, None).await?;
        Ok(r.filtered)
    }

    async fn get_pool_swappable_vouchers(
        &self,
        pool_address: &str,
        public_key: &str,
    ) -> Result<Vec<TokenHoldings>, Error> {
        let url = self
            .config
            .pool_vouchers_url(pool_address, &["to", public_key])?;
        let r: FilteredResult = self.request_json(Method::GET, url, None).await?;
        Ok(r.filtered)
    }

    async fn get_pool_swap_quote(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapQuoteResult, Error> {
        let body = json!({
            "amount": amount,
            "from": from,
            "fromTokenAddress": from_token_address,
            "poolAddress": pool_address,
            "toTokenAddress": to_token_address,
        });
        self.request_json(Method::POST, self.config.pool_swap_quote_url()?, Some(body))
            .await
    }

    async fn pool_swap(
        &self,
        amount: &str,
        from: &str,
        from_token_address: &str,
        pool_address: &str,
        to_token_address: &str,
    ) -> Result<PoolSwapResult, Error> {
        let body = json!({
            "amount": amount,
            "from": from,
            "fromTokenAddress": from_token_address,
            "poolAddress": pool_address,
            "toTokenAddress": to_token_address,
        });
        self.request_json(Method::POST, self.config.pool_swap_url()?, Some(body))
            .await
    }

    async fn get_swap_from_token_max_limit(
        &self,
        pool_address: &str,
        from_token_address: &str,
        to_token_address: &str,
        public_key: &str,
    ) -> Result<MaxLimitResult, Error> {
        let url = self.config.pool_vouchers_url(
            pool_address,
            &["limit", from_token_address, to_token_address, public_key],
        )?;
        self.request_json(Method::GET, url, None).await
    }
}

#[async_trait]
impl SmsService for HttpAccountService {
    async fn send_upsell_sms(
        &self,
        inviter_phone: &str,
        invitee_phone: &str,
    ) -> Result<SendSmsResponse, Error> {
        let body = json!({
            "inviterPhone": inviter_phone,
            "inviteePhone": invitee_phone,
        });
        self.request_json(Method::POST, self.config.send_sms_url()?, Some(body))
            .await
    }

    async fn send_address_sms(&self, public_key: &str, origin_phone: &str) -> Result<(), Error> {
        let url = self.config.external_sms_url("address")?;
        tracing::info!(%url, address = public_key, "sending an address sms");
        let body = json!({
            "address": public_key,
            "originPhone": origin_phone,
        });
        self.request_empty(Method::POST, url, Some(body)).await
    }

    async fn send_pin_reset_sms(&self, admin: &str, phone: &str) -> Result<(), Error> {
        let url = self.config.external_sms_url("pinreset")?;
        tracing::info!(%url, admin, "sending pin reset sms");
        let body = json!({
            "admin": admin,
            "phone": phone,
        });
        self.request_empty(Method::POST, url, Some(body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(config: RetryConfig) -> HttpAccountService {
        let base = Url::parse("http://localhost:5003").unwrap();
        HttpAccountService::new(ApiConfig::with_single_base(base, "token"), config)
    }

    #[test]
    fn test_to_fqdn() {
        assert_eq!(HttpAccountService::to_fqdn("foo"), "foo.sarafu.eth");
        assert_eq!(HttpAccountService::to_fqdn("foo.eth"), "foo.eth");
    }

    #[test]
    fn test_calculate_backoff_delay() {
        let svc = service(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            timeout_seconds: 10,
        });

        let delay1 = svc.calculate_backoff_delay(1);
        assert!(delay1.as_millis() >= 1000);
        assert!(delay1.as_millis() <= 1500);

        let delay2 = svc.calculate_backoff_delay(2);
        assert!(delay2.as_millis() >= 2000);
        assert!(delay2.as_millis() <= 2500);

        let delay3 = svc.calculate_backoff_delay(3);
        assert!(delay3.as_millis() >= 4000);
        assert!(delay3.as_millis() <= 4500);

        assert_eq!(svc.calculate_backoff_delay(10).as_millis(), 10000);
    }

    #[test]
    fn test_calculate_backoff_delay_does_not_overflow() {
        let svc = service(RetryConfig::for_tests());
        assert_eq!(svc.calculate_backoff_delay(200).as_millis(), 50);
    }
}
