use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response from account creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResult {
    pub public_key: String,
    pub tracking_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceResult {
    pub balance: String,
    pub nonce: serde_json::Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackStatusResult {
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransferResponse {
    pub tracking_id: String,
}

/// One voucher held by an account, as listed by the data service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenHoldings {
    pub contract_address: String,
    pub token_symbol: String,
    pub token_decimals: String,
    pub balance: String,
}

/// One entry of the last-ten transfers listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Last10TxResponse {
    pub sender: String,
    pub recipient: String,
    pub transfer_value: String,
    pub contract_address: String,
    pub tx_hash: String,
    pub date_block: DateTime<Utc>,
    pub token_symbol: String,
    pub token_decimals: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherDataResult {
    pub token_name: String,
    pub token_symbol: String,
    pub token_decimals: u32,
    pub sink_address: String,
    pub token_commodity: String,
    pub token_location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasAddress {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestAliasResult {
    pub alias: String,
}

/// Response from the alias (ENS) registration service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasEnsResult {
    pub address: String,
    pub auto_choose: bool,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEnsAddressResult {
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDepositResult {
    pub tracking_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSwapQuoteResult {
    pub includes_fees_deduction: bool,
    pub out_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSwapResult {
    pub tracking_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolDetails {
    pub pool_name: String,
    pub pool_symbol: String,
    pub pool_contract_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxLimitResult {
    pub max: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendSmsResponse {
    #[serde(default)]
    pub message: String,
}

/// Success envelope wrapped around every custodial API result
#[derive(Debug, Clone, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub result: serde_json::Map<String, serde_json::Value>,
}

/// Error envelope returned with a 4xx/5xx status
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub description: String,
    pub error_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_account_result_wire_names() {
        let result: AccountResult = serde_json::from_value(json!({
            "publicKey": "0x623EFAFa8868df4B934dd12a8B26CB3Dd75A7AdD",
            "trackingId": "075ccc86-f6ef-4d33-97d5-e91cfb37aa0d"
        }))
        .unwrap();
        assert_eq!(result.public_key, "0x623EFAFa8868df4B934dd12a8B26CB3Dd75A7AdD");
        assert_eq!(result.tracking_id, "075ccc86-f6ef-4d33-97d5-e91cfb37aa0d");
    }

    #[test]
    fn test_balance_result_accepts_numeric_nonce() {
        let result: BalanceResult =
            serde_json::from_value(json!({"balance": "0.003 CELO", "nonce": 0})).unwrap();
        assert_eq!(result.balance, "0.003 CELO");
        assert_eq!(result.nonce, serde_json::Number::from(0));
    }

    #[test]
    fn test_ok_response_without_result() {
        let response: OkResponse =
            serde_json::from_value(json!({"ok": true, "description": "done"})).unwrap();
        assert!(response.ok);
        assert!(response.result.is_empty());
    }
}
