//! Ethereum rail: deposit-address payments verified through JSON-RPC
//! (`eth_getTransactionByHash`, `eth_getTransactionReceipt`,
//! `eth_blockNumber`).

use async_trait::async_trait;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{
    PaymentHandle, PaymentRail, RailError, RailMetadata, RefundResult, VerificationResult,
};
use crate::models::PaymentMethod;

pub const FINALITY_CONFIRMATIONS: u64 = 12;

pub struct EthereumRail {
    client: reqwest::Client,
    rpc_url: String,
    wallet: String,
}

impl EthereumRail {
    pub fn new(rpc_url: String, wallet: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            rpc_url,
            wallet,
        }
    }

    async fn rpc(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RailError> {
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(RailError::Unavailable(format!(
                "ethereum rpc returned {}",
                response.status()
            )));
        }

        let body: RpcEnvelope = response.json().await?;
        if let Some(err) = body.error {
            return Err(RailError::Unavailable(format!(
                "ethereum rpc error {}: {}",
                err.code, err.message
            )));
        }
        Ok(body.result.unwrap_or(serde_json::Value::Null))
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<serde_json::Value>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct EthTransaction {
    to: Option<String>,
    /// Hex-encoded wei.
    value: String,
}

#[derive(Debug, Deserialize)]
struct EthReceipt {
    /// "0x1" success, "0x0" reverted.
    status: Option<String>,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
}

/// Parses a 0x-prefixed hex quantity into a decimal wei amount.
fn parse_hex_quantity(hex: &str) -> Result<u128, RailError> {
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    u128::from_str_radix(digits, 16)
        .map_err(|_| RailError::Malformed(format!("hex quantity '{hex}'")))
}

fn check_settlement(
    tx: &EthTransaction,
    receipt: &EthReceipt,
    current_block: u64,
    wallet: &str,
    expected_amount: Decimal,
) -> Result<VerificationResult, RailError> {
    if receipt.status.as_deref() == Some("0x0") {
        return Ok(VerificationResult::failed());
    }

    let destination = tx.to.as_deref().unwrap_or_default();
    if !destination.eq_ignore_ascii_case(wallet) {
        return Err(RailError::Rejected(format!(
            "transaction destination {destination} is not the receiving wallet"
        )));
    }

    let mined_at = match &receipt.block_number {
        Some(block) => parse_hex_quantity(block)? as u64,
        None => return Ok(VerificationResult::pending(Some(0))),
    };
    let confirmations = current_block.saturating_sub(mined_at) + 1;
    if confirmations < FINALITY_CONFIRMATIONS {
        return Ok(VerificationResult::pending(Some(confirmations)));
    }

    let wei = parse_hex_quantity(&tx.value)?;
    let received = Decimal::from_u128(wei)
        .ok_or_else(|| RailError::Malformed(format!("wei amount {wei} out of range")))?;
    if received < expected_amount {
        return Err(RailError::AmountMismatch {
            expected: expected_amount,
            actual: received,
        });
    }

    Ok(VerificationResult::succeeded(received, Some(confirmations)))
}

#[async_trait]
impl PaymentRail for EthereumRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Eth
    }

    async fn initiate(
        &self,
        _amount: Decimal,
        _metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError> {
        if self.wallet.is_empty() {
            return Err(RailError::Rejected("ethereum wallet not configured".into()));
        }
        Ok(PaymentHandle::DepositAddress {
            address: self.wallet.clone(),
        })
    }

    #[instrument(skip(self, _handle))]
    async fn verify(
        &self,
        _handle: &PaymentHandle,
        external_ref: &str,
        expected_amount: Decimal,
    ) -> Result<VerificationResult, RailError> {
        let tx = self
            .rpc("eth_getTransactionByHash", json!([external_ref]))
            .await?;
        if tx.is_null() {
            // Not yet in the mempool or pruned; poll again.
            return Ok(VerificationResult::pending(Some(0)));
        }
        let tx: EthTransaction = serde_json::from_value(tx)
            .map_err(|e| RailError::Malformed(format!("eth_getTransactionByHash: {e}")))?;

        let receipt = self
            .rpc("eth_getTransactionReceipt", json!([external_ref]))
            .await?;
        if receipt.is_null() {
            return Ok(VerificationResult::pending(Some(0)));
        }
        let receipt: EthReceipt = serde_json::from_value(receipt)
            .map_err(|e| RailError::Malformed(format!("eth_getTransactionReceipt: {e}")))?;

        let block = self.rpc("eth_blockNumber", json!([])).await?;
        let block = block
            .as_str()
            .ok_or_else(|| RailError::Malformed("eth_blockNumber response".into()))?;
        let current_block = parse_hex_quantity(block)? as u64;

        check_settlement(&tx, &receipt, current_block, &self.wallet, expected_amount)
    }

    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError> {
        Ok(RefundResult {
            external_ref: Some(format!("manual-eth-{external_ref}")),
            amount: amount.unwrap_or_default(),
            requires_manual_settlement: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rails::VerificationStatus;
    use rust_decimal_macros::dec;

    const WALLET: &str = "0xAbCd000000000000000000000000000000000001";

    fn tx(to: &str, value_wei: u128) -> EthTransaction {
        EthTransaction {
            to: Some(to.to_string()),
            value: format!("{:#x}", value_wei),
        }
    }

    fn receipt(status: &str, block: u64) -> EthReceipt {
        EthReceipt {
            status: Some(status.to_string()),
            block_number: Some(format!("{:#x}", block)),
        }
    }

    #[test]
    fn hex_quantities_parse() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_hex_quantity("0x2540be400").unwrap(), 10_000_000_000);
        assert!(parse_hex_quantity("0xzz").is_err());
    }

    #[test]
    fn settles_after_twelve_confirmations() {
        let tx = tx(WALLET, 50_000_000_000_000_000);
        let result = check_settlement(
            &tx,
            &receipt("0x1", 1_000),
            1_011,
            WALLET,
            dec!(50_000_000_000_000_000),
        )
        .unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
        assert_eq!(result.confirmations, Some(12));
    }

    #[test]
    fn shallow_confirmation_stays_pending() {
        let tx = tx(WALLET, 50_000_000_000_000_000);
        let result = check_settlement(
            &tx,
            &receipt("0x1", 1_000),
            1_005,
            WALLET,
            dec!(50_000_000_000_000_000),
        )
        .unwrap();
        assert_eq!(result.status, VerificationStatus::Pending);
        assert_eq!(result.confirmations, Some(6));
    }

    #[test]
    fn reverted_transaction_is_failed() {
        let tx = tx(WALLET, 1);
        let result = check_settlement(&tx, &receipt("0x0", 1_000), 2_000, WALLET, dec!(1)).unwrap();
        assert_eq!(result.status, VerificationStatus::Failed);
    }

    #[test]
    fn destination_check_is_case_insensitive() {
        let tx = tx(&WALLET.to_lowercase(), 100);
        let result = check_settlement(&tx, &receipt("0x1", 100), 500, WALLET, dec!(100)).unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
    }

    #[test]
    fn wrong_destination_is_rejected() {
        let tx = tx("0x000000000000000000000000000000000000dead", 100);
        let err =
            check_settlement(&tx, &receipt("0x1", 100), 500, WALLET, dec!(100)).unwrap_err();
        assert!(matches!(err, RailError::Rejected(_)));
    }

    #[test]
    fn underpayment_is_an_amount_mismatch() {
        let tx = tx(WALLET, 1_400);
        let err =
            check_settlement(&tx, &receipt("0x1", 100), 500, WALLET, dec!(1_500)).unwrap_err();
        assert!(matches!(err, RailError::AmountMismatch { .. }));
    }
}
