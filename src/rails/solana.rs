//! Solana rail: deposit-address payments verified through JSON-RPC
//! `getTransaction` against the receiving wallet's balance delta.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use super::{
    PaymentHandle, PaymentRail, RailError, RailMetadata, RefundResult, VerificationResult,
};
use crate::models::PaymentMethod;

/// Solana treats one confirmed slot as final for payment purposes.
pub const FINALITY_CONFIRMATIONS: u64 = 1;

pub struct SolanaRail {
    client: reqwest::Client,
    rpc_url: String,
    wallet: String,
}

impl SolanaRail {
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
                "solana rpc returned {}",
                response.status()
            )));
        }

        let body: RpcEnvelope = response.json().await?;
        if let Some(err) = body.error {
            return Err(RailError::Unavailable(format!(
                "solana rpc error {}: {}",
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
struct TransactionResult {
    meta: TransactionMeta,
    transaction: TransactionBody,
}

#[derive(Debug, Deserialize)]
struct TransactionMeta {
    err: Option<serde_json::Value>,
    #[serde(rename = "preBalances")]
    pre_balances: Vec<u64>,
    #[serde(rename = "postBalances")]
    post_balances: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct TransactionBody {
    message: TransactionMessage,
}

#[derive(Debug, Deserialize)]
struct TransactionMessage {
    #[serde(rename = "accountKeys")]
    account_keys: Vec<AccountKey>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountKey {
    Parsed { pubkey: String },
    Plain(String),
}

impl AccountKey {
    fn pubkey(&self) -> &str {
        match self {
            AccountKey::Parsed { pubkey } => pubkey,
            AccountKey::Plain(key) => key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SignatureStatusesResult {
    value: Vec<Option<SignatureStatus>>,
}

#[derive(Debug, Deserialize)]
struct SignatureStatus {
    /// Null once the transaction is rooted (finalized).
    confirmations: Option<u64>,
    err: Option<serde_json::Value>,
}

/// Lamports credited to `wallet` by the transaction, from the balance delta
/// at the wallet's account index.
fn lamports_received(tx: &TransactionResult, wallet: &str) -> Result<Decimal, RailError> {
    let index = tx
        .transaction
        .message
        .account_keys
        .iter()
        .position(|key| key.pubkey() == wallet)
        .ok_or_else(|| {
            RailError::Rejected(format!(
                "transaction does not touch the receiving wallet {wallet}"
            ))
        })?;

    let pre = *tx.meta.pre_balances.get(index).ok_or_else(|| {
        RailError::Malformed("preBalances shorter than account keys".into())
    })?;
    let post = *tx.meta.post_balances.get(index).ok_or_else(|| {
        RailError::Malformed("postBalances shorter than account keys".into())
    })?;

    Ok(Decimal::from(post.saturating_sub(pre)))
}

fn check_settlement(
    tx: &TransactionResult,
    confirmations: Option<u64>,
    wallet: &str,
    expected_amount: Decimal,
) -> Result<VerificationResult, RailError> {
    if tx.meta.err.is_some() {
        return Ok(VerificationResult::failed());
    }

    // Null confirmations means the transaction is rooted.
    let confirmed = confirmations.map_or(true, |c| c >= FINALITY_CONFIRMATIONS);
    if !confirmed {
        return Ok(VerificationResult::pending(confirmations));
    }

    let received = lamports_received(tx, wallet)?;
    if received < expected_amount {
        return Err(RailError::AmountMismatch {
            expected: expected_amount,
            actual: received,
        });
    }

    Ok(VerificationResult::succeeded(received, confirmations))
}

#[async_trait]
impl PaymentRail for SolanaRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Sol
    }

    async fn initiate(
        &self,
        _amount: Decimal,
        _metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError> {
        if self.wallet.is_empty() {
            return Err(RailError::Rejected("solana wallet not configured".into()));
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
        let result = self
            .rpc(
                "getTransaction",
                json!([external_ref, {
                    "encoding": "jsonParsed",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0,
                }]),
            )
            .await?;

        if result.is_null() {
            // Not yet visible at confirmed commitment.
            return Ok(VerificationResult::pending(Some(0)));
        }

        let tx: TransactionResult = serde_json::from_value(result)
            .map_err(|e| RailError::Malformed(format!("getTransaction response: {e}")))?;

        let statuses = self
            .rpc(
                "getSignatureStatuses",
                json!([[external_ref], {"searchTransactionHistory": true}]),
            )
            .await?;
        let statuses: SignatureStatusesResult = serde_json::from_value(statuses)
            .map_err(|e| RailError::Malformed(format!("getSignatureStatuses response: {e}")))?;

        let status = statuses.value.into_iter().flatten().next();
        if status.as_ref().is_some_and(|s| s.err.is_some()) {
            return Ok(VerificationResult::failed());
        }
        let confirmations = status.and_then(|s| s.confirmations);

        check_settlement(&tx, confirmations, &self.wallet, expected_amount)
    }

    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError> {
        // No custody of customer keys: the refund is settled by an operator
        // transfer and recorded here for the ledger.
        Ok(RefundResult {
            external_ref: Some(format!("manual-sol-{external_ref}")),
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

    fn tx(wallet: &str, pre: u64, post: u64, err: bool) -> TransactionResult {
        TransactionResult {
            meta: TransactionMeta {
                err: err.then(|| serde_json::json!({"InstructionError": [0, "Custom"]})),
                pre_balances: vec![500, pre],
                post_balances: vec![100, post],
            },
            transaction: TransactionBody {
                message: TransactionMessage {
                    account_keys: vec![
                        AccountKey::Plain("sender".into()),
                        AccountKey::Parsed {
                            pubkey: wallet.into(),
                        },
                    ],
                },
            },
        }
    }

    #[test]
    fn full_transfer_settles() {
        let tx = tx("addr_X", 0, 1_500_000_000, false);
        let result = check_settlement(&tx, Some(5), "addr_X", dec!(1_500_000_000)).unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
        assert_eq!(result.confirmed_amount, Some(dec!(1_500_000_000)));
    }

    #[test]
    fn underpayment_is_an_amount_mismatch() {
        // 1.4 SOL against an expected 1.5 SOL, in lamports.
        let tx = tx("addr_X", 0, 1_400_000_000, false);
        let err = check_settlement(&tx, Some(5), "addr_X", dec!(1_500_000_000)).unwrap_err();
        assert!(matches!(err, RailError::AmountMismatch { .. }));
    }

    #[test]
    fn wrong_destination_is_rejected() {
        let tx = tx("someone_else", 0, 2_000_000_000, false);
        let err = check_settlement(&tx, None, "addr_X", dec!(1)).unwrap_err();
        assert!(matches!(err, RailError::Rejected(_)));
    }

    #[test]
    fn failed_transaction_verifies_as_failed() {
        let tx = tx("addr_X", 0, 0, true);
        let result = check_settlement(&tx, Some(3), "addr_X", dec!(1)).unwrap();
        assert_eq!(result.status, VerificationStatus::Failed);
    }

    #[test]
    fn rooted_transaction_counts_as_final() {
        let tx = tx("addr_X", 0, 10, false);
        let result = check_settlement(&tx, None, "addr_X", dec!(10)).unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
    }
}
