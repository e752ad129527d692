//! Bitcoin rail: deposit-address payments verified through an Esplora-style
//! block-explorer REST API.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::instrument;

use super::{
    PaymentHandle, PaymentRail, RailError, RailMetadata, RefundResult, VerificationResult,
};
use crate::models::PaymentMethod;

pub const FINALITY_CONFIRMATIONS: u64 = 3;

pub struct BitcoinRail {
    client: reqwest::Client,
    api_url: String,
    wallet: String,
}

impl BitcoinRail {
    pub fn new(api_url: String, wallet: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            wallet,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TxResponse {
    vout: Vec<TxOutput>,
    status: TxStatus,
}

#[derive(Debug, Deserialize)]
struct TxOutput {
    scriptpubkey_address: Option<String>,
    /// Satoshis.
    value: u64,
}

#[derive(Debug, Deserialize)]
struct TxStatus {
    confirmed: bool,
    block_height: Option<u64>,
}

/// Satoshis paid to `wallet` across all outputs of the transaction.
fn sats_received(tx: &TxResponse, wallet: &str) -> Decimal {
    let total: u64 = tx
        .vout
        .iter()
        .filter(|out| out.scriptpubkey_address.as_deref() == Some(wallet))
        .map(|out| out.value)
        .sum();
    Decimal::from(total)
}

fn check_settlement(
    tx: &TxResponse,
    tip_height: u64,
    wallet: &str,
    expected_amount: Decimal,
) -> Result<VerificationResult, RailError> {
    let confirmations = match (tx.status.confirmed, tx.status.block_height) {
        (true, Some(height)) => tip_height.saturating_sub(height) + 1,
        _ => 0,
    };
    if confirmations < FINALITY_CONFIRMATIONS {
        return Ok(VerificationResult::pending(Some(confirmations)));
    }

    let received = sats_received(tx, wallet);
    if received == Decimal::ZERO {
        return Err(RailError::Rejected(format!(
            "transaction pays nothing to the receiving wallet {wallet}"
        )));
    }
    if received < expected_amount {
        return Err(RailError::AmountMismatch {
            expected: expected_amount,
            actual: received,
        });
    }

    Ok(VerificationResult::succeeded(received, Some(confirmations)))
}

#[async_trait]
impl PaymentRail for BitcoinRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Btc
    }

    async fn initiate(
        &self,
        _amount: Decimal,
        _metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError> {
        if self.wallet.is_empty() {
            return Err(RailError::Rejected("bitcoin wallet not configured".into()));
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
        let response = self
            .client
            .get(format!("{}/tx/{}", self.api_url, external_ref))
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(RailError::Unavailable(format!(
                "bitcoin explorer returned {}",
                response.status()
            )));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Unbroadcast or unindexed; let the caller poll again.
            return Ok(VerificationResult::pending(Some(0)));
        }

        let tx: TxResponse = response.json().await?;

        let tip = self
            .client
            .get(format!("{}/blocks/tip/height", self.api_url))
            .send()
            .await?
            .text()
            .await?;
        let tip_height: u64 = tip
            .trim()
            .parse()
            .map_err(|_| RailError::Malformed(format!("tip height '{tip}'")))?;

        check_settlement(&tx, tip_height, &self.wallet, expected_amount)
    }

    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError> {
        Ok(RefundResult {
            external_ref: Some(format!("manual-btc-{external_ref}")),
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

    fn tx(outputs: Vec<(&str, u64)>, confirmed: bool, block_height: Option<u64>) -> TxResponse {
        TxResponse {
            vout: outputs
                .into_iter()
                .map(|(addr, value)| TxOutput {
                    scriptpubkey_address: Some(addr.to_string()),
                    value,
                })
                .collect(),
            status: TxStatus {
                confirmed,
                block_height,
            },
        }
    }

    #[test]
    fn settles_after_three_confirmations() {
        let tx = tx(vec![("bc1_wallet", 250_000)], true, Some(800_000));
        let result = check_settlement(&tx, 800_002, "bc1_wallet", dec!(250_000)).unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
        assert_eq!(result.confirmations, Some(3));
    }

    #[test]
    fn shallow_confirmation_stays_pending() {
        let tx = tx(vec![("bc1_wallet", 250_000)], true, Some(800_000));
        let result = check_settlement(&tx, 800_000, "bc1_wallet", dec!(250_000)).unwrap();
        assert_eq!(result.status, VerificationStatus::Pending);
        assert_eq!(result.confirmations, Some(1));
    }

    #[test]
    fn unconfirmed_transaction_is_pending() {
        let tx = tx(vec![("bc1_wallet", 250_000)], false, None);
        let result = check_settlement(&tx, 800_000, "bc1_wallet", dec!(250_000)).unwrap();
        assert_eq!(result.status, VerificationStatus::Pending);
    }

    #[test]
    fn outputs_to_other_addresses_do_not_count() {
        let tx = tx(
            vec![("bc1_other", 250_000), ("bc1_wallet", 100_000)],
            true,
            Some(800_000),
        );
        let err = check_settlement(&tx, 800_010, "bc1_wallet", dec!(250_000)).unwrap_err();
        assert!(matches!(err, RailError::AmountMismatch { actual, .. } if actual == dec!(100_000)));
    }

    #[test]
    fn unrelated_transaction_is_rejected() {
        let tx = tx(vec![("bc1_other", 250_000)], true, Some(800_000));
        let err = check_settlement(&tx, 800_010, "bc1_wallet", dec!(250_000)).unwrap_err();
        assert!(matches!(err, RailError::Rejected(_)));
    }
}
