//! Card rail backed by a Stripe-shaped payment-intents REST API.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    PaymentHandle, PaymentRail, RailError, RailMetadata, RefundResult, VerificationResult,
};
use crate::models::PaymentMethod;

pub struct CardRail {
    client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl CardRail {
    pub fn new(api_url: String, secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            secret_key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
    status: String,
    #[serde(default)]
    amount_received: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
}

/// Maps a processor intent status onto the uniform verification result.
/// Separated from the HTTP call so the mapping is unit-testable.
fn intent_to_result(
    status: &str,
    amount_received: Option<i64>,
    expected_amount: Decimal,
) -> Result<VerificationResult, RailError> {
    match status {
        "succeeded" => {
            let received = Decimal::from(amount_received.unwrap_or(0));
            if received < expected_amount {
                return Err(RailError::AmountMismatch {
                    expected: expected_amount,
                    actual: received,
                });
            }
            Ok(VerificationResult::succeeded(received, None))
        }
        "processing" | "requires_action" | "requires_confirmation" | "requires_capture" => {
            Ok(VerificationResult::pending(None))
        }
        "canceled" => Err(RailError::Expired("payment intent was canceled".into())),
        // requires_payment_method after a confirmation attempt means the
        // charge was declined.
        "requires_payment_method" => Ok(VerificationResult::failed()),
        other => Err(RailError::Malformed(format!(
            "unknown intent status '{other}'"
        ))),
    }
}

fn amount_as_minor_units(amount: Decimal) -> Result<i64, RailError> {
    amount
        .to_i64()
        .ok_or_else(|| RailError::Rejected(format!("amount {amount} not representable in cents")))
}

#[async_trait]
impl PaymentRail for CardRail {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    #[instrument(skip(self, metadata))]
    async fn initiate(
        &self,
        amount: Decimal,
        metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError> {
        let cents = amount_as_minor_units(amount)?;

        let params = [
            ("amount", cents.to_string()),
            ("currency", "usd".to_string()),
            ("metadata[booking_id]", metadata.booking_id.to_string()),
            ("metadata[payment_id]", metadata.payment_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_url))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(RailError::Unavailable(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RailError::Rejected(format!(
                "intent creation failed ({status}): {body}"
            )));
        }

        let intent: IntentResponse = response.json().await?;
        debug!(intent_id = %intent.id, "card intent created");

        let client_secret = intent
            .client_secret
            .ok_or_else(|| RailError::Malformed("intent missing client_secret".into()))?;

        Ok(PaymentHandle::CardIntent {
            intent_id: intent.id,
            client_secret,
        })
    }

    #[instrument(skip(self, handle))]
    async fn verify(
        &self,
        handle: &PaymentHandle,
        external_ref: &str,
        expected_amount: Decimal,
    ) -> Result<VerificationResult, RailError> {
        // The external reference for a card payment is the intent itself;
        // fall back to the handle when the client did not echo it.
        let intent_id = if external_ref.is_empty() {
            handle.reference()
        } else {
            external_ref
        };

        let response = self
            .client
            .get(format!("{}/payment_intents/{}", self.api_url, intent_id))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(RailError::Unavailable(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RailError::Rejected(format!("unknown intent {intent_id}")));
        }

        let intent: IntentResponse = response.json().await?;
        intent_to_result(&intent.status, intent.amount_received, expected_amount)
    }

    #[instrument(skip(self))]
    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError> {
        let mut params = vec![("payment_intent", external_ref.to_string())];
        if let Some(partial) = amount {
            params.push(("amount", amount_as_minor_units(partial)?.to_string()));
        }

        let response = self
            .client
            .post(format!("{}/refunds", self.api_url))
            .basic_auth(&self.secret_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        if response.status().is_server_error() {
            return Err(RailError::Unavailable(format!(
                "card processor returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RailError::Rejected(format!(
                "refund failed ({status}): {body}"
            )));
        }

        let refund: RefundResponse = response.json().await?;
        Ok(RefundResult {
            external_ref: Some(refund.id),
            amount: Decimal::from(refund.amount),
            requires_manual_settlement: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rails::VerificationStatus;
    use rust_decimal_macros::dec;

    #[test]
    fn succeeded_intent_with_full_amount_verifies() {
        let result = intent_to_result("succeeded", Some(10000), dec!(10000)).unwrap();
        assert_eq!(result.status, VerificationStatus::Succeeded);
        assert_eq!(result.confirmed_amount, Some(dec!(10000)));
    }

    #[test]
    fn underpaid_intent_is_an_amount_mismatch() {
        let err = intent_to_result("succeeded", Some(9000), dec!(10000)).unwrap_err();
        assert!(matches!(
            err,
            RailError::AmountMismatch {
                expected,
                actual
            } if expected == dec!(10000) && actual == dec!(9000)
        ));
    }

    #[test]
    fn in_flight_statuses_are_pending() {
        for status in ["processing", "requires_action", "requires_confirmation"] {
            let result = intent_to_result(status, None, dec!(100)).unwrap();
            assert_eq!(result.status, VerificationStatus::Pending);
        }
    }

    #[test]
    fn canceled_intent_is_expired() {
        assert!(matches!(
            intent_to_result("canceled", None, dec!(100)),
            Err(RailError::Expired(_))
        ));
    }

    #[test]
    fn declined_intent_is_failed() {
        let result = intent_to_result("requires_payment_method", None, dec!(100)).unwrap();
        assert_eq!(result.status, VerificationStatus::Failed);
    }

    #[test]
    fn minor_unit_amounts_convert_exactly() {
        assert_eq!(amount_as_minor_units(dec!(100)).unwrap(), 100);
        assert_eq!(amount_as_minor_units(dec!(10050)).unwrap(), 10050);
    }
}
