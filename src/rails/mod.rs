//! Payment-rail adapters.
//!
//! Every external payment channel (the card processor and the three chain
//! rails) sits behind the same [`PaymentRail`] capability trait. The workflow
//! dispatches on [`PaymentMethod`](crate::models::PaymentMethod) exactly once,
//! at the API boundary, and from then on only talks to the trait.
//!
//! Chain rails deal in rail-native smallest units (lamports, satoshis, wei);
//! the fiat-to-rail conversion happens once, at initiation, and the converted
//! amount is what every later verification compares against.

pub mod bitcoin;
pub mod card;
pub mod ethereum;
pub mod retry;
pub mod solana;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::PaymentMethod;

/// Opaque reference the client uses to complete a payment out-of-band.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentHandle {
    /// Card intent: the client confirms it with the processor's browser SDK.
    CardIntent {
        intent_id: String,
        client_secret: String,
    },
    /// Chain deposit address: the client transfers funds to it on-chain.
    DepositAddress { address: String },
}

impl PaymentHandle {
    /// Stable string form persisted on the payment row.
    pub fn reference(&self) -> &str {
        match self {
            PaymentHandle::CardIntent { intent_id, .. } => intent_id,
            PaymentHandle::DepositAddress { address } => address,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Succeeded,
    Pending,
    Failed,
}

/// Outcome of asking a rail about a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub status: VerificationStatus,
    /// Settled amount in rail smallest units, when the rail reports one.
    pub confirmed_amount: Option<Decimal>,
    /// Chain rails only.
    pub confirmations: Option<u64>,
}

impl VerificationResult {
    pub fn succeeded(confirmed_amount: Decimal, confirmations: Option<u64>) -> Self {
        Self {
            status: VerificationStatus::Succeeded,
            confirmed_amount: Some(confirmed_amount),
            confirmations,
        }
    }

    pub fn pending(confirmations: Option<u64>) -> Self {
        Self {
            status: VerificationStatus::Pending,
            confirmed_amount: None,
            confirmations,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: VerificationStatus::Failed,
            confirmed_amount: None,
            confirmations: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    /// Refund reference issued by the rail, when it can execute the refund.
    pub external_ref: Option<String>,
    pub amount: Decimal,
    /// Chain rails have no custody of customer keys; the operator settles
    /// the refund with an outbound transfer and this flag marks that.
    pub requires_manual_settlement: bool,
}

/// Context forwarded to the rail at initiation, for processor-side metadata
/// and reconciliation.
#[derive(Debug, Clone)]
pub struct RailMetadata {
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RailError {
    /// Network trouble or a 5xx from the external service. Retryable.
    #[error("rail unavailable: {0}")]
    Unavailable(String),

    /// Settled amount below the expected rail-unit amount. Terminal.
    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: Decimal, actual: Decimal },

    /// The handle outlived its validity window. Terminal; re-initiate.
    #[error("handle expired: {0}")]
    Expired(String),

    /// The rail refused the operation outright.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Response did not parse as expected.
    #[error("malformed rail response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for RailError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            RailError::Unavailable(err.to_string())
        } else if err.is_decode() {
            RailError::Malformed(err.to_string())
        } else {
            RailError::Unavailable(err.to_string())
        }
    }
}

impl From<RailError> for ServiceError {
    fn from(err: RailError) -> Self {
        match err {
            RailError::Unavailable(msg) => ServiceError::RailUnavailable(msg),
            RailError::AmountMismatch { expected, actual } => {
                ServiceError::AmountMismatch { expected, actual }
            }
            RailError::Expired(msg) => ServiceError::Expired(msg),
            RailError::Rejected(msg) => ServiceError::PaymentRejected(msg),
            RailError::Malformed(msg) => ServiceError::RailUnavailable(msg),
        }
    }
}

/// Uniform contract every payment rail implements.
#[async_trait]
pub trait PaymentRail: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Obtain a handle for a new payment of `amount` rail smallest units.
    /// Calls the external service; mutates no local state.
    async fn initiate(
        &self,
        amount: Decimal,
        metadata: &RailMetadata,
    ) -> Result<PaymentHandle, RailError>;

    /// Ask the rail whether the payment referenced by `external_ref` has
    /// settled against `handle` for at least `expected_amount` smallest
    /// units, with rail-specific finality.
    async fn verify(
        &self,
        handle: &PaymentHandle,
        external_ref: &str,
        expected_amount: Decimal,
    ) -> Result<VerificationResult, RailError>;

    /// Refund a settled payment; full refund when `amount` is omitted.
    async fn refund(
        &self,
        external_ref: &str,
        amount: Option<Decimal>,
    ) -> Result<RefundResult, RailError>;
}

/// Rail-unit conversion. One place, fixed scale, no floating point.
pub mod units {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    pub const LAMPORTS_PER_SOL: Decimal = dec!(1_000_000_000);
    pub const SATS_PER_BTC: Decimal = dec!(100_000_000);
    pub const WEI_PER_ETH: Decimal = dec!(1_000_000_000_000_000_000);
    pub const CENTS_PER_USD: Decimal = dec!(100);

    /// Truncation, not rounding: a customer is never asked to pay a
    /// fractional smallest unit.
    pub fn usd_to_cents(usd: Decimal) -> Decimal {
        (usd * CENTS_PER_USD).trunc()
    }

    pub fn sol_to_lamports(sol: Decimal) -> Decimal {
        (sol * LAMPORTS_PER_SOL).trunc()
    }

    pub fn btc_to_sats(btc: Decimal) -> Decimal {
        (btc * SATS_PER_BTC).trunc()
    }

    pub fn eth_to_wei(eth: Decimal) -> Decimal {
        (eth * WEI_PER_ETH).trunc()
    }
}

#[cfg(test)]
mod tests {
    use super::units::*;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn conversions_use_fixed_scale() {
        assert_eq!(usd_to_cents(dec!(100)), dec!(10000));
        assert_eq!(usd_to_cents(dec!(99.999)), dec!(9999));
        assert_eq!(sol_to_lamports(dec!(1.5)), dec!(1_500_000_000));
        assert_eq!(btc_to_sats(dec!(0.0025)), dec!(250_000));
        assert_eq!(eth_to_wei(dec!(0.05)), dec!(50_000_000_000_000_000));
    }

    #[test]
    fn handle_reference_is_stable() {
        let card = PaymentHandle::CardIntent {
            intent_id: "pi_123".into(),
            client_secret: "pi_123_secret".into(),
        };
        assert_eq!(card.reference(), "pi_123");

        let chain = PaymentHandle::DepositAddress {
            address: "addr_X".into(),
        };
        assert_eq!(chain.reference(), "addr_X");
    }

    #[test]
    fn rail_errors_map_onto_service_taxonomy() {
        let err: ServiceError = RailError::AmountMismatch {
            expected: dec!(1500),
            actual: dec!(1400),
        }
        .into();
        assert!(matches!(err, ServiceError::AmountMismatch { .. }));

        let err: ServiceError = RailError::Unavailable("timeout".into()).into();
        assert!(matches!(err, ServiceError::RailUnavailable(_)));
    }
}
