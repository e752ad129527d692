//! Closed domain enums shared across entities, services, and handlers.
//!
//! Statuses are persisted as strings; `strum` keeps the string forms in one
//! place so the database, the API surface, and the state machine agree.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use utoipa::ToSchema;

/// Payment rail selected at checkout. Dispatch to the matching adapter
/// happens once, at the API boundary.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Card processor (Stripe-shaped REST API).
    Card,
    /// Solana, lamports, 1-confirmation finality.
    Sol,
    /// Bitcoin, satoshis, 3-confirmation finality.
    Btc,
    /// Ethereum, wei, 12-confirmation finality.
    Eth,
}

impl PaymentMethod {
    pub fn is_chain(&self) -> bool {
        !matches!(self, PaymentMethod::Card)
    }

    /// Currency label stored on payment and invoice rows.
    pub fn currency(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "USD",
            PaymentMethod::Sol => "SOL",
            PaymentMethod::Btc => "BTC",
            PaymentMethod::Eth => "ETH",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Legal transitions of the payment state machine. Everything else is an
    /// `InvalidTransition`.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (*self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, Refunded)
        )
    }

    /// Terminal states never leave except for the operator refund edge.
    pub fn is_terminal(&self) -> bool {
        use PaymentStatus::*;
        matches!(self, Completed | Failed | Refunded | Cancelled)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ToSchema,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn payment_method_round_trips_through_strings() {
        for method in PaymentMethod::iter() {
            let s = method.to_string();
            assert_eq!(PaymentMethod::from_str(&s).unwrap(), method);
        }
        assert_eq!(PaymentMethod::from_str("card").unwrap(), PaymentMethod::Card);
        assert!(PaymentMethod::from_str("doge").is_err());
    }

    #[test]
    fn happy_path_transitions_are_legal() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Failed));
        assert!(PaymentStatus::Completed.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn cancel_is_only_reachable_before_completion() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Cancelled));
        assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Cancelled));
        assert!(!PaymentStatus::Completed.can_transition_to(PaymentStatus::Cancelled));
        assert!(!PaymentStatus::Refunded.can_transition_to(PaymentStatus::Cancelled));
    }

    #[test]
    fn terminal_states_do_not_regress() {
        for terminal in [
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
        ] {
            for next in PaymentStatus::iter() {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} must be illegal"
                );
            }
        }
        // Completed only moves to refunded.
        for next in PaymentStatus::iter() {
            assert_eq!(
                PaymentStatus::Completed.can_transition_to(next),
                next == PaymentStatus::Refunded
            );
        }
    }
}
