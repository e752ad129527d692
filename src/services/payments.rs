//! Booking-confirmation workflow.
//!
//! Drives the payment state machine `pending -> processing -> {completed |
//! failed}` (plus the operator `completed -> refunded` edge and explicit
//! cancellation) across whichever rail the client picked. Client polls and
//! webhooks both funnel into [`PaymentWorkflow::attempt_completion`]; the
//! optimistic version check on the payment row guarantees at most one
//! terminal transition no matter how the two race.
//!
//! External rail calls never run inside a database transaction. The
//! transaction opens only around the final local state change, after the
//! rail's answer is known.

use crate::{
    config::PaymentsConfig,
    entities::{booking, payment, tour},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BookingStatus, PaymentMethod, PaymentStatus},
    rails::{
        bitcoin::BitcoinRail, card::CardRail, ethereum::EthereumRail, retry::with_backoff,
        solana::SolanaRail, units, PaymentHandle, PaymentRail, RailError, RailMetadata,
    },
    services::bookings::{cancel_booking, confirm_booking},
    services::invoicing::create_invoice,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Timeout and retry policy for the workflow.
#[derive(Debug, Clone)]
pub struct WorkflowPolicy {
    /// Card intents expire quickly; the processor holds them briefly.
    pub card_expiry: Duration,
    /// Chain payments get longer windows because of block-time variance.
    pub chain_expiry: Duration,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
}

impl From<&PaymentsConfig> for WorkflowPolicy {
    fn from(cfg: &PaymentsConfig) -> Self {
        Self {
            card_expiry: Duration::from_secs(cfg.card_expiry_secs),
            chain_expiry: Duration::from_secs(cfg.chain_expiry_secs),
            retry_attempts: cfg.rail_retry_attempts,
            retry_base_delay: Duration::from_millis(cfg.rail_retry_base_ms),
        }
    }
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            card_expiry: Duration::from_secs(15 * 60),
            chain_expiry: Duration::from_secs(2 * 60 * 60),
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CheckoutRequest {
    /// Supplied by the upstream session layer; null for guest checkout.
    pub user_id: Option<Uuid>,
    #[validate(email)]
    pub customer_email: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConfirmPaymentRequest {
    pub payment_id: Uuid,
    /// Processor intent id or on-chain transaction hash.
    #[validate(length(min = 1, max = 128))]
    pub external_tx_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub method: PaymentMethod,
    /// Rail smallest units (cents, lamports, satoshis, wei).
    pub amount: Decimal,
    pub currency: String,
    pub handle: PaymentHandle,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentStatusResponse {
    pub payment_id: Uuid,
    pub booking_id: Uuid,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub amount: Decimal,
    pub currency: String,
    pub handle: Option<String>,
    pub external_tx_id: Option<String>,
    pub failure_reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefundResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub refunded_amount: Decimal,
    pub refund_ref: Option<String>,
    /// Chain refunds are settled by an operator transfer.
    pub requires_manual_settlement: bool,
}

fn parse_payment_status(raw: &str) -> Result<PaymentStatus, ServiceError> {
    PaymentStatus::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("unknown payment status '{raw}'")))
}

fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    PaymentMethod::from_str(raw)
        .map_err(|_| ServiceError::InternalError(format!("unknown payment method '{raw}'")))
}

fn status_response(model: &payment::Model) -> Result<PaymentStatusResponse, ServiceError> {
    let method = parse_payment_method(&model.method)?;
    Ok(PaymentStatusResponse {
        payment_id: model.id,
        booking_id: model.booking_id,
        status: parse_payment_status(&model.status)?,
        method,
        amount: model.amount,
        currency: method.currency().to_string(),
        handle: model.handle.clone(),
        external_tx_id: model.external_tx_id.clone(),
        failure_reason: model.failure_reason.clone(),
        expires_at: model.expires_at,
    })
}

/// Applies a guarded status transition. `InvalidTransition` when the state
/// machine forbids it; `Ok(false)` when a concurrent writer got there first
/// (the row's version moved).
async fn transition_payment<C: ConnectionTrait>(
    conn: &C,
    row: &payment::Model,
    next: PaymentStatus,
    external_tx_id: Option<&str>,
    failure_reason: Option<&str>,
) -> Result<bool, ServiceError> {
    let current = parse_payment_status(&row.status)?;
    if !current.can_transition_to(next) {
        return Err(ServiceError::InvalidTransition {
            from: current,
            to: next,
        });
    }

    let mut update = payment::Entity::update_many()
        .col_expr(payment::Column::Status, Expr::value(next.to_string()))
        .col_expr(payment::Column::Version, Expr::value(row.version + 1))
        .col_expr(payment::Column::UpdatedAt, Expr::value(Utc::now()));
    if let Some(ext) = external_tx_id {
        update = update.col_expr(payment::Column::ExternalTxId, Expr::value(ext.to_string()));
    }
    if let Some(reason) = failure_reason {
        update = update.col_expr(
            payment::Column::FailureReason,
            Expr::value(reason.to_string()),
        );
    }

    let result = update
        .filter(payment::Column::Id.eq(row.id))
        .filter(payment::Column::Version.eq(row.version))
        .exec(conn)
        .await?;
    Ok(result.rows_affected == 1)
}

pub struct PaymentWorkflow {
    db: Arc<DatabaseConnection>,
    rails: HashMap<PaymentMethod, Arc<dyn PaymentRail>>,
    event_sender: EventSender,
    policy: WorkflowPolicy,
}

impl PaymentWorkflow {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        policy: WorkflowPolicy,
        rails: HashMap<PaymentMethod, Arc<dyn PaymentRail>>,
    ) -> Self {
        Self {
            db,
            rails,
            event_sender,
            policy,
        }
    }

    /// Production wiring: one adapter per configured rail.
    pub fn from_config(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        cfg: &PaymentsConfig,
    ) -> Self {
        let mut rails: HashMap<PaymentMethod, Arc<dyn PaymentRail>> = HashMap::new();
        rails.insert(
            PaymentMethod::Card,
            Arc::new(CardRail::new(
                cfg.card_api_url.clone(),
                cfg.card_secret_key.clone(),
            )),
        );
        rails.insert(
            PaymentMethod::Sol,
            Arc::new(SolanaRail::new(
                cfg.solana_rpc_url.clone(),
                cfg.solana_wallet.clone(),
            )),
        );
        rails.insert(
            PaymentMethod::Btc,
            Arc::new(BitcoinRail::new(
                cfg.bitcoin_api_url.clone(),
                cfg.bitcoin_wallet.clone(),
            )),
        );
        rails.insert(
            PaymentMethod::Eth,
            Arc::new(EthereumRail::new(
                cfg.ethereum_rpc_url.clone(),
                cfg.ethereum_wallet.clone(),
            )),
        );
        Self::new(db, event_sender, WorkflowPolicy::from(cfg), rails)
    }

    fn rail(&self, method: PaymentMethod) -> Result<Arc<dyn PaymentRail>, ServiceError> {
        self.rails
            .get(&method)
            .cloned()
            .ok_or_else(|| {
                ServiceError::PreconditionFailed(format!("no payment rail registered for {method}"))
            })
    }

    fn expiry_for(&self, method: PaymentMethod) -> DateTime<Utc> {
        let window = if method.is_chain() {
            self.policy.chain_expiry
        } else {
            self.policy.card_expiry
        };
        Utc::now() + ChronoDuration::from_std(window).unwrap_or_else(|_| ChronoDuration::hours(2))
    }

    /// Fiat-to-rail conversion, once, from the tour's price snapshot.
    fn rail_amount(tour: &tour::Model, method: PaymentMethod) -> Result<Decimal, ServiceError> {
        let amount = match method {
            PaymentMethod::Card => units::usd_to_cents(tour.price),
            PaymentMethod::Sol => units::sol_to_lamports(tour.price_sol),
            PaymentMethod::Btc => units::btc_to_sats(tour.price_btc),
            PaymentMethod::Eth => units::eth_to_wei(tour.price_eth),
        };
        if amount <= Decimal::ZERO {
            return Err(ServiceError::PreconditionFailed(format!(
                "tour {} has no {method} price configured",
                tour.id
            )));
        }
        Ok(amount)
    }

    async fn load_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))
    }

    /// Creates the pending booking and pending payment rows in one
    /// transaction, enforcing capacity when the tour declares one, then
    /// obtains a handle from the rail.
    #[instrument(skip(self, request))]
    pub async fn initiate_checkout(
        &self,
        tour_id: Uuid,
        method: PaymentMethod,
        request: CheckoutRequest,
    ) -> Result<CheckoutResponse, ServiceError> {
        request.validate()?;

        let tour = tour::Entity::find_by_id(tour_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Tour {tour_id} not found")))?;
        let amount = Self::rail_amount(&tour, method)?;

        let txn = self.db.begin().await?;

        if let Some(capacity) = tour.capacity {
            let active = booking::Entity::find()
                .filter(booking::Column::TourId.eq(tour_id))
                .filter(
                    booking::Column::Status.is_in([
                        BookingStatus::Pending.to_string(),
                        BookingStatus::Confirmed.to_string(),
                    ]),
                )
                .count(&txn)
                .await?;
            if active >= capacity.max(0) as u64 {
                txn.rollback().await?;
                return Err(ServiceError::PreconditionFailed(format!(
                    "tour {tour_id} is fully booked"
                )));
            }
        }

        let now = Utc::now();
        let booking_row = booking::ActiveModel {
            id: Set(Uuid::new_v4()),
            tour_id: Set(tour_id),
            user_id: Set(request.user_id),
            customer_email: Set(request.customer_email),
            booking_date: Set(now),
            status: Set(BookingStatus::Pending.to_string()),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        let payment_row = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking_row.id),
            amount: Set(amount),
            method: Set(method.to_string()),
            handle: Set(None),
            external_tx_id: Set(None),
            status: Set(PaymentStatus::Pending.to_string()),
            failure_reason: Set(None),
            expires_at: Set(Some(self.expiry_for(method))),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        self.event_sender
            .send(Event::BookingCreated(booking_row.id))
            .await;

        self.obtain_handle(payment_row, method).await
    }

    /// Fresh payment row for a pending booking whose previous attempt ended
    /// terminally. The failed row stays behind as audit history.
    #[instrument(skip(self))]
    pub async fn retry_payment(
        &self,
        booking_id: Uuid,
        method: Option<PaymentMethod>,
    ) -> Result<CheckoutResponse, ServiceError> {
        let booking_row = booking::Entity::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;
        if booking_row.status != BookingStatus::Pending.to_string() {
            return Err(ServiceError::PreconditionFailed(format!(
                "booking {booking_id} is {} and cannot take a new payment",
                booking_row.status
            )));
        }

        let latest = payment::Entity::find()
            .filter(payment::Column::BookingId.eq(booking_id))
            .order_by_desc(payment::Column::CreatedAt)
            .one(&*self.db)
            .await?;
        let method = match &latest {
            Some(previous) => {
                let previous_status = parse_payment_status(&previous.status)?;
                if !previous_status.is_terminal() {
                    return Err(ServiceError::Conflict(format!(
                        "booking {booking_id} already has an active payment {}",
                        previous.id
                    )));
                }
                method.unwrap_or(parse_payment_method(&previous.method)?)
            }
            None => method.ok_or_else(|| {
                ServiceError::ValidationError("payment method required".to_string())
            })?,
        };

        let tour = tour::Entity::find_by_id(booking_row.tour_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Tour {} not found", booking_row.tour_id))
            })?;
        let amount = Self::rail_amount(&tour, method)?;

        let now = Utc::now();
        let payment_row = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            booking_id: Set(booking_id),
            amount: Set(amount),
            method: Set(method.to_string()),
            handle: Set(None),
            external_tx_id: Set(None),
            status: Set(PaymentStatus::Pending.to_string()),
            failure_reason: Set(None),
            expires_at: Set(Some(self.expiry_for(method))),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;

        self.obtain_handle(payment_row, method).await
    }

    /// Calls the rail's `initiate` (outside any transaction) and persists the
    /// handle. An initiate failure leaves the checkout in a terminating
    /// state: payment failed, booking cancelled.
    async fn obtain_handle(
        &self,
        payment_row: payment::Model,
        method: PaymentMethod,
    ) -> Result<CheckoutResponse, ServiceError> {
        let rail = self.rail(method)?;
        let metadata = RailMetadata {
            booking_id: payment_row.booking_id,
            payment_id: payment_row.id,
            description: None,
        };

        let initiated = with_backoff(
            self.policy.retry_attempts,
            self.policy.retry_base_delay,
            || rail.initiate(payment_row.amount, &metadata),
        )
        .await;

        let handle = match initiated {
            Ok(handle) => handle,
            Err(err) => {
                warn!(payment_id = %payment_row.id, error = %err, "rail initiate failed");
                self.fail_payment(&payment_row, &err.to_string(), true).await?;
                return Err(err.into());
            }
        };

        let mut active: payment::ActiveModel = payment_row.clone().into();
        active.handle = Set(Some(handle.reference().to_string()));
        active.updated_at = Set(Some(Utc::now()));
        let payment_row = active.update(&*self.db).await?;

        info!(
            payment_id = %payment_row.id,
            booking_id = %payment_row.booking_id,
            %method,
            handle = %handle.reference(),
            "payment initiated"
        );
        self.event_sender
            .send(Event::PaymentInitiated {
                payment_id: payment_row.id,
                method: method.to_string(),
            })
            .await;

        Ok(CheckoutResponse {
            booking_id: payment_row.booking_id,
            payment_id: payment_row.id,
            method,
            amount: payment_row.amount,
            currency: method.currency().to_string(),
            handle,
            expires_at: payment_row.expires_at,
        })
    }

    /// `pending -> processing`: the client has begun the rail completion
    /// step (3-D-Secure challenge or on-chain broadcast).
    #[instrument(skip(self))]
    pub async fn mark_processing(
        &self,
        payment_id: Uuid,
        external_tx_id: &str,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        let row = self.load_payment(payment_id).await?;
        match parse_payment_status(&row.status)? {
            PaymentStatus::Pending => {
                let won =
                    transition_payment(&*self.db, &row, PaymentStatus::Processing, Some(external_tx_id), None)
                        .await?;
                if !won {
                    // A concurrent webhook may have already completed it;
                    // report whatever is there now.
                    let current = self.load_payment(payment_id).await?;
                    return status_response(&current);
                }
                status_response(&self.load_payment(payment_id).await?)
            }
            // Poll/webhook already moved it along; observing is a no-op.
            PaymentStatus::Processing | PaymentStatus::Completed => status_response(&row),
            other => Err(ServiceError::Conflict(format!(
                "payment {payment_id} is already {other}"
            ))),
        }
    }

    /// Idempotent verification entry point shared by client polls and
    /// webhooks. At most one caller wins the terminal transition; the rest
    /// observe the already-terminal row.
    #[instrument(skip(self))]
    pub async fn attempt_completion(
        &self,
        payment_id: Uuid,
        external_tx_id: Option<&str>,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        let row = self.load_payment(payment_id).await?;
        let method = parse_payment_method(&row.method)?;

        match parse_payment_status(&row.status)? {
            PaymentStatus::Pending | PaymentStatus::Processing => {}
            // Already settled; verification is a no-op.
            PaymentStatus::Completed | PaymentStatus::Refunded => return status_response(&row),
            other => {
                return Err(ServiceError::Conflict(format!(
                    "payment {payment_id} is already {other}"
                )))
            }
        }

        if row.expires_at.is_some_and(|at| at < Utc::now()) {
            // Terminal for this row; the booking stays pending so the
            // client can retry with a fresh payment.
            self.fail_payment(&row, "payment window expired", false).await?;
            return Err(ServiceError::Expired(format!(
                "payment {payment_id} outlived its validity window"
            )));
        }

        let handle_ref = row.handle.clone().ok_or_else(|| {
            ServiceError::PreconditionFailed(format!("payment {payment_id} has no rail handle"))
        })?;
        let handle = if method.is_chain() {
            PaymentHandle::DepositAddress {
                address: handle_ref.clone(),
            }
        } else {
            PaymentHandle::CardIntent {
                intent_id: handle_ref.clone(),
                client_secret: String::new(),
            }
        };

        let external_ref = external_tx_id
            .map(str::to_string)
            .or_else(|| row.external_tx_id.clone())
            .or_else(|| (!method.is_chain()).then(|| handle_ref.clone()))
            .ok_or_else(|| {
                ServiceError::ValidationError(
                    "an on-chain transaction reference is required".to_string(),
                )
            })?;

        let rail = self.rail(method)?;
        let verified = with_backoff(
            self.policy.retry_attempts,
            self.policy.retry_base_delay,
            || rail.verify(&handle, &external_ref, row.amount),
        )
        .await;

        match verified {
            Ok(result) => match result.status {
                crate::rails::VerificationStatus::Succeeded => {
                    self.complete_payment(&row, &external_ref).await
                }
                crate::rails::VerificationStatus::Pending => {
                    // Not final yet; record the reference so the sweep and
                    // later polls see an in-flight payment.
                    if parse_payment_status(&row.status)? == PaymentStatus::Pending {
                        let _ = transition_payment(
                            &*self.db,
                            &row,
                            PaymentStatus::Processing,
                            Some(&external_ref),
                            None,
                        )
                        .await?;
                    }
                    status_response(&self.load_payment(payment_id).await?)
                }
                crate::rails::VerificationStatus::Failed => {
                    self.fail_payment(&row, "rail reported failure", true).await?;
                    status_response(&self.load_payment(payment_id).await?)
                }
            },
            Err(RailError::AmountMismatch { expected, actual }) => {
                // Terminal for this payment row, but the booking stays
                // pending: the caller decides between retry and cancel.
                self.fail_payment(
                    &row,
                    &format!("amount mismatch: expected {expected}, got {actual}"),
                    false,
                )
                .await?;
                Err(ServiceError::AmountMismatch { expected, actual })
            }
            Err(RailError::Expired(msg)) => {
                self.fail_payment(&row, "handle expired", false).await?;
                Err(ServiceError::Expired(msg))
            }
            Err(RailError::Rejected(msg)) => {
                self.fail_payment(&row, &msg, false).await?;
                Err(ServiceError::PaymentRejected(msg))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// The one multi-row transaction: payment completed, booking confirmed,
    /// invoice created, atomically. The optimistic version check makes the
    /// race between two verifiers single-winner.
    async fn complete_payment(
        &self,
        row: &payment::Model,
        external_ref: &str,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let won = transition_payment(
            &txn,
            row,
            PaymentStatus::Completed,
            Some(external_ref),
            None,
        )
        .await?;
        if !won {
            txn.rollback().await?;
            let current = self.load_payment(row.id).await?;
            return match parse_payment_status(&current.status)? {
                // The concurrent verifier finished the job; no-op.
                PaymentStatus::Completed | PaymentStatus::Refunded => status_response(&current),
                other => Err(ServiceError::Conflict(format!(
                    "payment {} concurrently moved to {other}",
                    row.id
                ))),
            };
        }

        let confirmed = confirm_booking(&txn, row.booking_id).await?;
        if !confirmed {
            // The booking left pending while the rail was consulted
            // (cancelled by the customer or the sweep). Completing now
            // would resurrect it, so the whole completion rolls back.
            txn.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "booking {} is no longer pending",
                row.booking_id
            )));
        }

        let mut completed = row.clone();
        completed.status = PaymentStatus::Completed.to_string();
        let invoice = create_invoice(&txn, &completed).await?;

        txn.commit().await?;

        info!(
            payment_id = %row.id,
            booking_id = %row.booking_id,
            invoice_id = %invoice.id,
            "payment completed, booking confirmed"
        );
        self.event_sender.send(Event::PaymentCompleted(row.id)).await;
        self.event_sender
            .send(Event::BookingConfirmed {
                booking_id: row.booking_id,
                payment_id: row.id,
                invoice_id: invoice.id,
            })
            .await;

        status_response(&self.load_payment(row.id).await?)
    }

    /// Drives a payment to failed; optionally releases the booking slot in
    /// the same transaction.
    async fn fail_payment(
        &self,
        row: &payment::Model,
        reason: &str,
        release_booking: bool,
    ) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let won = transition_payment(&txn, row, PaymentStatus::Failed, None, Some(reason)).await?;
        if !won {
            // Someone else already resolved the row; leave their outcome be.
            txn.rollback().await?;
            return Ok(());
        }
        if release_booking {
            cancel_booking(&txn, row.booking_id).await?;
        }
        txn.commit().await?;

        self.event_sender
            .send(Event::PaymentFailed {
                payment_id: row.id,
                reason: reason.to_string(),
            })
            .await;
        if release_booking {
            self.event_sender
                .send(Event::BookingCancelled(row.booking_id))
                .await;
        }
        Ok(())
    }

    /// User- or operator-initiated abort prior to completion. Idempotent on
    /// an already-cancelled row; `Conflict` when a concurrent verify has
    /// already driven the row terminal.
    #[instrument(skip(self))]
    pub async fn cancel_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        let row = self.load_payment(payment_id).await?;
        match parse_payment_status(&row.status)? {
            PaymentStatus::Cancelled => return status_response(&row),
            PaymentStatus::Pending | PaymentStatus::Processing => {}
            other => {
                return Err(ServiceError::Conflict(format!(
                    "payment {payment_id} is already {other}"
                )))
            }
        }

        let txn = self.db.begin().await?;
        let won =
            transition_payment(&txn, &row, PaymentStatus::Cancelled, None, Some("cancelled"))
                .await?;
        if !won {
            txn.rollback().await?;
            let current = self.load_payment(payment_id).await?;
            return match parse_payment_status(&current.status)? {
                PaymentStatus::Cancelled => status_response(&current),
                other => Err(ServiceError::Conflict(format!(
                    "payment {payment_id} concurrently moved to {other}"
                ))),
            };
        }
        cancel_booking(&txn, row.booking_id).await?;
        txn.commit().await?;

        self.event_sender
            .send(Event::BookingCancelled(row.booking_id))
            .await;
        status_response(&self.load_payment(payment_id).await?)
    }

    /// Operator refund. The booking stays confirmed; returning the money
    /// does not implicitly re-open cancellation.
    #[instrument(skip(self))]
    pub async fn refund_payment(
        &self,
        payment_id: Uuid,
        amount: Option<Decimal>,
    ) -> Result<RefundResponse, ServiceError> {
        let row = self.load_payment(payment_id).await?;
        let method = parse_payment_method(&row.method)?;
        match parse_payment_status(&row.status)? {
            PaymentStatus::Completed => {}
            other => {
                return Err(ServiceError::PreconditionFailed(format!(
                    "refund requires a completed payment, payment {payment_id} is {other}"
                )))
            }
        }
        if let Some(partial) = amount {
            if partial <= Decimal::ZERO || partial > row.amount {
                return Err(ServiceError::ValidationError(format!(
                    "refund amount {partial} must be within (0, {}]",
                    row.amount
                )));
            }
        }

        let external_ref = row
            .external_tx_id
            .clone()
            .or_else(|| row.handle.clone())
            .ok_or_else(|| {
                ServiceError::PreconditionFailed(format!(
                    "payment {payment_id} has no settlement reference to refund"
                ))
            })?;

        let rail = self.rail(method)?;
        let refund = with_backoff(
            self.policy.retry_attempts,
            self.policy.retry_base_delay,
            || rail.refund(&external_ref, amount),
        )
        .await
        .map_err(ServiceError::from)?;

        let txn = self.db.begin().await?;
        let won = transition_payment(&txn, &row, PaymentStatus::Refunded, None, None).await?;
        if !won {
            txn.rollback().await?;
            return Err(ServiceError::Conflict(format!(
                "payment {payment_id} changed concurrently during refund"
            )));
        }
        txn.commit().await?;

        info!(%payment_id, "payment refunded");
        self.event_sender.send(Event::PaymentRefunded(payment_id)).await;

        Ok(RefundResponse {
            payment_id,
            status: PaymentStatus::Refunded,
            refunded_amount: amount.unwrap_or(row.amount),
            refund_ref: refund.external_ref,
            requires_manual_settlement: refund.requires_manual_settlement,
        })
    }

    /// Read-only projection for status polling.
    pub async fn payment_status(
        &self,
        payment_id: Uuid,
    ) -> Result<PaymentStatusResponse, ServiceError> {
        status_response(&self.load_payment(payment_id).await?)
    }
}
