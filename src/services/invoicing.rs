use crate::{
    entities::{invoice, payment},
    errors::ServiceError,
    models::{InvoiceStatus, PaymentStatus},
};
use chrono::Utc;
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Invoice creation and reads. The write path is always called inside the
/// payment-completion transaction so the invoice either lands with the
/// completed payment or not at all.
pub struct InvoiceService {
    db: Arc<DatabaseConnection>,
}

impl InvoiceService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        invoice::Entity::find_by_id(invoice_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {invoice_id} not found")))
    }

    pub async fn find_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<Option<invoice::Model>, ServiceError> {
        let invoice = invoice::Entity::find()
            .filter(invoice::Column::PaymentId.eq(payment_id))
            .one(&*self.db)
            .await?;
        Ok(invoice)
    }

    /// Standalone creation path for operator tooling; the payment must
    /// already be completed.
    #[instrument(skip(self))]
    pub async fn create_for_payment(
        &self,
        payment_id: Uuid,
    ) -> Result<invoice::Model, ServiceError> {
        let payment = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;
        create_invoice(&*self.db, &payment).await
    }
}

/// Inserts the invoice row for a completed payment. `PreconditionFailed`
/// unless the payment row passed in is completed.
pub async fn create_invoice<C: ConnectionTrait>(
    conn: &C,
    payment: &payment::Model,
) -> Result<invoice::Model, ServiceError> {
    let status = PaymentStatus::from_str(&payment.status).map_err(|_| {
        ServiceError::InternalError(format!("unknown payment status '{}'", payment.status))
    })?;
    if status != PaymentStatus::Completed {
        return Err(ServiceError::PreconditionFailed(format!(
            "invoice requires a completed payment, payment {} is {status}",
            payment.id
        )));
    }

    let invoice_id = Uuid::new_v4();
    let model = invoice::ActiveModel {
        id: Set(invoice_id),
        payment_id: Set(payment.id),
        invoice_number: Set(next_invoice_number()),
        amount: Set(payment.amount),
        currency: Set(currency_for_method(&payment.method)),
        status: Set(InvoiceStatus::Paid.to_string()),
        created_at: Set(Utc::now()),
    };

    let invoice = model.insert(conn).await?;
    info!(payment_id = %payment.id, %invoice_id, invoice_number = %invoice.invoice_number, "invoice created");
    Ok(invoice)
}

fn currency_for_method(method: &str) -> String {
    crate::models::PaymentMethod::from_str(method)
        .map(|m| m.currency().to_string())
        .unwrap_or_else(|_| "USD".to_string())
}

/// `INV-<YYYYMMDD>-<8 hex>`; the random suffix plus the unique index keep
/// numbers collision-free without a sequence table.
fn next_invoice_number() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("INV-{}-{:08X}", Utc::now().format("%Y%m%d"), suffix)
}
