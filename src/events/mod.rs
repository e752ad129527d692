use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events emitted by the booking and payment workflow. Emission is
/// best-effort and happens only after the owning transaction commits;
/// a full channel or a dropped receiver never rolls anything back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    BookingCreated(Uuid),
    BookingConfirmed {
        booking_id: Uuid,
        payment_id: Uuid,
        invoice_id: Uuid,
    },
    BookingCancelled(Uuid),
    PaymentInitiated {
        payment_id: Uuid,
        method: String,
    },
    PaymentCompleted(Uuid),
    PaymentFailed {
        payment_id: Uuid,
        reason: String,
    },
    PaymentRefunded(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event, logging (not propagating) delivery failure.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("failed to emit event: {}", e);
        }
    }
}

/// Creates a bounded event channel.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the event channel, handing each event to the notification layer.
/// Runs until every sender is dropped.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::BookingConfirmed {
                booking_id,
                invoice_id,
                ..
            } => {
                info!(%booking_id, %invoice_id, "booking confirmed");
                crate::services::notifications::notify_booking_confirmed(*booking_id, *invoice_id)
                    .await;
            }
            Event::PaymentFailed { payment_id, reason } => {
                info!(%payment_id, %reason, "payment failed");
            }
            other => {
                info!(event = ?other, "domain event");
            }
        }
    }
    info!("event channel closed, processor exiting");
}
