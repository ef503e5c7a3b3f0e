use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the order-placement flow. Consumers hang off the mpsc
/// channel; none of them sit on the request path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    PromotionApplied {
        promotion_id: Uuid,
        order_id: Uuid,
        user_id: Uuid,
    },
    InventoryAdjusted {
        product_id: Uuid,
        variant_id: Option<Uuid>,
        old_quantity: i32,
        new_quantity: i32,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Queues an event for the background processor.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.tx
            .send(event)
            .await
            .map_err(|e| format!("event channel unavailable: {}", e))
    }

    /// Sends an event, downgrading a full or closed channel to a warning.
    /// Used on paths where event delivery must never fail the request.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!("Dropping event {:?}: {}", event, e);
        }
    }
}

/// Event processing loop. Runs for the lifetime of the server task.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id = %order_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id = %order_id,
                    from = %old_status,
                    to = %new_status,
                    "order status changed"
                );
            }
            Event::PromotionApplied {
                promotion_id,
                order_id,
                user_id,
            } => {
                info!(
                    promotion_id = %promotion_id,
                    order_id = %order_id,
                    user_id = %user_id,
                    "promotion applied"
                );
            }
            Event::InventoryAdjusted {
                product_id,
                variant_id,
                old_quantity,
                new_quantity,
            } => {
                info!(
                    product_id = %product_id,
                    variant_id = ?variant_id,
                    old_quantity,
                    new_quantity,
                    "inventory adjusted"
                );
            }
            Event::CartCleared(cart_id) => {
                info!(cart_id = %cart_id, "cart cleared");
            }
        }
    }

    info!("Event channel closed, stopping event processing loop");
}
