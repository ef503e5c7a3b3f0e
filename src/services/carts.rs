use crate::{
    db::DbPool,
    entities::cart::{self, CartStatus, Entity as CartEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Removes the caller's active cart once their order has been placed.
/// Fire-and-forget: a cart that sticks around is a nuisance, not a reason
/// to fail a placed order.
#[derive(Clone)]
pub struct CartClearer {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CartClearer {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Deletes the active cart keyed by user id (authenticated) or session
    /// id (guest). Outcomes are logged and swallowed.
    #[instrument(skip(self))]
    pub async fn clear_after_checkout(&self, user_id: Option<Uuid>, session_id: Option<&str>) {
        match self.delete_active_cart(user_id, session_id).await {
            Ok(Some(cart_id)) => {
                debug!(cart_id = %cart_id, "Active cart cleared after checkout");
                if let Some(sender) = &self.event_sender {
                    sender.send_or_log(Event::CartCleared(cart_id)).await;
                }
            }
            Ok(None) => debug!("No active cart to clear"),
            Err(e) => warn!(error = %e, "Failed to clear cart after checkout"),
        }
    }

    async fn delete_active_cart(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
    ) -> Result<Option<Uuid>, ServiceError> {
        let db = &*self.db_pool;

        let query = CartEntity::find().filter(cart::Column::Status.eq(CartStatus::Active));
        let query = match (user_id, session_id) {
            (Some(uid), _) => query.filter(cart::Column::UserId.eq(uid)),
            (None, Some(sid)) => query.filter(cart::Column::SessionId.eq(sid)),
            (None, None) => return Ok(None),
        };

        let cart = match query.one(db).await? {
            Some(cart) => cart,
            None => return Ok(None),
        };

        let cart_id = cart.id;
        CartEntity::delete_by_id(cart_id).exec(db).await?;
        Ok(Some(cart_id))
    }
}
