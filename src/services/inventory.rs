use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    entities::product_variant::{self, Entity as VariantEntity},
    events::{Event, EventSender},
    services::stock::ValidatedItem,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Decrements stock after an order commits. Strictly best-effort: every
/// failure becomes a warning, never a failed order, because the order
/// already exists. Gaps left by concurrent reductions are reconciled out
/// of band.
#[derive(Clone)]
pub struct InventoryReducer {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl InventoryReducer {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Reduces stock for every line item of a committed order, flooring at
    /// zero. Returns the warnings collected along the way.
    #[instrument(skip(self, items), fields(order_id = %order_id, item_count = items.len()))]
    pub async fn reduce_for_order(&self, order_id: Uuid, items: &[ValidatedItem]) -> Vec<String> {
        let mut warnings = Vec::new();

        for item in items {
            if let Err(message) = self.reduce_item(item).await {
                warnings.push(message);
            }
        }

        if !warnings.is_empty() {
            warn!(
                order_id = %order_id,
                warning_count = warnings.len(),
                warnings = ?warnings,
                "Inventory reduction finished with warnings"
            );
        }

        warnings
    }

    async fn reduce_item(&self, item: &ValidatedItem) -> Result<(), String> {
        match item.variant_id {
            Some(variant_id) => self.reduce_variant(item, variant_id).await,
            None => self.reduce_product(item).await,
        }
    }

    async fn reduce_variant(&self, item: &ValidatedItem, variant_id: Uuid) -> Result<(), String> {
        let db = &*self.db_pool;

        let variant = VariantEntity::find_by_id(variant_id)
            .one(db)
            .await
            .map_err(|e| format!("Could not re-read stock for {}: {}", item.title, e))?
            .ok_or_else(|| format!("Variant for {} vanished before stock reduction", item.title))?;

        if !variant.tracks_inventory() {
            return Ok(());
        }

        let old_quantity = variant.inventory_quantity;
        let new_quantity = (old_quantity - item.quantity).max(0);

        let mut active: product_variant::ActiveModel = variant.into();
        active.inventory_quantity = Set(new_quantity);
        active.updated_at = Set(Utc::now());
        active
            .update(db)
            .await
            .map_err(|e| format!("Could not reduce stock for {}: {}", item.title, e))?;

        self.notify_adjustment(item.product_id, Some(variant_id), old_quantity, new_quantity)
            .await;
        Ok(())
    }

    async fn reduce_product(&self, item: &ValidatedItem) -> Result<(), String> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(item.product_id)
            .one(db)
            .await
            .map_err(|e| format!("Could not re-read stock for {}: {}", item.title, e))?
            .ok_or_else(|| format!("Product for {} vanished before stock reduction", item.title))?;

        if !product.tracks_inventory() {
            return Ok(());
        }

        let old_quantity = product.inventory_quantity;
        let new_quantity = (old_quantity - item.quantity).max(0);

        let mut active: product::ActiveModel = product.into();
        active.inventory_quantity = Set(new_quantity);
        active.updated_at = Set(Utc::now());
        active
            .update(db)
            .await
            .map_err(|e| format!("Could not reduce stock for {}: {}", item.title, e))?;

        self.notify_adjustment(item.product_id, None, old_quantity, new_quantity)
            .await;
        Ok(())
    }

    async fn notify_adjustment(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        old_quantity: i32,
        new_quantity: i32,
    ) {
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::InventoryAdjusted {
                    product_id,
                    variant_id,
                    old_quantity,
                    new_quantity,
                })
                .await;
        }
    }
}
