use crate::{
    auth::AuthUser,
    db::{self, DbPool},
    entities::order::{self, DeliveryMethod, Entity as OrderEntity, OrderStatus, PaymentStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::promotion,
    errors::ServiceError,
    events::{Event, EventSender},
    services::carts::CartClearer,
    services::inventory::InventoryReducer,
    services::order_numbers::OrderNumberGenerator,
    services::promotions::{PromotionOutcome, PromotionService},
    services::stock::{RequestedItem, StockOutcome, StockValidator, ValidatedItem},
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Fixed 7.5% VAT applied to every order
const VAT_RATE: Decimal = dec!(0.075);
/// Subtotal at or above which shipped orders ride free
const FREE_SHIPPING_THRESHOLD: Decimal = dec!(50000);
/// How many times a colliding order number is regenerated before giving up
const ORDER_NUMBER_RETRIES: u32 = 3;

/// Everything the placement pipeline needs, assembled by the HTTP layer
/// from the request body and the caller's identity.
#[derive(Debug, Clone)]
pub struct PlaceOrderCommand {
    pub items: Vec<RequestedItem>,
    pub email: String,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub delivery_method: DeliveryMethod,
    pub pickup_date: Option<String>,
    pub pickup_time: Option<String>,
    pub customer_phone: Option<String>,
    pub special_instructions: Option<String>,
    pub promotion_code: Option<String>,
}

/// A committed order plus any post-commit bookkeeping warnings
#[derive(Debug)]
pub struct PlacedOrder {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Pagination {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    #[serde(rename = "totalPages")]
    pub total_pages: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub pagination: Pagination,
}

/// Monetary breakdown of an order, computed server-side from resolved
/// catalog prices. `total = subtotal + tax + shipping - discount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    pub fn compute(
        items: &[ValidatedItem],
        delivery_method: DeliveryMethod,
        promotion: Option<&promotion::Model>,
        flat_shipping_fee: Decimal,
    ) -> Self {
        let subtotal: Decimal = items
            .iter()
            .map(|item| item.unit_price * Decimal::from(item.quantity))
            .sum();

        let tax = round_money(subtotal * VAT_RATE);

        let shipping = match delivery_method {
            DeliveryMethod::Pickup => Decimal::ZERO,
            DeliveryMethod::Shipping if subtotal >= FREE_SHIPPING_THRESHOLD => Decimal::ZERO,
            DeliveryMethod::Shipping => flat_shipping_fee,
        };

        let discount = promotion
            .map(|promo| PromotionService::discount_amount(promo, subtotal))
            .unwrap_or(Decimal::ZERO);

        let total = subtotal + tax + shipping - discount;

        Self {
            subtotal,
            tax,
            shipping,
            discount,
            total,
        }
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Drives the placement pipeline end to end and serves order reads.
///
/// Pipeline order is fixed: stock gate, promotion gate, totals, then the
/// transactional write. Usage recording, inventory reduction and cart
/// clearing run after commit and can only degrade to warnings.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    stock: StockValidator,
    promotions: PromotionService,
    numbers: OrderNumberGenerator,
    inventory: InventoryReducer,
    carts: CartClearer,
    flat_shipping_fee: Decimal,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        flat_shipping_fee: Decimal,
    ) -> Self {
        Self {
            stock: StockValidator::new(db_pool.clone()),
            promotions: PromotionService::new(db_pool.clone()),
            numbers: OrderNumberGenerator::new(db_pool.clone()),
            inventory: InventoryReducer::new(db_pool.clone(), event_sender.clone()),
            carts: CartClearer::new(db_pool.clone(), event_sender.clone()),
            db_pool,
            event_sender,
            flat_shipping_fee,
        }
    }

    /// Places an order: validates stock and promotion, prices the cart,
    /// writes the order atomically, then runs the post-commit bookkeeping.
    #[instrument(skip(self, cmd), fields(email = %cmd.email, item_count = cmd.items.len()))]
    pub async fn place_order(&self, cmd: PlaceOrderCommand) -> Result<PlacedOrder, ServiceError> {
        let first_item = cmd
            .items
            .first()
            .ok_or_else(|| ServiceError::validation("Order must contain at least one item"))?;
        let first_product_id = first_item.product_id;

        let items = match self.stock.validate_items(&cmd.items).await? {
            StockOutcome::Valid(items) => items,
            StockOutcome::Failed(failures) => {
                let details = failures.into_iter().map(|f| f.message).collect();
                return Err(ServiceError::validation_failed(
                    "Some items in your order are unavailable",
                    details,
                ));
            }
        };

        let promotion = match &cmd.promotion_code {
            Some(code) => match self.promotions.validate_code(code, cmd.user_id).await? {
                PromotionOutcome::Valid(promo) => Some(promo),
                PromotionOutcome::Failed(failure) => {
                    return Err(ServiceError::validation(failure.message));
                }
            },
            None => None,
        };

        let totals = OrderTotals::compute(
            &items,
            cmd.delivery_method,
            promotion.as_ref(),
            self.flat_shipping_fee,
        );

        let (order, order_items) = self
            .insert_with_retry(&cmd, &items, &totals, promotion.as_ref(), first_product_id)
            .await?;

        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderCreated(order.id)).await;
        }

        // Post-commit bookkeeping. The order exists; nothing below may undo it.
        if let (Some(promo), Some(user_id)) = (&promotion, cmd.user_id) {
            match self.promotions.record_usage(promo.id, user_id, order.id).await {
                Ok(()) => {
                    if let Some(sender) = &self.event_sender {
                        sender
                            .send_or_log(Event::PromotionApplied {
                                promotion_id: promo.id,
                                order_id: order.id,
                                user_id,
                            })
                            .await;
                    }
                }
                Err(e) => {
                    error!(
                        error = %e,
                        order_id = %order.id,
                        promotion_id = %promo.id,
                        "Failed to record promotion usage"
                    );
                }
            }
        }

        let warnings = self.inventory.reduce_for_order(order.id, &items).await;

        self.carts
            .clear_after_checkout(cmd.user_id, cmd.session_id.as_deref())
            .await;

        Ok(PlacedOrder {
            order,
            items: order_items,
            warnings,
        })
    }

    /// Inserts the order under a freshly generated number, regenerating on
    /// unique-constraint collisions. Two requests racing to the same
    /// brand/day sequence settle here instead of sharing a number.
    async fn insert_with_retry(
        &self,
        cmd: &PlaceOrderCommand,
        items: &[ValidatedItem],
        totals: &OrderTotals,
        promotion: Option<&promotion::Model>,
        first_product_id: Uuid,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let mut attempt = 0;
        loop {
            let order_number = self.numbers.generate(first_product_id).await;
            match self
                .insert_order(cmd, items, totals, promotion, &order_number)
                .await
            {
                Ok(inserted) => return Ok(inserted),
                Err(ServiceError::DatabaseError(ref db_err))
                    if is_unique_violation(db_err) && attempt < ORDER_NUMBER_RETRIES =>
                {
                    attempt += 1;
                    warn!(
                        order_number = %order_number,
                        attempt,
                        "Order number collided, regenerating"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Writes the order header and all line items in one transaction; a
    /// failed item insert leaves no header behind. Returns the rows as
    /// written, so the caller never depends on a follow-up read.
    async fn insert_order(
        &self,
        cmd: &PlaceOrderCommand,
        items: &[ValidatedItem],
        totals: &OrderTotals,
        promotion: Option<&promotion::Model>,
        order_number: &str,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let db = &*self.db_pool;
        let started = Instant::now();
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order placement");
            ServiceError::DatabaseError(e)
        })?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.to_string()),
            user_id: Set(cmd.user_id),
            session_id: Set(cmd.session_id.clone()),
            email: Set(cmd.email.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Pending),
            delivery_method: Set(cmd.delivery_method),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax),
            shipping_amount: Set(totals.shipping),
            discount_amount: Set(totals.discount),
            total: Set(totals.total),
            shipping_address: Set(cmd.shipping_address.clone()),
            billing_address: Set(cmd.billing_address.clone()),
            pickup_date: Set(cmd.pickup_date.clone()),
            pickup_time: Set(cmd.pickup_time.clone()),
            customer_phone: Set(cmd.customer_phone.clone()),
            special_instructions: Set(cmd.special_instructions.clone()),
            promotion_id: Set(promotion.map(|p| p.id)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut order_items = Vec::with_capacity(items.len());
        for item in items {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                variant_id: Set(item.variant_id),
                title: Set(item.title.clone()),
                sku: Set(item.sku.clone()),
                price: Set(item.unit_price),
                quantity: Set(item.quantity),
                total: Set(item.unit_price * Decimal::from(item.quantity)),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to insert order item, rolling back");
                ServiceError::DatabaseError(e)
            })?;
            order_items.push(line);
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order placement");
            ServiceError::DatabaseError(e)
        })?;

        db::record_db_operation("order_insert", started.elapsed());
        info!(
            order_id = %order_id,
            order_number = %order_number,
            total = %totals.total,
            "Order created successfully"
        );

        Ok((order_model, order_items))
    }

    /// Lists orders newest-first. Admins see everything; everyone else sees
    /// only their own.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn list_orders(
        &self,
        caller: &AuthUser,
        page: u64,
        limit: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut query = OrderEntity::find().order_by_desc(order::Column::CreatedAt);
        if !caller.is_admin() {
            query = query.filter(order::Column::UserId.eq(caller.user_id));
        }

        let paginator = query.paginate(&*self.db_pool, limit);
        let counts = paginator.num_items_and_pages().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        Ok(OrderListResponse {
            orders,
            pagination: Pagination {
                page,
                limit,
                total: counts.number_of_items,
                total_pages: counts.number_of_pages,
            },
        })
    }

    /// Fetches one order with its items. Non-admin callers only ever see
    /// their own orders; anything else reads as not found.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        self.visible_to(order, caller).await
    }

    /// Fetches one order by its human-readable number.
    #[instrument(skip(self, caller), fields(order_number = %order_number))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
        caller: &AuthUser,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        self.visible_to(order, caller).await
    }

    async fn visible_to(
        &self,
        order: order::Model,
        caller: &AuthUser,
    ) -> Result<OrderWithItems, ServiceError> {
        if !caller.is_admin() && order.user_id != Some(caller.user_id) {
            return Err(ServiceError::NotFound("Order not found".to_string()));
        }
        let items = self.load_items(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Moves an order to a new status, enforcing the lifecycle. Invalid
    /// transitions are rejected before any write happens.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<order::Model, ServiceError> {
        let db = &*self.db_pool;

        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = order.status;
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition order from {} to {}",
                old_status, new_status
            )));
        }

        let mut active: order::ActiveModel = order.into();
        active.status = Set(new_status);
        let updated = active.update(db).await?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "Order status updated"
        );

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderStatusChanged {
                    order_id,
                    old_status: old_status.to_string(),
                    new_status: new_status.to_string(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Validates a promotion code against a hypothetical subtotal without
    /// recording usage. Backs the storefront's "apply code" preview.
    pub async fn preview_promotion(
        &self,
        code: &str,
        subtotal: Decimal,
        user_id: Uuid,
    ) -> Result<(promotion::Model, Decimal), ServiceError> {
        match self.promotions.validate_code(code, Some(user_id)).await? {
            PromotionOutcome::Valid(promo) => {
                let discount = PromotionService::discount_amount(&promo, subtotal);
                Ok((promo, discount))
            }
            PromotionOutcome::Failed(failure) => Err(ServiceError::validation(failure.message)),
        }
    }

    async fn load_items(&self, order_id: Uuid) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db_pool)
            .await?)
    }
}
