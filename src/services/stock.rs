use crate::{
    db::DbPool,
    entities::product::Entity as ProductEntity,
    entities::product_variant::Entity as VariantEntity,
    errors::ServiceError,
};
use futures::future;
use rust_decimal::Decimal;
use sea_orm::{DbErr, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// A line item as requested by the storefront, before any resolution
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RequestedItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

/// A line item that passed validation, carrying the pricing snapshot
/// resolved from the catalog so later stages never trust client prices
#[derive(Debug, Clone)]
pub struct ValidatedItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub title: String,
    pub sku: String,
    pub unit_price: Decimal,
    pub quantity: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockFailureCode {
    ItemUnavailable,
    InsufficientStock,
    LookupFailed,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockFailure {
    pub code: StockFailureCode,
    pub message: String,
}

impl StockFailure {
    fn unavailable(title: &str) -> Self {
        Self {
            code: StockFailureCode::ItemUnavailable,
            message: format!("{} is currently unavailable", title),
        }
    }

    fn not_found(id: Uuid) -> Self {
        Self {
            code: StockFailureCode::ItemUnavailable,
            message: format!("Item {} is no longer available", id),
        }
    }

    fn insufficient(title: &str, requested: i32, available: i32) -> Self {
        Self {
            code: StockFailureCode::InsufficientStock,
            message: format!(
                "Insufficient stock for {}: requested {}, available {}",
                title, requested, available
            ),
        }
    }

    fn lookup_failed(id: Uuid) -> Self {
        Self {
            code: StockFailureCode::LookupFailed,
            message: format!("Could not verify availability for item {}", id),
        }
    }
}

/// Result of checking a whole item list: either every line resolved and
/// passed, or the complete set of failures for the storefront to display
#[derive(Debug)]
pub enum StockOutcome {
    Valid(Vec<ValidatedItem>),
    Failed(Vec<StockFailure>),
}

/// Validates requested line items against catalog availability and stock
#[derive(Clone)]
pub struct StockValidator {
    db_pool: Arc<DbPool>,
}

impl StockValidator {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Checks every requested item and reports all failures at once rather
    /// than stopping at the first, so the customer sees the full picture.
    #[instrument(skip(self, items), fields(item_count = items.len()))]
    pub async fn validate_items(
        &self,
        items: &[RequestedItem],
    ) -> Result<StockOutcome, ServiceError> {
        let checks = items.iter().map(|item| self.check_item(item));
        let results = future::join_all(checks).await;

        let mut validated = Vec::with_capacity(items.len());
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(item) => validated.push(item),
                Err(failure) => failures.push(failure),
            }
        }

        if failures.is_empty() {
            Ok(StockOutcome::Valid(validated))
        } else {
            warn!(failure_count = failures.len(), "Stock validation failed");
            Ok(StockOutcome::Failed(failures))
        }
    }

    async fn check_item(&self, item: &RequestedItem) -> Result<ValidatedItem, StockFailure> {
        match item.variant_id {
            Some(variant_id) => self.check_variant(item, variant_id).await,
            None => self.check_product(item).await,
        }
    }

    async fn check_variant(
        &self,
        item: &RequestedItem,
        variant_id: Uuid,
    ) -> Result<ValidatedItem, StockFailure> {
        let variant = VariantEntity::find_by_id(variant_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e: DbErr| {
                warn!(error = %e, variant_id = %variant_id, "Variant lookup failed");
                StockFailure::lookup_failed(variant_id)
            })?
            .ok_or_else(|| StockFailure::not_found(variant_id))?;

        if !variant.is_active {
            return Err(StockFailure::unavailable(&variant.title));
        }
        if variant.tracks_inventory() && variant.inventory_quantity < item.quantity {
            return Err(StockFailure::insufficient(
                &variant.title,
                item.quantity,
                variant.inventory_quantity,
            ));
        }

        Ok(ValidatedItem {
            product_id: item.product_id,
            variant_id: Some(variant_id),
            title: variant.title,
            sku: variant.sku,
            unit_price: variant.price,
            quantity: item.quantity,
        })
    }

    async fn check_product(&self, item: &RequestedItem) -> Result<ValidatedItem, StockFailure> {
        let product = ProductEntity::find_by_id(item.product_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e: DbErr| {
                warn!(error = %e, product_id = %item.product_id, "Product lookup failed");
                StockFailure::lookup_failed(item.product_id)
            })?
            .ok_or_else(|| StockFailure::not_found(item.product_id))?;

        if !product.is_active {
            return Err(StockFailure::unavailable(&product.title));
        }
        if product.tracks_inventory() && product.inventory_quantity < item.quantity {
            return Err(StockFailure::insufficient(
                &product.title,
                item.quantity,
                product.inventory_quantity,
            ));
        }

        Ok(ValidatedItem {
            product_id: product.id,
            variant_id: None,
            title: product.title,
            sku: product.sku,
            unit_price: product.price,
            quantity: item.quantity,
        })
    }
}
