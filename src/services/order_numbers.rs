use crate::{
    db::DbPool,
    entities::brand::Entity as BrandEntity,
    entities::order::{self, Entity as OrderEntity},
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
};
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

// The leading class admits hyphens: brand slugs like `acme-west` keep them.
static ORDER_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9-]+-\d{8}-(\d+)$").unwrap());

/// Produces human-readable order numbers scoped to brand and day, e.g.
/// `ACME-20260821-001`, with a timestamp-plus-random fallback so naming
/// can never block an order.
#[derive(Clone)]
pub struct OrderNumberGenerator {
    db_pool: Arc<DbPool>,
}

impl OrderNumberGenerator {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Next order number for the brand owning the given product. Any
    /// resolution failure downgrades to the fallback format.
    #[instrument(skip(self))]
    pub async fn generate(&self, first_product_id: Uuid) -> String {
        match self.next_sequential(first_product_id).await {
            Ok(number) => number,
            Err(e) => {
                warn!(error = %e, product_id = %first_product_id, "Falling back to alternate order number format");
                Self::fallback_number()
            }
        }
    }

    async fn next_sequential(&self, product_id: Uuid) -> Result<String, ServiceError> {
        let db = &*self.db_pool;

        let product = ProductEntity::find_by_id(product_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let brand = BrandEntity::find_by_id(product.brand_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Brand not found".to_string()))?;

        let prefix = format!("{}-{}", brand.slug.to_uppercase(), Utc::now().format("%Y%m%d"));

        let existing: Vec<String> = OrderEntity::find()
            .select_only()
            .column(order::Column::OrderNumber)
            .filter(order::Column::OrderNumber.like(format!("{}-%", prefix)))
            .order_by_desc(order::Column::OrderNumber)
            .into_tuple()
            .all(db)
            .await?;

        // Numeric max rather than the lexicographic top: once the sequence
        // widens past 999, string ordering would report 999 as the maximum
        // and keep producing a duplicate.
        let next = existing
            .iter()
            .filter_map(|number| Self::parse_sequence(number))
            .max()
            .map_or(1, |max| max + 1);

        Ok(format!("{}-{:03}", prefix, next))
    }

    /// Extracts the trailing sequence from a well-formed sequential order
    /// number. Fallback-format numbers yield `None`.
    pub fn parse_sequence(number: &str) -> Option<u32> {
        ORDER_NUMBER_RE
            .captures(number)
            .and_then(|caps| caps.get(1))
            .and_then(|seq| seq.as_str().parse().ok())
    }

    /// Alternate globally-unique format used when brand resolution fails:
    /// `BZ` + year + last six digits of Unix seconds + four random
    /// alphanumerics, uppercase.
    pub fn fallback_number() -> String {
        let now = Utc::now();
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(4)
            .map(char::from)
            .collect::<String>()
            .to_uppercase();
        format!(
            "BZ{}{:06}{}",
            now.format("%Y"),
            now.timestamp() % 1_000_000,
            suffix
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trailing_sequence() {
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ACME-20260821-007"),
            Some(7)
        );
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ACME-20260821-1000"),
            Some(1000)
        );
    }

    #[test]
    fn hyphenated_slugs_parse_like_plain_ones() {
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ACME-WEST-20260821-001"),
            Some(1)
        );
        assert_eq!(
            OrderNumberGenerator::parse_sequence("B2B-EU-NORTH-20260821-014"),
            Some(14)
        );
    }

    #[test]
    fn rejects_fallback_and_malformed_numbers() {
        assert_eq!(
            OrderNumberGenerator::parse_sequence("BZ2026123456ABCD"),
            None
        );
        assert_eq!(
            OrderNumberGenerator::parse_sequence("ACME-20260821-abc"),
            None
        );
        assert_eq!(OrderNumberGenerator::parse_sequence(""), None);
    }

    #[test]
    fn sequence_is_zero_padded_and_widens() {
        assert_eq!(format!("{:03}", 7), "007");
        assert_eq!(format!("{:03}", 42), "042");
        assert_eq!(format!("{:03}", 1000), "1000");
    }

    #[test]
    fn fallback_number_shape() {
        let number = OrderNumberGenerator::fallback_number();
        let re = Regex::new(r"^BZ\d{10}[A-Z0-9]{4}$").unwrap();
        assert!(re.is_match(&number), "unexpected fallback shape: {number}");
    }

    #[test]
    fn fallback_numbers_differ() {
        // Random suffix makes same-second collisions vanishingly unlikely
        let a = OrderNumberGenerator::fallback_number();
        let b = OrderNumberGenerator::fallback_number();
        assert_ne!(a, b);
    }
}
