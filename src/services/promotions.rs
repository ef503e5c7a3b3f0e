use crate::{
    db::DbPool,
    entities::promotion::{self, Entity as PromotionEntity},
    entities::promotion_usage::{self, Entity as UsageEntity},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, Set, Statement,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionFailureCode {
    PromotionNotFound,
    PromotionExpired,
    UsageLimitReached,
    AuthRequired,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PromotionFailure {
    pub code: PromotionFailureCode,
    pub message: String,
}

impl PromotionFailure {
    fn not_found(code: &str) -> Self {
        Self {
            code: PromotionFailureCode::PromotionNotFound,
            message: format!("Promotion code {} is not valid", code),
        }
    }

    fn not_started(code: &str) -> Self {
        Self {
            code: PromotionFailureCode::PromotionExpired,
            message: format!("Promotion code {} is not active yet", code),
        }
    }

    fn ended(code: &str) -> Self {
        Self {
            code: PromotionFailureCode::PromotionExpired,
            message: format!("Promotion code {} has expired", code),
        }
    }

    fn usage_limit(code: &str, limit: i32) -> Self {
        Self {
            code: PromotionFailureCode::UsageLimitReached,
            message: format!(
                "Promotion code {} has reached its usage limit of {} per customer",
                code, limit
            ),
        }
    }

    fn auth_required() -> Self {
        Self {
            code: PromotionFailureCode::AuthRequired,
            message: "Promotion codes require a signed-in account".to_string(),
        }
    }
}

/// Result of validating a promotion code: the eligible promotion record,
/// or the first hard-stop failure encountered
#[derive(Debug)]
pub enum PromotionOutcome {
    Valid(promotion::Model),
    Failed(PromotionFailure),
}

// Capability probe for the record_promotion_usage stored procedure.
// Resolved once per process; stores without the procedure use the
// direct-insert path from then on.
const PROC_UNKNOWN: u8 = 0;
const PROC_AVAILABLE: u8 = 1;
const PROC_MISSING: u8 = 2;
static RECORD_PROC_STATE: AtomicU8 = AtomicU8::new(PROC_UNKNOWN);

/// Validates promotion codes and records their usage after checkout
#[derive(Clone)]
pub struct PromotionService {
    db_pool: Arc<DbPool>,
}

impl PromotionService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Validates a promotion code for a user. Each check is a hard stop:
    /// active code exists, the current time falls inside its validity
    /// window, and the user has not exhausted the per-customer limit.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn validate_code(
        &self,
        code: &str,
        user_id: Option<Uuid>,
    ) -> Result<PromotionOutcome, ServiceError> {
        let user_id = match user_id {
            Some(id) => id,
            None => return Ok(PromotionOutcome::Failed(PromotionFailure::auth_required())),
        };

        let found = PromotionEntity::find()
            .filter(promotion::Column::Code.eq(code))
            .filter(promotion::Column::IsActive.eq(true))
            .one(&*self.db_pool)
            .await?;

        let promo = match found {
            Some(promo) => promo,
            None => return Ok(PromotionOutcome::Failed(PromotionFailure::not_found(code))),
        };

        let now = Utc::now();
        if now < promo.valid_from {
            return Ok(PromotionOutcome::Failed(PromotionFailure::not_started(code)));
        }
        if now > promo.valid_until {
            return Ok(PromotionOutcome::Failed(PromotionFailure::ended(code)));
        }

        let used = UsageEntity::find()
            .filter(promotion_usage::Column::PromotionId.eq(promo.id))
            .filter(promotion_usage::Column::UserId.eq(user_id))
            .count(&*self.db_pool)
            .await?;

        if used >= promo.usage_limit.max(0) as u64 {
            return Ok(PromotionOutcome::Failed(PromotionFailure::usage_limit(
                code,
                promo.usage_limit,
            )));
        }

        Ok(PromotionOutcome::Valid(promo))
    }

    /// Discount for a given subtotal, derived from the promotion's percentage
    /// at the moment the order is written.
    pub fn discount_amount(promo: &promotion::Model, subtotal: Decimal) -> Decimal {
        (subtotal * promo.discount_percent / Decimal::from(100))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Records one usage of a promotion against an order. Tries the
    /// record_promotion_usage stored procedure first and falls back to a
    /// direct insert when the store does not provide it.
    #[instrument(skip(self))]
    pub async fn record_usage(
        &self,
        promotion_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        if self
            .record_via_procedure(promotion_id, user_id, order_id)
            .await?
        {
            return Ok(());
        }

        let usage = promotion_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            promotion_id: Set(promotion_id),
            user_id: Set(user_id),
            order_id: Set(order_id),
            created_at: Set(Utc::now()),
        };
        usage.insert(&*self.db_pool).await?;

        debug!(promotion_id = %promotion_id, order_id = %order_id, "Promotion usage recorded via direct insert");
        Ok(())
    }

    /// Returns true when the stored procedure handled the recording.
    async fn record_via_procedure(
        &self,
        promotion_id: Uuid,
        user_id: Uuid,
        order_id: Uuid,
    ) -> Result<bool, ServiceError> {
        if RECORD_PROC_STATE.load(Ordering::Relaxed) == PROC_MISSING {
            return Ok(false);
        }

        // Only Postgres can host the procedure; other backends go straight
        // to the direct insert.
        if self.db_pool.get_database_backend() != DbBackend::Postgres {
            RECORD_PROC_STATE.store(PROC_MISSING, Ordering::Relaxed);
            return Ok(false);
        }

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT record_promotion_usage($1, $2, $3)",
            [promotion_id.into(), user_id.into(), order_id.into()],
        );

        match self.db_pool.execute(stmt).await {
            Ok(_) => {
                RECORD_PROC_STATE.store(PROC_AVAILABLE, Ordering::Relaxed);
                Ok(true)
            }
            Err(e) if RECORD_PROC_STATE.load(Ordering::Relaxed) == PROC_AVAILABLE => {
                Err(ServiceError::DatabaseError(e))
            }
            Err(e) => {
                warn!(error = %e, "record_promotion_usage procedure unavailable, falling back to direct insert");
                RECORD_PROC_STATE.store(PROC_MISSING, Ordering::Relaxed);
                Ok(false)
            }
        }
    }
}
