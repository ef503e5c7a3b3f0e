use axum::{extract::State, response::Json};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::AppState;

use super::AppJson;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ValidatePromotionRequest {
    #[validate(length(min = 1, message = "Promotion code must not be empty"))]
    pub code: String,
    /// Cart subtotal the discount would apply to
    pub subtotal: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPreview {
    pub code: String,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
}

/// Preview a promotion code
#[utoipa::path(
    post,
    path = "/api/v1/promotions/validate",
    summary = "Validate promotion code",
    description = "Checks eligibility and computes the discount for a hypothetical subtotal without recording usage",
    request_body = ValidatePromotionRequest,
    responses(
        (status = 200, description = "Code is valid", body = PromotionPreview),
        (status = 400, description = "Code is unknown, expired or over its usage limit", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn validate_promotion(
    State(state): State<AppState>,
    auth_user: AuthUser,
    AppJson(request): AppJson<ValidatePromotionRequest>,
) -> Result<Json<PromotionPreview>, ServiceError> {
    request.validate()?;
    if request.subtotal < Decimal::ZERO {
        return Err(ServiceError::validation("Subtotal must not be negative"));
    }

    let (promotion, discount) = state
        .order_service
        .preview_promotion(&request.code, request.subtotal, auth_user.user_id)
        .await?;

    Ok(Json(PromotionPreview {
        code: promotion.code,
        discount_percent: promotion.discount_percent,
        discount_amount: discount,
    }))
}
