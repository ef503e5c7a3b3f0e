use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::entities::order::{self, DeliveryMethod, OrderStatus};
use crate::errors::ServiceError;
use crate::services::orders::{OrderListResponse, OrderWithItems, PlaceOrderCommand};
use crate::services::stock::RequestedItem;
use crate::{AppState, ListQuery};

use super::AppJson;

/// Checkout payload exactly as the storefront sends it: camelCase top-level
/// keys, snake_case keys inside each item.
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateOrderRequest {
    #[validate]
    pub items: Vec<RequestedItem>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub shipping_address: serde_json::Value,
    #[serde(default)]
    pub billing_address: Option<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub delivery_method: DeliveryMethod,
    #[serde(default)]
    pub pickup_date: Option<String>,
    #[serde(default)]
    pub pickup_time: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub special_instructions: Option<String>,
    /// Optional promotion code, applied only for signed-in customers
    #[serde(default)]
    pub promotion: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

/// Place an order
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Place order",
    description = "Validates stock and promotion eligibility, computes totals server-side from catalog prices and creates the order with its items",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderWithItems),
        (status = 400, description = "Validation or business-rule failure", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid bearer token", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(
        (),
        ("Bearer" = [])
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    AppJson(request): AppJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ServiceError> {
    request.validate()?;

    let command = PlaceOrderCommand {
        items: request.items,
        email: request.email,
        user_id: user.as_ref().map(|u| u.user_id),
        session_id: request.session_id,
        shipping_address: request.shipping_address,
        billing_address: request.billing_address,
        delivery_method: request.delivery_method,
        pickup_date: request.pickup_date,
        pickup_time: request.pickup_time,
        customer_phone: request.customer_phone,
        special_instructions: request.special_instructions,
        promotion_code: request.promotion,
    };

    let placed = state.order_service.place_order(command).await?;
    Ok((
        StatusCode::CREATED,
        Json(OrderWithItems {
            order: placed.order,
            items: placed.items,
        }),
    ))
}

/// List orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Paginated list, newest first. Customers see their own orders; admins see all.",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20, max: 100)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderListResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderListResponse>, ServiceError> {
    let response = state
        .order_service
        .list_orders(&auth_user, query.page, query.limit)
        .await?;
    Ok(Json(response))
}

/// Get one order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    responses(
        (status = 200, description = "Order retrieved", body = OrderWithItems),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found or not visible to the caller", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    let order = state.order_service.get_order(id, &auth_user).await?;
    Ok(Json(order))
}

/// Get one order by its human-readable number
#[utoipa::path(
    get,
    path = "/api/v1/orders/number/{order_number}",
    summary = "Get order by number",
    params(
        ("order_number" = String, Path, description = "Order number, e.g. ACME-20250301-001"),
    ),
    responses(
        (status = 200, description = "Order retrieved", body = OrderWithItems),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found or not visible to the caller", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(order_number): Path<String>,
) -> Result<Json<OrderWithItems>, ServiceError> {
    let order = state
        .order_service
        .get_order_by_number(&order_number, &auth_user)
        .await?;
    Ok(Json(order))
}

/// Update order status
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Admin-only transition through the order lifecycle",
    params(
        ("id" = Uuid, Path, description = "Order ID"),
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = order::Model),
        (status = 400, description = "Transition not allowed from the current status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not an admin", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(request): AppJson<UpdateOrderStatusRequest>,
) -> Result<Json<order::Model>, ServiceError> {
    if !auth_user.is_admin() {
        return Err(ServiceError::Forbidden(
            "Administrator role required to update order status".to_string(),
        ));
    }

    let updated = state.order_service.update_status(id, request.status).await?;
    Ok(Json(updated))
}
