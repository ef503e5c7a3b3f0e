use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Orders API",
        version = "1.0.0",
        description = r#"
Order placement service for the storefront.

Checkout validates stock and promotion eligibility, computes totals
server-side from catalog prices and creates the order atomically with its
line items. Inventory reduction, promotion-usage recording and cart
clearing run after the order is committed and never fail a placed order.

## Authentication

Most endpoints require a JWT bearer token issued by the identity provider:

```
Authorization: Bearer <your-jwt-token>
```

`POST /api/v1/orders` also accepts anonymous guest checkouts carrying a
`sessionId` instead of a token.

## Errors

Non-2xx responses share one wire shape. Business-rule failures list the
individual problems in `details`:

```json
{
  "error": "Some items in your order are unavailable",
  "details": ["Insufficient stock for Mug: requested 3, available 1"]
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order placement and retrieval"),
        (name = "Promotions", description = "Promotion code preview"),
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_by_number,
        crate::handlers::orders::update_order_status,
        crate::handlers::promotions::validate_promotion,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::handlers::orders::CreateOrderRequest,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::promotions::ValidatePromotionRequest,
            crate::handlers::promotions::PromotionPreview,
            crate::services::stock::RequestedItem,
            crate::services::orders::OrderWithItems,
            crate::services::orders::OrderListResponse,
            crate::services::orders::Pagination,
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order::DeliveryMethod,
            crate::entities::order_item::Model,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
