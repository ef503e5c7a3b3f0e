mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::{json, Value};
use std::str::FromStr;
use storefront_orders::{
    entities::{cart, order, order_item, product, product_variant, promotion_usage},
    services::orders::PlaceOrderCommand,
    services::stock::RequestedItem,
};
use uuid::Uuid;

use common::{read_json, TestApp};

fn money(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("money fields serialize as strings")).unwrap()
}

fn shipping_address() -> Value {
    json!({
        "line1": "12 Marina Rd",
        "city": "Lagos",
        "country": "NG"
    })
}

#[tokio::test]
async fn shipping_order_at_threshold_ships_free() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Desk Lamp", "ACME-LAMP", Decimal::from(25_000), 10)
        .await;

    let user_id = Uuid::new_v4();
    let token = app.customer_token(user_id);
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 2}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert_eq!(money(&body["subtotal"]), Decimal::from(50_000));
    assert_eq!(money(&body["shipping_amount"]), Decimal::ZERO);
    assert_eq!(money(&body["tax_amount"]), Decimal::from(3_750));
    assert_eq!(money(&body["discount_amount"]), Decimal::ZERO);
    assert_eq!(money(&body["total"]), Decimal::from(53_750));
    assert_eq!(body["status"], "pending");
    assert_eq!(body["payment_status"], "pending");
    assert_eq!(body["email"], "jane@example.com");
    assert_eq!(body["user_id"], user_id.to_string());

    let items = body["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Desk Lamp");
    assert_eq!(items[0]["sku"], "ACME-LAMP");
    assert_eq!(items[0]["quantity"], 2);
    assert_eq!(money(&items[0]["price"]), Decimal::from(25_000));
    assert_eq!(money(&items[0]["total"]), Decimal::from(50_000));
}

#[tokio::test]
async fn pickup_orders_never_charge_shipping() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Desk Lamp", "ACME-LAMP", Decimal::from(25_000), 10)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 2}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "pickup",
        "pickupDate": "2026-09-01",
        "pickupTime": "14:00"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert_eq!(money(&body["shipping_amount"]), Decimal::ZERO);
    assert_eq!(money(&body["total"]), Decimal::from(53_750));
    assert_eq!(body["delivery_method"], "pickup");
    assert_eq!(body["pickup_date"], "2026-09-01");
    assert_eq!(body["pickup_time"], "14:00");
}

#[tokio::test]
async fn below_threshold_orders_pay_the_flat_fee() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert_eq!(money(&body["subtotal"]), Decimal::from(10_000));
    assert_eq!(money(&body["shipping_amount"]), Decimal::from(2_500));
    assert_eq!(money(&body["tax_amount"]), Decimal::from(750));
    assert_eq!(money(&body["total"]), Decimal::from(13_250));
}

#[tokio::test]
async fn save10_applies_discount_and_records_one_usage() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Desk Lamp", "ACME-LAMP", Decimal::from(25_000), 10)
        .await;
    let now = Utc::now();
    let promo = app
        .seed_promotion(
            "SAVE10",
            Decimal::from(10),
            now - Duration::days(1),
            now + Duration::days(30),
            1,
            true,
        )
        .await;

    let user_id = Uuid::new_v4();
    let token = app.customer_token(user_id);
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 2}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping",
        "promotion": "SAVE10"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert_eq!(money(&body["discount_amount"]), Decimal::from(5_000));
    // 50_000 + 3_750 tax + 0 shipping - 5_000 discount
    assert_eq!(money(&body["total"]), Decimal::from(48_750));
    assert_eq!(body["promotion_id"], promo.id.to_string());

    let order_id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
    let usages = promotion_usage::Entity::find()
        .filter(promotion_usage::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .expect("query promotion usages");
    assert_eq!(usages.len(), 1);
    assert_eq!(usages[0].promotion_id, promo.id);
    assert_eq!(usages[0].user_id, user_id);
}

#[tokio::test]
async fn understocked_item_fails_with_quantities_in_details() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 1)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 3}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["error"], "Some items in your order are unavailable");
    let details = body["details"].as_array().expect("details array");
    assert_eq!(details.len(), 1);
    assert_eq!(
        details[0],
        "Insufficient stock for Mug: requested 3, available 1"
    );

    let orders = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders");
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn inactive_and_unknown_items_fail_together() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let inactive = app
        .seed_inactive_product(brand.id, "Poster", "ACME-POSTER", Decimal::from(5_000))
        .await;
    let missing_id = Uuid::new_v4();

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [
            {"product_id": inactive.id, "quantity": 1},
            {"product_id": missing_id, "quantity": 1}
        ],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    let details: Vec<&str> = body["details"]
        .as_array()
        .expect("details array")
        .iter()
        .map(|d| d.as_str().unwrap())
        .collect();
    assert_eq!(details.len(), 2);
    assert!(details.contains(&"Poster is currently unavailable"));
    assert!(details.contains(&format!("Item {} is no longer available", missing_id).as_str()));
}

#[tokio::test]
async fn untracked_products_sell_regardless_of_quantity() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_untracked_product(brand.id, "Gift Card", "ACME-GIFT", Decimal::from(5_000))
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 25}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Inventory is untouched for untracked products.
    let reloaded = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.inventory_quantity, 0);
}

#[tokio::test]
async fn placement_reduces_product_inventory() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 3}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let reloaded = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.inventory_quantity, 7);
}

#[tokio::test]
async fn variant_orders_validate_and_reduce_the_variant() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "T-Shirt", "ACME-TEE", Decimal::from(8_000), 50)
        .await;
    let variant = app
        .seed_variant(product.id, "T-Shirt / L", "ACME-TEE-L", Decimal::from(8_500), 4)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "variant_id": variant.id, "quantity": 2}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    let items = body["items"].as_array().unwrap();
    // Line pricing comes from the variant, not the parent product.
    assert_eq!(items[0]["title"], "T-Shirt / L");
    assert_eq!(money(&items[0]["price"]), Decimal::from(8_500));

    let reloaded_variant = product_variant::Entity::find_by_id(variant.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded_variant.inventory_quantity, 2);

    let reloaded_product = product::Entity::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded_product.inventory_quantity, 50);
}

#[tokio::test]
async fn guest_checkout_works_and_clears_the_session_cart() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;
    let cart = app.seed_active_cart(None, Some("sess-42")).await;

    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "guest@example.com",
        "shippingAddress": shipping_address(),
        "sessionId": "sess-42",
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = read_json(response).await;
    assert!(body["user_id"].is_null());
    assert_eq!(body["session_id"], "sess-42");

    let gone = cart::Entity::find_by_id(cart.id)
        .one(&*app.state.db)
        .await
        .expect("query cart");
    assert!(gone.is_none());
}

#[tokio::test]
async fn authenticated_checkout_clears_the_user_cart() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;

    let user_id = Uuid::new_v4();
    let cart = app.seed_active_cart(Some(user_id), None).await;
    let token = app.customer_token(user_id);

    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let gone = cart::Entity::find_by_id(cart.id)
        .one(&*app.state.db)
        .await
        .expect("query cart");
    assert!(gone.is_none());
}

#[tokio::test]
async fn guest_checkout_with_promotion_code_is_rejected() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;
    let now = Utc::now();
    app.seed_promotion(
        "SAVE10",
        Decimal::from(10),
        now - Duration::days(1),
        now + Duration::days(30),
        5,
        true,
    )
    .await;

    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "guest@example.com",
        "shippingAddress": shipping_address(),
        "sessionId": "sess-7",
        "deliveryMethod": "shipping",
        "promotion": "SAVE10"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["error"], "Promotion codes require a signed-in account");
}

#[tokio::test]
async fn future_promotions_are_rejected_before_their_window() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;
    let now = Utc::now();
    app.seed_promotion(
        "LAUNCH20",
        Decimal::from(20),
        now + Duration::days(3),
        now + Duration::days(30),
        5,
        true,
    )
    .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping",
        "promotion": "LAUNCH20"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = read_json(response).await;
    assert_eq!(body["error"], "Promotion code LAUNCH20 is not active yet");
}

#[tokio::test]
async fn usage_limit_caps_redemptions_per_user() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 50)
        .await;
    let now = Utc::now();
    app.seed_promotion(
        "SAVE10",
        Decimal::from(10),
        now - Duration::days(1),
        now + Duration::days(30),
        1,
        true,
    )
    .await;

    let first_user = Uuid::new_v4();
    let token = app.customer_token(first_user);
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping",
        "promotion": "SAVE10"
    });

    let first = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(payload.clone()),
            Some(&token),
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(payload.clone()),
            Some(&token),
        )
        .await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = read_json(second).await;
    assert_eq!(
        body["error"],
        "Promotion code SAVE10 has reached its usage limit of 1 per customer"
    );

    // A different customer still redeems freely.
    let other_token = app.customer_token(Uuid::new_v4());
    let third = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(payload),
            Some(&other_token),
        )
        .await;
    assert_eq!(third.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn order_numbers_increment_within_brand_and_day() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 50)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let first = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(payload.clone()),
            Some(&token),
        )
        .await;
    let first_body = read_json(first).await;
    let first_number = first_body["order_number"].as_str().unwrap().to_string();

    let second = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    let second_body = read_json(second).await;
    let second_number = second_body["order_number"].as_str().unwrap().to_string();

    assert!(
        first_number.starts_with("ACME-") && first_number.ends_with("-001"),
        "unexpected first order number: {first_number}"
    );
    assert_eq!(
        second_number,
        first_number.replace("-001", "-002"),
        "sequence should continue within the same brand and day"
    );
}

#[tokio::test]
async fn hyphenated_brand_slugs_keep_their_daily_sequence() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme West", "acme-west").await;
    let product = app
        .seed_product(brand.id, "Mug", "AW-MUG", Decimal::from(10_000), 50)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [{"product_id": product.id, "quantity": 1}],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let first = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(payload.clone()),
            Some(&token),
        )
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first_body = read_json(first).await;
    let first_number = first_body["order_number"].as_str().unwrap().to_string();
    assert!(
        first_number.starts_with("ACME-WEST-") && first_number.ends_with("-001"),
        "unexpected first order number: {first_number}"
    );

    // The slug's own hyphen must not confuse sequence parsing: the second
    // order continues the count instead of colliding with the first.
    let second = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(second.status(), StatusCode::CREATED);
    let second_body = read_json(second).await;
    assert_eq!(
        second_body["order_number"].as_str().unwrap(),
        first_number.replace("-001", "-002")
    );
}

#[tokio::test]
async fn placement_response_carries_the_written_line_items() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let mug = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;
    let lamp = app
        .seed_product(brand.id, "Desk Lamp", "ACME-LAMP", Decimal::from(25_000), 10)
        .await;

    let token = app.customer_token(Uuid::new_v4());
    let payload = json!({
        "items": [
            {"product_id": mug.id, "quantity": 2},
            {"product_id": lamp.id, "quantity": 1}
        ],
        "email": "jane@example.com",
        "shippingAddress": shipping_address(),
        "deliveryMethod": "shipping"
    });

    let response = app
        .request(Method::POST, "/api/v1/orders", Some(payload), Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;

    // The item rows in the response are the ones the transaction wrote.
    let order_id = Uuid::parse_str(body["id"].as_str().unwrap()).unwrap();
    let stored = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&*app.state.db)
        .await
        .expect("query order items");
    assert_eq!(stored.len(), 2);

    let returned: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["id"].as_str().unwrap())
        .collect();
    assert_eq!(returned.len(), 2);
    for row in &stored {
        assert!(returned.contains(&row.id.to_string().as_str()));
    }
}

#[tokio::test]
async fn failed_item_insert_leaves_no_order_header() {
    let app = TestApp::new().await;
    let brand = app.seed_brand("Acme", "acme").await;
    let product = app
        .seed_product(brand.id, "Mug", "ACME-MUG", Decimal::from(10_000), 10)
        .await;

    // Zero quantity slips past stock checks but violates the order_items
    // quantity constraint, forcing a rollback mid-transaction.
    let command = PlaceOrderCommand {
        items: vec![RequestedItem {
            product_id: product.id,
            variant_id: None,
            quantity: 0,
        }],
        email: "jane@example.com".to_string(),
        user_id: Some(Uuid::new_v4()),
        session_id: None,
        shipping_address: shipping_address(),
        billing_address: None,
        delivery_method: storefront_orders::entities::order::DeliveryMethod::Shipping,
        pickup_date: None,
        pickup_time: None,
        customer_phone: None,
        special_instructions: None,
        promotion_code: None,
    };

    let result = app.state.order_service.place_order(command).await;
    assert!(result.is_err());

    let headers = order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders");
    assert_eq!(headers, 0);
    let items = order_item::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count order items");
    assert_eq!(items, 0);
}
