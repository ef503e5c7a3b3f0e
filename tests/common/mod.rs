use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_orders::{
    auth::Claims,
    config::AppConfig,
    db,
    entities::{brand, cart, product, product_variant, promotion},
    events::{self, EventSender},
    handlers, AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_JWT_SECRET: &str =
    "integration_test_secret_with_plenty_of_length_and_entropy_0123456789abcdef";

/// Test harness: full router over a private in-memory SQLite database.
/// Each instance gets its own schema, so tests stay independent.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_JWT_SECRET.to_string(),
            3600,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single pooled connection keeps the in-memory database alive and
        // shared across every query this TestApp issues.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db_arc, cfg, event_sender);

        let router = Router::new()
            .nest("/health", handlers::health::health_routes())
            .nest("/api/v1", storefront_orders::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Mints a signed JWT for the given user, matching the service's
    /// issuer/audience configuration.
    pub fn mint_token(&self, user_id: Uuid, roles: &[&str]) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some("customer@example.com".to_string()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
            nbf: now.timestamp() - 10,
            iss: self.state.config.auth_issuer.clone(),
            aud: self.state.config.auth_audience.clone(),
        };
        jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(self.state.config.jwt_secret.as_bytes()),
        )
        .expect("encode test token")
    }

    pub fn customer_token(&self, user_id: Uuid) -> String {
        self.mint_token(user_id, &["customer"])
    }

    pub fn admin_token(&self, user_id: Uuid) -> String {
        self.mint_token(user_id, &["admin"])
    }

    /// Sends one request through the router. `token`, when present,
    /// becomes a bearer Authorization header.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request construction");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router never errors")
    }

    pub async fn seed_brand(&self, name: &str, slug: &str) -> brand::Model {
        let now = Utc::now();
        brand::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed brand")
    }

    pub async fn seed_product(
        &self,
        brand_id: Uuid,
        title: &str,
        sku: &str,
        price: Decimal,
        inventory_quantity: i32,
    ) -> product::Model {
        self.insert_product(brand_id, title, sku, price, inventory_quantity, true, Some(true))
            .await
    }

    pub async fn seed_inactive_product(
        &self,
        brand_id: Uuid,
        title: &str,
        sku: &str,
        price: Decimal,
    ) -> product::Model {
        self.insert_product(brand_id, title, sku, price, 100, false, Some(true))
            .await
    }

    pub async fn seed_untracked_product(
        &self,
        brand_id: Uuid,
        title: &str,
        sku: &str,
        price: Decimal,
    ) -> product::Model {
        self.insert_product(brand_id, title, sku, price, 0, true, Some(false))
            .await
    }

    async fn insert_product(
        &self,
        brand_id: Uuid,
        title: &str,
        sku: &str,
        price: Decimal,
        inventory_quantity: i32,
        is_active: bool,
        track_inventory: Option<bool>,
    ) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            brand_id: Set(brand_id),
            title: Set(title.to_string()),
            sku: Set(sku.to_string()),
            price: Set(price),
            inventory_quantity: Set(inventory_quantity),
            track_inventory: Set(track_inventory),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_variant(
        &self,
        product_id: Uuid,
        title: &str,
        sku: &str,
        price: Decimal,
        inventory_quantity: i32,
    ) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            title: Set(title.to_string()),
            sku: Set(sku.to_string()),
            price: Set(price),
            inventory_quantity: Set(inventory_quantity),
            track_inventory: Set(Some(true)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product variant")
    }

    pub async fn seed_promotion(
        &self,
        code: &str,
        discount_percent: Decimal,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
        usage_limit: i32,
        is_active: bool,
    ) -> promotion::Model {
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_string()),
            discount_percent: Set(discount_percent),
            valid_from: Set(valid_from),
            valid_until: Set(valid_until),
            usage_limit: Set(usage_limit),
            is_active: Set(is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed promotion")
    }

    pub async fn seed_active_cart(
        &self,
        user_id: Option<Uuid>,
        session_id: Option<&str>,
    ) -> cart::Model {
        let now = Utc::now();
        cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            session_id: Set(session_id.map(|s| s.to_string())),
            status: Set(cart::CartStatus::Active),
            items: Set(serde_json::json!([])),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed cart")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Reads a response body into JSON.
pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("parse response body")
}
