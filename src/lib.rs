//! Storefront Orders Library
//!
//! Order placement for the storefront: stock validation, promotion
//! eligibility, server-side totals and sequential order numbering, with
//! post-commit inventory, promotion-usage and cart bookkeeping.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    routing::{get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub auth_service: auth::AuthService,
    pub order_service: services::orders::OrderService,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let auth_service = auth::AuthService::new(auth::AuthConfig::from(&config));
        let order_service = services::orders::OrderService::new(
            db.clone(),
            Some(Arc::new(event_sender.clone())),
            Decimal::from(config.flat_shipping_fee),
        );

        Self {
            db,
            config,
            event_sender,
            auth_service,
            order_service,
        }
    }
}

/// Page-number pagination accepted by list endpoints.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    /// 1-based page index
    #[serde(default = "ListQuery::first_page")]
    pub page: u64,
    /// Rows per page
    #[serde(default = "ListQuery::default_limit")]
    pub limit: u64,
}

impl ListQuery {
    fn first_page() -> u64 {
        1
    }

    fn default_limit() -> u64 {
        20
    }
}

/// Versioned API surface; the binary mounts this under `/api/v1`.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_order),
        )
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/number/:order_number",
            get(handlers::orders::get_order_by_number),
        )
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route(
            "/promotions/validate",
            post(handlers::promotions::validate_promotion),
        )
}
