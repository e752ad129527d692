//! Tourbook API Library
//!
//! Backend for a tour catalog with bookings, multi-rail payments (card plus
//! three cryptocurrency rails), and invoicing.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod rails;
pub mod services;

use axum::Router;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::ToSchema;
use utoipa_swagger_ui::SwaggerUi;

use crate::events::EventSender;
use crate::services::{
    bookings::BookingService, invoicing::InvoiceService, payments::PaymentWorkflow,
    tours::TourService,
};

/// Service container shared by every handler.
#[derive(Clone)]
pub struct AppServices {
    pub tours: Arc<TourService>,
    pub bookings: Arc<BookingService>,
    pub invoices: Arc<InvoiceService>,
    pub payments: Arc<PaymentWorkflow>,
}

impl AppServices {
    /// Production wiring from configuration.
    pub fn build(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        config: &config::AppConfig,
    ) -> Self {
        Self {
            tours: Arc::new(TourService::new(db.clone())),
            bookings: Arc::new(BookingService::new(db.clone(), event_sender.clone())),
            invoices: Arc::new(InvoiceService::new(db.clone())),
            payments: Arc::new(PaymentWorkflow::from_config(
                db,
                event_sender,
                &config.payments,
            )),
        }
    }
}

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: AppServices,
}

/// Builds the full application router with middleware and the Swagger UI.
pub fn app_router(state: AppState) -> Router {
    let cors = match state
        .config
        .cors_origins
        .as_deref()
        .filter(|origins| !origins.is_empty())
    {
        Some(origins) => {
            let parsed: Vec<axum::http::HeaderValue> = origins
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            CorsLayer::new().allow_origin(parsed)
        }
        None => CorsLayer::permissive(),
    };

    handlers::api_router()
        .with_state(state)
        .merge(
            SwaggerUi::new("/docs").url("/api-docs/openapi.json", openapi::ApiDoc::openapi_spec()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
