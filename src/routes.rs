use axum::{
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{self, AppState};
use crate::webhook_handler;

/// 5MB max payload.
pub const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024;

/// Serves the OpenAPI specification YAML file.
async fn serve_openapi_spec() -> impl IntoResponse {
    match tokio::fs::read_to_string("openapi.yml").await {
        Ok(content) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/yaml")],
            content,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "OpenAPI spec not found").into_response(),
    }
}

/// Serves the Swagger UI HTML page pointed at `/api-docs/openapi.yml`.
async fn serve_swagger_ui() -> impl IntoResponse {
    let html = r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Consult Portal API - Swagger UI</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css">
    <style>
        body { margin: 0; padding: 0; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: "/api-docs/openapi.yml",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
"#;
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
}

/// Routes exempt from rate limiting: health checks and provider webhooks.
pub fn open_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/v1/webhooks/stripe",
            post(webhook_handler::stripe_webhook),
        )
}

/// Customer, admin and documentation routes (rate limited in `main`).
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // API Documentation
        .route("/docs", get(serve_swagger_ui))
        .route("/api-docs/openapi.yml", get(serve_openapi_spec))
        // Catalog & dashboard
        .route("/api/v1/services", get(handlers::list_services))
        .route("/api/v1/me", get(handlers::me))
        .route("/api/v1/appointments", get(handlers::my_appointments))
        .route("/api/v1/payments", get(handlers::my_payments))
        // Booking & checkout
        .route("/api/v1/bookings", post(handlers::create_booking))
        .route(
            "/api/v1/payments/checkout-session",
            post(handlers::create_checkout_session),
        )
        // ACH
        .route("/api/v1/ach/customers", post(handlers::ach_create_customer))
        .route(
            "/api/v1/ach/funding-sources",
            post(handlers::ach_create_funding_source),
        )
        .route("/api/v1/ach/transfers", post(handlers::ach_transfer))
        // Intake, assistant, signup
        .route("/api/v1/consultations", post(handlers::submit_consultation))
        .route("/api/v1/assistant/chat", post(handlers::assistant_chat))
        .route(
            "/api/v1/assistant/analyze-document",
            post(handlers::analyze_document),
        )
        .route("/api/v1/auth/password-check", post(handlers::password_check))
        // Admin
        .route(
            "/api/v1/admin/consultations",
            get(handlers::admin_consultations),
        )
        .route(
            "/api/v1/admin/consultations/:id/status",
            patch(handlers::admin_update_consultation_status),
        )
        .route(
            "/api/v1/admin/appointments",
            get(handlers::admin_appointments),
        )
        .route(
            "/api/v1/admin/appointments/:id/status",
            patch(handlers::admin_update_appointment_status),
        )
        .route("/api/v1/admin/payments", get(handlers::admin_payments))
        .route("/api/v1/admin/invoices", post(handlers::admin_create_invoice))
        .route(
            "/api/v1/admin/invoices/:id/status",
            patch(handlers::admin_update_invoice_status),
        )
        .route("/api/v1/admin/analytics", get(handlers::admin_analytics))
}

/// Full application without rate limiting, as used by tests.
pub fn app(state: Arc<AppState>) -> Router {
    open_routes()
        .merge(api_routes().layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)))
        .with_state(state)
}
