/// Router-level tests: authentication, role guards and the main endpoints
mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consult_portal_api::memory_store::MemoryStore;
use consult_portal_api::models::{
    AppointmentStatus, AppointmentType, NewAppointment, NewPayment, PaymentStatus, Role,
};
use consult_portal_api::routes;
use consult_portal_api::store::Store;

const CUSTOMER_TOKEN: &str = "customer-token";
const ADMIN_TOKEN: &str = "admin-token";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
    server: MockServer,
    customer_id: Uuid,
}

async fn mount_identity(server: &MockServer, token: &str, id: Uuid, email: &str) {
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .and(header("authorization", format!("Bearer {}", token).as_str()))
        .and(header("apikey", "anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": id, "email": email })))
        .mount(server)
        .await;
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let customer_id = Uuid::new_v4();
    let admin_id = Uuid::new_v4();
    mount_identity(&server, CUSTOMER_TOKEN, customer_id, "patient@example.com").await;
    mount_identity(&server, ADMIN_TOKEN, admin_id, "admin@consultportal.com").await;
    Mock::given(method("GET"))
        .and(path("/auth/v1/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "msg": "invalid JWT" })))
        .mount(&server)
        .await;

    let (store, state) = common::state(&server.uri());
    store.grant_role(customer_id, Role::Customer);
    store.grant_role(admin_id, Role::Admin);

    Harness {
        app: routes::app(state),
        store,
        server,
        customer_id,
    }
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let h = harness().await;
    let (status, body) = send(&h.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_protected_routes_require_a_valid_token() {
    let h = harness().await;

    let (status, _) = send(&h.app, "GET", "/api/v1/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&h.app, "GET", "/api/v1/me", Some("expired-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&h.app, "GET", "/api/v1/me", Some(CUSTOMER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], h.customer_id.to_string());
    assert_eq!(body["role"], "customer");
}

#[tokio::test]
async fn test_admin_routes_check_role() {
    let h = harness().await;

    let (status, _) = send(&h.app, "GET", "/api/v1/admin/analytics", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &h.app,
        "GET",
        "/api/v1/admin/analytics",
        Some(CUSTOMER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &h.app,
        "GET",
        "/api/v1/admin/analytics",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revenueCents"], 0);
}

#[tokio::test]
async fn test_role_lookup_failure_denies_admin() {
    let h = harness().await;
    h.store.set_role_lookup_failure(true);

    let (status, _) = send(
        &h.app,
        "GET",
        "/api/v1/admin/consultations",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_free_booking_over_http_lands_on_dashboard() {
    let h = harness().await;
    let service = common::service("Initial Consultation", "0");
    h.store.add_service(service.clone());
    let date = (chrono::Utc::now() + chrono::Duration::days(3))
        .date_naive()
        .format("%Y-%m-%d")
        .to_string();

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/bookings",
        Some(CUSTOMER_TOKEN),
        Some(json!({
            "serviceId": service.id,
            "date": date,
            "time": "15:00",
            "appointmentType": "consultation",
            "contactEmail": "patient@example.com"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["effect"]["kind"], "navigate_to_dashboard");
    assert_eq!(body["appointment"]["status"], "scheduled");
    assert!(body["checkoutUrl"].is_null());

    let (status, lists) = send(
        &h.app,
        "GET",
        "/api/v1/appointments",
        Some(CUSTOMER_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lists["upcoming"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_booking_unknown_service_is_not_found() {
    let h = harness().await;
    let (status, _) = send(
        &h.app,
        "POST",
        "/api/v1/bookings",
        Some(CUSTOMER_TOKEN),
        Some(json!({ "serviceId": Uuid::new_v4(), "date": "2030-01-01", "time": "10:00" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_admin_appointment_transitions() {
    let h = harness().await;
    let service = common::service("Initial Consultation", "0");
    h.store.add_service(service.clone());
    let (_, body) = send(
        &h.app,
        "POST",
        "/api/v1/bookings",
        Some(CUSTOMER_TOKEN),
        Some(json!({
            "serviceId": service.id,
            "date": "2030-06-01",
            "time": "10:00",
            "appointmentType": "consultation",
            "contactEmail": "patient@example.com"
        })),
    )
    .await;
    let id = body["appointment"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v1/admin/appointments/{}/status", id);

    let (status, body) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(CUSTOMER_TOKEN),
        Some(json!({ "status": "cancelled" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_invoice_lifecycle() {
    let h = harness().await;

    let (status, _) = send(
        &h.app,
        "POST",
        "/api/v1/admin/invoices",
        Some(ADMIN_TOKEN),
        Some(json!({
            "userId": h.customer_id,
            "amountCents": 0,
            "description": "Credentialing",
            "dueDate": "2030-02-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, invoice) = send(
        &h.app,
        "POST",
        "/api/v1/admin/invoices",
        Some(ADMIN_TOKEN),
        Some(json!({
            "userId": h.customer_id,
            "amountCents": 45000,
            "description": "Credentialing",
            "dueDate": "2030-02-01"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(invoice["status"], "draft");
    let uri = format!(
        "/api/v1/admin/invoices/{}/status",
        invoice["id"].as_str().unwrap()
    );

    let (status, _) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "paid" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "sent" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "sent");
}

#[tokio::test]
async fn test_public_consultation_and_admin_review() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "em_1" })))
        .mount(&h.server)
        .await;

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/consultations",
        None,
        Some(json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "service": "Revenue Cycle Management"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    let id = body["requestId"].as_str().unwrap().to_string();

    let (status, list) = send(
        &h.app,
        "GET",
        "/api/v1/admin/consultations",
        Some(ADMIN_TOKEN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().map(Vec::len), Some(1));

    let (status, updated) = send(
        &h.app,
        "PATCH",
        &format!("/api/v1/admin/consultations/{}/status", id),
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "in_progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "in_progress");
}

#[tokio::test]
async fn test_password_check_endpoint() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path("/range/5BAA6"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("1E4C9B93F3F0682250B6CF8331B7EE68FD8:42\r\n"),
        )
        .mount(&h.server)
        .await;

    let (status, _) = send(
        &h.app,
        "POST",
        "/api/v1/auth/password-check",
        None,
        Some(json!({ "password": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &h.app,
        "POST",
        "/api/v1/auth/password-check",
        None,
        Some(json!({ "password": "password" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["breached"], true);
    assert_eq!(body["count"], 42);
}

#[tokio::test]
async fn test_paid_appointment_is_not_confirmed_before_payment() {
    let h = harness().await;
    let appointment = h
        .store
        .insert_appointment(NewAppointment {
            user_id: h.customer_id,
            scheduled_at: chrono::Utc::now() + chrono::Duration::days(5),
            appointment_type: AppointmentType::Consultation,
            contact_email: "patient@example.com".to_string(),
            contact_phone: None,
            consultant_name: None,
            notes: None,
            preferred_language: "en".to_string(),
            service_id: None,
            payment_required: true,
        })
        .await
        .unwrap();
    let uri = format!("/api/v1/admin/appointments/{}/status", appointment.id);

    let (status, _) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let stored = h.store.appointment(appointment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AppointmentStatus::Scheduled);

    let payment = h
        .store
        .insert_payment(NewPayment {
            user_id: h.customer_id,
            appointment_id: Some(appointment.id),
            amount_cents: 9900,
            currency: "usd".to_string(),
            service_type: "Premium Support".to_string(),
        })
        .await
        .unwrap();
    h.store
        .update_payment_status(payment.id, &[PaymentStatus::Pending], PaymentStatus::Completed)
        .await
        .unwrap();

    let (status, body) = send(
        &h.app,
        "PATCH",
        &uri,
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "confirmed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "confirmed");
}
