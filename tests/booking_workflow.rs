/// Booking workflow tests: state machine, checkout orchestration, dashboard
/// Providers are wiremock doubles; storage is the in-memory store.
mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consult_portal_api::auth::AuthUser;
use consult_portal_api::booking::{BookingEffect, BookingError, BookingFlow, BookingForm, BookingState};
use consult_portal_api::dashboard::split_appointments;
use consult_portal_api::errors::AppError;
use consult_portal_api::memory_store::MemoryStore;
use consult_portal_api::models::{AppointmentStatus, AppointmentType, PaymentStatus};
use consult_portal_api::payments::{
    CheckoutSessionRequest, CheckoutSessionResponse, CheckoutSessions, PaymentService,
};
use consult_portal_api::store::Store;
use consult_portal_api::stripe_client::StripeClient;

/// Counts calls; used where the orchestrator must not be reached.
#[derive(Default)]
struct CountingCheckout {
    calls: AtomicUsize,
}

#[async_trait]
impl CheckoutSessions for CountingCheckout {
    async fn create_checkout(
        &self,
        _user: &AuthUser,
        _request: CheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutSessionResponse {
            url: "https://checkout.test/unused".to_string(),
        })
    }
}

fn payment_service(store: Arc<MemoryStore>, base_url: &str) -> Arc<PaymentService> {
    let stripe = StripeClient::new(base_url.to_string(), "sk_test_123".to_string()).unwrap();
    Arc::new(PaymentService::new(
        store,
        stripe,
        "http://localhost:5173".to_string(),
    ))
}

async fn mount_checkout(server: &MockServer, session_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(header("authorization", "Bearer sk_test_123"))
        .and(header_exists("idempotency-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": session_id,
            "url": format!("https://checkout.stripe.test/pay/{}", session_id),
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_free_service_books_without_payment() {
    let store = Arc::new(MemoryStore::new());
    let checkout = Arc::new(CountingCheckout::default());
    let user = common::customer();
    let service = common::service("Initial Consultation", "0");

    let mut flow = BookingFlow::new(store.clone(), checkout.clone());
    let outcome = flow
        .submit(&user, &service, &common::form_for_tomorrow("10:00"))
        .await
        .unwrap();

    assert_eq!(outcome.effect, BookingEffect::NavigateToDashboard);
    assert!(matches!(flow.state(), BookingState::Booked { .. }));
    assert_eq!(checkout.calls.load(Ordering::SeqCst), 0);

    let appointments = store.appointments_for_user(user.id).await.unwrap();
    assert_eq!(appointments.len(), 1);
    assert_eq!(appointments[0].status, AppointmentStatus::Scheduled);
    assert_eq!(appointments[0].appointment_type, AppointmentType::Consultation);
    assert!(!appointments[0].payment_required);
    assert!(store.payments_for_user(user.id).await.unwrap().is_empty());

    // Dashboard lists it as upcoming.
    let lists = split_appointments(appointments, chrono::Utc::now());
    assert_eq!(lists.upcoming.len(), 1);
    assert!(lists.past.is_empty());
}

#[tokio::test]
async fn test_paid_service_creates_pending_payment_and_opens_checkout() {
    let server = MockServer::start().await;
    mount_checkout(&server, "cs_test_premium").await;

    let store = Arc::new(MemoryStore::new());
    let payments = payment_service(store.clone(), &server.uri());
    let user = common::customer();
    let service = common::service("Premium Support", "99.00");
    store.add_service(service.clone());

    let mut flow = BookingFlow::new(store.clone(), payments);
    let outcome = flow
        .submit(&user, &service, &common::form_for_tomorrow("14:30"))
        .await
        .unwrap();

    assert_eq!(
        outcome.effect,
        BookingEffect::OpenCheckout("https://checkout.stripe.test/pay/cs_test_premium".to_string())
    );
    let BookingState::PaymentPending { appointment, .. } = flow.state() else {
        panic!("expected PaymentPending, got {:?}", flow.state());
    };
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert!(appointment.payment_required);

    let payments = store.payments_for_user(user.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Pending);
    assert_eq!(payments[0].amount_cents, 9900);
    assert_eq!(payments[0].appointment_id, Some(appointment.id));
    assert_eq!(payments[0].stripe_session_id.as_deref(), Some("cs_test_premium"));
}

#[tokio::test]
async fn test_checkout_metadata_carries_appointment_and_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains("metadata%5Bappointment_id%5D"))
        .and(body_string_contains("metadata%5Bpayment_id%5D"))
        .and(body_string_contains("unit_amount%5D=9900"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_meta",
            "url": "https://checkout.stripe.test/pay/cs_meta",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let service = common::service("Premium Support", "99");
    store.add_service(service.clone());
    let mut flow = BookingFlow::new(store.clone(), payment_service(store.clone(), &server.uri()));

    flow.submit(&common::customer(), &service, &common::form_for_tomorrow("09:00"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_checkout_failure_keeps_appointment_and_fails_payment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("stripe is down"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let user = common::customer();
    let service = common::service("Premium Support", "99");
    store.add_service(service.clone());
    let mut flow = BookingFlow::new(store.clone(), payment_service(store.clone(), &server.uri()));

    let err = flow
        .submit(&user, &service, &common::form_for_tomorrow("11:00"))
        .await
        .unwrap_err();

    let BookingError::CheckoutUnavailable { appointment_id, .. } = &err else {
        panic!("expected CheckoutUnavailable, got {}", err);
    };
    assert_eq!(err.toast().title, "Payment unavailable");
    assert!(matches!(flow.state(), BookingState::Editing));

    // The appointment stays for the sweep; no pending payment survives.
    let appointment = store.appointment(*appointment_id).await.unwrap().unwrap();
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    let payments = store.payments_for_user(user.id).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_missing_time_is_rejected_without_writes() {
    let store = Arc::new(MemoryStore::new());
    let checkout = Arc::new(CountingCheckout::default());
    let user = common::customer();
    let mut flow = BookingFlow::new(store.clone(), checkout.clone());

    let form = BookingForm {
        time: None,
        ..common::form_for_tomorrow("10:00")
    };
    let err = flow
        .submit(&user, &common::service("Initial Consultation", "0"), &form)
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::Validation(_)));
    assert!(matches!(flow.state(), BookingState::Editing));
    assert!(store.appointments_for_user(user.id).await.unwrap().is_empty());
    assert_eq!(checkout.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_double_submit_for_same_slot_conflicts() {
    let store = Arc::new(MemoryStore::new());
    let checkout = Arc::new(CountingCheckout::default());
    let user = common::customer();
    let service = common::service("Initial Consultation", "0");
    let form = common::form_for_tomorrow("10:00");

    let mut first = BookingFlow::new(store.clone(), checkout.clone());
    first.submit(&user, &service, &form).await.unwrap();

    let mut second = BookingFlow::new(store.clone(), checkout);
    let err = second.submit(&user, &service, &form).await.unwrap_err();
    assert!(matches!(
        err,
        BookingError::AppointmentNotSaved(AppError::Conflict(_))
    ));
    assert_eq!(err.toast().title, "Time unavailable");
    assert_eq!(store.appointments_for_user(user.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_custom_payment_uses_explicit_amount() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/checkout/sessions"))
        .and(body_string_contains("unit_amount%5D=12550"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "cs_custom",
            "url": "https://checkout.stripe.test/pay/cs_custom",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let user = common::customer();
    let payments = payment_service(store.clone(), &server.uri());

    let response = payments
        .create_checkout(
            &user,
            CheckoutSessionRequest {
                service_id: "custom-payment".to_string(),
                amount: Some(125.50),
                description: Some("Invoice INV-42".to_string()),
                appointment_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(response.url, "https://checkout.stripe.test/pay/cs_custom");
    let stored = store.payments_for_user(user.id).await.unwrap();
    assert_eq!(stored[0].amount_cents, 12550);
    assert_eq!(stored[0].service_type, "custom-payment");
}

#[tokio::test]
async fn test_checkout_for_someone_elses_appointment_is_refused() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryStore::new());
    let owner = common::customer();
    let service = common::service("Initial Consultation", "0");

    let mut flow = BookingFlow::new(store.clone(), Arc::new(CountingCheckout::default()));
    flow.submit(&owner, &service, &common::form_for_tomorrow("10:00"))
        .await
        .unwrap();
    let appointment_id = store.appointments_for_user(owner.id).await.unwrap()[0].id;

    let paid = common::service("Premium Support", "99");
    store.add_service(paid.clone());
    let intruder = common::customer();
    let err = payment_service(store.clone(), &server.uri())
        .create_checkout(
            &intruder,
            CheckoutSessionRequest {
                service_id: paid.id.to_string(),
                amount: None,
                description: None,
                appointment_id: Some(appointment_id),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(store.payments_for_user(intruder.id).await.unwrap().is_empty());
}
