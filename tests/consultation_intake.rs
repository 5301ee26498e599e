/// Consultation intake tests: storage first, email in the background
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use consult_portal_api::consultations::{ConsultationForm, ConsultationService};
use consult_portal_api::email_client::EmailClient;
use consult_portal_api::errors::AppError;
use consult_portal_api::memory_store::MemoryStore;
use consult_portal_api::models::ConsultationStatus;
use consult_portal_api::notifications::{Delivery, Notifier};
use consult_portal_api::store::Store;

fn notifier(base_url: Option<&str>) -> Notifier {
    let email = base_url.map(|url| EmailClient::new(url.to_string(), "re_test".to_string()).unwrap());
    Notifier::new(
        email,
        "Consult Portal <noreply@consultportal.com>".to_string(),
        "admin@consultportal.com".to_string(),
    )
}

fn form() -> ConsultationForm {
    ConsultationForm {
        name: "Jane Doe".to_string(),
        email: "Jane@Example.com".to_string(),
        phone: Some("(650) 253-0000".to_string()),
        country: Some("US".to_string()),
        service: "Medical Billing".to_string(),
        message: Some("We need help with claims.".to_string()),
    }
}

/// Waits for the background notifier to reach the mock.
async fn wait_for_requests(server: &MockServer, expected: usize) -> usize {
    for _ in 0..50 {
        let seen = server.received_requests().await.unwrap_or_default().len();
        if seen >= expected {
            return seen;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    server.received_requests().await.unwrap_or_default().len()
}

#[tokio::test]
async fn test_submission_is_stored_and_both_emails_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(header("authorization", "Bearer re_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_1" })))
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let service = ConsultationService::new(store.clone(), notifier(Some(&server.uri())));

    let response = service.submit(form()).await.unwrap();
    assert!(response.success);

    let stored = store.consultation(response.request_id).await.unwrap().unwrap();
    assert_eq!(stored.email, "jane@example.com");
    assert_eq!(stored.phone.as_deref(), Some("+16502530000"));
    assert_eq!(stored.service_type, "Medical Billing");
    assert_eq!(stored.status, ConsultationStatus::Pending);

    assert_eq!(wait_for_requests(&server, 2).await, 2);
}

#[tokio::test]
async fn test_email_outage_does_not_fail_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(500).set_body_string("mail relay down"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let service = ConsultationService::new(store.clone(), notifier(Some(&server.uri())));

    let response = service.submit(form()).await.unwrap();
    assert!(response.success);
    assert_eq!(store.consultations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_deliveries_report_each_recipient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .and(body_partial_json(serde_json::json!({ "to": ["admin@consultportal.com"] })))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/emails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "em_2" })))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let service = ConsultationService::new(store.clone(), notifier(None));
    let request_id = service.submit(form()).await.unwrap().request_id;
    let request = store.consultation(request_id).await.unwrap().unwrap();

    let deliveries = notifier(Some(&server.uri()))
        .spawn_consultation_received(request)
        .await
        .unwrap();
    assert_eq!(deliveries, [Delivery::Sent, Delivery::Failed]);
}

#[tokio::test]
async fn test_email_disabled_skips_delivery() {
    let store = Arc::new(MemoryStore::new());
    let service = ConsultationService::new(store.clone(), notifier(None));
    let request_id = service.submit(form()).await.unwrap().request_id;
    let request = store.consultation(request_id).await.unwrap().unwrap();

    let deliveries = notifier(None).consultation_received(&request).await;
    assert_eq!(deliveries, [Delivery::Skipped, Delivery::Skipped]);
}

#[tokio::test]
async fn test_invalid_submissions_store_nothing() {
    let store = Arc::new(MemoryStore::new());
    let service = ConsultationService::new(store.clone(), notifier(None));

    let missing_service = ConsultationForm {
        service: "  ".to_string(),
        ..form()
    };
    let bad_email = ConsultationForm {
        email: "jane-at-example".to_string(),
        ..form()
    };

    for submission in [missing_service, bad_email] {
        let err = service.submit(submission).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
    assert!(store.consultations().await.unwrap().is_empty());
}
