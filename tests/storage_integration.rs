use std::env;
use uuid::Uuid;

use consult_portal_api::db::Database;
use consult_portal_api::db_storage::PgStore;
use consult_portal_api::errors::AppError;
use consult_portal_api::models::{
    AppointmentStatus, AppointmentType, NewAppointment, NewPayment, PaymentStatus,
};
use consult_portal_api::store::Store;

async fn store() -> anyhow::Result<PgStore> {
    let db_url = env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("Set TEST_DATABASE_URL or DATABASE_URL to run this test"))?;

    let db = Database::new(&db_url)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    Ok(PgStore::new(db.pool.clone()))
}

fn appointment_for(user_id: Uuid) -> NewAppointment {
    NewAppointment {
        user_id,
        // Unique slot per run.
        scheduled_at: chrono::Utc::now() + chrono::Duration::days(30),
        appointment_type: AppointmentType::Consultation,
        contact_email: "smoke@example.com".to_string(),
        contact_phone: None,
        consultant_name: None,
        notes: Some("storage smoke test".to_string()),
        preferred_language: "en".to_string(),
        service_id: None,
        payment_required: true,
    }
}

/// Smoke test for booking and payment reconciliation against Postgres.
/// Marked ignored to avoid running against production by accident; set TEST_DATABASE_URL to run.
#[tokio::test]
#[ignore]
async fn booking_and_payment_smoke_test() -> anyhow::Result<()> {
    let store = store().await?;
    let user_id = Uuid::new_v4();

    let new = appointment_for(user_id);
    let appointment = store
        .insert_appointment(new.clone())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);

    // Same live slot twice is refused by the partial unique index.
    let duplicate = store.insert_appointment(new).await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));

    let payment = store
        .insert_payment(NewPayment {
            user_id,
            appointment_id: Some(appointment.id),
            amount_cents: 9900,
            currency: "usd".to_string(),
            service_type: "Premium Support".to_string(),
        })
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let session_id = format!("cs_smoke_{}", Uuid::new_v4().simple());
    store
        .attach_checkout_session(payment.id, &session_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let completed = store
        .update_payment_status_by_session(
            &session_id,
            &PaymentStatus::sources_for(PaymentStatus::Completed),
            PaymentStatus::Completed,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(completed);

    // A late expiry matches no row.
    let expired = store
        .update_payment_status_by_session(
            &session_id,
            &PaymentStatus::sources_for(PaymentStatus::Expired),
            PaymentStatus::Expired,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(!expired);

    let stored = store
        .payment_by_session(&session_id)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .ok_or_else(|| anyhow::anyhow!("payment disappeared"))?;
    assert_eq!(stored.status, PaymentStatus::Completed);

    store
        .update_appointment_status(
            appointment.id,
            &[AppointmentStatus::Scheduled],
            AppointmentStatus::Cancelled,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}
