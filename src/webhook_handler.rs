use crate::errors::AppError;
use crate::handlers::AppState;
use crate::models::{AppointmentStatus, PaymentStatus};
use crate::store::Store;
use crate::webhook_models::{IntentLink, PaymentEvent, StripeEvent, WebhookAck};
use crate::webhook_signature;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

/// Payment webhook handler
///
/// Receives signed payment-provider events and reconciles payment and
/// appointment status. The signature is checked against the raw body before
/// anything is parsed; a rejected delivery mutates nothing.
///
/// Every processed delivery, including unhandled event types, answers
/// `200 { "received": true }`.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookAck>), AppError> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok());

    let ack = process_webhook(
        state.store.as_ref(),
        &state.config.stripe_webhook_secret,
        signature,
        &body,
        chrono::Utc::now().timestamp(),
    )
    .await?;

    Ok((StatusCode::OK, Json(ack)))
}

/// Verifies, parses and applies one delivery.
pub async fn process_webhook(
    store: &dyn Store,
    secret: &str,
    signature: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<WebhookAck, AppError> {
    if let Err(e) = webhook_signature::verify(body, signature, secret, now) {
        tracing::warn!("Rejected payment webhook: {}", e);
        return Err(AppError::BadRequest(
            "Webhook signature verification failed".to_string(),
        ));
    }

    let event: StripeEvent = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    tracing::info!("Received payment event {} ({})", event.id, event.event_type);

    reconcile(store, &event).await?;
    Ok(WebhookAck { received: true })
}

/// Outcome of applying one event, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Applied,
    /// No payment in a state that allows the transition (unknown session or out-of-order delivery).
    Skipped,
    Ignored,
}

/// Applies an event as a guarded status write.
///
/// Writes are "set status to X where session matches and the current status
/// may move to X (or already is X)", so redeliveries land on the same
/// terminal state and late events cannot move a payment backwards.
pub async fn reconcile(store: &dyn Store, event: &StripeEvent) -> Result<Reconciled, AppError> {
    match event.classify() {
        PaymentEvent::CheckoutCompleted {
            session_id,
            appointment_id,
        } => {
            let prior = store
                .payment_by_session(&session_id)
                .await?
                .map(|payment| payment.status);
            let applied =
                transition_session(store, &session_id, PaymentStatus::Completed).await?;
            if applied {
                if let Some(appointment_id) = appointment_id {
                    if prior == Some(PaymentStatus::Expired) {
                        reinstate_appointment(store, appointment_id, &session_id).await?;
                    } else {
                        confirm_appointment(store, appointment_id).await?;
                    }
                }
            }
            Ok(outcome(applied))
        }
        PaymentEvent::CheckoutExpired { session_id } => {
            let applied = transition_session(store, &session_id, PaymentStatus::Expired).await?;
            Ok(outcome(applied))
        }
        PaymentEvent::IntentSucceeded(link) => {
            transition_intent(store, &link, PaymentStatus::Completed).await
        }
        PaymentEvent::IntentFailed(link) => {
            transition_intent(store, &link, PaymentStatus::Failed).await
        }
        PaymentEvent::Unhandled(event_type) => {
            tracing::info!("Unhandled payment event type: {}", event_type);
            Ok(Reconciled::Ignored)
        }
    }
}

fn outcome(applied: bool) -> Reconciled {
    if applied {
        Reconciled::Applied
    } else {
        Reconciled::Skipped
    }
}

async fn transition_session(
    store: &dyn Store,
    session_id: &str,
    to: PaymentStatus,
) -> Result<bool, AppError> {
    let applied = store
        .update_payment_status_by_session(session_id, &PaymentStatus::sources_for(to), to)
        .await?;

    if applied {
        tracing::info!("Payment for session {} is now {}", session_id, to);
    } else {
        match store.payment_by_session(session_id).await? {
            Some(payment) => tracing::warn!(
                "Ignoring {} for session {}: payment {} is already {}",
                to,
                session_id,
                payment.id,
                payment.status
            ),
            None => tracing::warn!("No payment found for session {}", session_id),
        }
    }
    Ok(applied)
}

async fn transition_intent(
    store: &dyn Store,
    link: &IntentLink,
    to: PaymentStatus,
) -> Result<Reconciled, AppError> {
    let applied = match link {
        IntentLink::Session(session_id) => transition_session(store, session_id, to).await?,
        IntentLink::Payment(payment_id) => {
            let applied = store
                .update_payment_status(*payment_id, &PaymentStatus::sources_for(to), to)
                .await?;
            if !applied {
                tracing::warn!("Ignoring {} for payment {}", to, payment_id);
            }
            applied
        }
        IntentLink::Unlinked => {
            tracing::info!("Payment intent carries no session or payment metadata");
            return Ok(Reconciled::Ignored);
        }
    };
    Ok(outcome(applied))
}

async fn confirm_appointment(store: &dyn Store, appointment_id: uuid::Uuid) -> Result<(), AppError> {
    let confirmed = store
        .update_appointment_status(
            appointment_id,
            &AppointmentStatus::sources_for(AppointmentStatus::Confirmed),
            AppointmentStatus::Confirmed,
        )
        .await?;

    if confirmed {
        tracing::info!("Appointment {} confirmed by payment", appointment_id);
    } else {
        tracing::warn!(
            "Appointment {} not confirmed (missing or no longer scheduled)",
            appointment_id
        );
    }
    Ok(())
}

/// Brings back a booking the orphan sweep cancelled before its payment landed.
///
/// If the slot has been rebooked in the meantime the appointment stays
/// cancelled and the paid session is logged for a refund or a manual rebook.
async fn reinstate_appointment(
    store: &dyn Store,
    appointment_id: uuid::Uuid,
    session_id: &str,
) -> Result<(), AppError> {
    let reinstated = store
        .update_appointment_status(
            appointment_id,
            &[
                AppointmentStatus::Cancelled,
                AppointmentStatus::Scheduled,
                AppointmentStatus::Confirmed,
            ],
            AppointmentStatus::Confirmed,
        )
        .await;

    match reinstated {
        Ok(true) => {
            tracing::warn!(
                "Appointment {} reinstated: payment for session {} completed after the orphan sweep",
                appointment_id,
                session_id
            );
            Ok(())
        }
        Ok(false) => {
            tracing::error!(
                "Paid session {} has no reinstatable appointment {}; needs follow-up",
                session_id,
                appointment_id
            );
            Ok(())
        }
        Err(AppError::Conflict(_)) => {
            tracing::error!(
                "Paid session {} could not reinstate appointment {}: slot rebooked; needs follow-up",
                session_id,
                appointment_id
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}
