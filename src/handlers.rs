use crate::ach::{
    AchService, CreateCustomerResponse, FundingSourceRequest, FundingSourceResponse,
    TransferRequest, TransferResponse,
};
use crate::assistant::{AssistantService, ChatRequest, ChatResponse, DocumentAnalysis, DocumentRequest};
use crate::auth::{AdminUser, AuthUser, RoleResolver};
use crate::booking::{BookingEffect, BookingFlow, BookingForm, BookingState, Toast};
use crate::config::Config;
use crate::consultations::{ConsultationForm, ConsultationResponse, ConsultationService};
use crate::dashboard::{self, Analytics, AppointmentLists};
use crate::dwolla_client::DwollaClient;
use crate::email_client::EmailClient;
use crate::errors::AppError;
use crate::identity_client::IdentityClient;
use crate::llm_client::LlmClient;
use crate::models::*;
use crate::notifications::Notifier;
use crate::password_check::{PasswordCheckRequest, PasswordCheckResponse, PasswordChecker};
use crate::payments::{
    CheckoutSessionRequest, CheckoutSessionResponse, CheckoutSessions, PaymentService,
};
use crate::store::Store;
use crate::stripe_client::StripeClient;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
pub struct AppState {
    /// Relational store (Postgres in production).
    pub store: Arc<dyn Store>,
    /// Application configuration.
    pub config: Config,
    /// Resolves bearer tokens to users.
    pub identity: IdentityClient,
    /// Per-user role cache (5 minute TTL, fail-closed to customer).
    pub roles: RoleResolver,
    /// Checkout-session orchestrator, shared with the booking flow.
    pub payments: Arc<PaymentService>,
    pub ach: AchService,
    pub consultations: ConsultationService,
    pub assistant: AssistantService,
    pub passwords: PasswordChecker,
}

impl AppState {
    /// Builds every provider client from `config` on top of `store`.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self, AppError> {
        let identity = IdentityClient::new(
            config.identity_url.clone(),
            config.identity_anon_key.clone(),
        )?;
        let stripe = StripeClient::new(
            config.stripe_api_base.clone(),
            config.stripe_secret_key.clone(),
        )?;
        let dwolla = DwollaClient::new(
            config.dwolla_base_url.clone(),
            config.dwolla_key.clone(),
            config.dwolla_secret.clone(),
        )?;
        let email = match &config.resend_api_key {
            Some(key) => Some(EmailClient::new(config.resend_base_url.clone(), key.clone())?),
            None => None,
        };
        let llm = LlmClient::new(
            config.openai_base_url.clone(),
            config.openai_api_key.clone(),
            config.openai_model.clone(),
        )?;
        let notifier = Notifier::new(email, config.email_from.clone(), config.admin_email.clone());

        Ok(Self {
            identity,
            roles: RoleResolver::new(store.clone()),
            payments: Arc::new(PaymentService::new(
                store.clone(),
                stripe,
                config.site_url.clone(),
            )),
            ach: AchService::new(
                store.clone(),
                dwolla,
                config.dwolla_master_funding_source.clone(),
            ),
            consultations: ConsultationService::new(store.clone(), notifier),
            assistant: AssistantService::new(store.clone(), llm),
            passwords: PasswordChecker::new(config.pwned_passwords_url.clone())?,
            store,
            config,
        })
    }
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "consult-portal-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

// ============ Catalog & customer dashboard ============

/// GET /api/v1/services
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(state.store.active_services().await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

/// GET /api/v1/me
pub async fn me(user: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        id: user.id,
        email: user.email,
        role: user.role,
    })
}

/// GET /api/v1/appointments
pub async fn my_appointments(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<AppointmentLists>, AppError> {
    let appointments = state.store.appointments_for_user(user.id).await?;
    Ok(Json(dashboard::split_appointments(
        appointments,
        chrono::Utc::now(),
    )))
}

/// GET /api/v1/payments
pub async fn my_payments(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.store.payments_for_user(user.id).await?))
}

// ============ Booking & payments ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub service_id: Uuid,
    #[serde(flatten)]
    pub form: BookingForm,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub appointment: Appointment,
    pub checkout_url: Option<String>,
    pub toast: Toast,
    pub effect: BookingEffect,
}

/// POST /api/v1/bookings
///
/// Free services are booked straight away; paid services answer with the
/// checkout URL and are confirmed later by the payment webhook.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let service = state
        .store
        .service_by_id(request.service_id)
        .await?
        .filter(|s| s.active)
        .ok_or_else(|| {
            AppError::NotFound(format!("Service {} not found", request.service_id))
        })?;

    let checkout: Arc<dyn CheckoutSessions> = state.payments.clone();
    let mut flow = BookingFlow::new(state.store.clone(), checkout);
    let outcome = flow.submit(&user, &service, &request.form).await?;

    let (appointment, checkout_url) = match flow.state() {
        BookingState::Booked { appointment } => (appointment.clone(), None),
        BookingState::PaymentPending {
            appointment,
            checkout_url,
        } => (appointment.clone(), Some(checkout_url.clone())),
        BookingState::Editing => {
            return Err(AppError::InternalError(
                "Booking finished without an appointment".to_string(),
            ))
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse {
            appointment,
            checkout_url,
            toast: outcome.toast,
            effect: outcome.effect,
        }),
    ))
}

/// POST /api/v1/payments/checkout-session
pub async fn create_checkout_session(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<CheckoutSessionRequest>,
) -> Result<Json<CheckoutSessionResponse>, AppError> {
    tracing::info!(
        "Checkout requested by {} for service '{}'",
        user.id,
        request.service_id
    );
    Ok(Json(state.payments.create_checkout(&user, request).await?))
}

// ============ ACH ============

/// POST /api/v1/ach/customers
pub async fn ach_create_customer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<CreateCustomerResponse>, AppError> {
    Ok(Json(state.ach.create_customer(&user).await?))
}

/// POST /api/v1/ach/funding-sources
pub async fn ach_create_funding_source(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Option<Json<FundingSourceRequest>>,
) -> Result<Json<FundingSourceResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.ach.create_funding_source(&user, request).await?))
}

/// POST /api/v1/ach/transfers
pub async fn ach_transfer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<TransferRequest>,
) -> Result<Json<TransferResponse>, AppError> {
    Ok(Json(state.ach.transfer(&user, request).await?))
}

// ============ Intake, assistant, signup helpers ============

/// POST /api/v1/consultations
pub async fn submit_consultation(
    State(state): State<Arc<AppState>>,
    Json(form): Json<ConsultationForm>,
) -> Result<(StatusCode, Json<ConsultationResponse>), AppError> {
    let response = state.consultations.submit(form).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/v1/assistant/chat
pub async fn assistant_chat(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    Ok(Json(state.assistant.chat(&user, request).await?))
}

/// POST /api/v1/assistant/analyze-document
pub async fn analyze_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentAnalysis>, AppError> {
    tracing::info!("Document analysis requested by {}", user.id);
    Ok(Json(state.assistant.analyze_document(request).await?))
}

/// POST /api/v1/auth/password-check
pub async fn password_check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PasswordCheckRequest>,
) -> Result<Json<PasswordCheckResponse>, AppError> {
    if request.password.is_empty() {
        return Err(AppError::BadRequest("password is required".to_string()));
    }
    Ok(Json(state.passwords.check(&request.password).await))
}

// ============ Admin ============

fn illegal_transition(entity: &str, id: Uuid, from: impl ToString, to: impl ToString) -> AppError {
    AppError::Conflict(format!(
        "{} {} cannot move from {} to {}",
        entity,
        id,
        from.to_string(),
        to.to_string()
    ))
}

/// GET /api/v1/admin/consultations
pub async fn admin_consultations(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<ConsultationRequest>>, AppError> {
    Ok(Json(state.store.consultations().await?))
}

/// PATCH /api/v1/admin/consultations/:id/status
pub async fn admin_update_consultation_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate<ConsultationStatus>>,
) -> Result<Json<ConsultationRequest>, AppError> {
    let current = state
        .store
        .consultation(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Consultation {} not found", id)))?;

    if !current.status.can_transition_to(update.status) {
        return Err(illegal_transition("Consultation", id, current.status, update.status));
    }
    if !state
        .store
        .update_consultation_status(id, current.status, update.status)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Consultation {} changed concurrently",
            id
        )));
    }

    tracing::info!(
        "Admin {} moved consultation {} from {} to {}",
        admin.id,
        id,
        current.status,
        update.status
    );
    let updated = state
        .store
        .consultation(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Consultation {} not found", id)))?;
    Ok(Json(updated))
}

/// GET /api/v1/admin/appointments
pub async fn admin_appointments(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Appointment>>, AppError> {
    Ok(Json(state.store.all_appointments().await?))
}

/// PATCH /api/v1/admin/appointments/:id/status
pub async fn admin_update_appointment_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate<AppointmentStatus>>,
) -> Result<Json<Appointment>, AppError> {
    let current = state
        .store
        .appointment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", id)))?;

    if !current.status.can_transition_to(update.status) {
        return Err(illegal_transition("Appointment", id, current.status, update.status));
    }
    // Paid bookings are confirmed by the payment webhook, not by hand.
    if update.status == AppointmentStatus::Confirmed
        && current.payment_required
        && !has_completed_payment(state.store.as_ref(), &current).await?
    {
        return Err(AppError::Conflict(format!(
            "Appointment {} cannot be confirmed before its payment completes",
            id
        )));
    }
    if !state
        .store
        .update_appointment_status(id, &[current.status], update.status)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Appointment {} changed concurrently",
            id
        )));
    }

    tracing::info!(
        "Admin {} moved appointment {} from {} to {}",
        admin.id,
        id,
        current.status,
        update.status
    );
    let updated = state
        .store
        .appointment(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Appointment {} not found", id)))?;
    Ok(Json(updated))
}

/// GET /api/v1/admin/payments
pub async fn admin_payments(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Payment>>, AppError> {
    Ok(Json(state.store.all_payments().await?))
}

async fn has_completed_payment(
    store: &dyn Store,
    appointment: &Appointment,
) -> Result<bool, AppError> {
    Ok(store
        .payments_for_user(appointment.user_id)
        .await?
        .iter()
        .any(|p| {
            p.appointment_id == Some(appointment.id) && p.status == PaymentStatus::Completed
        }))
}

/// POST /api/v1/admin/invoices
pub async fn admin_create_invoice(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(new): Json<NewInvoice>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    if new.amount_cents <= 0 {
        return Err(AppError::BadRequest(
            "amountCents must be positive".to_string(),
        ));
    }
    if new.description.trim().is_empty() {
        return Err(AppError::BadRequest("description is required".to_string()));
    }
    let invoice = state.store.insert_invoice(new).await?;
    tracing::info!(
        "Admin {} drafted invoice {} for user {}",
        admin.id,
        invoice.id,
        invoice.user_id
    );
    Ok((StatusCode::CREATED, Json(invoice)))
}

/// PATCH /api/v1/admin/invoices/:id/status
pub async fn admin_update_invoice_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate<InvoiceStatus>>,
) -> Result<Json<Invoice>, AppError> {
    let current = state
        .store
        .invoice(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))?;

    if !current.status.can_transition_to(update.status) {
        return Err(illegal_transition("Invoice", id, current.status, update.status));
    }
    if !state
        .store
        .update_invoice_status(id, current.status, update.status)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Invoice {} changed concurrently",
            id
        )));
    }

    tracing::info!(
        "Admin {} moved invoice {} from {} to {}",
        admin.id,
        id,
        current.status,
        update.status
    );
    let updated = state
        .store
        .invoice(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", id)))?;
    Ok(Json(updated))
}

/// GET /api/v1/admin/analytics
pub async fn admin_analytics(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> Result<Json<Analytics>, AppError> {
    let appointments = state.store.all_appointments().await?;
    let payments = state.store.all_payments().await?;
    let consultations = state.store.consultations().await?;
    Ok(Json(dashboard::analytics(
        &appointments,
        &payments,
        &consultations,
    )))
}
