//! Checkout-session orchestration.
//!
//! A `pending` payment row is written before the provider is called so the
//! session can carry its id; any failure after that point moves the row to
//! `failed` before the error is returned, so no `pending` row outlives a
//! failed call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{amount_to_cents, NewPayment, Payment, PaymentStatus};
use crate::store::Store;
use crate::stripe_client::{CheckoutRequest, StripeClient};

/// Service id marking an ad-hoc amount (custom or invoice payments).
pub const CUSTOM_PAYMENT: &str = "custom-payment";

const CURRENCY: &str = "usd";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionRequest {
    pub service_id: String,
    /// Major units; only read for `custom-payment`.
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSessionResponse {
    pub url: String,
}

/// Anything that can turn a checkout request into a hosted checkout URL.
#[async_trait]
pub trait CheckoutSessions: Send + Sync {
    async fn create_checkout(
        &self,
        user: &AuthUser,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, AppError>;
}

/// Price and labels resolved from the request.
struct PricedItem {
    name: String,
    description: Option<String>,
    amount_cents: i64,
    service_type: String,
}

pub struct PaymentService {
    store: Arc<dyn Store>,
    stripe: StripeClient,
    site_url: String,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, stripe: StripeClient, site_url: String) -> Self {
        Self {
            store,
            stripe,
            site_url,
        }
    }

    async fn resolve_item(&self, request: &CheckoutSessionRequest) -> Result<PricedItem, AppError> {
        if request.service_id == CUSTOM_PAYMENT {
            let amount = request.amount.ok_or_else(|| {
                AppError::BadRequest("amount is required for custom payments".to_string())
            })?;
            let description = request
                .description
                .clone()
                .filter(|d| !d.trim().is_empty());
            return Ok(PricedItem {
                name: description
                    .clone()
                    .unwrap_or_else(|| "Custom Payment".to_string()),
                description,
                amount_cents: amount_to_cents(amount)?,
                service_type: CUSTOM_PAYMENT.to_string(),
            });
        }

        let service_id = Uuid::parse_str(&request.service_id)
            .map_err(|_| AppError::BadRequest(format!("Invalid serviceId '{}'", request.service_id)))?;
        let service = self
            .store
            .service_by_id(service_id)
            .await?
            .filter(|s| s.active)
            .ok_or_else(|| AppError::NotFound(format!("Service {} not found", service_id)))?;

        let amount_cents = service.price_cents()?;
        if amount_cents == 0 {
            return Err(AppError::BadRequest(format!(
                "Service '{}' is free and needs no payment",
                service.name
            )));
        }

        Ok(PricedItem {
            name: service.name.clone(),
            description: service.description.clone(),
            amount_cents,
            service_type: service.name,
        })
    }

    /// Marks the payment failed after a provider error; the provider error is what the caller sees.
    async fn abandon(&self, payment: &Payment, cause: AppError) -> AppError {
        match self
            .store
            .update_payment_status(payment.id, &[PaymentStatus::Pending], PaymentStatus::Failed)
            .await
        {
            Ok(_) => tracing::warn!(
                "Payment {} marked failed after checkout error: {}",
                payment.id,
                cause
            ),
            Err(e) => tracing::error!(
                "Failed to mark payment {} as failed after checkout error: {}",
                payment.id,
                e
            ),
        }
        cause
    }
}

#[async_trait]
impl CheckoutSessions for PaymentService {
    async fn create_checkout(
        &self,
        user: &AuthUser,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSessionResponse, AppError> {
        let item = self.resolve_item(&request).await?;

        if let Some(appointment_id) = request.appointment_id {
            let owned = self
                .store
                .appointment(appointment_id)
                .await?
                .is_some_and(|a| a.user_id == user.id);
            if !owned {
                return Err(AppError::NotFound(format!(
                    "Appointment {} not found",
                    appointment_id
                )));
            }
        }

        let payment = self
            .store
            .insert_payment(NewPayment {
                user_id: user.id,
                appointment_id: request.appointment_id,
                amount_cents: item.amount_cents,
                currency: CURRENCY.to_string(),
                service_type: item.service_type.clone(),
            })
            .await?;

        let mut metadata = vec![
            ("payment_id", payment.id.to_string()),
            ("user_id", user.id.to_string()),
            ("service_id", request.service_id.clone()),
        ];
        if let Some(appointment_id) = request.appointment_id {
            metadata.push(("appointment_id", appointment_id.to_string()));
        }

        let checkout = CheckoutRequest {
            product_name: &item.name,
            description: item.description.as_deref(),
            amount_cents: item.amount_cents,
            currency: CURRENCY,
            customer_email: user.email.as_deref(),
            success_url: format!(
                "{}/dashboard?payment=success&session_id={{CHECKOUT_SESSION_ID}}",
                self.site_url
            ),
            cancel_url: format!("{}/services?payment=cancelled", self.site_url),
            metadata,
            idempotency_key: payment.id.to_string(),
        };

        let session = match self.stripe.create_checkout_session(&checkout).await {
            Ok(session) => session,
            Err(e) => return Err(self.abandon(&payment, e).await),
        };

        let Some(url) = session.url.clone() else {
            let cause = AppError::ExternalApiError(format!(
                "Checkout session {} returned without a URL",
                session.id
            ));
            return Err(self.abandon(&payment, cause).await);
        };

        if let Err(e) = self
            .store
            .attach_checkout_session(payment.id, &session.id)
            .await
        {
            return Err(self.abandon(&payment, e).await);
        }

        tracing::info!(
            "Payment {} pending on checkout session {} ({} cents)",
            payment.id,
            session.id,
            payment.amount_cents
        );

        Ok(CheckoutSessionResponse { url })
    }
}
