use crate::errors::AppError;
use serde::Deserialize;
use std::time::Duration;

/// Hosted checkout session as returned by the payment provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

/// Parameters for a single-line-item hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub product_name: &'a str,
    pub description: Option<&'a str>,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub customer_email: Option<&'a str>,
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto both the session and its payment intent.
    pub metadata: Vec<(&'static str, String)>,
    pub idempotency_key: String,
}

/// Client for the payment provider's REST API (form-encoded requests, bearer secret key).
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl StripeClient {
    pub fn new(base_url: String, secret_key: String) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create Stripe client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            secret_key,
        })
    }

    /// Creates a hosted checkout session in `payment` mode.
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutRequest<'_>,
    ) -> Result<CheckoutSession, AppError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let form = checkout_form(request);

        tracing::info!(
            "Creating checkout session for '{}' ({} {})",
            request.product_name,
            request.amount_cents,
            request.currency
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Stripe checkout creation failed {}: {}",
                status, error_text
            )));
        }

        let session: CheckoutSession = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse Stripe response: {}", e))
        })?;

        tracing::info!("Checkout session created: {}", session.id);
        Ok(session)
    }
}

/// Flattens the request into the provider's bracketed form encoding.
fn checkout_form(request: &CheckoutRequest<'_>) -> Vec<(String, String)> {
    let mut form: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
        ("line_items[0][quantity]".into(), "1".into()),
        (
            "line_items[0][price_data][currency]".into(),
            request.currency.to_string(),
        ),
        (
            "line_items[0][price_data][unit_amount]".into(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".into(),
            request.product_name.to_string(),
        ),
    ];

    if let Some(description) = request.description.filter(|d| !d.trim().is_empty()) {
        form.push((
            "line_items[0][price_data][product_data][description]".into(),
            description.to_string(),
        ));
    }
    if let Some(email) = request.customer_email {
        form.push(("customer_email".into(), email.to_string()));
    }
    for (key, value) in &request.metadata {
        form.push((format!("metadata[{}]", key), value.clone()));
        form.push((
            format!("payment_intent_data[metadata][{}]", key),
            value.clone(),
        ));
    }

    form
}
