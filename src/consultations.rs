use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::NewConsultationRequest;
use crate::notifications::Notifier;
use crate::store::Store;

/// Contact form submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationResponse {
    pub success: bool,
    pub request_id: Uuid,
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        // RFC 5322 simplified: local@domain.tld
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email pattern compiles")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email.trim())
}

/// Normalizes a phone number to E.164 when it parses as valid.
///
/// The country may be an ISO code ("US") or omitted when the number carries
/// its own `+` prefix; anything else is kept as typed.
pub fn normalize_phone(raw: &str, country: Option<&str>) -> String {
    let trimmed = raw.trim();
    let region = country.and_then(|c| c.trim().to_uppercase().parse::<CountryId>().ok());

    if region.is_none() && !trimmed.starts_with('+') {
        return trimmed.to_string();
    }

    match phonenumber::parse(region, trimmed) {
        Ok(number) if phonenumber::is_valid(&number) => {
            let formatted = number.format().mode(Mode::E164).to_string();
            tracing::debug!("Normalized phone {} → {}", trimmed, formatted);
            formatted
        }
        Ok(_) => {
            tracing::debug!("Phone {} did not validate, storing as given", trimmed);
            trimmed.to_string()
        }
        Err(e) => {
            tracing::debug!("Failed to parse phone '{}': {:?}", trimmed, e);
            trimmed.to_string()
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate(form: ConsultationForm) -> Result<NewConsultationRequest, AppError> {
    let name = form.name.trim();
    let email = form.email.trim();
    let service = form.service.trim();

    if name.is_empty() || email.is_empty() || service.is_empty() {
        return Err(AppError::BadRequest(
            "name, email and service are required".to_string(),
        ));
    }
    if !is_valid_email(email) {
        return Err(AppError::BadRequest(format!("Invalid email address '{}'", email)));
    }

    let country = non_empty(form.country);
    let phone = non_empty(form.phone).map(|p| normalize_phone(&p, country.as_deref()));

    Ok(NewConsultationRequest {
        name: name.to_string(),
        email: email.to_lowercase(),
        phone,
        country,
        service_type: service.to_string(),
        message: non_empty(form.message),
    })
}

pub struct ConsultationService {
    store: Arc<dyn Store>,
    notifier: Notifier,
}

impl ConsultationService {
    pub fn new(store: Arc<dyn Store>, notifier: Notifier) -> Self {
        Self { store, notifier }
    }

    /// Stores the request, then notifies in the background.
    ///
    /// Email never affects the response; only validation and the insert can fail.
    pub async fn submit(&self, form: ConsultationForm) -> Result<ConsultationResponse, AppError> {
        let new = validate(form)?;
        let request = self.store.insert_consultation(new).await?;
        tracing::info!(
            "Consultation request {} received for '{}'",
            request.id,
            request.service_type
        );

        let request_id = request.id;
        self.notifier.spawn_consultation_received(request);

        Ok(ConsultationResponse {
            success: true,
            request_id,
        })
    }
}
