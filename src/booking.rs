//! Booking workflow state machine.
//!
//! ```text
//! Editing --submit, free service--> Booked            (navigate to dashboard)
//! Editing --submit, paid service--> PaymentPending    (open checkout in a new tab)
//! ```
//!
//! The appointment row is written in `scheduled` before checkout is
//! requested; confirmation only ever arrives through the payment webhook.
//! A checkout failure after the insert leaves that appointment in place and
//! it is cleaned up by the orphan sweep.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::{Appointment, AppointmentType, NewAppointment, Service};
use crate::payments::{CheckoutSessionRequest, CheckoutSessions};
use crate::store::Store;

/// What the user filled in on the booking form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingForm {
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub date: Option<String>,
    /// `HH:MM` or `HH:MM:SS`, UTC
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub appointment_type: Option<AppointmentType>,
    #[serde(default)]
    pub contact_email: Option<String>,
    #[serde(default)]
    pub contact_phone: Option<String>,
    #[serde(default)]
    pub consultant_name: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub preferred_language: Option<String>,
}

#[derive(Debug, Clone)]
pub enum BookingState {
    Editing,
    Booked {
        appointment: Appointment,
    },
    PaymentPending {
        appointment: Appointment,
        checkout_url: String,
    },
}

/// Navigation the client performs after a successful submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "url", rename_all = "snake_case")]
pub enum BookingEffect {
    NavigateToDashboard,
    OpenCheckout(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub title: String,
    pub description: String,
    pub variant: ToastVariant,
}

impl Toast {
    fn info(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            variant: ToastVariant::Default,
        }
    }

    fn error(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            variant: ToastVariant::Destructive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub toast: Toast,
    pub effect: BookingEffect,
}

#[derive(Debug)]
pub enum BookingError {
    /// Missing or malformed input; nothing was written.
    Validation(String),
    /// The appointment insert failed; the form stays editable.
    AppointmentNotSaved(AppError),
    /// The appointment exists but no checkout URL could be obtained.
    CheckoutUnavailable {
        appointment_id: Uuid,
        source: AppError,
    },
}

impl BookingError {
    pub fn toast(&self) -> Toast {
        match self {
            BookingError::Validation(msg) => Toast::error("Missing information", msg),
            BookingError::AppointmentNotSaved(AppError::Conflict(_)) => Toast::error(
                "Time unavailable",
                "You already have an appointment at this time.",
            ),
            BookingError::AppointmentNotSaved(_) => Toast::error(
                "Booking failed",
                "We could not book your appointment. Please try again.",
            ),
            BookingError::CheckoutUnavailable { .. } => Toast::error(
                "Payment unavailable",
                "Your appointment was saved but we could not start the payment. Please contact support.",
            ),
        }
    }
}

impl fmt::Display for BookingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingError::Validation(msg) => write!(f, "invalid booking: {}", msg),
            BookingError::AppointmentNotSaved(e) => write!(f, "appointment not saved: {}", e),
            BookingError::CheckoutUnavailable {
                appointment_id,
                source,
            } => write!(
                f,
                "appointment {} saved without checkout: {}",
                appointment_id, source
            ),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) => AppError::BadRequest(msg),
            BookingError::AppointmentNotSaved(e) => e,
            BookingError::CheckoutUnavailable {
                appointment_id,
                source,
            } => AppError::WithContext {
                source: Box::new(source),
                context: format!("appointment {} saved without checkout", appointment_id),
            },
        }
    }
}

/// Parses the form's date and time into a UTC instant.
pub fn parse_slot(date: Option<&str>, time: Option<&str>) -> Result<DateTime<Utc>, BookingError> {
    let date = date.map(str::trim).filter(|d| !d.is_empty());
    let time = time.map(str::trim).filter(|t| !t.is_empty());
    let (Some(date), Some(time)) = (date, time) else {
        return Err(BookingError::Validation(
            "Please select a date and time for your appointment.".to_string(),
        ));
    };

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("Invalid date '{}'", date)))?;
    let time = NaiveTime::parse_from_str(time, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
        .map_err(|_| BookingError::Validation(format!("Invalid time '{}'", time)))?;

    Ok(date.and_time(time).and_utc())
}

/// One booking form's worth of state.
pub struct BookingFlow {
    store: Arc<dyn Store>,
    checkout: Arc<dyn CheckoutSessions>,
    state: BookingState,
}

impl BookingFlow {
    pub fn new(store: Arc<dyn Store>, checkout: Arc<dyn CheckoutSessions>) -> Self {
        Self {
            store,
            checkout,
            state: BookingState::Editing,
        }
    }

    pub fn state(&self) -> &BookingState {
        &self.state
    }

    pub async fn submit(
        &mut self,
        user: &AuthUser,
        service: &Service,
        form: &BookingForm,
    ) -> Result<BookingOutcome, BookingError> {
        if !matches!(self.state, BookingState::Editing) {
            return Err(BookingError::Validation(
                "This booking has already been submitted.".to_string(),
            ));
        }

        let scheduled_at = parse_slot(form.date.as_deref(), form.time.as_deref())?;
        let contact_email = form
            .contact_email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .or_else(|| user.email.clone())
            .ok_or_else(|| BookingError::Validation("A contact email is required.".to_string()))?;
        let paid = !service.is_free();

        let appointment = self
            .store
            .insert_appointment(NewAppointment {
                user_id: user.id,
                scheduled_at,
                appointment_type: form
                    .appointment_type
                    .unwrap_or(AppointmentType::Consultation),
                contact_email,
                contact_phone: form.contact_phone.clone(),
                consultant_name: form.consultant_name.clone(),
                notes: form.notes.clone(),
                preferred_language: form
                    .preferred_language
                    .clone()
                    .unwrap_or_else(|| "en".to_string()),
                service_id: Some(service.id),
                payment_required: paid,
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to insert appointment for {}: {}", user.id, e);
                BookingError::AppointmentNotSaved(e)
            })?;

        if !paid {
            tracing::info!(
                "Booked free appointment {} ({}) for user {}",
                appointment.id,
                service.name,
                user.id
            );
            self.state = BookingState::Booked { appointment };
            return Ok(BookingOutcome {
                toast: Toast::info(
                    "Appointment booked",
                    "Your appointment has been scheduled.",
                ),
                effect: BookingEffect::NavigateToDashboard,
            });
        }

        let checkout = self
            .checkout
            .create_checkout(
                user,
                CheckoutSessionRequest {
                    service_id: service.id.to_string(),
                    amount: None,
                    description: None,
                    appointment_id: Some(appointment.id),
                },
            )
            .await
            .map_err(|source| {
                tracing::error!(
                    "Checkout failed for appointment {}: {}",
                    appointment.id,
                    source
                );
                BookingError::CheckoutUnavailable {
                    appointment_id: appointment.id,
                    source,
                }
            })?;

        tracing::info!(
            "Appointment {} awaiting payment for '{}'",
            appointment.id,
            service.name
        );
        self.state = BookingState::PaymentPending {
            appointment,
            checkout_url: checkout.url.clone(),
        };
        Ok(BookingOutcome {
            toast: Toast::info(
                "Complete your payment",
                "Finish payment in the new tab to confirm your appointment.",
            ),
            effect: BookingEffect::OpenCheckout(checkout.url),
        })
    }
}
