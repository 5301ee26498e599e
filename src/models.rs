use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AppError;

// ============ Status enums ============

/// Raised when a stored status string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Text-backed enums: `as_str`, `FromStr`, `TryFrom<String>` (for `#[sqlx(try_from)]`), `Display`.
macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

/// Access level assigned to a user. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Employee,
    Customer,
}

text_enum!(Role, "role", {
    Admin => "admin",
    Employee => "employee",
    Customer => "customer",
});

impl Role {
    /// Highest-priority role among the assignments, `Customer` when there are none.
    pub fn highest(roles: &[Role]) -> Role {
        roles.iter().copied().min().unwrap_or(Role::Customer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentType {
    #[serde(rename = "consultation")]
    Consultation,
    #[serde(rename = "follow-up")]
    FollowUp,
    #[serde(rename = "emergency")]
    Emergency,
}

text_enum!(AppointmentType, "appointment type", {
    Consultation => "consultation",
    FollowUp => "follow-up",
    Emergency => "emergency",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

text_enum!(AppointmentStatus, "appointment status", {
    Scheduled => "scheduled",
    Confirmed => "confirmed",
    Cancelled => "cancelled",
    Completed => "completed",
    NoShow => "no_show",
});

impl AppointmentStatus {
    const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
    ];

    /// Forward edges of the appointment lifecycle.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, Confirmed | Cancelled | Completed | NoShow)
                | (Confirmed, Cancelled | Completed | NoShow)
        )
    }

    /// States a row may be in for an update to `target` to apply (including `target` itself).
    pub fn sources_for(target: AppointmentStatus) -> Vec<AppointmentStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| *s == target || s.can_transition_to(target))
            .collect()
    }

    pub fn is_live(self) -> bool {
        matches!(self, AppointmentStatus::Scheduled | AppointmentStatus::Confirmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Expired,
    Refunded,
}

text_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Completed => "completed",
    Failed => "failed",
    Expired => "expired",
    Refunded => "refunded",
});

impl PaymentStatus {
    const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Expired,
        PaymentStatus::Refunded,
    ];

    /// Forward edges of the payment lifecycle.
    ///
    /// `Failed -> Completed` covers a declined attempt followed by a successful
    /// retry inside the same checkout session. `Expired -> Completed` covers a
    /// completion delivered after the orphan sweep expired the row locally; the
    /// provider's word on money wins.
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Completed | Failed | Expired)
                | (Failed | Expired, Completed)
                | (Completed, Refunded)
        )
    }

    /// States a row may be in for an update to `target` to apply (including `target` itself).
    pub fn sources_for(target: PaymentStatus) -> Vec<PaymentStatus> {
        Self::ALL
            .into_iter()
            .filter(|s| *s == target || s.can_transition_to(target))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Approved,
    Paid,
    Cancelled,
}

text_enum!(InvoiceStatus, "invoice status", {
    Draft => "draft",
    Sent => "sent",
    Approved => "approved",
    Paid => "paid",
    Cancelled => "cancelled",
});

impl InvoiceStatus {
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Approved) | (Approved, Paid) | (Draft | Sent | Approved, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

text_enum!(ConsultationStatus, "consultation status", {
    Pending => "pending",
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl ConsultationStatus {
    pub fn can_transition_to(self, next: ConsultationStatus) -> bool {
        use ConsultationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress | Cancelled) | (InProgress, Completed | Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

text_enum!(MessageRole, "message role", {
    User => "user",
    Assistant => "assistant",
});

// ============ Database Models ============

/// A bookable service offering from the catalog.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Price in major currency units.
    pub price: BigDecimal,
    pub duration: Option<String>,
    pub features: Vec<String>,
    pub active: bool,
}

impl Service {
    pub fn is_free(&self) -> bool {
        self.price == BigDecimal::from(0)
    }

    pub fn price_cents(&self) -> Result<i64, AppError> {
        price_to_cents(&self.price)
    }
}

/// Converts a major-unit decimal price into integer minor units, rounded to the nearest cent.
pub fn price_to_cents(price: &BigDecimal) -> Result<i64, AppError> {
    if price < &BigDecimal::from(0) {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }
    let cents = (price * BigDecimal::from(100)).round(0).with_scale(0);
    cents
        .to_string()
        .parse::<i64>()
        .map_err(|e| AppError::InternalError(format!("Price {} out of range: {}", price, e)))
}

/// Converts an ad-hoc amount in major units into minor units.
pub fn amount_to_cents(amount: f64) -> Result<i64, AppError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::BadRequest(
            "Amount must be a positive number".to_string(),
        ));
    }
    let cents = (amount * 100.0).round();
    if cents < 1.0 || cents > i64::MAX as f64 {
        return Err(AppError::BadRequest("Amount out of range".to_string()));
    }
    Ok(cents as i64)
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub appointment_type: AppointmentType,
    #[sqlx(try_from = "String")]
    pub status: AppointmentStatus,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub consultant_name: Option<String>,
    pub notes: Option<String>,
    pub preferred_language: String,
    pub service_id: Option<Uuid>,
    pub payment_required: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for an appointment; status always starts at `scheduled`.
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub user_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub appointment_type: AppointmentType,
    pub contact_email: String,
    pub contact_phone: Option<String>,
    pub consultant_name: Option<String>,
    pub notes: Option<String>,
    pub preferred_language: String,
    pub service_id: Option<Uuid>,
    pub payment_required: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    #[sqlx(try_from = "String")]
    pub status: PaymentStatus,
    pub service_type: String,
    pub stripe_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a payment; status always starts at `pending` with no session.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub user_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub amount_cents: i64,
    pub currency: String,
    pub service_type: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub description: String,
    pub due_date: NaiveDate,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub ach_transfer_id: Option<String>,
    pub ach_funding_source_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewInvoice {
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub description: String,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequest {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub service_type: String,
    pub message: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: ConsultationStatus,
    pub priority: String,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewConsultationRequest {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub service_type: String,
    pub message: Option<String>,
}

/// User profile row, including the ACH linkage fields.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dwolla_customer_id: Option<String>,
    pub dwolla_funding_source_id: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    #[sqlx(try_from = "String")]
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Result of one orphaned-booking sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub appointments_cancelled: u64,
    pub payments_expired: u64,
}

// ============ API Models ============

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate<S> {
    pub status: S,
}
