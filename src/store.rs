//! Storage seam over the relational store.
//!
//! Handlers and workflows only see `dyn Store`; `PgStore` (see `db_storage`)
//! backs production and `MemoryStore` (see `memory_store`) backs tests.
//!
//! Status updates take the set of states the row may currently be in and
//! report whether a row matched, so every lifecycle write is a guarded
//! "set status to X where status in S" rather than a blind overwrite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::*;

#[async_trait]
pub trait Store: Send + Sync {
    // ---- catalog ----
    async fn active_services(&self) -> Result<Vec<Service>, AppError>;
    async fn service_by_id(&self, id: Uuid) -> Result<Option<Service>, AppError>;

    // ---- identity ----
    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, AppError>;
    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;
    /// Stores the ACH customer id unless one is already set; returns the id now on the profile.
    async fn link_dwolla_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<String, AppError>;

    // ---- appointments ----
    /// Fails with `Conflict` when the user already holds a live appointment for the same slot.
    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, AppError>;
    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError>;
    async fn appointments_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError>;
    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError>;
    async fn update_appointment_status(
        &self,
        id: Uuid,
        from: &[AppointmentStatus],
        to: AppointmentStatus,
    ) -> Result<bool, AppError>;

    // ---- payments ----
    async fn insert_payment(&self, new: NewPayment) -> Result<Payment, AppError>;
    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), AppError>;
    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError>;
    async fn update_payment_status_by_session(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError>;
    async fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, AppError>;
    async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, AppError>;
    async fn all_payments(&self) -> Result<Vec<Payment>, AppError>;

    // ---- invoices ----
    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice, AppError>;
    async fn invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError>;
    async fn update_invoice_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError>;

    // ---- consultations ----
    async fn insert_consultation(
        &self,
        new: NewConsultationRequest,
    ) -> Result<ConsultationRequest, AppError>;
    async fn consultation(&self, id: Uuid) -> Result<Option<ConsultationRequest>, AppError>;
    async fn consultations(&self) -> Result<Vec<ConsultationRequest>, AppError>;
    async fn update_consultation_status(
        &self,
        id: Uuid,
        from: ConsultationStatus,
        to: ConsultationStatus,
    ) -> Result<bool, AppError>;

    // ---- chat ----
    async fn create_chat_session(&self, user_id: Uuid, title: &str)
        -> Result<ChatSession, AppError>;
    async fn chat_session(&self, id: Uuid) -> Result<Option<ChatSession>, AppError>;
    async fn append_chat_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, AppError>;
    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, AppError>;

    // ---- maintenance ----
    /// Cancels `scheduled` appointments that need payment, were created before
    /// `created_before`, and have no completed payment; expires their pending payments.
    async fn sweep_orphaned_bookings(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<SweepReport, AppError>;
}

/// Status text for binding `status = ANY($n)`.
pub(crate) fn status_texts<S: ToString>(statuses: &[S]) -> Vec<String> {
    statuses.iter().map(|s| s.to_string()).collect()
}
