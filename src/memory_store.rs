//! In-process `Store` used by the test suite and local demos.
//!
//! Mirrors the Postgres constraints that matter to the workflows: the
//! live-slot uniqueness on appointments, unique checkout session ids and the
//! guarded status updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::*;
use crate::store::Store;

#[derive(Default)]
struct Tables {
    services: Vec<Service>,
    roles: HashMap<Uuid, Vec<Role>>,
    profiles: HashMap<Uuid, Profile>,
    appointments: Vec<Appointment>,
    payments: Vec<Payment>,
    invoices: Vec<Invoice>,
    consultations: Vec<ConsultationRequest>,
    chat_sessions: Vec<ChatSession>,
    chat_messages: Vec<ChatMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// When set, role lookups fail (used to exercise the fail-closed path).
    fail_role_lookups: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, AppError> {
        self.tables
            .lock()
            .map_err(|_| AppError::InternalError("memory store lock poisoned".to_string()))
    }

    pub fn add_service(&self, service: Service) {
        if let Ok(mut t) = self.tables() {
            t.services.push(service);
        }
    }

    pub fn add_profile(&self, profile: Profile) {
        if let Ok(mut t) = self.tables() {
            t.profiles.insert(profile.id, profile);
        }
    }

    pub fn grant_role(&self, user_id: Uuid, role: Role) {
        if let Ok(mut t) = self.tables() {
            t.roles.entry(user_id).or_default().push(role);
        }
    }

    #[cfg(any(test, feature = "test-util"))]
    pub fn set_role_lookup_failure(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_role_lookups.lock() {
            *flag = fail;
        }
    }

    /// Back-dates an appointment's creation time.
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_appointment_created_at(&self, id: Uuid, created_at: DateTime<Utc>) {
        if let Ok(mut t) = self.tables() {
            if let Some(a) = t.appointments.iter_mut().find(|a| a.id == id) {
                a.created_at = created_at;
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_services(&self) -> Result<Vec<Service>, AppError> {
        Ok(self
            .tables()?
            .services
            .iter()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn service_by_id(&self, id: Uuid) -> Result<Option<Service>, AppError> {
        Ok(self.tables()?.services.iter().find(|s| s.id == id).cloned())
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, AppError> {
        let failing = self
            .fail_role_lookups
            .lock()
            .map(|flag| *flag)
            .unwrap_or(true);
        if failing {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        Ok(self
            .tables()?
            .roles
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(self.tables()?.profiles.get(&user_id).cloned())
    }

    async fn link_dwolla_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<String, AppError> {
        let mut t = self.tables()?;
        let profile = t
            .profiles
            .get_mut(&user_id)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))?;
        Ok(profile
            .dwolla_customer_id
            .get_or_insert_with(|| customer_id.to_string())
            .clone())
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, AppError> {
        let mut t = self.tables()?;
        let taken = t.appointments.iter().any(|a| {
            a.user_id == new.user_id && a.scheduled_at == new.scheduled_at && a.status.is_live()
        });
        if taken {
            return Err(AppError::Conflict(
                "An appointment is already booked for this time".to_string(),
            ));
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            scheduled_at: new.scheduled_at,
            appointment_type: new.appointment_type,
            status: AppointmentStatus::Scheduled,
            contact_email: new.contact_email,
            contact_phone: new.contact_phone,
            consultant_name: new.consultant_name,
            notes: new.notes,
            preferred_language: new.preferred_language,
            service_id: new.service_id,
            payment_required: new.payment_required,
            created_at: now,
            updated_at: now,
        };
        t.appointments.push(appointment.clone());
        Ok(appointment)
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        Ok(self
            .tables()?
            .appointments
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn appointments_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        let mut rows: Vec<Appointment> = self
            .tables()?
            .appointments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.scheduled_at);
        Ok(rows)
    }

    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError> {
        let mut rows = self.tables()?.appointments.clone();
        rows.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        Ok(rows)
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        from: &[AppointmentStatus],
        to: AppointmentStatus,
    ) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        let current = t
            .appointments
            .iter()
            .find(|a| a.id == id && from.contains(&a.status))
            .map(|a| (a.user_id, a.scheduled_at, a.status));
        if let Some((user_id, scheduled_at, status)) = current {
            let taken = to.is_live()
                && !status.is_live()
                && t.appointments.iter().any(|a| {
                    a.id != id
                        && a.user_id == user_id
                        && a.scheduled_at == scheduled_at
                        && a.status.is_live()
                });
            if taken {
                return Err(AppError::Conflict(
                    "An appointment is already booked for this time".to_string(),
                ));
            }
        }
        match t
            .appointments
            .iter_mut()
            .find(|a| a.id == id && from.contains(&a.status))
        {
            Some(a) => {
                a.status = to;
                a.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<Payment, AppError> {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            appointment_id: new.appointment_id,
            amount_cents: new.amount_cents,
            currency: new.currency,
            status: PaymentStatus::Pending,
            service_type: new.service_type,
            stripe_session_id: None,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.payments.push(payment.clone());
        Ok(payment)
    }

    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), AppError> {
        let mut t = self.tables()?;
        if t
            .payments
            .iter()
            .any(|p| p.stripe_session_id.as_deref() == Some(session_id))
        {
            return Err(AppError::Conflict(format!(
                "Checkout session {} already linked",
                session_id
            )));
        }
        let payment = t
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id && p.stripe_session_id.is_none())
            .ok_or_else(|| {
                AppError::Conflict(format!(
                    "Payment {} already has a checkout session",
                    payment_id
                ))
            })?;
        payment.stripe_session_id = Some(session_id.to_string());
        payment.updated_at = Utc::now();
        Ok(())
    }

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        match t
            .payments
            .iter_mut()
            .find(|p| p.id == payment_id && from.contains(&p.status))
        {
            Some(p) => {
                p.status = to;
                p.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_payment_status_by_session(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        match t.payments.iter_mut().find(|p| {
            p.stripe_session_id.as_deref() == Some(session_id) && from.contains(&p.status)
        }) {
            Some(p) => {
                p.status = to;
                p.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, AppError> {
        Ok(self
            .tables()?
            .payments
            .iter()
            .find(|p| p.stripe_session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, AppError> {
        Ok(self
            .tables()?
            .payments
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn all_payments(&self) -> Result<Vec<Payment>, AppError> {
        Ok(self.tables()?.payments.clone())
    }

    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice, AppError> {
        let now = Utc::now();
        let invoice = Invoice {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            amount_cents: new.amount_cents,
            description: new.description,
            due_date: new.due_date,
            status: InvoiceStatus::Draft,
            ach_transfer_id: None,
            ach_funding_source_id: None,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        Ok(self.tables()?.invoices.iter().find(|i| i.id == id).cloned())
    }

    async fn update_invoice_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        match t
            .invoices
            .iter_mut()
            .find(|i| i.id == id && i.status == from)
        {
            Some(i) => {
                i.status = to;
                i.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_consultation(
        &self,
        new: NewConsultationRequest,
    ) -> Result<ConsultationRequest, AppError> {
        let now = Utc::now();
        let request = ConsultationRequest {
            id: Uuid::new_v4(),
            name: new.name,
            email: new.email,
            phone: new.phone,
            country: new.country,
            service_type: new.service_type,
            message: new.message,
            status: ConsultationStatus::Pending,
            priority: "normal".to_string(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };
        self.tables()?.consultations.push(request.clone());
        Ok(request)
    }

    async fn consultation(&self, id: Uuid) -> Result<Option<ConsultationRequest>, AppError> {
        Ok(self
            .tables()?
            .consultations
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn consultations(&self) -> Result<Vec<ConsultationRequest>, AppError> {
        let mut rows = self.tables()?.consultations.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn update_consultation_status(
        &self,
        id: Uuid,
        from: ConsultationStatus,
        to: ConsultationStatus,
    ) -> Result<bool, AppError> {
        let mut t = self.tables()?;
        match t
            .consultations
            .iter_mut()
            .find(|c| c.id == id && c.status == from)
        {
            Some(c) => {
                c.status = to;
                c.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_chat_session(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<ChatSession, AppError> {
        let now = Utc::now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.tables()?.chat_sessions.push(session.clone());
        Ok(session)
    }

    async fn chat_session(&self, id: Uuid) -> Result<Option<ChatSession>, AppError> {
        Ok(self
            .tables()?
            .chat_sessions
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn append_chat_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let mut t = self.tables()?;
        let now = Utc::now();
        let session = t
            .chat_sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| AppError::NotFound(format!("Chat session {} not found", session_id)))?;
        session.updated_at = now;

        let message = ChatMessage {
            id: Uuid::new_v4(),
            session_id,
            role,
            content: content.to_string(),
            created_at: now,
        };
        t.chat_messages.push(message.clone());
        Ok(message)
    }

    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        Ok(self
            .tables()?
            .chat_messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn sweep_orphaned_bookings(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<SweepReport, AppError> {
        let mut t = self.tables()?;
        let now = Utc::now();
        let Tables {
            appointments,
            payments,
            ..
        } = &mut *t;

        let mut report = SweepReport::default();
        for appointment in appointments.iter_mut().filter(|a| {
            a.status == AppointmentStatus::Scheduled
                && a.payment_required
                && a.created_at < created_before
        }) {
            let paid = payments.iter().any(|p| {
                p.appointment_id == Some(appointment.id) && p.status == PaymentStatus::Completed
            });
            if paid {
                continue;
            }
            appointment.status = AppointmentStatus::Cancelled;
            appointment.updated_at = now;
            report.appointments_cancelled += 1;

            for payment in payments.iter_mut().filter(|p| {
                p.appointment_id == Some(appointment.id) && p.status == PaymentStatus::Pending
            }) {
                payment.status = PaymentStatus::Expired;
                payment.updated_at = now;
                report.payments_expired += 1;
            }
        }

        Ok(report)
    }
}
