use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::{AppError, ResultExt};
use crate::models::*;
use crate::store::{status_texts, Store};

/// Postgres-backed store.
///
/// Queries are runtime-checked (`sqlx::query`/`query_as`) against the schema
/// in `migrations/`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn active_services(&self) -> Result<Vec<Service>, AppError> {
        sqlx::query_as::<_, Service>(
            "SELECT id, name, description, price, duration, features, active
             FROM services WHERE active = true ORDER BY price ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading active services")
    }

    async fn service_by_id(&self, id: Uuid) -> Result<Option<Service>, AppError> {
        let service = sqlx::query_as::<_, Service>(
            "SELECT id, name, description, price, duration, features, active
             FROM services WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(service)
    }

    async fn user_roles(&self, user_id: Uuid) -> Result<Vec<Role>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT role FROM user_roles WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|(role,)| {
                role.parse::<Role>()
                    .map_err(|e| AppError::InternalError(e.to_string()))
            })
            .collect()
    }

    async fn profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, email, first_name, last_name, dwolla_customer_id, dwolla_funding_source_id
             FROM profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn link_dwolla_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<String, AppError> {
        // COALESCE keeps an id written by a concurrent request.
        let linked: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE profiles
            SET dwolla_customer_id = COALESCE(dwolla_customer_id, $2)
            WHERE id = $1
            RETURNING dwolla_customer_id
            "#,
        )
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        linked
            .and_then(|(id,)| id)
            .ok_or_else(|| AppError::NotFound(format!("Profile {} not found", user_id)))
    }

    async fn insert_appointment(&self, new: NewAppointment) -> Result<Appointment, AppError> {
        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (
                id, user_id, scheduled_at, appointment_type, status, contact_email,
                contact_phone, consultant_name, notes, preferred_language,
                service_id, payment_required
            )
            VALUES ($1, $2, $3, $4, 'scheduled', $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.scheduled_at)
        .bind(new.appointment_type.as_str())
        .bind(&new.contact_email)
        .bind(&new.contact_phone)
        .bind(&new.consultant_name)
        .bind(&new.notes)
        .bind(&new.preferred_language)
        .bind(new.service_id)
        .bind(new.payment_required)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;

        tracing::debug!(
            "Stored appointment {} for user {}",
            appointment.id,
            appointment.user_id
        );
        Ok(appointment)
    }

    async fn appointment(&self, id: Uuid) -> Result<Option<Appointment>, AppError> {
        let appointment =
            sqlx::query_as::<_, Appointment>("SELECT * FROM appointments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(appointment)
    }

    async fn appointments_for_user(&self, user_id: Uuid) -> Result<Vec<Appointment>, AppError> {
        sqlx::query_as::<_, Appointment>(
            "SELECT * FROM appointments WHERE user_id = $1 ORDER BY scheduled_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("loading user appointments")
    }

    async fn all_appointments(&self) -> Result<Vec<Appointment>, AppError> {
        sqlx::query_as::<_, Appointment>("SELECT * FROM appointments ORDER BY scheduled_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("loading appointments")
    }

    async fn update_appointment_status(
        &self,
        id: Uuid,
        from: &[AppointmentStatus],
        to: AppointmentStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE appointments
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(id)
        .bind(to.as_str())
        .bind(status_texts(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_payment(&self, new: NewPayment) -> Result<Payment, AppError> {
        let payment = sqlx::query_as::<_, Payment>(
            r#"
            INSERT INTO payments (
                id, user_id, appointment_id, amount_cents, currency, status, service_type
            )
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.appointment_id)
        .bind(new.amount_cents)
        .bind(&new.currency)
        .bind(&new.service_type)
        .fetch_one(&self.pool)
        .await
        .context("inserting pending payment")?;

        Ok(payment)
    }

    async fn attach_checkout_session(
        &self,
        payment_id: Uuid,
        session_id: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET stripe_session_id = $2, updated_at = now()
            WHERE id = $1 AND stripe_session_id IS NULL
            "#,
        )
        .bind(payment_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "Payment {} already has a checkout session",
                payment_id
            )));
        }
        Ok(())
    }

    async fn update_payment_status(
        &self,
        payment_id: Uuid,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(payment_id)
        .bind(to.as_str())
        .bind(status_texts(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_payment_status_by_session(
        &self,
        session_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, updated_at = now()
            WHERE stripe_session_id = $1 AND status = ANY($3)
            "#,
        )
        .bind(session_id)
        .bind(to.as_str())
        .bind(status_texts(from))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, AppError> {
        let payment =
            sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE stripe_session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(payment)
    }

    async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("loading user payments")
    }

    async fn all_payments(&self) -> Result<Vec<Payment>, AppError> {
        sqlx::query_as::<_, Payment>("SELECT * FROM payments ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .context("loading payments")
    }

    async fn insert_invoice(&self, new: NewInvoice) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (id, user_id, amount_cents, description, due_date, status)
            VALUES ($1, $2, $3, $4, $5, 'draft')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.amount_cents)
        .bind(&new.description)
        .bind(new.due_date)
        .fetch_one(&self.pool)
        .await
        .context("inserting invoice")
    }

    async fn invoice(&self, id: Uuid) -> Result<Option<Invoice>, AppError> {
        let invoice = sqlx::query_as::<_, Invoice>("SELECT * FROM invoices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    async fn update_invoice_status(
        &self,
        id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE invoices SET status = $3, updated_at = now() WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_consultation(
        &self,
        new: NewConsultationRequest,
    ) -> Result<ConsultationRequest, AppError> {
        sqlx::query_as::<_, ConsultationRequest>(
            r#"
            INSERT INTO consultation_requests (
                id, name, email, phone, country, service_type, message, status, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 'normal')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.country)
        .bind(&new.service_type)
        .bind(&new.message)
        .fetch_one(&self.pool)
        .await
        .context("inserting consultation request")
    }

    async fn consultation(&self, id: Uuid) -> Result<Option<ConsultationRequest>, AppError> {
        let request = sqlx::query_as::<_, ConsultationRequest>(
            "SELECT * FROM consultation_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(request)
    }

    async fn consultations(&self) -> Result<Vec<ConsultationRequest>, AppError> {
        sqlx::query_as::<_, ConsultationRequest>(
            "SELECT * FROM consultation_requests ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading consultation requests")
    }

    async fn update_consultation_status(
        &self,
        id: Uuid,
        from: ConsultationStatus,
        to: ConsultationStatus,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE consultation_requests
            SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_chat_session(
        &self,
        user_id: Uuid,
        title: &str,
    ) -> Result<ChatSession, AppError> {
        sqlx::query_as::<_, ChatSession>(
            "INSERT INTO chat_sessions (id, user_id, title) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .context("creating chat session")
    }

    async fn chat_session(&self, id: Uuid) -> Result<Option<ChatSession>, AppError> {
        let session = sqlx::query_as::<_, ChatSession>("SELECT * FROM chat_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(session)
    }

    async fn append_chat_message(
        &self,
        session_id: Uuid,
        role: MessageRole,
        content: &str,
    ) -> Result<ChatMessage, AppError> {
        let mut tx = self.pool.begin().await?;

        let message = sqlx::query_as::<_, ChatMessage>(
            r#"
            INSERT INTO chat_messages (id, session_id, role, content)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE chat_sessions SET updated_at = now() WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(message)
    }

    async fn chat_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        sqlx::query_as::<_, ChatMessage>(
            "SELECT * FROM chat_messages WHERE session_id = $1 ORDER BY created_at ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("loading chat transcript")
    }

    async fn sweep_orphaned_bookings(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<SweepReport, AppError> {
        let mut tx = self.pool.begin().await?;

        let cancelled: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE appointments a
            SET status = 'cancelled', updated_at = now()
            WHERE a.status = 'scheduled'
              AND a.payment_required
              AND a.created_at < $1
              AND NOT EXISTS (
                  SELECT 1 FROM payments p
                  WHERE p.appointment_id = a.id AND p.status = 'completed'
              )
            RETURNING a.id
            "#,
        )
        .bind(created_before)
        .fetch_all(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = cancelled.into_iter().map(|(id,)| id).collect();

        let expired = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'expired', updated_at = now()
            WHERE appointment_id = ANY($1) AND status = 'pending'
            "#,
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(SweepReport {
            appointments_cancelled: ids.len() as u64,
            payments_expired: expired.rows_affected(),
        })
    }
}
